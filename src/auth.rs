//! Bearer token issuance for the upstream Firehose endpoint.
//!
//! An API key is exchanged for a short-lived JWT at the token endpoint; the
//! token is attached to every upstream call by [`BearerAuth`] and re-issued
//! in the background before it expires.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(30);
const MIN_REFRESH: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    api_key: &'a str,
    lifetime: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl IssuedToken {
    /// How long to wait before re-issuing: 80% of the remaining lifetime.
    pub fn refresh_in(&self, now: i64) -> Duration {
        let remaining = (self.expires_at - now).max(0) as u64;
        Duration::from_secs(remaining * 4 / 5).max(MIN_REFRESH)
    }
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    http: reqwest::Client,
    url: String,
    api_key: String,
    lifetime_secs: u64,
}

impl TokenIssuer {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, lifetime_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            lifetime_secs,
        }
    }

    pub async fn issue(&self) -> Result<IssuedToken> {
        let response = self
            .http
            .post(&self.url)
            .json(&IssueRequest {
                api_key: &self.api_key,
                lifetime: self.lifetime_secs,
            })
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token endpoint returned {status}: {body}")));
        }

        response
            .json::<IssuedToken>()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))
    }
}

/// Shared holder of the current `authorization` header value.
#[derive(Debug, Clone, Default)]
pub struct TokenCell(Arc<RwLock<Option<MetadataValue<Ascii>>>>);

impl TokenCell {
    pub fn set(&self, token: &str) -> Result<()> {
        let value: MetadataValue<Ascii> = format!("Bearer {token}")
            .parse()
            .map_err(|_| Error::Auth("token is not a valid header value".into()))?;
        let mut slot = self
            .0
            .write()
            .map_err(|_| Error::Internal("token lock poisoned".into()))?;
        *slot = Some(value);
        Ok(())
    }

    fn get(&self) -> Option<MetadataValue<Ascii>> {
        self.0.read().ok().and_then(|slot| slot.clone())
    }
}

/// Interceptor adding the bearer token, if any, to outgoing calls.
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    token: TokenCell,
}

impl BearerAuth {
    pub fn new(token: TokenCell) -> Self {
        Self { token }
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        if let Some(value) = self.token.get() {
            request.metadata_mut().insert("authorization", value);
        }
        Ok(request)
    }
}

/// Issues the first token and keeps re-issuing until `cancel` fires.
pub async fn start_refresh(
    issuer: TokenIssuer,
    cell: TokenCell,
    cancel: CancellationToken,
) -> Result<()> {
    let first = issuer.issue().await?;
    cell.set(&first.token)?;
    info!(expires_at = first.expires_at, "Upstream token issued");

    let mut wait = first.refresh_in(chrono::Utc::now().timestamp());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("token refresh stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            wait = match issuer.issue().await {
                Ok(token) => match cell.set(&token.token) {
                    Ok(()) => {
                        debug!(expires_at = token.expires_at, "Upstream token refreshed");
                        token.refresh_in(chrono::Utc::now().timestamp())
                    }
                    Err(e) => {
                        warn!("Failed to store refreshed token: {}", e);
                        RETRY_AFTER_FAILURE
                    }
                },
                Err(e) => {
                    warn!("Failed to refresh upstream token: {}", e);
                    RETRY_AFTER_FAILURE
                }
            };
        }
    });
    Ok(())
}
