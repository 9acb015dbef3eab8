//! Upstream block feed.
//!
//! [`BlockSource`] opens raw `sf.firehose.v2` block streams. [`FirehoseClient`]
//! is the network implementation (TLS + bearer token); tests plug in
//! in-memory sources. [`BlockStream`] wraps an opened feed in a forwarding
//! task and a one-slot channel, and releases the feed when closed or dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use prost::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Status;
use tracing::{debug, info};

use crate::auth::{self, BearerAuth, TokenCell, TokenIssuer};
use crate::config::{EndpointConfig, FirehoseConfig};
use crate::error::{Error, Result};
use crate::pb::fh::stream_client::StreamClient;
use crate::pb::{eth, fh, transform, COMBINED_FILTER_TYPE_URL, ETH_BLOCK_TYPE_URL};
use crate::pipeline::{ContractSet, ExtractorSet};

pub type RawBlockStream = BoxStream<'static, std::result::Result<fh::Response, Status>>;

#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    async fn blocks(&self, request: fh::Request) -> Result<RawBlockStream>;
}

/// Network client for a Firehose endpoint. Cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct FirehoseClient {
    client: StreamClient<InterceptedService<Channel, BearerAuth>>,
    _refresh: Option<Arc<DropGuard>>,
}

impl FirehoseClient {
    pub async fn connect(config: &FirehoseConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let channel = dial(&endpoint).await?;
        info!(url = %endpoint.url, chain = ?config.chain, "Connected to Firehose");

        let token = TokenCell::default();
        let refresh = match &config.api_key {
            Some(api_key) => {
                let issuer = TokenIssuer::new(&config.token_url, api_key, config.token_lifetime_secs);
                let cancel = CancellationToken::new();
                auth::start_refresh(issuer, token.clone(), cancel.clone()).await?;
                Some(Arc::new(cancel.drop_guard()))
            }
            None => {
                info!("No API key configured, upstream calls are unauthenticated");
                None
            }
        };

        Ok(Self::from_channel(channel, token, refresh))
    }

    fn from_channel(channel: Channel, token: TokenCell, refresh: Option<Arc<DropGuard>>) -> Self {
        let client = StreamClient::with_interceptor(channel, BearerAuth::new(token))
            .max_decoding_message_size(usize::MAX);
        Self {
            client,
            _refresh: refresh,
        }
    }
}

async fn dial(config: &EndpointConfig) -> Result<Channel> {
    let mut endpoint = Endpoint::from_shared(config.url.clone())?
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Some(Duration::from_secs(15)));
    if !config.plaintext {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_webpki_roots())?;
    }
    Ok(endpoint.connect().await?)
}

#[async_trait]
impl BlockSource for FirehoseClient {
    async fn blocks(&self, request: fh::Request) -> Result<RawBlockStream> {
        let mut client = self.client.clone();
        let response = client.blocks(request).await?;
        Ok(response.into_inner().boxed())
    }
}

/// Upstream-side log filter. Advisory only: the local pipeline filters again.
pub fn log_filter_transform(contracts: &ContractSet, extractors: &ExtractorSet) -> prost_types::Any {
    let filter = transform::CombinedFilter {
        log_filters: vec![transform::LogFilter {
            addresses: contracts.iter().map(|a| a.to_vec()).collect(),
            event_signatures: extractors.hashes().map(|h| h.to_vec()).collect(),
        }],
        send_all_block_headers: false,
    };
    prost_types::Any {
        type_url: COMBINED_FILTER_TYPE_URL.to_string(),
        value: filter.encode_to_vec(),
    }
}

/// A decoded upstream block with its stream position. `raw` is the payload
/// exactly as the upstream sent it.
#[derive(Debug, Clone)]
pub struct UpstreamBlock {
    pub block: eth::Block,
    pub raw: prost_types::Any,
    pub cursor: String,
    pub step: fh::ForkStep,
}

impl UpstreamBlock {
    pub fn new(block: eth::Block, cursor: impl Into<String>, step: fh::ForkStep) -> Self {
        let raw = prost_types::Any {
            type_url: ETH_BLOCK_TYPE_URL.to_string(),
            value: block.encode_to_vec(),
        };
        Self {
            block,
            raw,
            cursor: cursor.into(),
            step,
        }
    }

    pub fn from_response(response: fh::Response) -> Result<Self> {
        let raw = response
            .block
            .ok_or_else(|| Error::Upstream(Status::data_loss("upstream response without a block")))?;
        if raw.type_url != ETH_BLOCK_TYPE_URL {
            return Err(Error::Upstream(Status::data_loss(format!(
                "unexpected block type {}",
                raw.type_url
            ))));
        }
        let block = eth::Block::decode(raw.value.as_slice())
            .map_err(|e| Error::Upstream(Status::data_loss(format!("malformed block: {e}"))))?;
        let step = fh::ForkStep::try_from(response.step).unwrap_or(fh::ForkStep::StepUnset);
        Ok(Self {
            block,
            raw,
            cursor: response.cursor,
            step,
        })
    }

    /// Inverse of [`UpstreamBlock::from_response`].
    pub fn into_response(self) -> fh::Response {
        fh::Response {
            block: Some(self.raw),
            step: self.step as i32,
            cursor: self.cursor,
        }
    }
}

/// Channel-backed view of one upstream block stream.
pub struct BlockStream {
    rx: mpsc::Receiver<Result<UpstreamBlock>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BlockStream {
    /// Opens the upstream stream and starts forwarding. Cancelling `parent`
    /// tears the stream down.
    pub async fn open(
        source: &dyn BlockSource,
        request: fh::Request,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let raw = tokio::select! {
            _ = parent.cancelled() => return Err(Error::Cancelled),
            raw = source.blocks(request) => raw?,
        };

        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(forward(raw, tx, cancel.clone()));
        Ok(Self {
            rx,
            cancel,
            task: Some(task),
        })
    }

    /// Next block, `None` once the upstream finished cleanly. An error is
    /// always the last item.
    pub async fn recv(&mut self) -> Option<Result<UpstreamBlock>> {
        self.rx.recv().await
    }

    /// Stops forwarding and waits until the upstream stream is released.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward(
    mut raw: RawBlockStream,
    tx: mpsc::Sender<Result<UpstreamBlock>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = raw.next() => next,
        };
        let item = match next {
            None => {
                debug!("upstream stream ended");
                break;
            }
            Some(Ok(response)) => UpstreamBlock::from_response(response),
            Some(Err(status)) => Err(Error::Upstream(status)),
        };

        let terminal = item.is_err();
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => if sent.is_err() { break },
        }
        if terminal {
            break;
        }
    }
    // `raw` drops here, closing the upstream call
}
