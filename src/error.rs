//! Error types for the event extraction pipeline

use alloy_primitives::B256;
use thiserror::Error;
use tonic::{Code, Status};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Debug, Error)]
pub enum Error {
    /// The request is malformed and was rejected before any upstream work
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An argument has no ABI mapping or a payload does not fit its type
    #[error("ABI error: {0}")]
    Abi(String),

    /// A matched log could not be decoded with its signature
    #[error("decoding log {log_index} of transaction {tx}: {message}")]
    Decode {
        tx: B256,
        log_index: u32,
        message: String,
    },

    /// Log-level decode failure, before the transaction context is known
    #[error("log decode: {0}")]
    Log(String),

    /// The upstream block stream returned an error status
    #[error("upstream: {0}")]
    Upstream(#[from] Status),

    /// Dialing the upstream endpoint failed
    #[error("transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Token issuance failed
    #[error("authentication: {0}")]
    Auth(String),

    /// The caller's cancellation token fired
    #[error("stream cancelled")]
    Cancelled,

    /// The downstream receiver went away
    #[error("downstream receiver closed")]
    ReceiverGone,

    /// Broken internal invariant; indicates a bug rather than bad input
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Attaches transaction context to a log-level decode error.
    pub fn in_transaction(self, tx: B256, log_index: u32) -> Self {
        match self {
            Error::Log(message) | Error::Abi(message) => Error::Decode {
                tx,
                log_index,
                message,
            },
            other => other,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest(_) => Status::invalid_argument(err.to_string()),
            Error::Abi(_) | Error::Log(_) | Error::Decode { .. } => {
                Status::data_loss(err.to_string())
            }
            Error::Upstream(status) => status,
            Error::Transport(_) => Status::unavailable(err.to_string()),
            Error::Auth(_) => Status::unauthenticated(err.to_string()),
            Error::Cancelled => Status::cancelled(err.to_string()),
            Error::ReceiverGone => Status::new(Code::Aborted, err.to_string()),
            Error::Internal(_) => Status::internal(err.to_string()),
        }
    }
}
