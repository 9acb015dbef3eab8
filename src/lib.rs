//! Firehose Event Extraction Library
//!
//! Turns a raw Firehose Ethereum block stream into a stream of decoded EVM
//! events, filtered by contract address and event signature.
//!
//! # Features
//!
//! - Event templates built from the wire `Value` model or from JSON ABI files
//! - Signature hashing and log decoding with `alloy-dyn-abi`
//! - Sparse per-block output with upstream cursor and fork step passthrough
//! - Authenticated upstream Firehose client with token refresh
//! - gRPC `EventsService` and an in-process client sharing one code path
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use firehose_events::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let upstream = FirehoseClient::connect(&config.firehose).await?;
//!     let client = InProcessClient::new(EventsHandler::new(Arc::new(upstream)));
//!
//!     let request = EventsRequest {
//!         contracts: vec!["0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d".parse::<Address>()?.to_vec()],
//!         start_block_num: 12_287_507,
//!         stop_block_num: 12_290_000,
//!         ..Default::default()
//!     };
//!
//!     let cancel = tokio_util::sync::CancellationToken::new();
//!     let mut stream = client.erc721_transfer_events(request, &cancel)?;
//!     while let Some(response) = stream.message().await? {
//!         if let Some(block) = response.block {
//!             println!("block {}: {} transactions", block.number, block.transactions.len());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pb;
pub mod pipeline;
pub mod service;
pub mod signature;
pub mod upstream;
pub mod value;

// Re-export commonly used types
pub use client::{EventResponseStream, EventStream, EventsClient, InProcessClient};
pub use crate::config::{Chain, Config, EndpointConfig, FirehoseConfig, ServiceConfig};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use pb::events::{
    Argument, Block, Event, EventsRequest, EventsResponse, Transaction, Value,
};
pub use pipeline::{extract, ContractSet, ExtractorSet};
pub use service::{EventsHandler, RequestPlan};
pub use signature::{erc721_transfer, load_json_abi_events};
pub use upstream::{BlockSource, BlockStream, FirehoseClient, RawBlockStream};

// Re-export Alloy types for convenience
pub use alloy_primitives::{Address, B256, U256};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
