//! Shared fixtures: a scripted upstream and block builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, LogData, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use futures::StreamExt;
use tonic::Status;

use firehose_events::pb::{eth, fh};
use firehose_events::upstream::UpstreamBlock;
use firehose_events::{Argument, BlockSource, Event, RawBlockStream, Value};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    event WithData(uint8 indexed kind, bytes data);
}

pub const EMITTER: Address = Address::new([0xe1; 20]);
pub const OTHER: Address = Address::new([0x0e; 20]);

/// Upstream adapter that panics when a stream is opened.
pub struct PanickingSource;

#[async_trait]
impl BlockSource for PanickingSource {
    async fn blocks(&self, _request: fh::Request) -> firehose_events::Result<RawBlockStream> {
        panic!("block source bug")
    }
}

/// Upstream that replays a fixed list of responses, optionally staying
/// open afterwards. Counts calls and currently open streams.
pub struct ScriptedSource {
    responses: Vec<Result<fh::Response, Status>>,
    hold_open: bool,
    calls: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

struct OpenStream(Arc<AtomicUsize>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<fh::Response, Status>>) -> Self {
        Self {
            responses,
            hold_open: false,
            calls: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn blocks(&self, _request: fh::Request) -> firehose_events::Result<RawBlockStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenStream(self.open.clone());

        let tail: RawBlockStream = if self.hold_open {
            futures::stream::pending().boxed()
        } else {
            futures::stream::empty().boxed()
        };
        Ok(futures::stream::iter(self.responses.clone())
            .chain(tail)
            .map(move |item| {
                let _ = &guard;
                item
            })
            .boxed())
    }
}

pub fn with_data_template() -> Event {
    Event::template(
        "WithData",
        vec![
            Argument::new("kind", Value::uint8(0), true),
            Argument::new("data", Value::bytes(Vec::new()), false),
        ],
    )
}

pub fn raw_log(address: Address, data: LogData, block_index: u32) -> eth::Log {
    eth::Log {
        address: address.to_vec(),
        topics: data.topics().iter().map(|t| t.to_vec()).collect(),
        data: data.data.to_vec(),
        block_index,
        ..Default::default()
    }
}

pub fn transfer_log(address: Address, token: u64, block_index: u32) -> eth::Log {
    let transfer = Transfer {
        from: Address::repeat_byte(0xf0),
        to: Address::repeat_byte(0x70),
        tokenId: U256::from(token),
    };
    raw_log(address, transfer.encode_log_data(), block_index)
}

pub fn with_data_log(address: Address, kind: u8, data: &[u8], block_index: u32) -> eth::Log {
    let event = WithData {
        kind,
        data: data.to_vec().into(),
    };
    raw_log(address, event.encode_log_data(), block_index)
}

pub fn tx(hash: u8, logs: Vec<eth::Log>) -> eth::TransactionTrace {
    eth::TransactionTrace {
        hash: B256::repeat_byte(hash).to_vec(),
        receipt: Some(eth::TransactionReceipt {
            logs,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn block(number: u64, traces: Vec<eth::TransactionTrace>) -> eth::Block {
    eth::Block {
        number,
        hash: B256::with_last_byte(number as u8).to_vec(),
        header: Some(eth::BlockHeader {
            number,
            parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8).to_vec(),
            timestamp: Some(prost_types::Timestamp {
                seconds: 1_700_000_000 + number as i64 * 12,
                nanos: 0,
            }),
            ..Default::default()
        }),
        transaction_traces: traces,
        ..Default::default()
    }
}

pub fn response(block: eth::Block, step: fh::ForkStep) -> Result<fh::Response, Status> {
    let cursor = format!("cursor-{}", block.number);
    Ok(UpstreamBlock::new(block, cursor, step).into_response())
}
