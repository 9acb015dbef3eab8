//! Request handling shared by the gRPC server and the in-process client.
//!
//! A request is validated and turned into a [`RequestPlan`] before any
//! upstream work. The plan then runs on one worker task which opens the
//! upstream block stream, extracts every block and pushes responses into a
//! channel. The worker stops on upstream EOF, on the first error, when the
//! receiver goes away, or when its cancellation token fires; the upstream
//! stream is released on every one of those paths.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pb::events::events_service_server::EventsService;
use crate::pb::events::{EventsRequest, EventsResponse};
use crate::pb::fh;
use crate::pipeline::{extract, ContractSet, ExtractorSet};
use crate::signature::erc721_transfer;
use crate::upstream::{log_filter_transform, BlockSource, BlockStream};

pub type ResponseSender = mpsc::Sender<std::result::Result<EventsResponse, Status>>;
pub type ResponseReceiver = mpsc::Receiver<std::result::Result<EventsResponse, Status>>;

/// How long a stopping worker waits for room to deliver its terminal status.
const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// A validated request: filters, extractors and the upstream request.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub contracts: ContractSet,
    pub extractors: ExtractorSet,
    pub upstream: fh::Request,
}

impl RequestPlan {
    pub fn events(request: EventsRequest) -> Result<Self> {
        if request.signatures.is_empty() {
            return Err(Error::invalid("at least one event signature is required"));
        }
        Self::build(request)
    }

    /// `Events` restricted to ERC-721 `Transfer`. The caller must not bring
    /// its own signatures.
    pub fn erc721_transfers(mut request: EventsRequest) -> Result<Self> {
        if !request.signatures.is_empty() {
            return Err(Error::invalid(
                "ERC721TransferEvents does not accept signatures, use Events instead",
            ));
        }
        request.signatures.push(erc721_transfer());
        Self::build(request)
    }

    fn build(request: EventsRequest) -> Result<Self> {
        let contracts = ContractSet::from_raw(&request.contracts)?;
        if contracts.is_empty() {
            return Err(Error::invalid("at least one contract address is required"));
        }
        if request.stop_block_num != 0
            && request.start_block_num >= 0
            && request.stop_block_num < request.start_block_num as u64
        {
            return Err(Error::invalid(format!(
                "stop block {} is before start block {}",
                request.stop_block_num, request.start_block_num
            )));
        }

        let extractors = ExtractorSet::from_templates(request.signatures).map_err(|e| match e {
            Error::Abi(message) => Error::InvalidRequest(message),
            other => other,
        })?;

        let upstream = fh::Request {
            start_block_num: request.start_block_num,
            cursor: request.cursor,
            stop_block_num: request.stop_block_num,
            final_blocks_only: request.final_blocks_only,
            transforms: vec![log_filter_transform(&contracts, &extractors)],
        };

        Ok(Self {
            contracts,
            extractors,
            upstream,
        })
    }
}

/// Runs request plans against a shared upstream source.
#[derive(Clone)]
pub struct EventsHandler {
    source: Arc<dyn BlockSource>,
    shutdown: CancellationToken,
}

impl EventsHandler {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        Self {
            source,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops every worker spawned through the gRPC server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns the worker for `plan`. Responses go into a one-slot channel; a
    /// terminal error, if any, is the last item before the channel closes.
    /// A panicking worker ends the stream with `Internal`.
    pub fn spawn(&self, plan: RequestPlan, cancel: CancellationToken) -> (ResponseReceiver, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let source = self.source.clone();
        let worker_tx = tx.clone();
        let worker = tokio::spawn(async move {
            run(source.as_ref(), plan, &cancel, &worker_tx).await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    error!("Events worker panicked");
                    send_terminal(&tx, Status::internal("events worker panicked")).await;
                }
            }
        });
        (rx, handle)
    }
}

async fn run(source: &dyn BlockSource, plan: RequestPlan, cancel: &CancellationToken, tx: &ResponseSender) {
    info!(
        contracts = plan.contracts.len(),
        signatures = plan.extractors.len(),
        start = plan.upstream.start_block_num,
        stop = plan.upstream.stop_block_num,
        "Starting events stream"
    );

    match stream_blocks(source, plan, cancel, tx).await {
        Ok(()) => info!("Events stream completed"),
        Err(Error::ReceiverGone) => debug!("events receiver went away"),
        Err(Error::Cancelled) => {
            info!("Events stream cancelled");
            send_terminal(tx, Error::Cancelled.into()).await;
        }
        Err(err) => {
            warn!("Events stream failed: {}", err);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tx.send(Err(err.into())) => {}
            }
        }
    }
}

/// Best effort delivery of the last item. A reader that stopped draining or
/// went away does not hold the worker.
async fn send_terminal(tx: &ResponseSender, status: Status) {
    if tokio::time::timeout(TERMINAL_SEND_TIMEOUT, tx.send(Err(status)))
        .await
        .is_err()
    {
        debug!("terminal status not delivered");
    }
}

async fn stream_blocks(
    source: &dyn BlockSource,
    plan: RequestPlan,
    cancel: &CancellationToken,
    tx: &ResponseSender,
) -> Result<()> {
    let RequestPlan {
        contracts,
        extractors,
        upstream,
    } = plan;

    let mut blocks = BlockStream::open(source, upstream, cancel).await?;
    let result = pump(&mut blocks, &contracts, &extractors, cancel, tx).await;
    blocks.close().await;
    result
}

async fn pump(
    blocks: &mut BlockStream,
    contracts: &ContractSet,
    extractors: &ExtractorSet,
    cancel: &CancellationToken,
    tx: &ResponseSender,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tx.closed() => return Err(Error::ReceiverGone),
            next = blocks.recv() => next,
        };
        let Some(upstream) = next else {
            return Ok(());
        };
        let upstream = upstream?;

        let block = extract(&upstream.block, contracts, extractors)?;
        debug!(
            number = block.number,
            transactions = block.transactions.len(),
            step = ?upstream.step,
            "block extracted"
        );
        if block.transactions.is_empty() {
            continue;
        }

        let response = EventsResponse {
            block: Some(block),
            cursor: upstream.cursor,
            step: upstream.step as i32,
            raw_block: Some(upstream.raw),
        };
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = tx.send(Ok(response)) => sent.map_err(|_| Error::ReceiverGone)?,
        }
    }
}

#[tonic::async_trait]
impl EventsService for EventsHandler {
    type EventsStream = ReceiverStream<std::result::Result<EventsResponse, Status>>;
    type ERC721TransferEventsStream = ReceiverStream<std::result::Result<EventsResponse, Status>>;

    async fn events(
        &self,
        request: Request<EventsRequest>,
    ) -> std::result::Result<Response<Self::EventsStream>, Status> {
        let plan = RequestPlan::events(request.into_inner())?;
        let (rx, _worker) = self.spawn(plan, self.shutdown.child_token());
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn erc721_transfer_events(
        &self,
        request: Request<EventsRequest>,
    ) -> std::result::Result<Response<Self::ERC721TransferEventsStream>, Status> {
        let plan = RequestPlan::erc721_transfers(request.into_inner())?;
        let (rx, _worker) = self.spawn(plan, self.shutdown.child_token());
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
