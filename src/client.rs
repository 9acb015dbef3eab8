//! Client side of the events API.
//!
//! [`InProcessClient`] drives the same request handling as the gRPC server
//! without a network hop: a request is validated synchronously, then one
//! worker task pushes responses into a one-slot channel that the caller
//! drains through [`EventStream`]. [`EventsClient`] abstracts over it and the
//! generated tonic client so callers can pick either transport.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::transport::Channel;
use tonic::Status;

use crate::pb::events::events_service_client::EventsServiceClient;
use crate::pb::events::{EventsRequest, EventsResponse};
use crate::service::{EventsHandler, RequestPlan, ResponseReceiver};

pub type EventResponseStream = BoxStream<'static, Result<EventsResponse, Status>>;

#[derive(Clone)]
pub struct InProcessClient {
    handler: EventsHandler,
}

impl InProcessClient {
    pub fn new(handler: EventsHandler) -> Self {
        Self { handler }
    }

    /// Starts an `Events` stream. Validation errors come back immediately and
    /// no worker is started for them.
    pub fn events(&self, request: EventsRequest, cancel: &CancellationToken) -> Result<EventStream, Status> {
        let plan = RequestPlan::events(request)?;
        Ok(self.start(plan, cancel))
    }

    pub fn erc721_transfer_events(
        &self,
        request: EventsRequest,
        cancel: &CancellationToken,
    ) -> Result<EventStream, Status> {
        let plan = RequestPlan::erc721_transfers(request)?;
        Ok(self.start(plan, cancel))
    }

    fn start(&self, plan: RequestPlan, cancel: &CancellationToken) -> EventStream {
        let worker = cancel.child_token();
        let (rx, task) = self.handler.spawn(plan, worker.clone());
        EventStream {
            rx,
            cancel: cancel.clone(),
            task,
            _worker: worker.drop_guard(),
        }
    }
}

/// Responses of one in-process request. Dropping it stops the worker.
pub struct EventStream {
    rx: ResponseReceiver,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _worker: DropGuard,
}

impl EventStream {
    /// Next response. `Ok(None)` means the upstream completed; an error is
    /// terminal and a crashed worker reports `Internal`. Once the caller's
    /// token is cancelled this returns `Cancelled` without waiting on the
    /// worker.
    pub async fn message(&mut self) -> Result<Option<EventsResponse>, Status> {
        if self.cancel.is_cancelled() {
            return Err(Status::cancelled("request cancelled"));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Status::cancelled("request cancelled")),
            item = self.rx.recv() => item.transpose(),
        }
    }

    /// True once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the worker task to exit.
    pub async fn join(self) {
        let EventStream {
            rx, task, _worker: worker, ..
        } = self;
        drop(rx);
        drop(worker);
        let _ = task.await;
    }

    pub fn into_stream(self) -> EventResponseStream {
        stream::unfold(Some(self), |state| async move {
            let Some(mut events) = state else {
                return None;
            };
            match events.message().await {
                Ok(Some(response)) => Some((Ok(response), Some(events))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
        .boxed()
    }
}

/// Transport independent access to the events API.
#[async_trait]
pub trait EventsClient: Send {
    async fn events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status>;

    async fn erc721_transfer_events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status>;
}

#[async_trait]
impl EventsClient for EventsServiceClient<Channel> {
    async fn events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status> {
        let response = EventsServiceClient::events(self, request).await?;
        Ok(response.into_inner().boxed())
    }

    async fn erc721_transfer_events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status> {
        let response = EventsServiceClient::erc721_transfer_events(self, request).await?;
        Ok(response.into_inner().boxed())
    }
}

#[async_trait]
impl EventsClient for InProcessClient {
    async fn events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status> {
        let stream = InProcessClient::events(self, request, &CancellationToken::new())?;
        Ok(stream.into_stream())
    }

    async fn erc721_transfer_events(&mut self, request: EventsRequest) -> Result<EventResponseStream, Status> {
        let stream = InProcessClient::erc721_transfer_events(self, request, &CancellationToken::new())?;
        Ok(stream.into_stream())
    }
}
