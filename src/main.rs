//! Firehose Events Service - decoded EVM events over gRPC

use std::sync::Arc;

use anyhow::Result;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firehose_events::pb::events::events_service_server::EventsServiceServer;
use firehose_events::{Config, EventsHandler, FirehoseClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let log_level = config.service.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Configuration loaded successfully");

    let upstream = FirehoseClient::connect(&config.firehose).await?;
    let handler = EventsHandler::new(Arc::new(upstream));
    let shutdown = handler.shutdown_token();

    let addr = config.listen_addr()?;
    info!("Starting Firehose Events Service on {}", addr);

    Server::builder()
        .add_service(EventsServiceServer::new(handler).max_encoding_message_size(usize::MAX))
        .serve_with_shutdown(addr, async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, stopping streams");
            shutdown.cancel();
        })
        .await?;

    info!("Firehose Events Service stopped");
    Ok(())
}
