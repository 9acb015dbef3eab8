//! Events CLI - streams decoded events from a running firehose-events server

use std::path::PathBuf;

use alloy_primitives::{hex, Address, B256};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use futures::StreamExt;
use serde_json::json;
use tonic::transport::{Channel, ClientTlsConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firehose_events::pb::events::events_service_client::EventsServiceClient;
use firehose_events::pb::fh::ForkStep;
use firehose_events::{load_json_abi_events, EventsClient, EventsRequest, EventsResponse};

#[derive(Parser, Debug)]
#[command(name = "events-cli")]
#[command(about = "Stream decoded EVM events from a firehose-events server", long_about = None)]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, env = "EVENTS_SERVER_URL", default_value = "http://127.0.0.1:9000")]
    server: String,

    /// Contract addresses to watch (repeatable)
    #[arg(short, long = "contract", required = true)]
    contracts: Vec<Address>,

    /// JSON ABI file to take event signatures from
    #[arg(short, long, conflicts_with = "erc721")]
    abi: Option<PathBuf>,

    /// Event names to pick from the ABI (default: every supported event)
    #[arg(short, long = "event")]
    events: Vec<String>,

    /// Stream ERC-721 Transfer events only
    #[arg(long)]
    erc721: bool,

    /// First block, negative values are relative to the chain head
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    start: i64,

    /// Last block (0 = follow the chain)
    #[arg(long, default_value = "0")]
    stop: u64,

    /// Resume from a cursor returned by an earlier run
    #[arg(long, default_value = "")]
    cursor: String,

    /// Only stream irreversible blocks
    #[arg(long)]
    final_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let signatures = match (&cli.abi, cli.erc721) {
        (Some(path), false) => load_json_abi_events(path, &cli.events)?,
        (None, true) => Vec::new(),
        _ => bail!("pass either --abi or --erc721"),
    };
    if !cli.erc721 && signatures.is_empty() {
        bail!("no supported events found in the ABI");
    }

    let request = EventsRequest {
        contracts: cli.contracts.iter().map(|a| a.to_vec()).collect(),
        signatures,
        start_block_num: cli.start,
        stop_block_num: cli.stop,
        cursor: cli.cursor.clone(),
        final_blocks_only: cli.final_only,
    };

    let mut endpoint = Channel::from_shared(cli.server.clone())?;
    if cli.server.starts_with("https://") {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_webpki_roots())?;
    }
    let channel = endpoint.connect().await?;
    let mut client = EventsServiceClient::new(channel).max_decoding_message_size(usize::MAX);
    info!("Connected to {}", cli.server);

    let mut stream = if cli.erc721 {
        EventsClient::erc721_transfer_events(&mut client, request).await?
    } else {
        EventsClient::events(&mut client, request).await?
    };

    while let Some(response) = stream.next().await {
        for line in render(&response?) {
            println!("{line}");
        }
    }

    Ok(())
}

/// One JSON line per event.
fn render(response: &EventsResponse) -> Vec<String> {
    let Some(block) = &response.block else {
        return Vec::new();
    };
    let time = block
        .timestamp
        .as_ref()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
        .map(|t| t.to_rfc3339());
    let step = ForkStep::try_from(response.step)
        .map(|s| s.as_str_name())
        .unwrap_or("STEP_UNSET");

    block
        .transactions
        .iter()
        .flat_map(|tx| {
            let tx_hash = fixed_hash(&tx.hash);
            tx.events.iter().map(move |event| (tx_hash.clone(), event))
        })
        .map(|(tx_hash, event)| {
            json!({
                "block": block.number,
                "block_hash": fixed_hash(&block.hash),
                "time": time,
                "step": step,
                "cursor": response.cursor,
                "tx": tx_hash,
                "event": event.to_json(),
            })
            .to_string()
        })
        .collect()
}

fn fixed_hash(raw: &[u8]) -> String {
    if raw.len() == 32 {
        B256::from_slice(raw).to_string()
    } else {
        hex::encode_prefixed(raw)
    }
}
