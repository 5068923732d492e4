//! mcpsse-tap - pipe stdin/stdout through an SSE JSON-RPC session.
//!
//! Each stdin line is parsed as a JSON-RPC message and sent to the server;
//! each message from the server is printed to stdout as one JSON line. Logs go
//! to stderr so stdout stays machine-readable.

use anyhow::Result;
use clap::Parser;
use mcpsse_core::{
    EnvelopeReceiver, EnvelopeSender, JsonRpcMessage, ParseError, SessionConfig,
    SseServerParameters, TransportConfig, TransportSession,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "mcpsse-tap")]
#[command(about = "Bridge stdin/stdout to a JSON-RPC server over HTTP and SSE")]
struct Args {
    /// SSE endpoint of the server
    #[arg(short, long, default_value = TransportConfig::DEFAULT_SSE_ENDPOINT)]
    endpoint: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Delay before reconnecting a dropped event stream, in milliseconds
    #[arg(long, default_value_t = 1000)]
    reconnect_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug when set
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let params = SseServerParameters::new(args.endpoint);
    let config = SessionConfig::default()
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms));

    let mut session = TransportSession::new(params, config)?;
    let (inbound, outbound) = session.open()?.into_parts();
    info!("Connected to {}", session.url());

    let stdin_task = tokio::spawn(pump_stdin(outbound));
    let result = tokio::select! {
        result = print_inbound(inbound) => result,
        joined = stdin_task => {
            debug!("stdin closed");
            joined?
        }
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.map_err(Into::into)
        }
    };

    session.close().await;
    if let Some(stats) = session.sender_stats() {
        info!(
            "Session closed (sent={}, dropped={}, failed={})",
            stats.sent(),
            stats.dropped(),
            stats.failed()
        );
    }
    result
}

/// Classify one stdin line. Blank lines yield `None`.
fn parse_line(line: &str) -> Option<std::result::Result<JsonRpcMessage, ParseError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(JsonRpcMessage::parse(line))
}

async fn pump_stdin(outbound: EnvelopeSender) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            None => {}
            Some(Ok(message)) => {
                if outbound.send(message).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => warn!("Skipping stdin line: {}", e),
        }
    }
    Ok(())
}

async fn print_inbound(mut inbound: EnvelopeReceiver) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    while let Some(message) = inbound.recv().await {
        match message.to_json() {
            Ok(json) => {
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(e) => error!("Failed to serialize {}: {}", message.describe(), e),
        }
    }
    Ok(())
}
