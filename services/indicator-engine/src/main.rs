use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use indicator_engine::events::MarketEvent;
use indicator_engine::http::create_router;
use indicator_engine::{Engine, EngineConfig, EngineError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => EngineConfig::default(),
    };
    let engine = Arc::new(Engine::new(config)?);

    let addr: SocketAddr = std::env::var("INDICATOR_ENGINE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("parsing INDICATOR_ENGINE_ADDR")?;

    tokio::spawn(ingest_stdin(engine.clone()));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving indicator queries");
    axum::serve(listener, create_router(engine)).await?;

    Ok(())
}

/// Newline-delimited JSON market events from stdin.
async fn ingest_stdin(engine: Arc<Engine>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Failed reading stdin");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: MarketEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = line_no, error = %err, "Skipping malformed event");
                continue;
            }
        };
        match engine.submit(event) {
            Ok(()) | Err(EngineError::Overflow { .. }) => {}
            Err(err) => warn!(line = line_no, error = %err, "Event not submitted"),
        }
    }

    engine.flush_all();
    info!(lines = line_no, "Input stream ended, open bars flushed");
}
