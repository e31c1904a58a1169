//! Deterministic replay
//!
//! Window state is never persisted; it is recomputed by replaying the
//! ingestion source. Replay builds a fresh partition, applies events in
//! order and checksums the materialized series:
//! - Same configuration and events → same checksum
//! - Re-applying an already-seen prefix leaves the checksum unchanged
//! - An optional expected checksum turns replay into a verification step

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use types::ids::Symbol;

use crate::config::{ConfigError, EngineConfig};
use crate::events::MarketEvent;
use crate::partition::SymbolPartition;
use crate::query::SeriesStore;

/// Metrics collected during replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayMetrics {
    pub events_replayed: u64,
    /// Events rejected as late or invalid.
    pub events_rejected: u64,
    pub duration_ms: u128,
    pub state_checksum: String,
}

/// Result of a replay operation.
pub struct ReplayResult {
    pub partition: SymbolPartition,
    pub metrics: ReplayMetrics,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("state checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Replays a symbol's event stream into a fresh partition.
pub struct ReplayEngine {
    config: EngineConfig,
    expected_checksum: Option<String>,
    flush_at_end: bool,
}

impl ReplayEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            expected_checksum: None,
            flush_at_end: false,
        }
    }

    /// Verify the post-replay checksum.
    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    /// Treat the event sequence as the whole stream and close every open
    /// bar once it is exhausted.
    pub fn with_flush(mut self) -> Self {
        self.flush_at_end = true;
        self
    }

    pub fn replay<I>(&self, symbol: Symbol, events: I) -> Result<ReplayResult, ReplayError>
    where
        I: IntoIterator<Item = MarketEvent>,
    {
        let start = Instant::now();
        let config = Arc::new(self.config.resolve()?);
        let mut partition = SymbolPartition::standalone(symbol.clone(), config);

        info!(symbol = %symbol, "Starting event replay");

        let mut events_replayed = 0u64;
        let mut events_rejected = 0u64;
        for event in events {
            events_replayed += 1;
            if partition.apply(event).is_err() {
                events_rejected += 1;
            }
        }
        if self.flush_at_end {
            partition.flush();
        }

        let state_checksum = partition.state_checksum();
        if let Some(expected) = &self.expected_checksum {
            if &state_checksum != expected {
                error!(
                    symbol = %symbol,
                    expected = %expected,
                    actual = %state_checksum,
                    "State checksum mismatch after replay"
                );
                return Err(ReplayError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: state_checksum,
                });
            }
        }

        let metrics = ReplayMetrics {
            events_replayed,
            events_rejected,
            duration_ms: start.elapsed().as_millis(),
            state_checksum,
        };
        info!(
            symbol = %symbol,
            events_replayed = metrics.events_replayed,
            events_rejected = metrics.events_rejected,
            duration_ms = metrics.duration_ms,
            "Replay completed"
        );

        Ok(ReplayResult { partition, metrics })
    }
}

/// Replay `events` for `symbol` under `config`, returning the rebuilt
/// partition and its state checksum.
pub fn replay<I>(
    config: &EngineConfig,
    symbol: Symbol,
    events: I,
) -> Result<(SymbolPartition, String), ReplayError>
where
    I: IntoIterator<Item = MarketEvent>,
{
    let result = ReplayEngine::new(config.clone()).replay(symbol, events)?;
    Ok((result.partition, result.metrics.state_checksum))
}

/// Checksum over every closed bar and indicator point in a store.
pub fn checksum(store: &SeriesStore) -> String {
    let mut hasher = Sha256::new();

    for (resolution, bars) in store.bar_series() {
        hasher.update(resolution.to_string().as_bytes());
        hasher.update(b"|");
        for bar in bars {
            for field in [
                bar.bucket_start.to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
                bar.buy_volume.to_string(),
                bar.sell_volume.to_string(),
                bar.tick_count.to_string(),
            ] {
                hasher.update(field.as_bytes());
                hasher.update(b":");
            }
            hasher.update(b",");
        }
        hasher.update(b"===");
    }

    for (resolution, name, points) in store.point_series() {
        if let Some(resolution) = resolution {
            hasher.update(resolution.to_string().as_bytes());
        }
        hasher.update(b"/");
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        for point in points {
            hasher.update(point.timestamp.to_string().as_bytes());
            hasher.update(b"=");
            hasher.update(serde_json::to_string(&point.value).unwrap_or_default().as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"===");
    }

    format!("{:x}", hasher.finalize())
}
