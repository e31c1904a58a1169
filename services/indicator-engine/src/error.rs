//! Error taxonomy for the indicator engine
//!
//! Only conditions the caller must act on are errors. Degenerate windows
//! and incomplete warmup are not: they surface as
//! [`IndicatorValue::Undefined`](crate::indicators::IndicatorValue) points
//! so the stream keeps running through routine data gaps.

use thiserror::Error;
use types::errors::ValidationError;
use types::ids::Symbol;

use crate::config::ConfigError;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Event older than what the symbol has already closed, beyond the
    /// configured lateness tolerance. Rejected and counted.
    #[error("late data for {symbol}: event at {timestamp} is behind watermark {closed_through}")]
    LateData {
        symbol: Symbol,
        timestamp: i64,
        closed_through: i64,
    },

    /// The per-symbol ingest queue was full. The submitted event was queued;
    /// `dropped` oldest events were evicted to make room.
    #[error("ingest buffer overflow for {symbol}: capacity {capacity}, dropped {dropped} oldest events")]
    Overflow {
        symbol: Symbol,
        capacity: usize,
        dropped: u64,
    },

    /// Too many distinct ticks in open buckets to dedup them exactly. The
    /// tick is rejected rather than risk counting a re-delivery twice.
    #[error("dedup capacity exhausted for {symbol}: {limit} keys held for open buckets")]
    DedupCapacity { symbol: Symbol, limit: usize },

    /// Fatal at setup only.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid event: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Resolution {0} is not configured")]
    UnknownResolution(String),

    #[error("Partition for {0} has shut down")]
    ShutDown(String),
}

impl EngineError {
    /// Short label for logs and counters.
    pub fn kind_label(&self) -> &'static str {
        match self {
            EngineError::LateData { .. } => "late_data",
            EngineError::Overflow { .. } => "overflow",
            EngineError::DedupCapacity { .. } => "dedup_capacity",
            EngineError::Configuration(_) => "configuration",
            EngineError::Validation(_) => "validation",
            EngineError::UnknownSymbol(_) => "unknown_symbol",
            EngineError::UnknownIndicator(_) => "unknown_indicator",
            EngineError::UnknownResolution(_) => "unknown_resolution",
            EngineError::ShutDown(_) => "shut_down",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_data_display() {
        let err = EngineError::LateData {
            symbol: Symbol::new("BTC-USD"),
            timestamp: 5,
            closed_through: 10,
        };
        assert_eq!(
            err.to_string(),
            "late data for BTC-USD: event at 5 is behind watermark 10"
        );
        assert_eq!(err.kind_label(), "late_data");
    }

    #[test]
    fn test_from_validation_error() {
        let err: EngineError = ValidationError::InvalidPrice("0".to_string()).into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err: EngineError = ConfigError::EmptyIndicatorName.into();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(err.kind_label(), "configuration");
    }
}
