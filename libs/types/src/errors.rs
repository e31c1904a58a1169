//! Error types for event validation
//!
//! Raised when an ingestion source hands over an event that cannot be
//! canonicalized. These are data-shape errors: the engine counts and logs
//! them, it never halts the stream because of one.

use thiserror::Error;

/// Validation failures for incoming ticks, book snapshots and identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Bid levels not strictly descending at level {index}")]
    UnsortedBids { index: usize },

    #[error("Ask levels not strictly ascending at level {index}")]
    UnsortedAsks { index: usize },

    #[error("Crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook { bid: String, ask: String },

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossed_book_display() {
        let err = ValidationError::CrossedBook {
            bid: "101".to_string(),
            ask: "100".to_string(),
        };
        assert_eq!(err.to_string(), "Crossed book: best bid 101 >= best ask 100");
    }

    #[test]
    fn test_invalid_symbol_display() {
        let err = ValidationError::InvalidSymbol("  ".to_string());
        assert!(err.to_string().contains("Invalid symbol"));
    }
}
