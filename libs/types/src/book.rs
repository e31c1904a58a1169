//! L2 order book snapshot types
//!
//! Bids are ordered best-first (descending price), asks best-first
//! (ascending price). A snapshot with both sides present must not be
//! crossed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::Symbol;
use crate::numeric::{Nanos, Price, Size};

/// A single aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Size,
}

impl BookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// L2 order book state at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Unix nanoseconds from the exchange clock
    pub timestamp: Nanos,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    pub fn new(symbol: Symbol, timestamp: Nanos, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        Self {
            symbol,
            timestamp,
            bids,
            asks,
        }
    }

    /// Best (highest) bid level.
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask level.
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Mid-market price, when both sides are present.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Validate and canonicalize: empty levels are dropped, prices and
    /// sizes normalized, ordering and crossing checked.
    pub fn canonicalize(mut self) -> Result<Self, ValidationError> {
        if self.timestamp < 0 {
            return Err(ValidationError::InvalidTimestamp(self.timestamp));
        }
        self.bids = canonical_levels(self.bids)?;
        self.asks = canonical_levels(self.asks)?;

        if let Some(index) = first_unsorted(&self.bids, |prev, next| prev > next) {
            return Err(ValidationError::UnsortedBids { index });
        }
        if let Some(index) = first_unsorted(&self.asks, |prev, next| prev < next) {
            return Err(ValidationError::UnsortedAsks { index });
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(ValidationError::CrossedBook {
                    bid: bid.price.to_string(),
                    ask: ask.price.to_string(),
                });
            }
        }
        Ok(self)
    }
}

fn canonical_levels(levels: Vec<BookLevel>) -> Result<Vec<BookLevel>, ValidationError> {
    let mut out = Vec::with_capacity(levels.len());
    for level in levels {
        if level.price <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice(level.price.to_string()));
        }
        if level.size < Decimal::ZERO {
            return Err(ValidationError::InvalidSize(level.size.to_string()));
        }
        if level.size.is_zero() {
            continue;
        }
        out.push(BookLevel::new(level.price.normalize(), level.size.normalize()));
    }
    Ok(out)
}

/// Index of the first level that breaks the strict ordering, if any.
fn first_unsorted(levels: &[BookLevel], ordered: impl Fn(Price, Price) -> bool) -> Option<usize> {
    levels
        .windows(2)
        .position(|pair| !ordered(pair[0].price, pair[1].price))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: i64, size: i64) -> BookLevel {
        BookLevel::new(Decimal::from(price), Decimal::from(size))
    }

    fn snapshot(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> BookSnapshot {
        BookSnapshot::new(Symbol::new("BTC-USD"), 1_000, bids, asks)
    }

    #[test]
    fn test_valid_snapshot() {
        let snap = snapshot(vec![level(100, 1), level(99, 2)], vec![level(101, 1), level(102, 3)])
            .canonicalize()
            .unwrap();
        assert_eq!(snap.best_bid().unwrap().price, Decimal::from(100));
        assert_eq!(snap.best_ask().unwrap().price, Decimal::from(101));
        assert_eq!(snap.mid_price(), Some(Decimal::new(1005, 1)));
    }

    #[test]
    fn test_unsorted_bids_rejected() {
        let err = snapshot(vec![level(99, 1), level(100, 2)], vec![])
            .canonicalize()
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsortedBids { index: 1 });
    }

    #[test]
    fn test_unsorted_asks_rejected() {
        let err = snapshot(vec![], vec![level(101, 1), level(101, 2)])
            .canonicalize()
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsortedAsks { index: 1 });
    }

    #[test]
    fn test_crossed_book_rejected() {
        let err = snapshot(vec![level(101, 1)], vec![level(100, 1)])
            .canonicalize()
            .unwrap_err();
        assert!(matches!(err, ValidationError::CrossedBook { .. }));
    }

    #[test]
    fn test_zero_size_levels_dropped() {
        let snap = snapshot(vec![level(100, 0), level(99, 2)], vec![level(101, 1)])
            .canonicalize()
            .unwrap();
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.best_bid().unwrap().price, Decimal::from(99));
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let snap = snapshot(vec![level(100, 1)], vec![]).canonicalize().unwrap();
        assert!(snap.mid_price().is_none());
    }
}
