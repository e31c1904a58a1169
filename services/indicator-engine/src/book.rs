//! Order-book derived metrics
//!
//! Computed once per accepted [`BookSnapshot`], independent of bar
//! resolution:
//! - Bid-ask spread, absolute and in basis points of mid
//! - L2 execution price: the volume-weighted average price of walking the
//!   book until a requested size is filled, for both sides
//!
//! All arithmetic stays in `Decimal` except the bps ratio.

use rust_decimal::Decimal;
use types::book::{BookLevel, BookSnapshot};
use types::numeric::to_f64;

use crate::config::IndicatorSpec;
use crate::indicators::{ExecutionQuote, IndicatorSettings, IndicatorValue, UndefinedReason};

const BPS: i64 = 10_000;

/// A configured book indicator instance.
#[derive(Debug, Clone, PartialEq)]
pub enum BookIndicator {
    Spread,
    L2Price { sizes: Vec<Decimal> },
}

impl BookIndicator {
    /// Book indicator for a configured instance; `None` for bar-driven kinds.
    pub fn from_spec(spec: &IndicatorSpec) -> Option<Self> {
        match &spec.settings {
            IndicatorSettings::Spread => Some(BookIndicator::Spread),
            IndicatorSettings::L2Price { sizes } => Some(BookIndicator::L2Price {
                sizes: sizes.clone(),
            }),
            _ => None,
        }
    }

    pub fn compute(&self, book: &BookSnapshot) -> IndicatorValue {
        match self {
            BookIndicator::Spread => spread(book),
            BookIndicator::L2Price { sizes } => execution_prices(book, sizes),
        }
    }
}

/// Absolute spread and spread in bps of mid.
pub fn spread(book: &BookSnapshot) -> IndicatorValue {
    let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
        return IndicatorValue::Undefined {
            reason: UndefinedReason::EmptyBook,
        };
    };
    let absolute = ask.price - bid.price;
    let mid = (ask.price + bid.price) / Decimal::TWO;
    if mid.is_zero() {
        return IndicatorValue::degenerate();
    }
    let bps = to_f64(absolute / mid * Decimal::from(BPS));
    IndicatorValue::Spread { absolute, bps }
}

/// Average execution price of filling `size` against `levels`, best first.
/// `None` if the levels hold less than `size` in total.
pub fn walk_levels(levels: &[BookLevel], size: Decimal) -> Option<Decimal> {
    if size <= Decimal::ZERO {
        return None;
    }
    let mut remaining = size;
    let mut notional = Decimal::ZERO;
    for level in levels {
        let take = remaining.min(level.size);
        notional += take * level.price;
        remaining -= take;
        if remaining.is_zero() {
            return Some((notional / size).normalize());
        }
    }
    None
}

/// Buy (asks) and sell (bids) execution prices for each requested size.
pub fn execution_prices(book: &BookSnapshot, sizes: &[Decimal]) -> IndicatorValue {
    if book.bids.is_empty() && book.asks.is_empty() {
        return IndicatorValue::Undefined {
            reason: UndefinedReason::EmptyBook,
        };
    }
    let quotes = sizes
        .iter()
        .map(|&size| ExecutionQuote {
            size,
            buy: walk_levels(&book.asks, size),
            sell: walk_levels(&book.bids, size),
        })
        .collect();
    IndicatorValue::Execution { quotes }
}

/// Total size resting on a side.
pub fn depth(levels: &[BookLevel]) -> Decimal {
    levels.iter().map(|level| level.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::Symbol;

    fn level(price: &str, size: &str) -> BookLevel {
        BookLevel::new(price.parse().unwrap(), size.parse().unwrap())
    }

    fn book(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> BookSnapshot {
        BookSnapshot::new(Symbol::new("BTC-USD"), 1, bids, asks)
    }

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_spread() {
        let b = book(vec![level("99.5", "10")], vec![level("100.5", "10")]);
        match spread(&b) {
            IndicatorValue::Spread { absolute, bps } => {
                assert_eq!(absolute, Decimal::ONE);
                assert!((bps - 100.0).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_spread_one_sided_book() {
        let b = book(vec![level("99.5", "10")], vec![]);
        assert_eq!(
            spread(&b),
            IndicatorValue::Undefined {
                reason: UndefinedReason::EmptyBook
            }
        );
    }

    #[test]
    fn test_execution_within_first_level() {
        let b = book(vec![level("99.5", "10")], vec![level("100.5", "10")]);
        assert_eq!(walk_levels(&b.asks, d("5")), Some(d("100.5")));
        assert_eq!(walk_levels(&b.bids, d("5")), Some(d("99.5")));
    }

    #[test]
    fn test_execution_across_levels() {
        let b = book(
            vec![level("99.5", "10"), level("99", "10")],
            vec![level("100.5", "10"), level("101", "10")],
        );
        // 10 @ 100.5 + 5 @ 101 = 1510 / 15
        let expected = (d("1510") / d("15")).normalize();
        assert_eq!(walk_levels(&b.asks, d("15")), Some(expected));
        assert_eq!(depth(&b.asks), d("20"));
    }

    #[test]
    fn test_execution_insufficient_depth() {
        let b = book(vec![level("99.5", "10")], vec![level("100.5", "10")]);
        match execution_prices(&b, &[d("5"), d("15")]) {
            IndicatorValue::Execution { quotes } => {
                assert_eq!(quotes[0].buy, Some(d("100.5")));
                assert_eq!(quotes[1].buy, None);
                assert_eq!(quotes[1].sell, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_book() {
        let b = book(vec![], vec![]);
        assert!(!execution_prices(&b, &[d("1")]).is_defined());
    }
}
