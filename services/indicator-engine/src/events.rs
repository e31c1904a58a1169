//! Engine input and output events
//!
//! [`MarketEvent`] is what the ingestion source pushes; [`BarEvent`] is what
//! the bar aggregator emits as buckets are revised and sealed.

use serde::{Deserialize, Serialize};
use types::book::BookSnapshot;
use types::ids::Symbol;
use types::trade::Tick;

use crate::bars::Bar;

/// An event pushed by the ingestion source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// An executed trade
    Trade(Tick),
    /// An L2 book snapshot
    Book(BookSnapshot),
}

impl MarketEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Trade(tick) => &tick.symbol,
            MarketEvent::Book(book) => &book.symbol,
        }
    }

    /// Exchange timestamp in Unix nanoseconds.
    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Trade(tick) => tick.timestamp,
            MarketEvent::Book(book) => book.timestamp,
        }
    }

    /// Event type label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            MarketEvent::Trade(_) => "trade",
            MarketEvent::Book(_) => "book",
        }
    }
}

impl From<Tick> for MarketEvent {
    fn from(tick: Tick) -> Self {
        MarketEvent::Trade(tick)
    }
}

impl From<BookSnapshot> for MarketEvent {
    fn from(book: BookSnapshot) -> Self {
        MarketEvent::Book(book)
    }
}

/// Bar lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "bar", rename_all = "snake_case")]
pub enum BarEvent {
    /// A pending bar absorbed a late tick within the lateness tolerance.
    /// The bar is not yet visible to windows or queries.
    Revised(Bar),
    /// The bar is sealed and immutable.
    Closed(Bar),
}

impl BarEvent {
    pub fn bar(&self) -> &Bar {
        match self {
            BarEvent::Revised(bar) | BarEvent::Closed(bar) => bar,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, BarEvent::Closed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::trade::Side;

    #[test]
    fn test_market_event_json_tagging() {
        let json = r#"{"event_type":"trade","symbol":"ETH-USD","timestamp":42,"price":"3000.5","size":"0.25","side":"SELL"}"#;
        let event: MarketEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type_label(), "trade");
        assert_eq!(event.symbol().as_str(), "ETH-USD");
        assert_eq!(event.timestamp(), 42);
        match event {
            MarketEvent::Trade(tick) => {
                assert_eq!(tick.side, Side::SELL);
                assert_eq!(tick.price, Decimal::new(30005, 1));
            }
            MarketEvent::Book(_) => panic!("expected trade"),
        }

        let json = r#"{"event_type":"book","symbol":"ETH-USD","timestamp":43,
            "bids":[{"price":"99.5","size":"10"}],"asks":[{"price":"100.5","size":"10"}]}"#;
        let event: MarketEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type_label(), "book");
    }

    #[test]
    fn test_round_trip_label() {
        let tick = Tick::new(Symbol::new("BTC-USD"), 1, Decimal::ONE, Decimal::ONE, Side::BUY);
        let event = MarketEvent::from(tick);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"trade\""));
    }
}
