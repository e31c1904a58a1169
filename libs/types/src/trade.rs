//! Executed trade types
//!
//! A [`Tick`] is one executed trade as delivered by the feed handler. The
//! engine consumes ticks immediately and never retains them; retention is
//! the storage collaborator's job.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::Symbol;
use crate::numeric::{Nanos, Price, Size};

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buyer lifted the offer
    #[serde(alias = "buy", alias = "Buy")]
    BUY,
    /// Seller hit the bid
    #[serde(alias = "sell", alias = "Sell")]
    SELL,
    /// Feed did not report the aggressor
    #[default]
    #[serde(alias = "unknown", alias = "Unknown")]
    UNKNOWN,
}

/// A single executed trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    /// Unix nanoseconds from the exchange clock
    pub timestamp: Nanos,
    pub price: Price,
    pub size: Size,
    #[serde(default)]
    pub side: Side,
    /// Exchange trade id, when the feed provides one. Part of the dedup key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<u64>,
}

impl Tick {
    pub fn new(symbol: Symbol, timestamp: Nanos, price: Price, size: Size, side: Side) -> Self {
        Self {
            symbol,
            timestamp,
            price,
            size,
            side,
            trade_id: None,
        }
    }

    /// Attach an exchange trade id.
    pub fn with_trade_id(mut self, trade_id: u64) -> Self {
        self.trade_id = Some(trade_id);
        self
    }

    /// Check the tick's numeric invariants.
    ///
    /// Price must be strictly positive, size non-negative and the timestamp
    /// non-negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp < 0 {
            return Err(ValidationError::InvalidTimestamp(self.timestamp));
        }
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice(self.price.to_string()));
        }
        if self.size < Decimal::ZERO {
            return Err(ValidationError::InvalidSize(self.size.to_string()));
        }
        Ok(())
    }

    /// Canonical form: validated, decimals normalized (trailing zeros stripped).
    pub fn canonicalize(mut self) -> Result<Self, ValidationError> {
        self.validate()?;
        self.price = self.price.normalize();
        self.size = self.size.normalize();
        Ok(self)
    }
}
