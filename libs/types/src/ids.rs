//! Identifier types
//!
//! Symbols are the partition key for the whole engine, so they are
//! canonicalized once at the edge (trimmed, upper-cased) and compared
//! byte-for-byte everywhere else.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::errors::ValidationError;

/// Instrument identifier (e.g. "BTC-USD", "ETH/USDT", "AAPL")
///
/// Always stored in canonical form: no surrounding whitespace, upper case,
/// no interior whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a canonical symbol, rejecting empty or whitespace-bearing input.
    pub fn try_new(symbol: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = symbol.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Create a symbol from a literal known to be valid.
    ///
    /// # Panics
    /// Panics if the symbol is empty or contains whitespace.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        match Self::try_new(symbol) {
            Ok(s) => s,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
