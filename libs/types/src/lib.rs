//! Types library for the incremental indicator engine
//!
//! Shared vocabulary between the ingestion source, the engine and its
//! consumers. Everything here is plain data plus validation; no engine
//! state lives in this crate.
//!
//! # Modules
//! - `ids`: Symbol identifiers
//! - `numeric`: Decimal price/size aliases and float conversion
//! - `resolution`: Bar bucket widths and grid alignment
//! - `trade`: Executed trade ticks and aggressor side
//! - `book`: L2 order book snapshots
//! - `errors`: Validation error taxonomy

pub mod book;
pub mod errors;
pub mod ids;
pub mod numeric;
pub mod resolution;
pub mod trade;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::book::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::resolution::*;
    pub use crate::trade::*;
}
