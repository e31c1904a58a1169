//! Incremental Market-Data Indicator Engine
//!
//! Turns a possibly out-of-order stream of trade ticks and order-book
//! snapshots into:
//! - OHLCV bars at a base resolution, cascaded into coarser resolutions
//! - A fixed catalog of streaming indicators per (symbol, resolution)
//! - Book-derived liquidity metrics (spread, L2 execution price)
//! - Immutable per-symbol snapshots served to query consumers
//!
//! Every symbol is an independent partition with its own worker task;
//! within a partition all work is strictly sequential so the O(1)
//! recurrences (EMA, running sums, monotonic deques) stay correct.
//!
//! # Architecture
//!
//! ```text
//!   Ticks / BookSnapshots (push)
//!        │
//!  ┌─────▼──────┐   bounded per-symbol queue, drop-oldest + Overflow
//!  │ Backpressure│
//!  └─────┬──────┘
//!        │  one task per symbol
//!  ┌─────▼──────┐
//!  │ Normalizer │  ← validates, canonicalizes, dedupes
//!  └─────┬──────┘
//!        │
//!  ┌─────▼──────┐      ┌──────────┐
//!  │    Bars    │─────►│ Cascade  │  fine → coarse, watermark-driven
//!  └─────┬──────┘      └────┬─────┘
//!        │ closed bars      │
//!  ┌─────▼──────────────────▼─┐
//!  │ Windows → Indicators     │
//!  └─────┬────────────────────┘
//!        │
//!  ┌─────▼──────┐
//!  │   Query    │  ← immutable snapshots, freshness watermark
//!  └────────────┘
//! ```

pub mod backpressure;
pub mod bars;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod indicators;
pub mod metrics;
pub mod normalizer;
pub mod partition;
pub mod query;
pub mod replay;
pub mod sink;
pub mod watermark;
pub mod window;

pub use config::{EngineConfig, ResolvedConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{BarEvent, MarketEvent};
pub use partition::SymbolPartition;
pub use query::{QueryResult, SymbolSnapshot, TimeRange};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
