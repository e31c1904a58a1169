//! Event normalizer
//!
//! First stage of a symbol's pipeline. Validates and canonicalizes ticks
//! and book snapshots, and drops exact re-deliveries:
//! - Ticks are keyed by `(timestamp, trade_id)`; feeds without trade ids
//!   fall back to the timestamp alone.
//! - Every key of a tick whose base bucket is still open or pending is
//!   held until that bucket closes, so a re-delivery can never be merged
//!   twice. Once closed, keys move to a bounded window of recent keys;
//!   re-deliveries older than that window are rejected as late by the bar
//!   aggregator instead of being counted as duplicates.
//! - Book snapshots are full-state replacements, so only the newest
//!   timestamp matters: an equal timestamp is a re-delivery, an older one
//!   is late.
//!
//! A tick's key is recorded only once the bar aggregator has accepted it
//! (see [`EventNormalizer::commit_tick`]), so a tick rejected as late can
//! never shadow a later legitimate delivery.

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::{debug, warn};
use types::book::BookSnapshot;
use types::errors::ValidationError;
use types::ids::Symbol;
use types::trade::Tick;

use crate::error::EngineError;

/// Dedup key of a tick.
pub type DedupKey = (i64, Option<u64>);

/// Outcome of normalizing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized<T> {
    /// Canonical event, ready for aggregation.
    Accepted(T),
    /// Exact re-delivery of an event already applied.
    Duplicate,
}

pub struct EventNormalizer {
    symbol: Symbol,
    /// Keys of committed ticks in buckets not yet closed, ordered by time.
    open_keys: BTreeSet<DedupKey>,
    open_key_limit: usize,
    /// Keys of ticks in closed buckets, oldest first.
    closed_keys: VecDeque<DedupKey>,
    closed_set: HashSet<DedupKey>,
    dedup_window: usize,
    last_book_ts: Option<i64>,
}

impl EventNormalizer {
    pub fn new(symbol: Symbol, dedup_window: usize, open_key_limit: usize) -> Self {
        let dedup_window = dedup_window.max(1);
        Self {
            symbol,
            open_keys: BTreeSet::new(),
            open_key_limit: open_key_limit.max(1),
            closed_keys: VecDeque::with_capacity(dedup_window),
            closed_set: HashSet::with_capacity(dedup_window),
            dedup_window,
            last_book_ts: None,
        }
    }

    pub fn dedup_key(tick: &Tick) -> DedupKey {
        (tick.timestamp, tick.trade_id)
    }

    /// Validate, canonicalize and dedup-check a tick.
    ///
    /// Fails with `DedupCapacity` when a new key would not fit in the open
    /// bucket key set.
    pub fn normalize_tick(&self, tick: Tick) -> Result<Normalized<Tick>, EngineError> {
        self.check_symbol(&tick.symbol)?;
        let timestamp = tick.timestamp;
        let tick = tick.canonicalize().map_err(|e| {
            warn!(symbol = %self.symbol, timestamp, error = %e, "Rejecting invalid tick");
            EngineError::Validation(e)
        })?;

        let key = Self::dedup_key(&tick);
        if self.open_keys.contains(&key) || self.closed_set.contains(&key) {
            debug!(
                symbol = %self.symbol,
                timestamp = tick.timestamp,
                trade_id = ?tick.trade_id,
                "Dropping duplicate tick"
            );
            return Ok(Normalized::Duplicate);
        }
        if self.open_keys.len() >= self.open_key_limit {
            warn!(
                symbol = %self.symbol,
                limit = self.open_key_limit,
                "Open bucket dedup keys exhausted, rejecting tick"
            );
            return Err(EngineError::DedupCapacity {
                symbol: self.symbol.clone(),
                limit: self.open_key_limit,
            });
        }
        Ok(Normalized::Accepted(tick))
    }

    /// Remember an applied tick's key until its bucket closes.
    pub fn commit_tick(&mut self, tick: &Tick) {
        self.open_keys.insert(Self::dedup_key(tick));
    }

    /// Base buckets before `closed_through` are sealed: move their keys to
    /// the bounded window, evicting the oldest beyond it.
    pub fn prune_closed(&mut self, closed_through: i64) {
        let still_open = self.open_keys.split_off(&(closed_through, None));
        let closed = std::mem::replace(&mut self.open_keys, still_open);
        for key in closed {
            if !self.closed_set.insert(key) {
                continue;
            }
            self.closed_keys.push_back(key);
            if self.closed_keys.len() > self.dedup_window {
                if let Some(evicted) = self.closed_keys.pop_front() {
                    self.closed_set.remove(&evicted);
                }
            }
        }
    }

    /// Validate and order-check a book snapshot. Accepted snapshots are
    /// committed immediately.
    pub fn normalize_book(&mut self, book: BookSnapshot) -> Result<Normalized<BookSnapshot>, EngineError> {
        self.check_symbol(&book.symbol)?;
        let book = book.canonicalize().map_err(|e| {
            warn!(symbol = %self.symbol, error = %e, "Rejecting invalid book snapshot");
            EngineError::Validation(e)
        })?;

        if let Some(last) = self.last_book_ts {
            if book.timestamp == last {
                debug!(symbol = %self.symbol, timestamp = book.timestamp, "Dropping duplicate book snapshot");
                return Ok(Normalized::Duplicate);
            }
            if book.timestamp < last {
                return Err(EngineError::LateData {
                    symbol: self.symbol.clone(),
                    timestamp: book.timestamp,
                    closed_through: last,
                });
            }
        }
        self.last_book_ts = Some(book.timestamp);
        Ok(Normalized::Accepted(book))
    }

    pub fn last_book_ts(&self) -> Option<i64> {
        self.last_book_ts
    }

    /// Number of tick keys currently remembered.
    pub fn remembered_keys(&self) -> usize {
        self.open_keys.len() + self.closed_keys.len()
    }

    /// Keys held for open and pending buckets.
    pub fn open_keys(&self) -> usize {
        self.open_keys.len()
    }

    fn check_symbol(&self, symbol: &Symbol) -> Result<(), EngineError> {
        if symbol != &self.symbol {
            return Err(ValidationError::InvalidSymbol(symbol.to_string()).into());
        }
        Ok(())
    }
}
