//! OHLCV Bar Aggregator
//!
//! Folds a symbol's accepted ticks into bars at the base resolution and
//! cascades sealed base bars into every coarser configured resolution.
//!
//! Bar lifecycle:
//! - **Open**: the newest bucket, still receiving ticks.
//! - **Pending**: a later bucket has started but the watermark has not yet
//!   passed this bucket's end; late ticks still merge and emit
//!   [`BarEvent::Revised`].
//! - **Closed**: the watermark passed the bucket's end. The bar is
//!   immutable, handed to the cascade and to the rolling windows.
//!
//! Coarse bars are built only from finer closed bars, never from ticks.
//! A coarse bar closes either when a finer bar for a later coarse bucket
//! arrives or when the finer level's closed-through mark passes its end.
//!
//! Buckets are aligned to the epoch. Empty buckets produce no bar.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::ids::Symbol;
use types::numeric::to_f64;
use types::resolution::Resolution;
use types::trade::{Side, Tick};

use crate::error::EngineError;
use crate::events::BarEvent;

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub resolution: Resolution,
    /// Inclusive start of the bucket, aligned to `resolution`.
    pub bucket_start: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Volume of trades with a known buy aggressor.
    pub buy_volume: Decimal,
    /// Volume of trades with a known sell aggressor.
    pub sell_volume: Decimal,
    pub tick_count: u64,
    /// Earliest tick timestamp folded into the bar.
    pub first_ts: i64,
    /// Latest tick timestamp folded into the bar.
    pub last_ts: i64,
}

impl Bar {
    fn from_tick(tick: &Tick, resolution: Resolution, bucket_start: i64) -> Self {
        let (buy_volume, sell_volume) = side_volumes(tick);
        Self {
            symbol: tick.symbol.clone(),
            resolution,
            bucket_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.size,
            buy_volume,
            sell_volume,
            tick_count: 1,
            first_ts: tick.timestamp,
            last_ts: tick.timestamp,
        }
    }

    /// Merge a tick of the same bucket, in any arrival order.
    ///
    /// The earliest tick owns the open and the latest the close; on equal
    /// timestamps the first arrival keeps the open and the last arrival
    /// takes the close.
    fn merge_tick(&mut self, tick: &Tick) {
        if tick.timestamp < self.first_ts {
            self.open = tick.price;
            self.first_ts = tick.timestamp;
        }
        if tick.timestamp >= self.last_ts {
            self.close = tick.price;
            self.last_ts = tick.timestamp;
        }
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.volume += tick.size;
        let (buy, sell) = side_volumes(tick);
        self.buy_volume += buy;
        self.sell_volume += sell;
        self.tick_count += 1;
    }

    /// Start a coarse bar from its first finer bar.
    fn from_finer(fine: &Bar, resolution: Resolution, bucket_start: i64) -> Self {
        Self {
            resolution,
            bucket_start,
            ..fine.clone()
        }
    }

    /// Fold the next finer bar (finer bars arrive in bucket order).
    fn fold(&mut self, fine: &Bar) {
        self.high = self.high.max(fine.high);
        self.low = self.low.min(fine.low);
        self.close = fine.close;
        self.volume += fine.volume;
        self.buy_volume += fine.buy_volume;
        self.sell_volume += fine.sell_volume;
        self.tick_count += fine.tick_count;
        self.first_ts = self.first_ts.min(fine.first_ts);
        self.last_ts = self.last_ts.max(fine.last_ts);
    }

    /// Exclusive end of the bucket.
    pub fn bucket_end(&self) -> i64 {
        self.resolution.bucket_end(self.bucket_start)
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (to_f64(self.high) + to_f64(self.low) + to_f64(self.close)) / 3.0
    }

    /// Validate bar integrity (OHLCV invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
            && self.bucket_start == self.resolution.align(self.bucket_start)
    }
}

fn side_volumes(tick: &Tick) -> (Decimal, Decimal) {
    match tick.side {
        Side::BUY => (tick.size, Decimal::ZERO),
        Side::SELL => (Decimal::ZERO, tick.size),
        Side::UNKNOWN => (Decimal::ZERO, Decimal::ZERO),
    }
}

/// Closed-through and open-bar position of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStatus {
    pub resolution: Resolution,
    /// Every bucket starting before this instant is closed.
    pub closed_through: Option<i64>,
    /// Bucket start of the earliest bar not yet closed.
    pub open_from: Option<i64>,
}

/// Base-resolution bars built directly from ticks.
#[derive(Debug, Clone)]
pub struct BaseAggregator {
    symbol: Symbol,
    resolution: Resolution,
    /// Open and pending bars keyed by bucket start.
    open: BTreeMap<i64, Bar>,
    closed_through: Option<i64>,
}

impl BaseAggregator {
    pub fn new(symbol: Symbol, resolution: Resolution) -> Self {
        Self {
            symbol,
            resolution,
            open: BTreeMap::new(),
            closed_through: None,
        }
    }

    /// Merge an accepted tick into its bucket.
    ///
    /// Fails with `LateData` if the bucket is already closed. Returns a
    /// revision event when the bucket was pending.
    pub fn ingest(&mut self, tick: &Tick) -> Result<Option<BarEvent>, EngineError> {
        let bucket = self.resolution.align(tick.timestamp);
        if let Some(closed_through) = self.closed_through {
            if bucket < closed_through {
                return Err(EngineError::LateData {
                    symbol: self.symbol.clone(),
                    timestamp: tick.timestamp,
                    closed_through,
                });
            }
        }

        let pending = self
            .open
            .keys()
            .next_back()
            .is_some_and(|&latest| bucket < latest);

        let bar = self
            .open
            .entry(bucket)
            .and_modify(|bar| bar.merge_tick(tick))
            .or_insert_with(|| Bar::from_tick(tick, self.resolution, bucket));

        if pending {
            Ok(Some(BarEvent::Revised(bar.clone())))
        } else {
            Ok(None)
        }
    }

    /// Close every bar whose bucket ends at or before `watermark`.
    pub fn seal(&mut self, watermark: i64) -> Vec<Bar> {
        let through = self.resolution.align(watermark);
        if self.closed_through.is_some_and(|ct| through <= ct) {
            return Vec::new();
        }
        let still_open = self.open.split_off(&through);
        let sealed = std::mem::replace(&mut self.open, still_open);
        self.closed_through = Some(through);
        sealed.into_values().collect()
    }

    pub fn closed_through(&self) -> Option<i64> {
        self.closed_through
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Open and pending bars, oldest first.
    pub fn open_bars(&self) -> impl Iterator<Item = &Bar> {
        self.open.values()
    }

    fn status(&self) -> LevelStatus {
        LevelStatus {
            resolution: self.resolution,
            closed_through: self.closed_through,
            open_from: self.open.keys().next().copied(),
        }
    }
}

/// One coarser resolution fed by the closed bars of the level below it.
#[derive(Debug, Clone)]
pub struct CascadeLevel {
    resolution: Resolution,
    open: Option<Bar>,
    closed_through: Option<i64>,
}

impl CascadeLevel {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            open: None,
            closed_through: None,
        }
    }

    /// Fold a closed finer bar. Returns the coarse bar it closed, if the
    /// finer bar belongs to a later coarse bucket.
    pub fn on_finer_bar(&mut self, fine: &Bar) -> Option<Bar> {
        let bucket = self.resolution.align(fine.bucket_start);
        let open_bucket = self.open.as_ref().map(|bar| bar.bucket_start);
        match open_bucket {
            Some(open) if open == bucket => {
                if let Some(bar) = self.open.as_mut() {
                    bar.fold(fine);
                }
                None
            }
            Some(open) if open < bucket => {
                let closed = self.open.replace(Bar::from_finer(fine, self.resolution, bucket));
                if let Some(closed) = &closed {
                    self.mark_closed(closed.bucket_end());
                }
                closed
            }
            Some(open) => {
                debug!(
                    resolution = %self.resolution,
                    open_bucket = open,
                    finer_bucket = fine.bucket_start,
                    "Ignoring finer bar behind the open coarse bucket"
                );
                None
            }
            None => {
                self.open = Some(Bar::from_finer(fine, self.resolution, bucket));
                None
            }
        }
    }

    /// The finer level has closed everything before `finer_closed_through`.
    /// Closes the open coarse bar if that covers its whole bucket.
    pub fn on_progress(&mut self, finer_closed_through: i64) -> Option<Bar> {
        let closed = match &self.open {
            Some(bar) if bar.bucket_end() <= finer_closed_through => self.open.take(),
            _ => None,
        };
        self.mark_closed(self.resolution.align(finer_closed_through));
        closed
    }

    fn mark_closed(&mut self, through: i64) {
        self.closed_through = Some(self.closed_through.map_or(through, |ct| ct.max(through)));
    }

    pub fn closed_through(&self) -> Option<i64> {
        self.closed_through
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn open_bar(&self) -> Option<&Bar> {
        self.open.as_ref()
    }

    fn status(&self) -> LevelStatus {
        LevelStatus {
            resolution: self.resolution,
            closed_through: self.closed_through,
            open_from: self.open.as_ref().map(|bar| bar.bucket_start),
        }
    }
}

/// Base aggregator plus its cascade, finest first.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    base: BaseAggregator,
    levels: Vec<CascadeLevel>,
}

impl BarAggregator {
    pub fn new(symbol: Symbol, base: Resolution, cascade: &[Resolution]) -> Self {
        Self {
            base: BaseAggregator::new(symbol, base),
            levels: cascade.iter().copied().map(CascadeLevel::new).collect(),
        }
    }

    pub fn ingest_tick(&mut self, tick: &Tick) -> Result<Option<BarEvent>, EngineError> {
        self.base.ingest(tick)
    }

    /// Close everything the watermark covers, at every level.
    ///
    /// Returned bars are in causal order: a coarse bar always follows the
    /// finer bar whose arrival or progress closed it.
    pub fn advance(&mut self, watermark: i64) -> Vec<Bar> {
        let mut closed = Vec::new();

        for bar in self.base.seal(watermark) {
            debug!(
                symbol = %bar.symbol,
                resolution = %bar.resolution,
                bucket_start = bar.bucket_start,
                ticks = bar.tick_count,
                "Bar closed"
            );
            closed.push(bar.clone());
            self.cascade_from(0, bar, &mut closed);
        }

        let mut finer_closed_through = self.base.closed_through();
        for index in 0..self.levels.len() {
            let Some(through) = finer_closed_through else {
                break;
            };
            if let Some(bar) = self.levels[index].on_progress(through) {
                closed.push(bar.clone());
                self.cascade_from(index + 1, bar, &mut closed);
            }
            finer_closed_through = self.levels[index].closed_through();
        }

        closed
    }

    /// Feed a closed bar into `levels[start..]`, collecting whatever closes.
    fn cascade_from(&mut self, start: usize, bar: Bar, closed: &mut Vec<Bar>) {
        let mut carry = Some(bar);
        for level in self.levels.iter_mut().skip(start) {
            let Some(fine) = carry.take() else {
                break;
            };
            carry = level.on_finer_bar(&fine);
            if let Some(coarse) = &carry {
                debug!(
                    symbol = %coarse.symbol,
                    resolution = %coarse.resolution,
                    bucket_start = coarse.bucket_start,
                    "Cascade bar closed"
                );
                closed.push(coarse.clone());
            }
        }
    }

    /// Watermark that closes every bar currently open at any level: the end
    /// of the coarsest bucket containing the newest open bar.
    pub fn flush_target(&self) -> Option<i64> {
        let latest_end = self
            .base
            .open_bars()
            .map(Bar::bucket_end)
            .chain(self.levels.iter().filter_map(|l| l.open_bar().map(Bar::bucket_end)))
            .max()?;
        let coarsest = self
            .levels
            .last()
            .map_or(self.base.resolution(), CascadeLevel::resolution);
        Some(coarsest.bucket_end(coarsest.align(latest_end - 1)))
    }

    /// Closed-through of the base level.
    pub fn base_closed_through(&self) -> Option<i64> {
        self.base.closed_through()
    }

    /// Timestamp below which every level is consistent: the coarsest
    /// level's closed-through.
    pub fn consistent_through(&self) -> Option<i64> {
        match self.levels.last() {
            Some(level) => level.closed_through(),
            None => self.base.closed_through(),
        }
    }

    /// Per-resolution position, finest first.
    pub fn status(&self) -> Vec<LevelStatus> {
        std::iter::once(self.base.status())
            .chain(self.levels.iter().map(CascadeLevel::status))
            .collect()
    }
}
