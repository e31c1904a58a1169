//! Query / materialization layer
//!
//! Closed bars and indicator points are materialized into a bounded
//! [`SeriesStore`] owned by the partition worker. After each batch of work
//! the worker publishes an immutable [`SymbolSnapshot`]; readers only ever
//! see published snapshots, so:
//! - No partially closed bar is ever returned
//! - A reader that sees a bar at T also sees every indicator point derived
//!   from bars ≤ T
//! - Series are returned in strictly increasing timestamp order
//!
//! Series are held behind `Arc` and cloned on write, so publishing a
//! snapshot copies only the series touched since the previous one.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::resolution::Resolution;

use crate::bars::{Bar, LevelStatus};
use crate::config::ResolvedConfig;
use crate::error::EngineError;
use crate::indicators::IndicatorPoint;
use crate::metrics::PartitionStats;

type Shared<T> = Arc<VecDeque<T>>;

/// Half-open `[from, to)` range in nanoseconds; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: i64, to: i64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn since(from: i64) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.from.map_or(true, |from| timestamp >= from) && self.to.map_or(true, |to| timestamp < to)
    }
}

/// Bounded history of every materialized series of one symbol.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    history_limit: usize,
    bars: BTreeMap<Resolution, Shared<Bar>>,
    points: BTreeMap<Resolution, BTreeMap<String, Shared<IndicatorPoint>>>,
    book_points: BTreeMap<String, Shared<IndicatorPoint>>,
}

impl SeriesStore {
    /// Empty series for every configured resolution and indicator.
    pub fn new(config: &ResolvedConfig) -> Self {
        let mut store = Self {
            history_limit: config.history_limit.max(1),
            ..Self::default()
        };
        for resolution in config.resolutions() {
            store.bars.insert(resolution, Shared::default());
            store.points.insert(
                resolution,
                config
                    .bar_indicators
                    .iter()
                    .map(|spec| (spec.name.clone(), Shared::default()))
                    .collect(),
            );
        }
        for spec in &config.book_indicators {
            store.book_points.insert(spec.name.clone(), Shared::default());
        }
        store
    }

    pub fn push_bar(&mut self, bar: Bar) {
        let limit = self.history_limit;
        let series = self.bars.entry(bar.resolution).or_default();
        push_bounded(series, bar, limit);
    }

    pub fn push_point(&mut self, resolution: Resolution, indicator: &str, point: IndicatorPoint) {
        let limit = self.history_limit;
        let series = self
            .points
            .entry(resolution)
            .or_default()
            .entry(indicator.to_string())
            .or_default();
        push_bounded(series, point, limit);
    }

    pub fn push_book_point(&mut self, indicator: &str, point: IndicatorPoint) {
        let limit = self.history_limit;
        let series = self.book_points.entry(indicator.to_string()).or_default();
        push_bounded(series, point, limit);
    }

    pub fn bars(&self, resolution: Resolution) -> Option<&VecDeque<Bar>> {
        self.bars.get(&resolution).map(|s| s.as_ref())
    }

    pub fn points(&self, resolution: Resolution, indicator: &str) -> Option<&VecDeque<IndicatorPoint>> {
        self.points
            .get(&resolution)
            .and_then(|by_name| by_name.get(indicator))
            .map(|s| s.as_ref())
    }

    pub fn book_points(&self, indicator: &str) -> Option<&VecDeque<IndicatorPoint>> {
        self.book_points.get(indicator).map(|s| s.as_ref())
    }

    /// Bar series, finest resolution first.
    pub fn bar_series(&self) -> impl Iterator<Item = (Resolution, &VecDeque<Bar>)> {
        self.bars.iter().map(|(r, s)| (*r, s.as_ref()))
    }

    /// Indicator series in deterministic order: bar-driven by resolution
    /// and name, then book-driven by name (with no resolution).
    pub fn point_series(&self) -> impl Iterator<Item = (Option<Resolution>, &str, &VecDeque<IndicatorPoint>)> {
        self.points
            .iter()
            .flat_map(|(r, by_name)| {
                by_name
                    .iter()
                    .map(move |(name, s)| (Some(*r), name.as_str(), s.as_ref()))
            })
            .chain(
                self.book_points
                    .iter()
                    .map(|(name, s)| (None, name.as_str(), s.as_ref())),
            )
    }
}

fn push_bounded<T: Clone>(series: &mut Shared<T>, item: T, limit: usize) {
    let series = Arc::make_mut(series);
    series.push_back(item);
    while series.len() > limit {
        series.pop_front();
    }
}

fn slice<T: Clone>(series: &VecDeque<T>, range: TimeRange, timestamp: impl Fn(&T) -> i64) -> Vec<T> {
    let start = range
        .from
        .map_or(0, |from| series.partition_point(|item| timestamp(item) < from));
    let end = range
        .to
        .map_or(series.len(), |to| series.partition_point(|item| timestamp(item) < to));
    if end <= start {
        return Vec::new();
    }
    series.range(start..end).cloned().collect()
}

/// Whether a resolution has anything to show yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Nothing ingested that could ever land in this series.
    NoData,
    /// Ticks were accepted but no bar has closed at this resolution yet.
    Pending,
    /// At least one closed value exists.
    Current,
}

/// Ordered bars or indicator points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum QuerySeries {
    Bars(Vec<Bar>),
    Points(Vec<IndicatorPoint>),
}

impl QuerySeries {
    pub fn len(&self) -> usize {
        match self {
            QuerySeries::Bars(bars) => bars.len(),
            QuerySeries::Points(points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keep_last(self) -> Self {
        match self {
            QuerySeries::Bars(bars) => QuerySeries::Bars(bars.into_iter().last().into_iter().collect()),
            QuerySeries::Points(points) => {
                QuerySeries::Points(points.into_iter().last().into_iter().collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub symbol: Symbol,
    pub resolution: Resolution,
    pub indicator: Option<String>,
    /// Every resolution of the symbol is consistent below this instant.
    pub watermark: Option<i64>,
    /// Closed-through of the queried resolution.
    pub closed_through: Option<i64>,
    pub freshness: Freshness,
    pub series: QuerySeries,
}

/// Immutable, published view of one symbol partition.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: Symbol,
    /// Incremented on every published state change.
    pub version: u64,
    /// Cascade freshness marker: every resolution is consistent below it.
    pub watermark: Option<i64>,
    pub last_event_ts: Option<i64>,
    /// Per-resolution position, finest first.
    pub levels: Vec<LevelStatus>,
    pub stats: PartitionStats,
    #[serde(skip)]
    pub store: SeriesStore,
}

impl SymbolSnapshot {
    /// Snapshot of a partition that has seen nothing.
    pub fn empty(symbol: Symbol, config: &ResolvedConfig) -> Self {
        Self {
            symbol,
            version: 0,
            watermark: None,
            last_event_ts: None,
            levels: config
                .resolutions()
                .map(|resolution| LevelStatus {
                    resolution,
                    closed_through: None,
                    open_from: None,
                })
                .collect(),
            stats: PartitionStats::default(),
            store: SeriesStore::new(config),
        }
    }

    /// Bars (no indicator) or indicator points in `range`, ordered by
    /// timestamp.
    pub fn query(
        &self,
        resolution: Resolution,
        indicator: Option<&str>,
        range: TimeRange,
    ) -> Result<QueryResult, EngineError> {
        let position = self
            .levels
            .iter()
            .position(|level| level.resolution == resolution)
            .ok_or_else(|| EngineError::UnknownResolution(resolution.to_string()))?;

        let (series, has_history, book_derived) = match indicator {
            None => {
                let bars = self
                    .store
                    .bars(resolution)
                    .ok_or_else(|| EngineError::UnknownResolution(resolution.to_string()))?;
                (
                    QuerySeries::Bars(slice(bars, range, |bar| bar.bucket_start)),
                    !bars.is_empty(),
                    false,
                )
            }
            Some(name) => {
                if let Some(points) = self.store.points(resolution, name) {
                    (
                        QuerySeries::Points(slice(points, range, |p| p.timestamp)),
                        !points.is_empty(),
                        false,
                    )
                } else if let Some(points) = self.store.book_points(name) {
                    (
                        QuerySeries::Points(slice(points, range, |p| p.timestamp)),
                        !points.is_empty(),
                        true,
                    )
                } else {
                    return Err(EngineError::UnknownIndicator(name.to_string()));
                }
            }
        };

        let freshness = if has_history {
            Freshness::Current
        } else if !book_derived
            && self.levels[..=position]
                .iter()
                .any(|level| level.open_from.is_some())
        {
            Freshness::Pending
        } else {
            Freshness::NoData
        };

        Ok(QueryResult {
            symbol: self.symbol.clone(),
            resolution,
            indicator: indicator.map(str::to_string),
            watermark: self.watermark,
            closed_through: self.levels[position].closed_through,
            freshness,
            series,
        })
    }

    /// The latest bar or point stamped at or before `at`.
    pub fn query_at(
        &self,
        resolution: Resolution,
        indicator: Option<&str>,
        at: i64,
    ) -> Result<QueryResult, EngineError> {
        let range = TimeRange {
            from: None,
            to: Some(at.saturating_add(1)),
        };
        let mut result = self.query(resolution, indicator, range)?;
        result.series = result.series.keep_last();
        Ok(result)
    }

    /// Whether the symbol saw an event at or after `since`.
    pub fn active_since(&self, since: i64) -> bool {
        self.last_event_ts.is_some_and(|ts| ts >= since)
    }
}
