//! One symbol's sequential pipeline
//!
//! A partition owns everything mutable about a symbol: normalizer state,
//! watermark, open bars, indicator windows and materialized series. It is
//! driven by exactly one caller at a time (the symbol's worker task, or a
//! replay loop), so every update runs in a single total order:
//!
//! ```text
//! ingest → bar close → cascade → window update → indicator recompute → materialize
//! ```
//!
//! Readers never touch a partition directly; they get a [`SymbolSnapshot`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use types::book::BookSnapshot;
use types::ids::Symbol;
use types::resolution::Resolution;
use types::trade::Tick;

use crate::bars::{Bar, BarAggregator};
use crate::book::BookIndicator;
use crate::config::ResolvedConfig;
use crate::error::EngineError;
use crate::events::{BarEvent, MarketEvent};
use crate::indicators::{Indicator, IndicatorPoint, IndicatorState};
use crate::metrics::PartitionStats;
use crate::normalizer::{EventNormalizer, Normalized};
use crate::query::{SeriesStore, SymbolSnapshot};
use crate::replay;
use crate::sink::{NoopSink, Sink};
use crate::watermark::Watermark;

/// Bar indicator instances of one resolution, in configuration order.
type IndicatorSet = Vec<(String, IndicatorState)>;

pub struct SymbolPartition {
    symbol: Symbol,
    config: Arc<ResolvedConfig>,
    sink: Arc<dyn Sink>,
    normalizer: EventNormalizer,
    watermark: Watermark,
    bars: BarAggregator,
    indicators: BTreeMap<Resolution, IndicatorSet>,
    book_indicators: Vec<(String, BookIndicator)>,
    store: SeriesStore,
    stats: PartitionStats,
    last_event_ts: Option<i64>,
    version: u64,
}

impl SymbolPartition {
    pub fn new(symbol: Symbol, config: Arc<ResolvedConfig>, sink: Arc<dyn Sink>) -> Self {
        info!(
            symbol = %symbol,
            resolutions = config.cascade.len() + 1,
            bar_indicators = config.bar_indicators.len(),
            book_indicators = config.book_indicators.len(),
            "Symbol partition created"
        );
        Self {
            normalizer: EventNormalizer::new(symbol.clone(), config.dedup_window, config.open_key_limit),
            watermark: Watermark::new(config.lateness_tolerance),
            bars: BarAggregator::new(symbol.clone(), config.base_resolution, &config.cascade),
            indicators: fresh_indicators(&config),
            book_indicators: config
                .book_indicators
                .iter()
                .filter_map(|spec| BookIndicator::from_spec(spec).map(|b| (spec.name.clone(), b)))
                .collect(),
            store: SeriesStore::new(&config),
            stats: PartitionStats::default(),
            last_event_ts: None,
            version: 0,
            symbol,
            config,
            sink,
        }
    }

    /// Partition without a persistence sink.
    pub fn standalone(symbol: Symbol, config: Arc<ResolvedConfig>) -> Self {
        Self::new(symbol, config, Arc::new(NoopSink))
    }

    /// Apply one market event. Returns the bar lifecycle events it caused.
    pub fn apply(&mut self, event: MarketEvent) -> Result<Vec<BarEvent>, EngineError> {
        match event {
            MarketEvent::Trade(tick) => self.ingest_tick(tick),
            MarketEvent::Book(book) => self.ingest_book(book).map(|_| Vec::new()),
        }
    }

    /// Ingest a trade tick.
    ///
    /// Duplicates are dropped silently. Late and invalid ticks are counted
    /// and returned as errors; partition state is unchanged by them.
    pub fn ingest_tick(&mut self, tick: Tick) -> Result<Vec<BarEvent>, EngineError> {
        let tick = match self.normalizer.normalize_tick(tick) {
            Ok(Normalized::Accepted(tick)) => tick,
            Ok(Normalized::Duplicate) => {
                self.stats.duplicates += 1;
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.reject(err)),
        };

        let revised = match self.bars.ingest_tick(&tick) {
            Ok(revised) => revised,
            Err(err) => return Err(self.reject(err)),
        };
        self.normalizer.commit_tick(&tick);
        self.stats.ticks_accepted += 1;
        self.observe_event(tick.timestamp);
        self.watermark.observe(tick.timestamp);
        self.version += 1;

        let mut events = Vec::new();
        if let Some(revision) = revised {
            self.stats.revisions += 1;
            debug!(
                symbol = %self.symbol,
                bucket_start = revision.bar().bucket_start,
                "Pending bar revised"
            );
            events.push(revision);
        }
        events.extend(self.close_through_watermark());
        Ok(events)
    }

    /// Ingest a book snapshot and compute every book indicator from it.
    pub fn ingest_book(&mut self, book: BookSnapshot) -> Result<(), EngineError> {
        let book = match self.normalizer.normalize_book(book) {
            Ok(Normalized::Accepted(book)) => book,
            Ok(Normalized::Duplicate) => {
                self.stats.duplicates += 1;
                return Ok(());
            }
            Err(err) => return Err(self.reject(err)),
        };

        self.stats.book_snapshots += 1;
        self.observe_event(book.timestamp);
        self.version += 1;
        for (name, indicator) in &self.book_indicators {
            let point = IndicatorPoint {
                timestamp: book.timestamp,
                value: indicator.compute(&book),
            };
            self.sink.on_point(&self.symbol, None, name, &point);
            self.store.push_book_point(name, point);
        }
        Ok(())
    }

    /// Raise the watermark explicitly and close whatever it covers.
    pub fn advance_watermark(&mut self, timestamp: i64) -> Vec<BarEvent> {
        self.watermark.advance_to(timestamp);
        self.version += 1;
        self.close_through_watermark()
    }

    /// Close every open bar at every resolution (end of stream).
    pub fn flush(&mut self) -> Vec<BarEvent> {
        match self.bars.flush_target() {
            Some(target) => {
                info!(symbol = %self.symbol, target, "Flushing open bars");
                self.advance_watermark(target)
            }
            None => Vec::new(),
        }
    }

    /// Explicit stream restart: every indicator window and cumulative
    /// accumulator starts over. Bars, watermark and history are kept.
    pub fn restart(&mut self) {
        self.indicators = fresh_indicators(&self.config);
        self.stats.restarts += 1;
        self.version += 1;
        info!(symbol = %self.symbol, "Indicator state restarted");
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> SymbolSnapshot {
        SymbolSnapshot {
            symbol: self.symbol.clone(),
            version: self.version,
            watermark: self.bars.consistent_through(),
            last_event_ts: self.last_event_ts,
            levels: self.bars.status(),
            stats: self.stats,
            store: self.store.clone(),
        }
    }

    /// SHA-256 over every materialized series.
    pub fn state_checksum(&self) -> String {
        replay::checksum(&self.store)
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn stats(&self) -> PartitionStats {
        self.stats
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn observe_event(&mut self, timestamp: i64) {
        self.last_event_ts = Some(self.last_event_ts.map_or(timestamp, |t| t.max(timestamp)));
    }

    fn reject(&mut self, err: EngineError) -> EngineError {
        self.stats.record_rejection(&err);
        if let EngineError::LateData {
            timestamp,
            closed_through,
            ..
        } = &err
        {
            warn!(
                symbol = %self.symbol,
                timestamp,
                closed_through,
                "Rejecting late event"
            );
        }
        err
    }

    fn close_through_watermark(&mut self) -> Vec<BarEvent> {
        let Some(watermark) = self.watermark.current() else {
            return Vec::new();
        };
        let closed = self.bars.advance(watermark);
        if let Some(closed_through) = self.bars.base_closed_through() {
            self.normalizer.prune_closed(closed_through);
        }
        let mut events = Vec::with_capacity(closed.len());
        for bar in closed {
            self.on_bar_closed(&bar);
            events.push(BarEvent::Closed(bar));
        }
        events
    }

    fn on_bar_closed(&mut self, bar: &Bar) {
        self.stats.bars_closed += 1;
        self.sink.on_bar(bar);
        if let Some(set) = self.indicators.get_mut(&bar.resolution) {
            for (name, state) in set.iter_mut() {
                let point = IndicatorPoint {
                    timestamp: bar.bucket_start,
                    value: state.update(bar),
                };
                self.sink.on_point(&self.symbol, Some(bar.resolution), name, &point);
                self.store.push_point(bar.resolution, name, point);
            }
        }
        self.store.push_bar(bar.clone());
    }
}

fn fresh_indicators(config: &ResolvedConfig) -> BTreeMap<Resolution, IndicatorSet> {
    config
        .resolutions()
        .map(|resolution| {
            let set = config
                .bar_indicators
                .iter()
                .filter_map(|spec| {
                    IndicatorState::new(&spec.settings, resolution).map(|s| (spec.name.clone(), s))
                })
                .collect();
            (resolution, set)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, IndicatorParams};
    use crate::indicators::IndicatorValue;
    use crate::query::{QuerySeries, TimeRange};
    use crate::sink::{ChannelSink, SinkRecord};
    use rust_decimal::Decimal;
    use types::book::BookLevel;
    use types::trade::Side;

    const S: i64 = 1_000_000_000;

    fn sym() -> Symbol {
        Symbol::new("BTC-USD")
    }

    fn res(s: &str) -> Resolution {
        s.parse().unwrap()
    }

    fn config(lateness: &str) -> Arc<ResolvedConfig> {
        Arc::new(
            EngineConfig::default()
                .with_resolutions("1s", &["1m"])
                .with_lateness(lateness)
                .with_indicators([
                    ("ohlc", IndicatorParams::default()),
                    ("vwap", IndicatorParams::default()),
                    ("sma", IndicatorParams::of_kind("sma").with_period(2)),
                    ("spread", IndicatorParams::default()),
                ])
                .resolve()
                .unwrap(),
        )
    }

    fn tick(ts: i64, price: i64) -> Tick {
        Tick::new(sym(), ts, Decimal::from(price), Decimal::ONE, Side::BUY)
    }

    fn closed_starts(events: &[BarEvent], resolution: Resolution) -> Vec<i64> {
        events
            .iter()
            .filter(|e| e.is_closed() && e.bar().resolution == resolution)
            .map(|e| e.bar().bucket_start)
            .collect()
    }

    #[test]
    fn test_later_bucket_closes_prior_bar() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        assert!(p.ingest_tick(tick(100, 10)).unwrap().is_empty());
        let events = p.ingest_tick(tick(S + 1, 11)).unwrap();
        assert_eq!(closed_starts(&events, res("1s")), vec![0]);

        let snapshot = p.snapshot();
        let result = snapshot.query(res("1s"), Some("sma"), TimeRange::all()).unwrap();
        assert_eq!(
            result.series,
            QuerySeries::Points(vec![IndicatorPoint {
                timestamp: 0,
                value: IndicatorValue::warmup(),
            }])
        );
    }

    #[test]
    fn test_late_tick_rejected_and_counted() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        p.ingest_tick(tick(2 * S, 10)).unwrap();
        let err = p.ingest_tick(tick(S, 10)).unwrap_err();
        assert!(matches!(err, EngineError::LateData { .. }));
        assert_eq!(p.stats().late_rejections, 1);
        assert_eq!(p.stats().ticks_accepted, 1);
    }

    #[test]
    fn test_revision_within_tolerance() {
        let mut p = SymbolPartition::standalone(sym(), config("2s"));
        p.ingest_tick(tick(0, 10)).unwrap();
        p.ingest_tick(tick(S, 11)).unwrap();
        let events = p.ingest_tick(tick(500_000_000, 12)).unwrap();
        assert!(matches!(events.as_slice(), [BarEvent::Revised(bar)] if bar.high == Decimal::from(12)));
        assert_eq!(p.stats().revisions, 1);

        // Watermark 3s − 2s = 1s seals bucket 0.
        let events = p.ingest_tick(tick(3 * S, 13)).unwrap();
        assert_eq!(closed_starts(&events, res("1s")), vec![0]);
        let bar = events[0].bar();
        assert_eq!(bar.high, Decimal::from(12));
        assert_eq!(bar.tick_count, 2);
    }

    #[test]
    fn test_duplicate_tick_leaves_state_unchanged() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        p.ingest_tick(tick(0, 10)).unwrap();
        p.ingest_tick(tick(S, 11)).unwrap();
        let before = p.state_checksum();
        let version = p.version();
        assert!(p.ingest_tick(tick(0, 10)).unwrap().is_empty());
        assert!(p.ingest_tick(tick(S, 11)).unwrap().is_empty());
        assert_eq!(p.state_checksum(), before);
        assert_eq!(p.version(), version);
        assert_eq!(p.stats().duplicates, 2);
        assert_eq!(p.stats().late_rejections, 0);
    }

    #[test]
    fn test_reingest_beyond_dedup_window_is_absorbed() {
        let mut cfg = EngineConfig::default()
            .with_resolutions("1s", &["1m"])
            .with_indicators([("vwap", IndicatorParams::default())]);
        cfg.dedup_window = 2;
        let resolved = Arc::new(cfg.resolve().unwrap());
        let mut p = SymbolPartition::standalone(sym(), resolved.clone());

        // Three trades in one open bucket, more than the window holds.
        let ticks: Vec<Tick> = (0..3)
            .map(|i| tick(i * 100_000_000, 10 + i).with_trade_id(i as u64))
            .collect();
        for t in &ticks {
            p.ingest_tick(t.clone()).unwrap();
        }
        let version = p.version();
        for t in &ticks {
            assert!(p.ingest_tick(t.clone()).unwrap().is_empty());
        }
        assert_eq!(p.stats().duplicates, 3);
        assert_eq!(p.stats().ticks_accepted, 3);
        assert_eq!(p.version(), version);

        p.flush();
        let bars = p.store().bars(res("1s")).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, Decimal::from(3));
        assert_eq!(bars[0].tick_count, 3);

        // Closed keys beyond the window come back as late, never merged.
        let mut replayed = SymbolPartition::standalone(sym(), resolved);
        for t in ticks.iter().chain(ticks.iter()) {
            let _ = replayed.ingest_tick(t.clone());
        }
        replayed.flush();
        assert_eq!(replayed.state_checksum(), p.state_checksum());

        let err = p.ingest_tick(ticks[0].clone()).unwrap_err();
        assert!(matches!(err, EngineError::LateData { .. }));
    }

    #[test]
    fn test_open_key_limit_rejects_tick() {
        let mut cfg = EngineConfig::default()
            .with_resolutions("1s", &[])
            .with_indicators(Vec::<(String, IndicatorParams)>::new());
        cfg.open_key_limit = 2;
        let mut p = SymbolPartition::standalone(sym(), Arc::new(cfg.resolve().unwrap()));
        p.ingest_tick(tick(0, 10).with_trade_id(1)).unwrap();
        p.ingest_tick(tick(1, 10).with_trade_id(2)).unwrap();
        let err = p.ingest_tick(tick(2, 10).with_trade_id(3)).unwrap_err();
        assert!(matches!(err, EngineError::DedupCapacity { limit: 2, .. }));
        assert_eq!(p.stats().ticks_accepted, 2);
        assert_eq!(p.stats().invalid, 1);

        // An explicit watermark seals the bucket and frees its keys.
        p.advance_watermark(S);
        p.ingest_tick(tick(S, 11).with_trade_id(4)).unwrap();
        assert_eq!(p.stats().ticks_accepted, 3);
    }

    #[test]
    fn test_flush_closes_every_level() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        p.ingest_tick(tick(0, 10)).unwrap();
        p.ingest_tick(tick(5 * S, 12)).unwrap();
        let events = p.flush();
        assert_eq!(closed_starts(&events, res("1s")), vec![5 * S]);
        assert_eq!(closed_starts(&events, res("1m")), vec![0]);

        let snapshot = p.snapshot();
        assert_eq!(snapshot.watermark, Some(60 * S));
        let coarse = snapshot.query(res("1m"), None, TimeRange::all()).unwrap();
        match coarse.series {
            QuerySeries::Bars(bars) => {
                assert_eq!(bars[0].open, Decimal::from(10));
                assert_eq!(bars[0].close, Decimal::from(12));
                assert_eq!(bars[0].volume, Decimal::from(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_restart_resets_cumulative_indicators() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        p.ingest_tick(tick(0, 10)).unwrap();
        p.ingest_tick(tick(S, 20)).unwrap();
        p.restart();
        p.ingest_tick(tick(2 * S, 30)).unwrap();

        let snapshot = p.snapshot();
        let result = snapshot.query(res("1s"), Some("vwap"), TimeRange::all()).unwrap();
        match result.series {
            QuerySeries::Points(points) => {
                assert_eq!(points.len(), 2);
                // Bar at 1s is the first bar after restart.
                assert_eq!(points[1].value, IndicatorValue::scalar(20.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(snapshot.stats.restarts, 1);
    }

    #[test]
    fn test_book_snapshot_points() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        let book = BookSnapshot::new(
            sym(),
            10,
            vec![BookLevel::new("99.5".parse().unwrap(), Decimal::from(10))],
            vec![BookLevel::new("100.5".parse().unwrap(), Decimal::from(10))],
        );
        p.ingest_book(book.clone()).unwrap();
        p.ingest_book(book.clone()).unwrap();
        let mut older = book;
        older.timestamp = 5;
        assert!(matches!(p.ingest_book(older), Err(EngineError::LateData { .. })));

        let stats = p.stats();
        assert_eq!(stats.book_snapshots, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.late_rejections, 1);
        let points = p.store().book_points("spread").unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_sink_receives_closed_bars_and_points() {
        let (sink, mut rx) = ChannelSink::new(64);
        let mut p = SymbolPartition::new(sym(), config("0s"), Arc::new(sink));
        p.ingest_tick(tick(0, 10)).unwrap();
        p.ingest_tick(tick(S, 11)).unwrap();

        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        assert!(records
            .iter()
            .any(|r| matches!(r, SinkRecord::Bar(bar) if bar.bucket_start == 0)));
        let points = records
            .iter()
            .filter(|r| matches!(r, SinkRecord::Point { .. }))
            .count();
        assert_eq!(points, 3);
    }

    #[test]
    fn test_invalid_tick_counted() {
        let mut p = SymbolPartition::standalone(sym(), config("0s"));
        let bad = Tick::new(sym(), 0, Decimal::ZERO, Decimal::ONE, Side::BUY);
        assert!(matches!(p.ingest_tick(bad), Err(EngineError::Validation(_))));
        let other = Tick::new(Symbol::new("ETH-USD"), 0, Decimal::ONE, Decimal::ONE, Side::BUY);
        assert!(p.ingest_tick(other).is_err());
        assert_eq!(p.stats().invalid, 2);
        assert_eq!(p.version(), 0);
    }
}
