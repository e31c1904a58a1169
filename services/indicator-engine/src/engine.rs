//! Partition arena
//!
//! The engine routes pushed events to per-symbol partitions. Each partition
//! runs on its own tokio task behind a bounded [`PartitionQueue`], so
//! symbols are processed fully in parallel and share no mutable state.
//!
//! After every batch a worker publishes an `Arc<SymbolSnapshot>` on a
//! `watch` channel. Queries read the latest published snapshot and never
//! contend with ingestion.
//!
//! The engine must be used from within a tokio runtime: the first event
//! for a symbol spawns its worker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::ids::Symbol;
use types::resolution::Resolution;

use crate::backpressure::{Command, PartitionQueue, PushOutcome};
use crate::config::{EngineConfig, ResolvedConfig};
use crate::error::EngineError;
use crate::events::MarketEvent;
use crate::metrics::EngineMetrics;
use crate::partition::SymbolPartition;
use crate::query::{QueryResult, SymbolSnapshot, TimeRange};
use crate::sink::{NoopSink, Sink};

/// Commands a worker applies before publishing a snapshot.
const MAX_BATCH: usize = 512;

struct PartitionHandle {
    queue: Arc<PartitionQueue>,
    snapshot: watch::Receiver<Arc<SymbolSnapshot>>,
    task: JoinHandle<()>,
}

pub struct Engine {
    config: Arc<ResolvedConfig>,
    sink: Arc<dyn Sink>,
    partitions: RwLock<BTreeMap<Symbol, PartitionHandle>>,
    metrics: Arc<EngineMetrics>,
    /// Set by `shutdown`; no partition is spawned or fed afterwards.
    closed: AtomicBool,
}

impl Engine {
    /// Validate `config` and build an engine with no persistence sink.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    pub fn with_sink(config: EngineConfig, sink: Arc<dyn Sink>) -> Result<Self, EngineError> {
        let resolved = config.resolve()?;
        info!(
            base_resolution = %resolved.base_resolution,
            queue_capacity = resolved.queue_capacity,
            "Indicator engine started"
        );
        Ok(Self {
            config: Arc::new(resolved),
            sink,
            partitions: RwLock::new(BTreeMap::new()),
            metrics: Arc::new(EngineMetrics::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Push one event. Never blocks.
    ///
    /// Returns `Overflow` when the symbol's queue was full: the event is
    /// still queued, and the oldest queued event was dropped for it.
    pub fn submit(&self, event: MarketEvent) -> Result<(), EngineError> {
        let symbol = event.symbol().clone();
        if self.is_shut_down() {
            return Err(EngineError::ShutDown(symbol.to_string()));
        }
        self.metrics.record_submitted();
        let queue = self.queue_or_spawn(&symbol)?;

        match queue.push(Command::Event(event)) {
            Ok(PushOutcome::Queued) => Ok(()),
            Ok(PushOutcome::Displaced) => {
                self.metrics.record_overflow(1);
                let total = queue.dropped();
                if total == 1 || total % 1_000 == 0 {
                    warn!(
                        symbol = %symbol,
                        capacity = queue.capacity(),
                        dropped_total = total,
                        "Ingest queue full, dropping oldest events"
                    );
                }
                Err(EngineError::Overflow {
                    symbol,
                    capacity: queue.capacity(),
                    dropped: 1,
                })
            }
            Err(_) => Err(EngineError::ShutDown(symbol.to_string())),
        }
    }

    /// Submit a batch, collecting per-event failures instead of stopping.
    pub fn submit_all<I>(&self, events: I) -> Vec<EngineError>
    where
        I: IntoIterator<Item = MarketEvent>,
    {
        events
            .into_iter()
            .filter_map(|event| self.submit(event).err())
            .collect()
    }

    /// Raise a symbol's watermark explicitly.
    pub fn advance_watermark(&self, symbol: &Symbol, timestamp: i64) -> Result<(), EngineError> {
        self.control(symbol, Command::AdvanceWatermark(timestamp))
    }

    /// Close every open bar of a symbol.
    pub fn flush(&self, symbol: &Symbol) -> Result<(), EngineError> {
        self.control(symbol, Command::Flush)
    }

    /// Flush every symbol (end of stream).
    pub fn flush_all(&self) {
        for (symbol, handle) in self.read().iter() {
            if handle.queue.push(Command::Flush).is_err() {
                warn!(symbol = %symbol, "Flush not delivered, partition queue closed");
            }
        }
    }

    /// Restart a symbol's indicator windows and cumulative accumulators.
    pub fn restart(&self, symbol: &Symbol) -> Result<(), EngineError> {
        self.control(symbol, Command::Restart)
    }

    /// Wait until everything submitted for `symbol` so far is applied, and
    /// return the resulting snapshot.
    pub async fn sync(&self, symbol: &Symbol) -> Result<Arc<SymbolSnapshot>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.control(symbol, Command::Barrier(tx))?;
        rx.await
            .map_err(|_| EngineError::ShutDown(symbol.to_string()))?;
        self.snapshot(symbol)
    }

    /// Wait for every partition to catch up.
    pub async fn sync_all(&self) {
        for symbol in self.symbols() {
            if let Err(err) = self.sync(&symbol).await {
                warn!(symbol = %symbol, error = %err, "Partition did not catch up");
            }
        }
    }

    /// Latest published snapshot of a symbol.
    pub fn snapshot(&self, symbol: &Symbol) -> Result<Arc<SymbolSnapshot>, EngineError> {
        self.read()
            .get(symbol)
            .map(|handle| handle.snapshot.borrow().clone())
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
    }

    /// Receiver notified on every published snapshot of a symbol.
    pub fn subscribe(&self, symbol: &Symbol) -> Result<watch::Receiver<Arc<SymbolSnapshot>>, EngineError> {
        self.read()
            .get(symbol)
            .map(|handle| handle.snapshot.clone())
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
    }

    /// Bars (no indicator) or indicator points of a symbol in `range`.
    pub fn query(
        &self,
        symbol: &Symbol,
        resolution: Resolution,
        indicator: Option<&str>,
        range: TimeRange,
    ) -> Result<QueryResult, EngineError> {
        self.query_snapshot(symbol, resolution, indicator, range)
            .map(|(_, result)| result)
    }

    /// Like `query`, also returning the snapshot the result was read from so
    /// callers can report its stats without a second, possibly newer, read.
    pub fn query_snapshot(
        &self,
        symbol: &Symbol,
        resolution: Resolution,
        indicator: Option<&str>,
        range: TimeRange,
    ) -> Result<(Arc<SymbolSnapshot>, QueryResult), EngineError> {
        if !self.config.has_resolution(resolution) {
            return Err(EngineError::UnknownResolution(resolution.to_string()));
        }
        if let Some(name) = indicator {
            if self.config.indicator(name).is_none() {
                return Err(EngineError::UnknownIndicator(name.to_string()));
            }
        }
        let snapshot = self.snapshot(symbol)?;
        let result = snapshot.query(resolution, indicator, range)?;
        Ok((snapshot, result))
    }

    /// Symbols with an accepted event within `recency` nanoseconds of the
    /// newest event seen by any symbol.
    pub fn list_active_symbols(&self, recency: i64) -> Vec<Symbol> {
        let snapshots: Vec<Arc<SymbolSnapshot>> = self
            .read()
            .values()
            .map(|handle| handle.snapshot.borrow().clone())
            .collect();
        let Some(now) = snapshots.iter().filter_map(|s| s.last_event_ts).max() else {
            return Vec::new();
        };
        let since = now.saturating_sub(recency.max(0));
        snapshots
            .iter()
            .filter(|s| s.active_since(since))
            .map(|s| s.symbol.clone())
            .collect()
    }

    /// Every symbol with a live partition.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.read().keys().cloned().collect()
    }

    /// Destroy a symbol's partition: worker, bars, windows and series.
    pub fn teardown(&self, symbol: &Symbol) -> Result<(), EngineError> {
        let handle = self
            .write()
            .remove(symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;
        handle.queue.close();
        handle.task.abort();
        self.metrics.record_partition_torn_down();
        info!(symbol = %symbol, "Symbol partition torn down");
        Ok(())
    }

    /// Stop accepting events, let every worker drain its queue, and wait
    /// for them to finish.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let handles: Vec<(Symbol, PartitionHandle)> =
            std::mem::take(&mut *self.write()).into_iter().collect();
        for (_, handle) in &handles {
            handle.queue.close();
        }
        for (symbol, handle) in handles {
            if let Err(err) = handle.task.await {
                warn!(symbol = %symbol, error = %err, "Partition worker ended abnormally");
            }
        }
        info!("Indicator engine shut down");
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn control(&self, symbol: &Symbol, command: Command) -> Result<(), EngineError> {
        let queue = self
            .read()
            .get(symbol)
            .map(|handle| handle.queue.clone())
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;
        queue
            .push(command)
            .map(|_| ())
            .map_err(|_| EngineError::ShutDown(symbol.to_string()))
    }

    fn queue_or_spawn(&self, symbol: &Symbol) -> Result<Arc<PartitionQueue>, EngineError> {
        if let Some(handle) = self.read().get(symbol) {
            return Ok(handle.queue.clone());
        }
        let mut partitions = self.write();
        // Checked under the write lock: `shutdown` raises the flag before
        // taking the map, so nothing spawned here can escape it.
        if self.is_shut_down() {
            return Err(EngineError::ShutDown(symbol.to_string()));
        }
        let handle = partitions
            .entry(symbol.clone())
            .or_insert_with(|| self.spawn_partition(symbol.clone()));
        Ok(handle.queue.clone())
    }

    fn spawn_partition(&self, symbol: Symbol) -> PartitionHandle {
        let partition = SymbolPartition::new(symbol.clone(), self.config.clone(), self.sink.clone());
        let queue = Arc::new(PartitionQueue::new(self.config.queue_capacity));
        let (publisher, snapshot) = watch::channel(Arc::new(partition.snapshot()));
        let task = tokio::spawn(run_partition(partition, queue.clone(), publisher));
        self.metrics.record_partition_created();
        PartitionHandle {
            queue,
            snapshot,
            task,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Symbol, PartitionHandle>> {
        self.partitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Symbol, PartitionHandle>> {
        self.partitions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker loop of one symbol: apply a batch, publish, release barriers.
async fn run_partition(
    mut partition: SymbolPartition,
    queue: Arc<PartitionQueue>,
    publisher: watch::Sender<Arc<SymbolSnapshot>>,
) {
    while let Some(batch) = queue.pop_batch(MAX_BATCH).await {
        let mut barriers = Vec::new();
        for command in batch {
            match command {
                Command::Event(event) => {
                    if let Err(err) = partition.apply(event) {
                        debug!(
                            symbol = %partition.symbol(),
                            kind = err.kind_label(),
                            "Event rejected"
                        );
                    }
                }
                Command::AdvanceWatermark(timestamp) => {
                    partition.advance_watermark(timestamp);
                }
                Command::Flush => {
                    partition.flush();
                }
                Command::Restart => partition.restart(),
                Command::Barrier(done) => barriers.push(done),
            }
        }

        publisher.send_replace(Arc::new(partition.snapshot()));
        for done in barriers {
            let _ = done.send(());
        }
    }

    info!(symbol = %partition.symbol(), "Partition worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorParams;
    use crate::query::QuerySeries;
    use rust_decimal::Decimal;
    use types::trade::{Side, Tick};

    const S: i64 = 1_000_000_000;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_resolutions("1s", &["1m"])
            .with_indicators([("sma", IndicatorParams::of_kind("sma").with_period(2))])
    }

    fn tick(symbol: &str, ts: i64, price: i64) -> MarketEvent {
        Tick::new(Symbol::new(symbol), ts, Decimal::from(price), Decimal::ONE, Side::BUY).into()
    }

    fn res(s: &str) -> Resolution {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_query() {
        let engine = Engine::new(config()).unwrap();
        let btc = Symbol::new("BTC-USD");
        for (i, price) in [10, 11, 12].iter().enumerate() {
            engine.submit(tick("BTC-USD", i as i64 * S, *price)).unwrap();
        }
        engine.sync(&btc).await.unwrap();

        let result = engine
            .query(&btc, res("1s"), Some("sma"), TimeRange::all())
            .unwrap();
        match result.series {
            QuerySeries::Points(points) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[1].value.as_scalar(), Some(10.5));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(result.closed_through, Some(2 * S));
    }

    #[tokio::test]
    async fn test_query_snapshot_pairs_result_with_its_stats() {
        let engine = Engine::new(config()).unwrap();
        let btc = Symbol::new("BTC-USD");
        for i in 0..3 {
            engine.submit(tick("BTC-USD", i * S, 10)).unwrap();
        }
        engine.sync(&btc).await.unwrap();

        let (snapshot, result) = engine
            .query_snapshot(&btc, res("1s"), None, TimeRange::all())
            .unwrap();
        // Later events publish a new snapshot; the pair stays consistent.
        engine.submit(tick("BTC-USD", 3 * S, 10)).unwrap();
        engine.sync(&btc).await.unwrap();

        assert_eq!(snapshot.stats.ticks_accepted, 3);
        assert_eq!(result.closed_through, snapshot.levels[0].closed_through);
        assert_eq!(result.series.len(), 2);
        assert_eq!(engine.snapshot(&btc).unwrap().stats.ticks_accepted, 4);
        assert!(matches!(
            engine.query_snapshot(&btc, res("1s"), Some("macd"), TimeRange::all()),
            Err(EngineError::UnknownIndicator(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_symbol_and_indicator() {
        let engine = Engine::new(config()).unwrap();
        let eth = Symbol::new("ETH-USD");
        assert!(matches!(
            engine.query(&eth, res("1s"), None, TimeRange::all()),
            Err(EngineError::UnknownSymbol(_))
        ));
        assert!(matches!(
            engine.query(&eth, res("1s"), Some("macd"), TimeRange::all()),
            Err(EngineError::UnknownIndicator(_))
        ));
        assert!(matches!(
            engine.query(&eth, res("5m"), None, TimeRange::all()),
            Err(EngineError::UnknownResolution(_))
        ));
        assert!(matches!(engine.flush(&eth), Err(EngineError::UnknownSymbol(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let bad = EngineConfig::default().with_resolutions("1m", &["1m"]);
        assert!(matches!(Engine::new(bad), Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_list_active_symbols() {
        let engine = Engine::new(config()).unwrap();
        engine.submit(tick("BTC-USD", 100 * S, 10)).unwrap();
        engine.submit(tick("ETH-USD", 10 * S, 10)).unwrap();
        engine.sync_all().await;

        assert_eq!(engine.list_active_symbols(30 * S), vec![Symbol::new("BTC-USD")]);
        assert_eq!(engine.list_active_symbols(100 * S).len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_removes_partition() {
        let engine = Engine::new(config()).unwrap();
        let btc = Symbol::new("BTC-USD");
        engine.submit(tick("BTC-USD", 0, 10)).unwrap();
        engine.teardown(&btc).unwrap();
        assert!(matches!(engine.snapshot(&btc), Err(EngineError::UnknownSymbol(_))));
        assert_eq!(engine.metrics().export()["partitions_torn_down"], 1);

        // A later event starts a fresh partition.
        engine.submit(tick("BTC-USD", 0, 10)).unwrap();
        let snapshot = engine.sync(&btc).await.unwrap();
        assert_eq!(snapshot.stats.ticks_accepted, 1);
    }

    #[tokio::test]
    async fn test_flush_and_watermark_commands() {
        let engine = Engine::new(config()).unwrap();
        let btc = Symbol::new("BTC-USD");
        engine.submit(tick("BTC-USD", 0, 10)).unwrap();
        engine.advance_watermark(&btc, S).unwrap();
        let snapshot = engine.sync(&btc).await.unwrap();
        assert_eq!(snapshot.stats.bars_closed, 1);

        engine.submit(tick("BTC-USD", 2 * S, 11)).unwrap();
        engine.flush(&btc).unwrap();
        let snapshot = engine.sync(&btc).await.unwrap();
        assert_eq!(snapshot.watermark, Some(60 * S));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queues() {
        let engine = Engine::new(config()).unwrap();
        for i in 0..10 {
            engine.submit(tick("BTC-USD", i * S, 10)).unwrap();
        }
        let mut updates = engine.subscribe(&Symbol::new("BTC-USD")).unwrap();
        engine.shutdown().await;
        assert!(engine.symbols().is_empty());
        let last = updates.borrow_and_update().clone();
        assert_eq!(last.stats.ticks_accepted, 10);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let engine = Engine::new(config()).unwrap();
        engine.submit(tick("BTC-USD", 0, 10)).unwrap();
        engine.shutdown().await;

        assert!(matches!(
            engine.submit(tick("BTC-USD", S, 11)),
            Err(EngineError::ShutDown(_))
        ));
        assert!(matches!(
            engine.queue_or_spawn(&Symbol::new("ETH-USD")),
            Err(EngineError::ShutDown(_))
        ));
        assert!(engine.symbols().is_empty());
        assert_eq!(engine.metrics().export()["events_submitted"], 1);
    }

    #[tokio::test]
    async fn test_bulk_commands_skip_closed_queue() {
        let engine = Engine::new(config()).unwrap();
        let btc = Symbol::new("BTC-USD");
        engine.submit(tick("BTC-USD", 0, 10)).unwrap();
        engine.submit(tick("ETH-USD", 0, 10)).unwrap();
        engine.sync_all().await;

        // Worker stopped while its handle is still registered.
        engine.read()[&btc].queue.close();
        engine.flush_all();
        engine.sync_all().await;

        assert!(matches!(engine.sync(&btc).await, Err(EngineError::ShutDown(_))));
        let eth = engine.snapshot(&Symbol::new("ETH-USD")).unwrap();
        assert_eq!(eth.stats.bars_closed, 2);
    }
}
