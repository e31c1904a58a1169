//! Engine and partition counters
//!
//! Partition counters live inside the worker and are published with every
//! snapshot. Engine counters are shared atomics updated from `submit` and
//! the partition arena.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Counters owned by one symbol partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub ticks_accepted: u64,
    pub duplicates: u64,
    pub late_rejections: u64,
    pub invalid: u64,
    pub revisions: u64,
    pub bars_closed: u64,
    pub book_snapshots: u64,
    pub restarts: u64,
}

impl PartitionStats {
    /// Count a rejected event under its error kind.
    pub fn record_rejection(&mut self, err: &EngineError) {
        match err {
            EngineError::LateData { .. } => self.late_rejections += 1,
            _ => self.invalid += 1,
        }
    }
}

/// Engine-wide counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub events_submitted: AtomicU64,
    pub overflow_drops: AtomicU64,
    pub partitions_created: AtomicU64,
    pub partitions_torn_down: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.events_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self, dropped: u64) {
        self.overflow_drops.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_partition_created(&self) {
        self.partitions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partition_torn_down(&self) {
        self.partitions_torn_down.fetch_add(1, Ordering::Relaxed);
    }

    /// Export all counters as a name → value map.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert(
            "events_submitted".to_string(),
            self.events_submitted.load(Ordering::Relaxed),
        );
        m.insert(
            "overflow_drops".to_string(),
            self.overflow_drops.load(Ordering::Relaxed),
        );
        m.insert(
            "partitions_created".to_string(),
            self.partitions_created.load(Ordering::Relaxed),
        );
        m.insert(
            "partitions_torn_down".to_string(),
            self.partitions_torn_down.load(Ordering::Relaxed),
        );
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::Symbol;

    #[test]
    fn test_engine_metrics_export() {
        let metrics = EngineMetrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_overflow(3);
        metrics.record_partition_created();

        let exported = metrics.export();
        assert_eq!(exported["events_submitted"], 2);
        assert_eq!(exported["overflow_drops"], 3);
        assert_eq!(exported["partitions_created"], 1);
        assert_eq!(exported["partitions_torn_down"], 0);
    }

    #[test]
    fn test_rejection_classification() {
        let mut stats = PartitionStats::default();
        stats.record_rejection(&EngineError::LateData {
            symbol: Symbol::new("BTC-USD"),
            timestamp: 1,
            closed_through: 2,
        });
        stats.record_rejection(&EngineError::UnknownSymbol("ETH-USD".into()));
        assert_eq!(stats.late_rejections, 1);
        assert_eq!(stats.invalid, 1);
    }
}
