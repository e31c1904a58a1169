//! Persistence sink
//!
//! Closed bars and indicator points are offered to an optional durable
//! store. Delivery is fire-and-forget: the in-memory state never depends
//! on it, and a slow or absent store never blocks a partition worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use types::ids::Symbol;
use types::resolution::Resolution;

use crate::bars::Bar;
use crate::indicators::IndicatorPoint;

/// Receiver of everything a partition materializes.
pub trait Sink: Send + Sync {
    fn on_bar(&self, bar: &Bar);

    /// `resolution` is `None` for book-derived series.
    fn on_point(
        &self,
        symbol: &Symbol,
        resolution: Option<Resolution>,
        indicator: &str,
        point: &IndicatorPoint,
    );
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn on_bar(&self, _bar: &Bar) {}

    fn on_point(&self, _: &Symbol, _: Option<Resolution>, _: &str, _: &IndicatorPoint) {}
}

/// One record handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SinkRecord {
    Bar(Bar),
    Point {
        symbol: Symbol,
        resolution: Option<Resolution>,
        indicator: String,
        point: IndicatorPoint,
    },
}

/// Forwards records over a bounded channel. A full or closed channel drops
/// the record and counts it.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkRecord>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Records dropped because the store was not keeping up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn offer(&self, record: SinkRecord) {
        if let Err(err) = self.tx.try_send(record) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // Log the first drop and then every thousandth.
            if dropped == 1 || dropped % 1_000 == 0 {
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                warn!(dropped, reason, "Persistence sink dropping records");
            }
        }
    }
}

impl Sink for ChannelSink {
    fn on_bar(&self, bar: &Bar) {
        self.offer(SinkRecord::Bar(bar.clone()));
    }

    fn on_point(
        &self,
        symbol: &Symbol,
        resolution: Option<Resolution>,
        indicator: &str,
        point: &IndicatorPoint,
    ) {
        self.offer(SinkRecord::Point {
            symbol: symbol.clone(),
            resolution,
            indicator: indicator.to_string(),
            point: point.clone(),
        });
    }
}
