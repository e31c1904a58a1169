//! Bounded out-of-orderness watermark
//!
//! The watermark trails the newest event timestamp a symbol has seen by
//! the configured lateness tolerance. Everything strictly below it is
//! considered complete: bars whose bucket ends at or before the watermark
//! are sealed and later events for them are rejected as late.
//!
//! An explicit watermark (end of stream, idle source) can push it forward
//! but never back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    tolerance: i64,
    max_event_ts: Option<i64>,
    explicit: Option<i64>,
}

impl Watermark {
    /// `tolerance` in nanoseconds; negative values are treated as zero.
    pub fn new(tolerance: i64) -> Self {
        Self {
            tolerance: tolerance.max(0),
            max_event_ts: None,
            explicit: None,
        }
    }

    /// Record an accepted event timestamp.
    pub fn observe(&mut self, timestamp: i64) {
        self.max_event_ts = Some(self.max_event_ts.map_or(timestamp, |m| m.max(timestamp)));
    }

    /// Raise the watermark explicitly. Earlier values are ignored.
    pub fn advance_to(&mut self, timestamp: i64) {
        self.explicit = Some(self.explicit.map_or(timestamp, |e| e.max(timestamp)));
    }

    /// Current watermark, if any event or explicit advance has been seen.
    pub fn current(&self) -> Option<i64> {
        let derived = self
            .max_event_ts
            .map(|ts| ts.saturating_sub(self.tolerance));
        match (derived, self.explicit) {
            (Some(d), Some(e)) => Some(d.max(e)),
            (d, e) => d.or(e),
        }
    }

    /// Newest event timestamp observed.
    pub fn max_event_ts(&self) -> Option<i64> {
        self.max_event_ts
    }

    pub fn tolerance(&self) -> i64 {
        self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_watermark() {
        let wm = Watermark::new(10);
        assert_eq!(wm.current(), None);
    }

    #[test]
    fn test_watermark_trails_max_timestamp() {
        let mut wm = Watermark::new(10);
        wm.observe(100);
        assert_eq!(wm.current(), Some(90));
        wm.observe(50);
        assert_eq!(wm.current(), Some(90));
        wm.observe(130);
        assert_eq!(wm.current(), Some(120));
        assert_eq!(wm.max_event_ts(), Some(130));
    }

    #[test]
    fn test_zero_tolerance() {
        let mut wm = Watermark::new(0);
        wm.observe(7);
        assert_eq!(wm.current(), Some(7));
    }

    #[test]
    fn test_explicit_advance_is_monotonic() {
        let mut wm = Watermark::new(5);
        wm.advance_to(200);
        assert_eq!(wm.current(), Some(200));
        wm.observe(100);
        assert_eq!(wm.current(), Some(200));
        wm.advance_to(150);
        assert_eq!(wm.current(), Some(200));
        wm.observe(300);
        assert_eq!(wm.current(), Some(295));
    }
}
