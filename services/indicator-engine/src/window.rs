//! Rolling Window Engine
//!
//! O(1)-amortized accumulators fed by the closed-bar stream of one
//! (symbol, resolution). Each accumulator is a deterministic function of
//! the ordered values pushed into it, so replaying the same bars from
//! scratch reproduces the same state.
//!
//! Warmup rule: count-based statistics (SMA, variance, extrema) report
//! `None` until the window holds `period` observations. Exponential
//! smoothers are seeded with the SMA of their first `period` inputs and
//! report `None` before that; there is no silent fallback. Unbounded
//! running totals are defined from the first observation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of evictions between full recomputations of the running sums,
/// bounding floating-point drift on long-lived windows.
const RESYNC_INTERVAL: u64 = 4096;

/// Averaging used by RSI, ATR and Keltner's ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingKind {
    /// Simple moving average over the last `period` values
    #[serde(alias = "SMA")]
    Sma,
    /// Exponential smoothing, alpha = 2 / (period + 1)
    #[serde(alias = "EMA")]
    Ema,
    /// Wilder's smoothing, alpha = 1 / period
    #[serde(alias = "Wilder", alias = "WILDER")]
    Wilder,
}

/// Count-based window with running `sum` and `sum_of_squares`.
#[derive(Debug, Clone)]
pub struct RollingStats {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    sum_sq: f64,
    evictions: u64,
}

impl RollingStats {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            sum_sq: 0.0,
            evictions: 0,
        }
    }

    /// Push a value, returning the one evicted from the window (if full).
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };

        if let Some(old) = evicted {
            self.sum -= old;
            self.sum_sq -= old * old;
            self.evictions += 1;
        }

        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        if evicted.is_some() && self.evictions % RESYNC_INTERVAL == 0 {
            self.resync();
        }

        evicted
    }

    fn resync(&mut self) {
        self.sum = self.values.iter().sum();
        self.sum_sq = self.values.iter().map(|v| v * v).sum();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the window holds `capacity` observations.
    pub fn is_warm(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Sum over whatever the window currently holds (not warmup-gated).
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Simple moving average; `None` until warm.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        Some(self.sum / self.capacity as f64)
    }

    /// Population variance `sum_sq/N - (sum/N)^2`, clamped to zero to absorb
    /// cancellation error; `None` until warm.
    pub fn variance(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        let n = self.capacity as f64;
        let mean = self.sum / n;
        Some((self.sum_sq / n - mean * mean).max(0.0))
    }

    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Sample variance (n - 1) over the values currently held; needs two.
    pub fn sample_variance(&self) -> Option<f64> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        let n = n as f64;
        Some(((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0))
    }

    pub fn sample_stddev(&self) -> Option<f64> {
        self.sample_variance().map(f64::sqrt)
    }

    /// Oldest value still inside the window.
    pub fn oldest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }
}

/// Exponential moving average seeded by the SMA of its first `period` inputs.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    /// Standard EMA, alpha = 2 / (period + 1).
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self::with_alpha(period, 2.0 / (period as f64 + 1.0))
    }

    /// Wilder's smoothing, alpha = 1 / period.
    pub fn wilder(period: usize) -> Self {
        let period = period.max(1);
        Self::with_alpha(period, 1.0 / period as f64)
    }

    fn with_alpha(period: usize, alpha: f64) -> Self {
        Self {
            period,
            alpha,
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        match self.value {
            Some(prev) => {
                self.value = Some(self.alpha * x + (1.0 - self.alpha) * prev);
            }
            None => {
                self.seen += 1;
                self.seed_sum += x;
                if self.seen >= self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.value.is_some()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

/// An average of one configurable [`SmoothingKind`].
#[derive(Debug, Clone)]
pub enum Smoother {
    Simple(RollingStats),
    Exponential(Ema),
}

impl Smoother {
    pub fn new(kind: SmoothingKind, period: usize) -> Self {
        match kind {
            SmoothingKind::Sma => Smoother::Simple(RollingStats::new(period)),
            SmoothingKind::Ema => Smoother::Exponential(Ema::new(period)),
            SmoothingKind::Wilder => Smoother::Exponential(Ema::wilder(period)),
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        match self {
            Smoother::Simple(stats) => {
                stats.push(x);
                stats.mean()
            }
            Smoother::Exponential(ema) => ema.update(x),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Smoother::Simple(stats) => stats.mean(),
            Smoother::Exponential(ema) => ema.value(),
        }
    }
}

/// Highest and lowest value over the last `capacity` pushes.
///
/// Two monotonic deques of (index, value): the max deque is kept
/// non-increasing and the min deque non-decreasing, so the front of each is
/// the window extremum and every value is pushed and popped at most once.
#[derive(Debug, Clone)]
pub struct WindowExtrema {
    capacity: usize,
    next_index: u64,
    maxima: VecDeque<(u64, f64)>,
    minima: VecDeque<(u64, f64)>,
}

impl WindowExtrema {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_index: 0,
            maxima: VecDeque::new(),
            minima: VecDeque::new(),
        }
    }

    /// Push one observation. For a single series pass the same value twice.
    pub fn push(&mut self, high: f64, low: f64) {
        let index = self.next_index;
        self.next_index += 1;

        while matches!(self.maxima.back(), Some(&(_, v)) if v <= high) {
            self.maxima.pop_back();
        }
        self.maxima.push_back((index, high));

        while matches!(self.minima.back(), Some(&(_, v)) if v >= low) {
            self.minima.pop_back();
        }
        self.minima.push_back((index, low));

        let window_start = self.next_index.saturating_sub(self.capacity as u64);
        while matches!(self.maxima.front(), Some(&(i, _)) if i < window_start) {
            self.maxima.pop_front();
        }
        while matches!(self.minima.front(), Some(&(i, _)) if i < window_start) {
            self.minima.pop_front();
        }
    }

    pub fn is_warm(&self) -> bool {
        self.next_index >= self.capacity as u64
    }

    /// Highest value in the window; `None` until warm.
    pub fn max(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        self.maxima.front().map(|&(_, v)| v)
    }

    /// Lowest value in the window; `None` until warm.
    pub fn min(&self) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        self.minima.front().map(|&(_, v)| v)
    }
}

/// Unbounded running total from stream start.
#[derive(Debug, Clone, Default)]
pub struct RunningTotal {
    value: f64,
    count: u64,
}

impl RunningTotal {
    pub fn add(&mut self, x: f64) -> f64 {
        self.value += x;
        self.count += 1;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Running peak of close with current and worst drawdown.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    peak: Option<f64>,
    drawdown: f64,
    max_drawdown: f64,
}

impl DrawdownTracker {
    /// Returns `(drawdown, max_drawdown)`, both `<= 0`. `None` if the peak
    /// is not positive.
    pub fn update(&mut self, close: f64) -> Option<(f64, f64)> {
        let peak = self.peak.map_or(close, |p| p.max(close));
        self.peak = Some(peak);
        if peak <= 0.0 {
            return None;
        }
        self.drawdown = (close - peak) / peak;
        self.max_drawdown = self.max_drawdown.min(self.drawdown);
        Some((self.drawdown, self.max_drawdown))
    }

    pub fn peak(&self) -> Option<f64> {
        self.peak
    }
}
