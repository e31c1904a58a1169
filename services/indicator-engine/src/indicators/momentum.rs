//! Momentum oscillators: RSI, stochastic, rate of change.

use types::numeric::to_f64;

use super::{Indicator, IndicatorValue};
use crate::bars::Bar;
use crate::window::{RollingStats, Smoother, SmoothingKind, WindowExtrema};

/// Relative strength index over N close-to-close changes.
///
/// The first bar has no previous close, so the first N bars are
/// undefined. With no losses in the window RSI is 100; with neither gains
/// nor losses it is 50.
#[derive(Debug, Clone)]
pub struct Rsi {
    prev_close: Option<f64>,
    gains: Smoother,
    losses: Smoother,
}

impl Rsi {
    pub fn new(period: usize, smoothing: SmoothingKind) -> Self {
        Self {
            prev_close: None,
            gains: Smoother::new(smoothing, period),
            losses: Smoother::new(smoothing, period),
        }
    }
}

impl Indicator for Rsi {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let close = to_f64(bar.close);
        let Some(prev) = self.prev_close.replace(close) else {
            return IndicatorValue::warmup();
        };
        let change = close - prev;
        let avg_gain = self.gains.update(change.max(0.0));
        let avg_loss = self.losses.update((-change).max(0.0));
        let (Some(gain), Some(loss)) = (avg_gain, avg_loss) else {
            return IndicatorValue::warmup();
        };

        let rsi = if loss == 0.0 {
            if gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
        IndicatorValue::scalar(rsi.clamp(0.0, 100.0))
    }
}

/// %K = (close − lowest low) / (highest high − lowest low) · 100 over N
/// bars; %D = SMA of %K.
#[derive(Debug, Clone)]
pub struct Stochastic {
    range: WindowExtrema,
    k_values: RollingStats,
}

impl Stochastic {
    pub fn new(period: usize, d_period: usize) -> Self {
        Self {
            range: WindowExtrema::new(period),
            k_values: RollingStats::new(d_period),
        }
    }
}

impl Indicator for Stochastic {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.range.push(to_f64(bar.high), to_f64(bar.low));
        let (Some(highest), Some(lowest)) = (self.range.max(), self.range.min()) else {
            return IndicatorValue::warmup();
        };
        if highest == lowest {
            return IndicatorValue::degenerate();
        }
        let k = (to_f64(bar.close) - lowest) / (highest - lowest) * 100.0;
        self.k_values.push(k);
        IndicatorValue::Stochastic {
            k,
            d: self.k_values.mean(),
        }
    }
}

/// Percent change of close over N bars.
#[derive(Debug, Clone)]
pub struct Roc {
    closes: RollingStats,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Self {
            closes: RollingStats::new(period + 1),
        }
    }
}

impl Indicator for Roc {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let close = to_f64(bar.close);
        self.closes.push(close);
        if !self.closes.is_warm() {
            return IndicatorValue::warmup();
        }
        match self.closes.oldest() {
            Some(base) if base != 0.0 => IndicatorValue::scalar((close - base) / base * 100.0),
            _ => IndicatorValue::degenerate(),
        }
    }
}
