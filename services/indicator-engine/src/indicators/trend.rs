//! Trend indicators: OHLC passthrough, SMA, EMA, MACD, Donchian channels.

use types::numeric::to_f64;

use super::{Indicator, IndicatorValue};
use crate::bars::Bar;
use crate::window::{Ema, RollingStats, WindowExtrema};

/// The closed bar itself.
#[derive(Debug, Clone, Default)]
pub struct OhlcSeries;

impl Indicator for OhlcSeries {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        IndicatorValue::Ohlc {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

/// Simple moving average of close.
#[derive(Debug, Clone)]
pub struct Sma {
    closes: RollingStats,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            closes: RollingStats::new(period),
        }
    }
}

impl Indicator for Sma {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.closes.push(to_f64(bar.close));
        self.closes
            .mean()
            .map_or_else(IndicatorValue::warmup, IndicatorValue::scalar)
    }
}

/// Exponential moving average of close.
#[derive(Debug, Clone)]
pub struct EmaSeries {
    ema: Ema,
}

impl EmaSeries {
    pub fn new(period: usize) -> Self {
        Self { ema: Ema::new(period) }
    }
}

impl Indicator for EmaSeries {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.ema
            .update(to_f64(bar.close))
            .map_or_else(IndicatorValue::warmup, IndicatorValue::scalar)
    }
}

/// MACD line, signal line and histogram.
///
/// The signal EMA only starts consuming once both the fast and the slow
/// EMA are warm, so the first MACD values carry no signal yet.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }
}

impl Indicator for Macd {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let close = to_f64(bar.close);
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return IndicatorValue::warmup();
        };
        let macd = fast - slow;
        let signal = self.signal.update(macd);
        IndicatorValue::Macd {
            macd,
            signal,
            histogram: signal.map(|s| macd - s),
        }
    }
}

/// Highest high and lowest low over N bars, with their midpoint.
#[derive(Debug, Clone)]
pub struct Donchian {
    range: WindowExtrema,
}

impl Donchian {
    pub fn new(period: usize) -> Self {
        Self {
            range: WindowExtrema::new(period),
        }
    }
}

impl Indicator for Donchian {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.range.push(to_f64(bar.high), to_f64(bar.low));
        match (self.range.max(), self.range.min()) {
            (Some(upper), Some(lower)) => IndicatorValue::Bands {
                upper,
                middle: (upper + lower) / 2.0,
                lower,
            },
            _ => IndicatorValue::warmup(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{bar, close_bar};

    #[test]
    fn test_ohlc_passthrough() {
        let b = bar(0, 1.0, 3.0, 0.5, 2.0, 7.0);
        match OhlcSeries.update(&b) {
            IndicatorValue::Ohlc { open, close, volume, .. } => {
                assert_eq!(open, b.open);
                assert_eq!(close, b.close);
                assert_eq!(volume, b.volume);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sma_warmup() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(&close_bar(0, 1.0)), IndicatorValue::warmup());
        assert_eq!(sma.update(&close_bar(1, 2.0)), IndicatorValue::warmup());
        assert_eq!(sma.update(&close_bar(2, 3.0)), IndicatorValue::scalar(2.0));
    }

    #[test]
    fn test_ema_constant_stream() {
        let mut ema = EmaSeries::new(5);
        let mut last = IndicatorValue::warmup();
        for i in 0..25 {
            last = ema.update(&close_bar(i, 42.0));
        }
        assert!((last.as_scalar().unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_warmup_and_signal() {
        let mut macd = Macd::new(3, 5, 2);
        let mut values = Vec::new();
        for i in 0..10 {
            values.push(macd.update(&close_bar(i, 10.0 + i as f64)));
        }
        // Slow EMA warms on bar 5 (index 4).
        assert!(!values[3].is_defined());
        match &values[4] {
            IndicatorValue::Macd { macd, signal, .. } => {
                assert!(*macd > 0.0);
                assert!(signal.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        match &values[5] {
            IndicatorValue::Macd { macd, signal, histogram } => {
                let signal = signal.unwrap();
                assert!((histogram.unwrap() - (macd - signal)).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_donchian_channels() {
        let mut dc = Donchian::new(2);
        assert!(!dc.update(&bar(0, 10.0, 12.0, 9.0, 11.0, 1.0)).is_defined());
        let value = dc.update(&bar(1, 11.0, 15.0, 10.0, 14.0, 1.0));
        assert_eq!(
            value,
            IndicatorValue::Bands {
                upper: 15.0,
                middle: 12.0,
                lower: 9.0
            }
        );
    }
}
