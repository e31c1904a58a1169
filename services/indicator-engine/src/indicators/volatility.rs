//! Volatility indicators: Bollinger bands and bandwidth, ATR, Keltner
//! channels, realized volatility and drawdown.

use types::numeric::to_f64;

use super::{Indicator, IndicatorValue};
use crate::bars::Bar;
use crate::window::{DrawdownTracker, Ema, RollingStats, Smoother, SmoothingKind, WindowExtrema};

/// SMA(N) ± k·stddev(N) of close.
#[derive(Debug, Clone)]
pub struct Bollinger {
    closes: RollingStats,
    k: f64,
}

impl Bollinger {
    pub fn new(period: usize, k: f64) -> Self {
        Self {
            closes: RollingStats::new(period),
            k,
        }
    }
}

impl Indicator for Bollinger {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.closes.push(to_f64(bar.close));
        match (self.closes.mean(), self.closes.stddev()) {
            (Some(middle), Some(sd)) => IndicatorValue::Bands {
                upper: middle + self.k * sd,
                middle,
                lower: middle - self.k * sd,
            },
            _ => IndicatorValue::warmup(),
        }
    }
}

/// (upper − lower) / SMA · 100, plus its min/max-normalized position over a
/// longer lookback of bandwidth values.
#[derive(Debug, Clone)]
pub struct BollingerBandwidth {
    closes: RollingStats,
    k: f64,
    history: WindowExtrema,
}

impl BollingerBandwidth {
    pub fn new(period: usize, k: f64, lookback: usize) -> Self {
        Self {
            closes: RollingStats::new(period),
            k,
            history: WindowExtrema::new(lookback),
        }
    }
}

impl Indicator for BollingerBandwidth {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.closes.push(to_f64(bar.close));
        let (Some(sma), Some(sd)) = (self.closes.mean(), self.closes.stddev()) else {
            return IndicatorValue::warmup();
        };
        if sma == 0.0 {
            return IndicatorValue::degenerate();
        }
        let bandwidth = 2.0 * self.k * sd / sma * 100.0;
        self.history.push(bandwidth, bandwidth);
        let normalized = match (self.history.max(), self.history.min()) {
            (Some(max), Some(min)) if max > min => Some((bandwidth - min) / (max - min) * 100.0),
            _ => None,
        };
        IndicatorValue::Bandwidth {
            bandwidth,
            normalized,
        }
    }
}

/// True range against the previous close. The first bar has no previous
/// close and yields nothing.
#[derive(Debug, Clone, Default)]
pub struct TrueRange {
    prev_close: Option<f64>,
}

impl TrueRange {
    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let high = to_f64(bar.high);
        let low = to_f64(bar.low);
        let tr = self.prev_close.map(|prev| {
            (high - low)
                .max((high - prev).abs())
                .max((low - prev).abs())
        });
        self.prev_close = Some(to_f64(bar.close));
        tr
    }
}

/// Average true range.
#[derive(Debug, Clone)]
pub struct Atr {
    true_range: TrueRange,
    average: Smoother,
}

impl Atr {
    pub fn new(period: usize, smoothing: SmoothingKind) -> Self {
        Self {
            true_range: TrueRange::default(),
            average: Smoother::new(smoothing, period),
        }
    }

    fn next(&mut self, bar: &Bar) -> Option<f64> {
        let tr = self.true_range.update(bar)?;
        self.average.update(tr)
    }
}

impl Indicator for Atr {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.next(bar)
            .map_or_else(IndicatorValue::warmup, IndicatorValue::scalar)
    }
}

/// EMA(N) ± k·ATR(N).
#[derive(Debug, Clone)]
pub struct Keltner {
    center: Ema,
    atr: Atr,
    k: f64,
}

impl Keltner {
    pub fn new(period: usize, k: f64, smoothing: SmoothingKind) -> Self {
        Self {
            center: Ema::new(period),
            atr: Atr::new(period, smoothing),
            k,
        }
    }
}

impl Indicator for Keltner {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let center = self.center.update(to_f64(bar.close));
        let atr = self.atr.next(bar);
        match (center, atr) {
            (Some(middle), Some(atr)) => IndicatorValue::Bands {
                upper: middle + self.k * atr,
                middle,
                lower: middle - self.k * atr,
            },
            _ => IndicatorValue::warmup(),
        }
    }
}

/// Annualized sample standard deviation of log returns.
#[derive(Debug, Clone)]
pub struct RealizedVolatility {
    prev_close: Option<f64>,
    returns: RollingStats,
    annualization: f64,
}

impl RealizedVolatility {
    pub fn new(period: usize, periods_per_year: f64) -> Self {
        Self {
            prev_close: None,
            returns: RollingStats::new(period),
            annualization: periods_per_year.sqrt(),
        }
    }
}

impl Indicator for RealizedVolatility {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let close = to_f64(bar.close);
        if let Some(prev) = self.prev_close {
            if prev > 0.0 && close > 0.0 {
                self.returns.push((close / prev).ln());
            }
        }
        self.prev_close = Some(close);
        self.returns
            .sample_stddev()
            .map_or_else(IndicatorValue::warmup, |sd| {
                IndicatorValue::scalar(sd * self.annualization)
            })
    }
}

/// Drawdown from the running peak of close.
#[derive(Debug, Clone, Default)]
pub struct Drawdown {
    tracker: DrawdownTracker,
}

impl Indicator for Drawdown {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        match self.tracker.update(to_f64(bar.close)) {
            Some((drawdown, max_drawdown)) => IndicatorValue::Drawdown {
                drawdown,
                max_drawdown,
            },
            None => IndicatorValue::degenerate(),
        }
    }
}
