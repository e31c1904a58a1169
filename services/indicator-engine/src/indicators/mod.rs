//! Indicator Library
//!
//! A closed catalog of streaming indicators. Each kind is a small state
//! machine over the rolling-window primitives in [`crate::window`], fed one
//! closed bar at a time and producing one [`IndicatorValue`] per bar.
//!
//! Families:
//! - `trend`: OHLC passthrough, SMA, EMA, MACD, Donchian channels
//! - `volatility`: Bollinger bands and bandwidth, ATR, Keltner channels,
//!   realized volatility, drawdown
//! - `momentum`: RSI, stochastic oscillator, rate of change
//! - `volume`: VWAP, OBV, volume profile, volume spike, aggressor imbalance
//!
//! Book-derived kinds (spread, L2 execution price) live in [`crate::book`].
//!
//! Adding an indicator means adding an [`IndicatorKind`] variant, its
//! [`IndicatorSettings`], and a state type in the right family module.

pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::resolution::Resolution;

use crate::bars::Bar;
use crate::config::{ConfigError, IndicatorParams};
use crate::window::SmoothingKind;

/// Every indicator the engine knows how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Ohlc,
    Vwap,
    Sma,
    Ema,
    Bollinger,
    BollingerBandwidth,
    Rsi,
    Macd,
    Atr,
    Stochastic,
    Obv,
    Donchian,
    Keltner,
    Roc,
    RealizedVolatility,
    Drawdown,
    VolumeProfile,
    VolumeSpike,
    AggressorImbalance,
    Spread,
    L2Price,
}

impl IndicatorKind {
    pub fn all() -> &'static [IndicatorKind] {
        &[
            IndicatorKind::Ohlc,
            IndicatorKind::Vwap,
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Bollinger,
            IndicatorKind::BollingerBandwidth,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Atr,
            IndicatorKind::Stochastic,
            IndicatorKind::Obv,
            IndicatorKind::Donchian,
            IndicatorKind::Keltner,
            IndicatorKind::Roc,
            IndicatorKind::RealizedVolatility,
            IndicatorKind::Drawdown,
            IndicatorKind::VolumeProfile,
            IndicatorKind::VolumeSpike,
            IndicatorKind::AggressorImbalance,
            IndicatorKind::Spread,
            IndicatorKind::L2Price,
        ]
    }

    /// Configuration name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Ohlc => "ohlc",
            IndicatorKind::Vwap => "vwap",
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::BollingerBandwidth => "bollinger_bandwidth",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Obv => "obv",
            IndicatorKind::Donchian => "donchian",
            IndicatorKind::Keltner => "keltner",
            IndicatorKind::Roc => "roc",
            IndicatorKind::RealizedVolatility => "realized_volatility",
            IndicatorKind::Drawdown => "drawdown",
            IndicatorKind::VolumeProfile => "volume_profile",
            IndicatorKind::VolumeSpike => "volume_spike",
            IndicatorKind::AggressorImbalance => "aggressor_imbalance",
            IndicatorKind::Spread => "spread",
            IndicatorKind::L2Price => "l2_price",
        }
    }

    /// Look a kind up by name. A few common spellings are accepted too.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let alias = match name.as_str() {
            "bollinger_bands" | "bb" => Some(IndicatorKind::Bollinger),
            "bbw" => Some(IndicatorKind::BollingerBandwidth),
            "realized_vol" => Some(IndicatorKind::RealizedVolatility),
            "max_drawdown" => Some(IndicatorKind::Drawdown),
            "bid_ask_spread" => Some(IndicatorKind::Spread),
            "l2" | "liquidity" => Some(IndicatorKind::L2Price),
            _ => None,
        };
        alias.or_else(|| Self::all().iter().copied().find(|k| k.name() == name))
    }

    /// Computed from book snapshots instead of bars.
    pub fn is_book_derived(&self) -> bool {
        matches!(self, IndicatorKind::Spread | IndicatorKind::L2Price)
    }

    /// Parameters this kind understands.
    pub fn accepted_params(&self) -> &'static [&'static str] {
        match self {
            IndicatorKind::Ohlc
            | IndicatorKind::Vwap
            | IndicatorKind::Obv
            | IndicatorKind::Drawdown
            | IndicatorKind::Spread => &[],
            IndicatorKind::Sma
            | IndicatorKind::Ema
            | IndicatorKind::Donchian
            | IndicatorKind::Roc
            | IndicatorKind::AggressorImbalance => &["period"],
            IndicatorKind::Bollinger => &["period", "k"],
            IndicatorKind::BollingerBandwidth => &["period", "k", "lookback"],
            IndicatorKind::Rsi | IndicatorKind::Atr => &["period", "smoothing_kind"],
            IndicatorKind::Macd => &["fast", "slow", "signal"],
            IndicatorKind::Stochastic => &["period", "d_period"],
            IndicatorKind::Keltner => &["period", "k", "smoothing_kind"],
            IndicatorKind::RealizedVolatility => &["period", "periods_per_year"],
            IndicatorKind::VolumeProfile => &["period", "bins", "tick_size"],
            IndicatorKind::VolumeSpike => &["k"],
            IndicatorKind::L2Price => &["sizes"],
        }
    }
}

/// Validated parameters of one indicator instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSettings {
    Ohlc,
    Vwap,
    Sma { period: usize },
    Ema { period: usize },
    Bollinger { period: usize, k: f64 },
    BollingerBandwidth { period: usize, k: f64, lookback: usize },
    Rsi { period: usize, smoothing: SmoothingKind },
    Macd { fast: usize, slow: usize, signal: usize },
    Atr { period: usize, smoothing: SmoothingKind },
    Stochastic { period: usize, d_period: usize },
    Obv,
    Donchian { period: usize },
    Keltner { period: usize, k: f64, smoothing: SmoothingKind },
    Roc { period: usize },
    /// `periods_per_year` of `None` derives it from the bar resolution.
    RealizedVolatility { period: usize, periods_per_year: Option<f64> },
    Drawdown,
    /// `tick_size` of `None` selects dynamic binning.
    VolumeProfile { period: usize, bins: usize, tick_size: Option<Decimal> },
    VolumeSpike { k: f64 },
    AggressorImbalance { period: usize },
    Spread,
    L2Price { sizes: Vec<Decimal> },
}

impl IndicatorSettings {
    /// Apply defaults and validate the supplied parameters.
    pub fn from_params(
        name: &str,
        kind: IndicatorKind,
        params: &IndicatorParams,
    ) -> Result<Self, ConfigError> {
        let invalid = |parameter: &'static str, reason: &str| ConfigError::InvalidParameter {
            indicator: name.to_string(),
            parameter,
            reason: reason.to_string(),
        };
        let count = |parameter: &'static str, value: Option<usize>, default: usize| {
            let value = value.unwrap_or(default);
            if value == 0 {
                return Err(invalid(parameter, "must be at least 1"));
            }
            Ok(value)
        };
        let period = |default: usize| count("period", params.period, default);
        let k = |default: f64| {
            let value = params.k.unwrap_or(default);
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid("k", "must be a positive number"));
            }
            Ok(value)
        };
        let smoothing = params.smoothing_kind.unwrap_or(SmoothingKind::Wilder);

        let settings = match kind {
            IndicatorKind::Ohlc => IndicatorSettings::Ohlc,
            IndicatorKind::Vwap => IndicatorSettings::Vwap,
            IndicatorKind::Obv => IndicatorSettings::Obv,
            IndicatorKind::Drawdown => IndicatorSettings::Drawdown,
            IndicatorKind::Spread => IndicatorSettings::Spread,
            IndicatorKind::Sma => IndicatorSettings::Sma { period: period(20)? },
            IndicatorKind::Ema => IndicatorSettings::Ema { period: period(20)? },
            IndicatorKind::Bollinger => IndicatorSettings::Bollinger {
                period: period(20)?,
                k: k(2.0)?,
            },
            IndicatorKind::BollingerBandwidth => IndicatorSettings::BollingerBandwidth {
                period: period(20)?,
                k: k(2.0)?,
                lookback: count("lookback", params.lookback, 100)?,
            },
            IndicatorKind::Rsi => IndicatorSettings::Rsi {
                period: period(14)?,
                smoothing,
            },
            IndicatorKind::Macd => {
                let fast = count("fast", params.fast, 12)?;
                let slow = count("slow", params.slow, 26)?;
                if fast >= slow {
                    return Err(invalid("fast", "must be shorter than slow"));
                }
                IndicatorSettings::Macd {
                    fast,
                    slow,
                    signal: count("signal", params.signal, 9)?,
                }
            }
            IndicatorKind::Atr => IndicatorSettings::Atr {
                period: period(14)?,
                smoothing,
            },
            IndicatorKind::Stochastic => IndicatorSettings::Stochastic {
                period: period(14)?,
                d_period: count("d_period", params.d_period, 3)?,
            },
            IndicatorKind::Donchian => IndicatorSettings::Donchian { period: period(20)? },
            IndicatorKind::Keltner => IndicatorSettings::Keltner {
                period: period(20)?,
                k: k(2.0)?,
                smoothing,
            },
            IndicatorKind::Roc => IndicatorSettings::Roc { period: period(12)? },
            IndicatorKind::RealizedVolatility => {
                if let Some(ppy) = params.periods_per_year {
                    if !ppy.is_finite() || ppy <= 0.0 {
                        return Err(invalid("periods_per_year", "must be a positive number"));
                    }
                }
                IndicatorSettings::RealizedVolatility {
                    period: period(20)?,
                    periods_per_year: params.periods_per_year,
                }
            }
            IndicatorKind::VolumeProfile => {
                let bins = params.bins.unwrap_or(50);
                if bins < 2 {
                    return Err(invalid("bins", "must be at least 2"));
                }
                if let Some(tick) = params.tick_size {
                    if tick <= Decimal::ZERO {
                        return Err(invalid("tick_size", "must be positive"));
                    }
                }
                IndicatorSettings::VolumeProfile {
                    period: period(20)?,
                    bins,
                    tick_size: params.tick_size,
                }
            }
            IndicatorKind::VolumeSpike => IndicatorSettings::VolumeSpike { k: k(2.0)? },
            IndicatorKind::AggressorImbalance => {
                IndicatorSettings::AggressorImbalance { period: period(20)? }
            }
            IndicatorKind::L2Price => {
                let sizes = params.sizes.clone().unwrap_or_else(|| vec![Decimal::ONE]);
                if sizes.is_empty() {
                    return Err(invalid("sizes", "must list at least one size"));
                }
                if sizes.iter().any(|s| *s <= Decimal::ZERO) {
                    return Err(invalid("sizes", "every size must be positive"));
                }
                IndicatorSettings::L2Price {
                    sizes: sizes.into_iter().map(|s| s.normalize()).collect(),
                }
            }
        };
        Ok(settings)
    }

    pub fn kind(&self) -> IndicatorKind {
        match self {
            IndicatorSettings::Ohlc => IndicatorKind::Ohlc,
            IndicatorSettings::Vwap => IndicatorKind::Vwap,
            IndicatorSettings::Sma { .. } => IndicatorKind::Sma,
            IndicatorSettings::Ema { .. } => IndicatorKind::Ema,
            IndicatorSettings::Bollinger { .. } => IndicatorKind::Bollinger,
            IndicatorSettings::BollingerBandwidth { .. } => IndicatorKind::BollingerBandwidth,
            IndicatorSettings::Rsi { .. } => IndicatorKind::Rsi,
            IndicatorSettings::Macd { .. } => IndicatorKind::Macd,
            IndicatorSettings::Atr { .. } => IndicatorKind::Atr,
            IndicatorSettings::Stochastic { .. } => IndicatorKind::Stochastic,
            IndicatorSettings::Obv => IndicatorKind::Obv,
            IndicatorSettings::Donchian { .. } => IndicatorKind::Donchian,
            IndicatorSettings::Keltner { .. } => IndicatorKind::Keltner,
            IndicatorSettings::Roc { .. } => IndicatorKind::Roc,
            IndicatorSettings::RealizedVolatility { .. } => IndicatorKind::RealizedVolatility,
            IndicatorSettings::Drawdown => IndicatorKind::Drawdown,
            IndicatorSettings::VolumeProfile { .. } => IndicatorKind::VolumeProfile,
            IndicatorSettings::VolumeSpike { .. } => IndicatorKind::VolumeSpike,
            IndicatorSettings::AggressorImbalance { .. } => IndicatorKind::AggressorImbalance,
            IndicatorSettings::Spread => IndicatorKind::Spread,
            IndicatorSettings::L2Price { .. } => IndicatorKind::L2Price,
        }
    }
}

/// Why a point carries no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Fewer observations than the window requires.
    Warmup,
    /// Division by zero or an empty range.
    Degenerate,
    /// The book has no levels on a side the metric needs.
    EmptyBook,
}

/// One bin of a volume profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBin {
    pub price_low: f64,
    pub price_high: f64,
    pub volume: f64,
}

/// Average execution prices for one requested size. `None` when the book
/// side is too thin to fill it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionQuote {
    pub size: Decimal,
    /// Walking the asks
    pub buy: Option<Decimal>,
    /// Walking the bids
    pub sell: Option<Decimal>,
}

/// Output of one indicator at one timestamp.
///
/// `Undefined` is explicit so consumers can tell "no signal yet" from a
/// signal that is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorValue {
    Undefined {
        reason: UndefinedReason,
    },
    Scalar {
        value: f64,
    },
    Ohlc {
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    },
    Bands {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Bandwidth {
        bandwidth: f64,
        /// Position of the bandwidth within its lookback range, 0..=100
        normalized: Option<f64>,
    },
    Macd {
        macd: f64,
        signal: Option<f64>,
        histogram: Option<f64>,
    },
    Stochastic {
        k: f64,
        d: Option<f64>,
    },
    Drawdown {
        drawdown: f64,
        max_drawdown: f64,
    },
    Flag {
        value: bool,
    },
    Profile {
        bins: Vec<ProfileBin>,
    },
    Spread {
        absolute: Decimal,
        bps: f64,
    },
    Execution {
        quotes: Vec<ExecutionQuote>,
    },
}

impl IndicatorValue {
    pub fn warmup() -> Self {
        IndicatorValue::Undefined {
            reason: UndefinedReason::Warmup,
        }
    }

    pub fn degenerate() -> Self {
        IndicatorValue::Undefined {
            reason: UndefinedReason::Degenerate,
        }
    }

    /// A scalar, or `Degenerate` if the arithmetic produced NaN/inf.
    pub fn scalar(value: f64) -> Self {
        if value.is_finite() {
            IndicatorValue::Scalar { value }
        } else {
            Self::degenerate()
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, IndicatorValue::Undefined { .. })
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar { value } => Some(*value),
            _ => None,
        }
    }
}

/// One timestamped output value. Bar indicators are stamped with the
/// bar's bucket start, book indicators with the snapshot timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: i64,
    pub value: IndicatorValue,
}

/// Uniform capability of every bar-driven indicator state.
pub trait Indicator {
    /// Consume the next closed bar and produce this bar's value.
    fn update(&mut self, bar: &Bar) -> IndicatorValue;
}

/// Live state of one bar indicator instance at one resolution.
#[derive(Debug, Clone)]
pub enum IndicatorState {
    Ohlc(trend::OhlcSeries),
    Vwap(volume::Vwap),
    Sma(trend::Sma),
    Ema(trend::EmaSeries),
    Bollinger(volatility::Bollinger),
    BollingerBandwidth(volatility::BollingerBandwidth),
    Rsi(momentum::Rsi),
    Macd(trend::Macd),
    Atr(volatility::Atr),
    Stochastic(momentum::Stochastic),
    Obv(volume::Obv),
    Donchian(trend::Donchian),
    Keltner(volatility::Keltner),
    Roc(momentum::Roc),
    RealizedVolatility(volatility::RealizedVolatility),
    Drawdown(volatility::Drawdown),
    VolumeProfile(volume::VolumeProfile),
    VolumeSpike(volume::VolumeSpike),
    AggressorImbalance(volume::AggressorImbalance),
}

impl IndicatorState {
    /// Fresh state for a bar indicator; `None` for book-derived kinds.
    pub fn new(settings: &IndicatorSettings, resolution: Resolution) -> Option<Self> {
        let state = match settings {
            IndicatorSettings::Ohlc => IndicatorState::Ohlc(trend::OhlcSeries),
            IndicatorSettings::Vwap => IndicatorState::Vwap(volume::Vwap::default()),
            IndicatorSettings::Sma { period } => IndicatorState::Sma(trend::Sma::new(*period)),
            IndicatorSettings::Ema { period } => {
                IndicatorState::Ema(trend::EmaSeries::new(*period))
            }
            IndicatorSettings::Bollinger { period, k } => {
                IndicatorState::Bollinger(volatility::Bollinger::new(*period, *k))
            }
            IndicatorSettings::BollingerBandwidth { period, k, lookback } => {
                IndicatorState::BollingerBandwidth(volatility::BollingerBandwidth::new(
                    *period, *k, *lookback,
                ))
            }
            IndicatorSettings::Rsi { period, smoothing } => {
                IndicatorState::Rsi(momentum::Rsi::new(*period, *smoothing))
            }
            IndicatorSettings::Macd { fast, slow, signal } => {
                IndicatorState::Macd(trend::Macd::new(*fast, *slow, *signal))
            }
            IndicatorSettings::Atr { period, smoothing } => {
                IndicatorState::Atr(volatility::Atr::new(*period, *smoothing))
            }
            IndicatorSettings::Stochastic { period, d_period } => {
                IndicatorState::Stochastic(momentum::Stochastic::new(*period, *d_period))
            }
            IndicatorSettings::Obv => IndicatorState::Obv(volume::Obv::default()),
            IndicatorSettings::Donchian { period } => {
                IndicatorState::Donchian(trend::Donchian::new(*period))
            }
            IndicatorSettings::Keltner { period, k, smoothing } => {
                IndicatorState::Keltner(volatility::Keltner::new(*period, *k, *smoothing))
            }
            IndicatorSettings::Roc { period } => IndicatorState::Roc(momentum::Roc::new(*period)),
            IndicatorSettings::RealizedVolatility {
                period,
                periods_per_year,
            } => IndicatorState::RealizedVolatility(volatility::RealizedVolatility::new(
                *period,
                periods_per_year.unwrap_or_else(|| resolution.periods_per_year()),
            )),
            IndicatorSettings::Drawdown => IndicatorState::Drawdown(volatility::Drawdown::default()),
            IndicatorSettings::VolumeProfile {
                period,
                bins,
                tick_size,
            } => IndicatorState::VolumeProfile(volume::VolumeProfile::new(
                *period, *bins, *tick_size,
            )),
            IndicatorSettings::VolumeSpike { k } => {
                IndicatorState::VolumeSpike(volume::VolumeSpike::new(*k))
            }
            IndicatorSettings::AggressorImbalance { period } => {
                IndicatorState::AggressorImbalance(volume::AggressorImbalance::new(*period))
            }
            IndicatorSettings::Spread | IndicatorSettings::L2Price { .. } => return None,
        };
        Some(state)
    }

    fn as_indicator(&mut self) -> &mut dyn Indicator {
        match self {
            IndicatorState::Ohlc(s) => s,
            IndicatorState::Vwap(s) => s,
            IndicatorState::Sma(s) => s,
            IndicatorState::Ema(s) => s,
            IndicatorState::Bollinger(s) => s,
            IndicatorState::BollingerBandwidth(s) => s,
            IndicatorState::Rsi(s) => s,
            IndicatorState::Macd(s) => s,
            IndicatorState::Atr(s) => s,
            IndicatorState::Stochastic(s) => s,
            IndicatorState::Obv(s) => s,
            IndicatorState::Donchian(s) => s,
            IndicatorState::Keltner(s) => s,
            IndicatorState::Roc(s) => s,
            IndicatorState::RealizedVolatility(s) => s,
            IndicatorState::Drawdown(s) => s,
            IndicatorState::VolumeProfile(s) => s,
            IndicatorState::VolumeSpike(s) => s,
            IndicatorState::AggressorImbalance(s) => s,
        }
    }
}

impl Indicator for IndicatorState {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.as_indicator().update(bar)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in IndicatorKind::all() {
            assert_eq!(IndicatorKind::from_name(kind.name()), Some(*kind));
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
        assert_eq!(IndicatorKind::from_name("BB"), Some(IndicatorKind::Bollinger));
        assert_eq!(IndicatorKind::from_name("ichimoku"), None);
    }

    #[test]
    fn test_defaults_applied() {
        let settings =
            IndicatorSettings::from_params("macd", IndicatorKind::Macd, &IndicatorParams::default())
                .unwrap();
        assert_eq!(
            settings,
            IndicatorSettings::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            }
        );
        let settings =
            IndicatorSettings::from_params("atr", IndicatorKind::Atr, &IndicatorParams::default())
                .unwrap();
        assert_eq!(
            settings,
            IndicatorSettings::Atr {
                period: 14,
                smoothing: SmoothingKind::Wilder
            }
        );
    }

    #[test]
    fn test_macd_fast_must_be_shorter() {
        let params = IndicatorParams {
            fast: Some(30),
            ..IndicatorParams::default()
        };
        let err = IndicatorSettings::from_params("macd", IndicatorKind::Macd, &params).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { parameter: "fast", .. }));
    }

    #[test]
    fn test_l2_sizes_validated() {
        let params = IndicatorParams {
            sizes: Some(vec![Decimal::ONE, Decimal::ZERO]),
            ..IndicatorParams::default()
        };
        assert!(IndicatorSettings::from_params("l2_price", IndicatorKind::L2Price, &params).is_err());
    }

    #[test]
    fn test_book_kinds_have_no_bar_state() {
        let resolution: Resolution = "1m".parse().unwrap();
        assert!(IndicatorState::new(&IndicatorSettings::Spread, resolution).is_none());
        assert!(IndicatorState::new(&IndicatorSettings::Obv, resolution).is_some());
    }

    #[test]
    fn test_value_serialization() {
        let json = serde_json::to_string(&IndicatorValue::warmup()).unwrap();
        assert_eq!(json, r#"{"type":"undefined","reason":"warmup"}"#);
        let json = serde_json::to_string(&IndicatorValue::scalar(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"scalar","value":1.5}"#);
        assert_eq!(IndicatorValue::scalar(f64::NAN), IndicatorValue::degenerate());
    }
}
