//! Engine configuration
//!
//! The recognized options are:
//! - `base_resolution`: bucket width of the base bar stream (`"1s"`)
//! - `cascade_resolutions`: coarser levels, strictly increasing, each a
//!   multiple of the level below it (`["1m", "5m", "1h"]`)
//! - `lateness_tolerance`: how far behind the newest tick an event may
//!   arrive and still revise a pending bar (`"0s"`)
//! - `indicator_params`: instance name → parameters
//! - `queue_capacity`, `history_limit`, `dedup_window`, `open_key_limit`:
//!   resource bounds
//!
//! [`EngineConfig`] is the raw, serde-facing form. [`EngineConfig::resolve`]
//! validates it into a [`ResolvedConfig`]; every failure is fatal at setup.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use types::resolution::{format_duration_nanos, parse_duration_nanos, Resolution};

use crate::indicators::{IndicatorKind, IndicatorSettings};
use crate::window::SmoothingKind;

/// Configuration failures. All of them abort engine construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {field}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("cascade resolutions must be strictly increasing: {coarser} does not exceed {finer}")]
    NonMonotonicCascade { finer: String, coarser: String },

    #[error("cascade resolution {coarser} is not a multiple of {finer}")]
    MisalignedCascade { finer: String, coarser: String },

    #[error("indicator {indicator:?}: unknown kind {kind:?}")]
    UnknownIndicatorKind { indicator: String, kind: String },

    #[error("indicator {indicator:?} ({kind}) does not accept parameter {parameter:?}")]
    UnsupportedParameter {
        indicator: String,
        kind: &'static str,
        parameter: &'static str,
    },

    #[error("indicator {indicator:?}: invalid {parameter}: {reason}")]
    InvalidParameter {
        indicator: String,
        parameter: &'static str,
        reason: String,
    },

    #[error("indicator names must not be empty")]
    EmptyIndicatorName,

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("failed to read configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Per-instance indicator parameters.
///
/// Only the fields relevant to the instance's kind may be set; anything
/// else is rejected by [`EngineConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorParams {
    /// Indicator kind; defaults to the instance name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<usize>,
    #[serde(alias = "smoothing", skip_serializing_if = "Option::is_none")]
    pub smoothing_kind: Option<SmoothingKind>,
    /// Band or spike multiplier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periods_per_year: Option<f64>,
    /// Requested execution sizes for L2 price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<Decimal>>,
}

impl IndicatorParams {
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period: usize) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_k(mut self, k: f64) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingKind) -> Self {
        self.smoothing_kind = Some(smoothing);
        self
    }

    /// Names of the parameters that are set, excluding `kind`.
    pub fn supplied(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let flags = [
            ("period", self.period.is_some()),
            ("smoothing_kind", self.smoothing_kind.is_some()),
            ("k", self.k.is_some()),
            ("fast", self.fast.is_some()),
            ("slow", self.slow.is_some()),
            ("signal", self.signal.is_some()),
            ("d_period", self.d_period.is_some()),
            ("lookback", self.lookback.is_some()),
            ("tick_size", self.tick_size.is_some()),
            ("bins", self.bins.is_some()),
            ("periods_per_year", self.periods_per_year.is_some()),
            ("sizes", self.sizes.is_some()),
        ];
        for (name, set) in flags {
            if set {
                names.push(name);
            }
        }
        names
    }
}

/// Raw engine configuration as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub base_resolution: String,
    #[serde(alias = "cascade")]
    pub cascade_resolutions: Vec<String>,
    pub lateness_tolerance: String,
    pub indicator_params: BTreeMap<String, IndicatorParams>,
    /// Per-symbol ingest queue bound
    pub queue_capacity: usize,
    /// Closed bars / points retained per series
    pub history_limit: usize,
    /// Dedup keys of already-closed buckets remembered per symbol
    pub dedup_window: usize,
    /// Upper bound on dedup keys held for open and pending buckets
    pub open_key_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_resolution: "1s".to_string(),
            cascade_resolutions: vec!["1m".to_string(), "5m".to_string(), "1h".to_string()],
            lateness_tolerance: "0s".to_string(),
            indicator_params: default_catalog(),
            queue_capacity: 10_000,
            history_limit: 5_000,
            dedup_window: 10_000,
            open_key_limit: 1_000_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Replace the indicator catalog.
    pub fn with_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = (S, IndicatorParams)>,
        S: Into<String>,
    {
        self.indicator_params = indicators
            .into_iter()
            .map(|(name, params)| (name.into(), params))
            .collect();
        self
    }

    pub fn with_lateness(mut self, tolerance: &str) -> Self {
        self.lateness_tolerance = tolerance.to_string();
        self
    }

    pub fn with_resolutions(mut self, base: &str, cascade: &[&str]) -> Self {
        self.base_resolution = base.to_string();
        self.cascade_resolutions = cascade.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve().map(|_| ())
    }

    /// Validate and resolve into the engine's working form.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let base_resolution = parse_resolution("base_resolution", &self.base_resolution)?;

        let mut cascade = Vec::with_capacity(self.cascade_resolutions.len());
        let mut finer = base_resolution;
        for raw in &self.cascade_resolutions {
            let coarser = parse_resolution("cascade_resolutions", raw)?;
            if coarser <= finer {
                return Err(ConfigError::NonMonotonicCascade {
                    finer: finer.to_string(),
                    coarser: coarser.to_string(),
                });
            }
            if !coarser.is_multiple_of(finer) {
                return Err(ConfigError::MisalignedCascade {
                    finer: finer.to_string(),
                    coarser: coarser.to_string(),
                });
            }
            cascade.push(coarser);
            finer = coarser;
        }

        let lateness_tolerance = parse_duration_nanos(&self.lateness_tolerance).map_err(|_| {
            ConfigError::InvalidDuration {
                field: "lateness_tolerance",
                value: self.lateness_tolerance.clone(),
            }
        })?;

        for (field, value) in [
            ("queue_capacity", self.queue_capacity),
            ("history_limit", self.history_limit),
            ("dedup_window", self.dedup_window),
            ("open_key_limit", self.open_key_limit),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(field));
            }
        }

        let mut bar_indicators = Vec::new();
        let mut book_indicators = Vec::new();
        for (name, params) in &self.indicator_params {
            let spec = IndicatorSpec::resolve(name, params)?;
            if spec.kind().is_book_derived() {
                book_indicators.push(spec);
            } else {
                bar_indicators.push(spec);
            }
        }

        info!(
            base_resolution = %base_resolution,
            cascade_levels = cascade.len(),
            lateness_tolerance = %format_duration_nanos(lateness_tolerance),
            bar_indicators = bar_indicators.len(),
            book_indicators = book_indicators.len(),
            "Engine configuration resolved"
        );

        Ok(ResolvedConfig {
            base_resolution,
            cascade,
            lateness_tolerance,
            bar_indicators,
            book_indicators,
            queue_capacity: self.queue_capacity,
            history_limit: self.history_limit,
            dedup_window: self.dedup_window,
            open_key_limit: self.open_key_limit,
        })
    }
}

fn parse_resolution(field: &'static str, raw: &str) -> Result<Resolution, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidDuration {
        field,
        value: raw.to_string(),
    })
}

/// The default indicator catalog: one instance of every kind, named after it.
pub fn default_catalog() -> BTreeMap<String, IndicatorParams> {
    IndicatorKind::all()
        .iter()
        .filter(|kind| !matches!(kind, IndicatorKind::Sma | IndicatorKind::Ema))
        .map(|kind| (kind.name().to_string(), IndicatorParams::default()))
        .collect()
}

/// A validated indicator instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSpec {
    pub name: String,
    pub settings: IndicatorSettings,
}

impl IndicatorSpec {
    pub fn resolve(name: &str, params: &IndicatorParams) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyIndicatorName);
        }
        let kind_name = params.kind.as_deref().unwrap_or(name);
        let kind = IndicatorKind::from_name(kind_name).ok_or_else(|| {
            ConfigError::UnknownIndicatorKind {
                indicator: name.to_string(),
                kind: kind_name.to_string(),
            }
        })?;

        let accepted = kind.accepted_params();
        if let Some(parameter) = params
            .supplied()
            .into_iter()
            .find(|p| !accepted.contains(p))
        {
            return Err(ConfigError::UnsupportedParameter {
                indicator: name.to_string(),
                kind: kind.name(),
                parameter,
            });
        }

        let settings = IndicatorSettings::from_params(name, kind, params)?;
        Ok(Self {
            name: name.to_string(),
            settings,
        })
    }

    pub fn kind(&self) -> IndicatorKind {
        self.settings.kind()
    }
}

/// Validated configuration shared by every partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub base_resolution: Resolution,
    /// Coarser levels, finest first
    pub cascade: Vec<Resolution>,
    /// Nanoseconds
    pub lateness_tolerance: i64,
    /// Instances computed from closed bars, at every resolution
    pub bar_indicators: Vec<IndicatorSpec>,
    /// Instances computed from book snapshots
    pub book_indicators: Vec<IndicatorSpec>,
    pub queue_capacity: usize,
    pub history_limit: usize,
    pub dedup_window: usize,
    pub open_key_limit: usize,
}

impl ResolvedConfig {
    /// Base resolution followed by the cascade, finest first.
    pub fn resolutions(&self) -> impl Iterator<Item = Resolution> + '_ {
        std::iter::once(self.base_resolution).chain(self.cascade.iter().copied())
    }

    pub fn has_resolution(&self, resolution: Resolution) -> bool {
        self.resolutions().any(|r| r == resolution)
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorSpec> {
        self.bar_indicators
            .iter()
            .chain(self.book_indicators.iter())
            .find(|spec| spec.name == name)
    }
}
