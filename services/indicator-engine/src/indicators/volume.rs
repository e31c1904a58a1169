//! Volume indicators: VWAP, OBV, volume profile, volume spike and
//! aggressor imbalance.
//!
//! VWAP and OBV are unbounded running totals from stream start and are
//! defined from the first bar. Profile and imbalance sum over up to the N
//! most recent bars.

use std::collections::{BTreeMap, VecDeque};

use rust_decimal::Decimal;
use types::numeric::to_f64;

use super::{Indicator, IndicatorValue, ProfileBin};
use crate::bars::Bar;
use crate::window::{RollingStats, RunningTotal};

/// Σ(typical_price · volume) / Σ volume since stream start.
#[derive(Debug, Clone, Default)]
pub struct Vwap {
    price_volume: RunningTotal,
    volume: RunningTotal,
}

impl Indicator for Vwap {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let volume = to_f64(bar.volume);
        self.price_volume.add(bar.typical_price() * volume);
        self.volume.add(volume);
        if self.volume.value() == 0.0 {
            return IndicatorValue::degenerate();
        }
        IndicatorValue::scalar(self.price_volume.value() / self.volume.value())
    }
}

/// On-balance volume: cumulative volume signed by the close-to-close move.
#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<Decimal>,
    total: RunningTotal,
}

impl Indicator for Obv {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let signed = match self.prev_close {
            Some(prev) if bar.close > prev => to_f64(bar.volume),
            Some(prev) if bar.close < prev => -to_f64(bar.volume),
            _ => 0.0,
        };
        self.prev_close = Some(bar.close);
        IndicatorValue::scalar(self.total.add(signed))
    }
}

/// Traded volume binned by price over the last N bars.
///
/// Each bar's volume is attributed to its typical price. With a tick size
/// the bins are fixed multiples of it; without one the observed price
/// range is split into `bins` buckets of width `range / (bins − 1)`.
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    window: VecDeque<(f64, f64)>,
    period: usize,
    bins: usize,
    tick_size: Option<f64>,
}

impl VolumeProfile {
    pub fn new(period: usize, bins: usize, tick_size: Option<Decimal>) -> Self {
        Self {
            window: VecDeque::with_capacity(period),
            period: period.max(1),
            bins: bins.max(2),
            tick_size: tick_size.map(to_f64),
        }
    }

    fn fixed_bins(&self, tick: f64) -> Vec<ProfileBin> {
        let mut by_index: BTreeMap<i64, f64> = BTreeMap::new();
        for &(price, volume) in &self.window {
            *by_index.entry((price / tick).floor() as i64).or_default() += volume;
        }
        by_index
            .into_iter()
            .map(|(index, volume)| ProfileBin {
                price_low: index as f64 * tick,
                price_high: (index + 1) as f64 * tick,
                volume,
            })
            .collect()
    }

    fn dynamic_bins(&self) -> Vec<ProfileBin> {
        let (min, max) = self
            .window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(p, _)| {
                (lo.min(p), hi.max(p))
            });
        let total: f64 = self.window.iter().map(|&(_, v)| v).sum();
        if max <= min {
            return vec![ProfileBin {
                price_low: min,
                price_high: max,
                volume: total,
            }];
        }

        let width = (max - min) / (self.bins - 1) as f64;
        let mut volumes = vec![0.0; self.bins];
        for &(price, volume) in &self.window {
            let index = (((price - min) / width).floor() as usize).min(self.bins - 1);
            volumes[index] += volume;
        }
        volumes
            .into_iter()
            .enumerate()
            .filter(|(_, volume)| *volume > 0.0)
            .map(|(index, volume)| {
                let price_low = min + index as f64 * width;
                ProfileBin {
                    price_low,
                    price_high: price_low + width,
                    volume,
                }
            })
            .collect()
    }
}

impl Indicator for VolumeProfile {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.window.push_back((bar.typical_price(), to_f64(bar.volume)));
        while self.window.len() > self.period {
            self.window.pop_front();
        }
        let total: f64 = self.window.iter().map(|&(_, v)| v).sum();
        if total <= 0.0 {
            return IndicatorValue::degenerate();
        }
        let bins = match self.tick_size {
            Some(tick) => self.fixed_bins(tick),
            None => self.dynamic_bins(),
        };
        IndicatorValue::Profile { bins }
    }
}

/// Flags a bar whose volume exceeds k times the previous bar's volume.
#[derive(Debug, Clone)]
pub struct VolumeSpike {
    prev_volume: Option<f64>,
    k: f64,
}

impl VolumeSpike {
    pub fn new(k: f64) -> Self {
        Self {
            prev_volume: None,
            k,
        }
    }
}

impl Indicator for VolumeSpike {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        let volume = to_f64(bar.volume);
        let spike = self
            .prev_volume
            .replace(volume)
            .is_some_and(|prev| volume > self.k * prev);
        IndicatorValue::Flag { value: spike }
    }
}

/// (buy − sell) / (buy + sell) · 100 over the last N bars, using the
/// aggressor side reported on each trade.
#[derive(Debug, Clone)]
pub struct AggressorImbalance {
    buys: RollingStats,
    sells: RollingStats,
}

impl AggressorImbalance {
    pub fn new(period: usize) -> Self {
        Self {
            buys: RollingStats::new(period),
            sells: RollingStats::new(period),
        }
    }
}

impl Indicator for AggressorImbalance {
    fn update(&mut self, bar: &Bar) -> IndicatorValue {
        self.buys.push(to_f64(bar.buy_volume));
        self.sells.push(to_f64(bar.sell_volume));
        let buy = self.buys.sum();
        let sell = self.sells.sum();
        if buy + sell <= 0.0 {
            return IndicatorValue::degenerate();
        }
        IndicatorValue::scalar((buy - sell) / (buy + sell) * 100.0)
    }
}
