use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::indicator::stats;
use crate::model::features::{FeatureSnapshot, MarketRegime, VolatilityRegime};
use crate::model::tick::Tick;

/// Recent prices of other tracked symbols, oldest first.
pub type CrossPrices = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Baseline,
    #[default]
    Advanced,
}

/// Ordered ladder for [`MarketRegime`]: trending, then volatile, then calm,
/// otherwise ranging.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub trending_strength: f64,
    pub trending_max_sign_changes: usize,
    pub volatile_ratio: f64,
    pub calm_ratio: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trending_strength: 0.6,
            trending_max_sign_changes: 3,
            volatile_ratio: 0.001,
            calm_ratio: 0.0005,
        }
    }
}

/// Upper bounds (exclusive) for low, medium and high volatility.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolatilityCuts {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for VolatilityCuts {
    fn default() -> Self {
        Self {
            low: 0.0005,
            medium: 0.001,
            high: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub variant: ModelVariant,
    pub min_ticks: usize,
    pub window: usize,
    pub spike_multiplier: f64,
    pub delta_lookback: usize,
    pub regime: RegimeThresholds,
    pub volatility_cuts: VolatilityCuts,
    pub min_correlation_points: usize,
}

impl FeatureConfig {
    pub fn for_variant(variant: ModelVariant) -> Self {
        let (min_ticks, window, spike_multiplier) = match variant {
            ModelVariant::Baseline => (10, 30, 2.0),
            ModelVariant::Advanced => (20, 50, 2.5),
        };
        Self {
            variant,
            min_ticks,
            window,
            spike_multiplier,
            delta_lookback: 10,
            regime: RegimeThresholds::default(),
            volatility_cuts: VolatilityCuts::default(),
            min_correlation_points: 3,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::for_variant(ModelVariant::default())
    }
}

pub fn classify_market_regime(
    trend_strength: f64,
    sign_changes: usize,
    volatility: f64,
    thresholds: &RegimeThresholds,
) -> MarketRegime {
    if trend_strength >= thresholds.trending_strength
        && sign_changes <= thresholds.trending_max_sign_changes
    {
        MarketRegime::Trending
    } else if volatility >= thresholds.volatile_ratio {
        MarketRegime::Volatile
    } else if volatility < thresholds.calm_ratio {
        MarketRegime::Calm
    } else {
        MarketRegime::Ranging
    }
}

pub fn classify_volatility_regime(volatility: f64, cuts: &VolatilityCuts) -> VolatilityRegime {
    if volatility < cuts.low {
        VolatilityRegime::Low
    } else if volatility < cuts.medium {
        VolatilityRegime::Medium
    } else if volatility < cuts.high {
        VolatilityRegime::High
    } else {
        VolatilityRegime::Extreme
    }
}

/// Pure window statistics over one symbol's recent ticks.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Same thresholds, different trailing window.
    pub fn with_window(&self, window: usize) -> Self {
        let mut config = self.config.clone();
        config.window = window.max(1);
        Self { config }
    }

    /// Returns `Ok(None)` while the buffer is shorter than the minimum length.
    pub fn extract(
        &self,
        ticks: &[Tick],
        cross: &CrossPrices,
    ) -> Result<Option<FeatureSnapshot>, AnalysisError> {
        if ticks.is_empty() || ticks.len() < self.config.min_ticks {
            return Ok(None);
        }

        let start = ticks.len().saturating_sub(self.config.window.max(1));
        let window = &ticks[start..];
        let symbol = window
            .last()
            .map(|t| t.symbol.clone())
            .unwrap_or_default();

        let prices: Vec<f64> = window.iter().map(|t| t.price).collect();
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(AnalysisError::DegenerateSnapshot(format!(
                "{}: non-finite price in window",
                symbol
            )));
        }

        let mean = stats::mean(&prices).ok_or(AnalysisError::NonFinite("mean"))?;
        if mean.abs() <= f64::EPSILON {
            return Err(AnalysisError::DegenerateSnapshot(format!(
                "{}: mean price is zero",
                symbol
            )));
        }
        let std = stats::population_std(&prices).ok_or(AnalysisError::NonFinite("std"))?;
        let volatility = std / mean.abs();
        if !std.is_finite() || !volatility.is_finite() {
            return Err(AnalysisError::DegenerateSnapshot(format!(
                "{}: volatility is undefined",
                symbol
            )));
        }

        let all_deltas = stats::deltas(&prices);
        let lookback_start = all_deltas
            .len()
            .saturating_sub(self.config.delta_lookback.max(1));
        let last_deltas = all_deltas[lookback_start..].to_vec();

        let sign_changes = stats::sign_changes(&last_deltas);
        let average_velocity = stats::mean_abs(&all_deltas);
        let spike_indicator = all_deltas
            .last()
            .map(|d| d.abs() > std * self.config.spike_multiplier)
            .unwrap_or(false);

        let momentum: f64 = last_deltas.iter().sum();
        let price_acceleration = match last_deltas.as_slice() {
            [.., prev, last] => last - prev,
            _ => 0.0,
        };
        let trend_strength = stats::efficiency_ratio(&last_deltas);

        let market_regime = classify_market_regime(
            trend_strength,
            sign_changes,
            volatility,
            &self.config.regime,
        );
        let volatility_regime =
            classify_volatility_regime(volatility, &self.config.volatility_cuts);

        let mut digit_histogram = [0.0; 10];
        for tick in window {
            digit_histogram[(tick.last_digit % 10) as usize] += 1.0;
        }
        let n = window.len() as f64;
        for freq in digit_histogram.iter_mut() {
            *freq /= n;
        }

        let mut digit_repeats = [0u32; 10];
        for pair in window.windows(2) {
            if pair[0].last_digit == pair[1].last_digit {
                digit_repeats[(pair[1].last_digit % 10) as usize] += 1;
            }
        }

        let mut cross_correlation = BTreeMap::new();
        if self.config.variant == ModelVariant::Advanced {
            for (other, other_prices) in cross {
                if *other == symbol {
                    continue;
                }
                if let Some(r) = stats::tail_aligned_pearson(
                    &prices,
                    other_prices,
                    self.config.min_correlation_points,
                ) {
                    cross_correlation.insert(other.clone(), r);
                }
            }
        }

        Ok(Some(FeatureSnapshot {
            symbol,
            window_len: window.len(),
            mean,
            std,
            last_deltas,
            sign_changes,
            digit_histogram,
            average_velocity,
            spike_indicator,
            volatility,
            momentum,
            price_acceleration,
            trend_strength,
            market_regime,
            volatility_regime,
            digit_repeats,
            cross_correlation,
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossVolatilityReport {
    /// `std / |mean|` per symbol.
    pub volatilities: BTreeMap<String, f64>,
    /// Pairwise Pearson correlation, each pair listed once in symbol order.
    pub correlations: Vec<(String, String, f64)>,
}

/// Volatility ratio per symbol and pairwise price correlation across symbols.
/// Symbols with fewer than `min_points` prices or a zero mean are skipped.
pub fn cross_volatility(prices: &CrossPrices, min_points: usize) -> CrossVolatilityReport {
    let eligible: Vec<(&String, &Vec<f64>)> = prices
        .iter()
        .filter(|(_, p)| p.len() >= min_points.max(2))
        .collect();

    let mut report = CrossVolatilityReport::default();
    for (symbol, series) in &eligible {
        let (Some(mean), Some(std)) = (stats::mean(series), stats::population_std(series)) else {
            continue;
        };
        if mean.abs() <= f64::EPSILON {
            continue;
        }
        let ratio = std / mean.abs();
        if ratio.is_finite() {
            report.volatilities.insert((*symbol).clone(), ratio);
        }
    }

    for (i, (a, pa)) in eligible.iter().enumerate() {
        for (b, pb) in eligible.iter().skip(i + 1) {
            if let Some(r) = stats::tail_aligned_pearson(pa, pb, min_points) {
                report.correlations.push(((*a).clone(), (*b).clone(), r));
            }
        }
    }
    report
}
