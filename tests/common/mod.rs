#![allow(dead_code)]

use std::collections::BTreeMap;

use digit_consensus::model::features::{FeatureSnapshot, MarketRegime, VolatilityRegime};
use digit_consensus::model::tick::Tick;

pub fn ticks_from_prices(symbol: &str, prices: &[f64]) -> Vec<Tick> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| Tick::new(i as u64, symbol, 1_000 * i as u64, *p))
        .collect()
}

/// Flat series whose trailing digit is always 5.
pub fn constant_digit_five(symbol: &str, n: usize) -> Vec<Tick> {
    ticks_from_prices(symbol, &vec![100.55; n])
}

/// Slow steady climb: low volatility, trending, digits 0..=4 only.
pub fn slow_climb(symbol: &str, n: usize) -> Vec<Tick> {
    let prices: Vec<f64> = (0..n).map(|i| 1_000.0 + i as f64 * 0.01).collect();
    ticks_from_prices(symbol, &prices)
}

/// Deterministic zig-zag with a drift, touching every digit.
pub fn scripted_walk(symbol: &str, n: usize) -> Vec<Tick> {
    let prices: Vec<f64> = (0..n)
        .map(|i| {
            let wiggle = [0.0, 0.37, -0.21, 0.58, -0.44, 0.13, 0.91, -0.66][i % 8];
            500.0 + i as f64 * 0.05 + wiggle
        })
        .collect();
    ticks_from_prices(symbol, &prices)
}

/// Snapshot with no trend, medium volatility and a calm regime.
pub fn neutral_snapshot(histogram: [f64; 10]) -> FeatureSnapshot {
    FeatureSnapshot {
        symbol: "R_50".to_string(),
        window_len: 50,
        mean: 1_000.0,
        std: 0.7,
        last_deltas: vec![0.0; 10],
        sign_changes: 0,
        digit_histogram: histogram,
        average_velocity: 0.0,
        spike_indicator: false,
        volatility: 0.0007,
        momentum: 0.0,
        price_acceleration: 0.0,
        trend_strength: 0.0,
        market_regime: MarketRegime::Calm,
        volatility_regime: VolatilityRegime::Medium,
        digit_repeats: [0; 10],
        cross_correlation: BTreeMap::new(),
    }
}
