use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Calm,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trending => "trending",
            Self::Ranging => "ranging",
            Self::Volatile => "volatile",
            Self::Calm => "calm",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
    Extreme,
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extreme => "extreme",
        };
        f.write_str(label)
    }
}

/// Statistics derived from the trailing window of one symbol's tick buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub symbol: String,
    /// Number of ticks the statistics were computed over.
    pub window_len: usize,
    pub mean: f64,
    /// Population standard deviation of price.
    pub std: f64,
    pub last_deltas: Vec<f64>,
    pub sign_changes: usize,
    /// Empirical frequency of each trailing digit; sums to 1.
    pub digit_histogram: [f64; 10],
    pub average_velocity: f64,
    pub spike_indicator: bool,
    /// `std / |mean|`.
    pub volatility: f64,
    pub momentum: f64,
    pub price_acceleration: f64,
    pub trend_strength: f64,
    pub market_regime: MarketRegime,
    pub volatility_regime: VolatilityRegime,
    /// Per digit, how many times it appeared in two consecutive ticks.
    pub digit_repeats: [u32; 10],
    pub cross_correlation: BTreeMap<String, f64>,
}

impl FeatureSnapshot {
    pub fn repeated_digits(&self) -> Vec<u8> {
        self.digit_repeats
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(digit, _)| digit as u8)
            .collect()
    }

    /// Share of consecutive pairs in the window where `digit` repeated.
    pub fn repeat_rate(&self, digit: usize) -> f64 {
        let pairs = self.window_len.saturating_sub(1);
        if pairs == 0 || digit > 9 {
            return 0.0;
        }
        self.digit_repeats[digit] as f64 / pairs as f64
    }

    /// -1, 0 or 1 following the sign of momentum.
    pub fn trend_direction(&self) -> f64 {
        if self.momentum > 0.0 {
            1.0
        } else if self.momentum < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}
