use serde::{Deserialize, Serialize};

/// Extra per-digit diagnostics produced by the advanced model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitDetails {
    pub time_horizon_ticks: u32,
    pub volatility_impact: f64,
    pub trend_alignment: f64,
    pub sequence_pattern: f64,
    pub market_regime_alignment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitPrediction {
    pub digit: u8,
    /// Normalized across all ten digits.
    pub probability: f64,
    /// Clamped score before normalization, in `[0.01, 0.9]`.
    pub raw_score: f64,
    pub confidence: f64,
    pub details: Option<DigitDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverUnderAnalysis {
    pub over4: f64,
    pub under5: f64,
    pub volatility_adjusted: bool,
    pub trend_based: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPrediction {
    /// Mass over digits 3..=9.
    pub over2: f64,
    /// Mass over digits 0..=6.
    pub under7: f64,
    pub confidence: f64,
    pub analysis: Option<OverUnderAnalysis>,
}

/// Highest-probability digit; ties resolve to the lowest digit.
pub fn top_digit(predictions: &[DigitPrediction; 10]) -> DigitPrediction {
    let mut best = predictions[0];
    for p in predictions.iter().skip(1) {
        if p.probability > best.probability {
            best = *p;
        }
    }
    best
}
