use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::AnalysisError;
use crate::feature::ModelVariant;
use crate::model::features::{FeatureSnapshot, MarketRegime, VolatilityRegime};
use crate::model::prediction::{
    top_digit, BandPrediction, DigitDetails, DigitPrediction, OverUnderAnalysis,
};
use crate::model::signal::BandLabel;

pub const DIGIT_PROBABILITY_MIN: f64 = 0.01;
pub const DIGIT_PROBABILITY_MAX: f64 = 0.9;
pub const BAND_PROBABILITY_MIN: f64 = 0.1;
pub const BAND_PROBABILITY_MAX: f64 = 0.9;

/// Noise beyond this would swamp every probability clamp.
pub const MAX_NOISE_AMPLITUDE: f64 = 1.0;

const UNIFORM_DIGIT: f64 = 0.1;
const BAND_PRIOR: f64 = 0.7;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Blend weights of the additive digit-model terms. Must sum to 1 so that an
/// all-neutral snapshot reproduces the base frequency.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ModelWeights {
    pub frequency: f64,
    pub trend: f64,
    pub volatility: f64,
    pub regime: f64,
    pub sequence: f64,
}

impl ModelWeights {
    pub fn baseline() -> Self {
        Self {
            frequency: 0.4,
            trend: 0.3,
            volatility: 0.2,
            regime: 0.0,
            sequence: 0.1,
        }
    }

    pub fn advanced() -> Self {
        Self {
            frequency: 0.3,
            trend: 0.25,
            volatility: 0.2,
            regime: 0.15,
            sequence: 0.1,
        }
    }

    pub fn for_variant(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::Baseline => Self::baseline(),
            ModelVariant::Advanced => Self::advanced(),
        }
    }

    pub fn sum(&self) -> f64 {
        self.frequency + self.trend + self.volatility + self.regime + self.sequence
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [
            self.frequency,
            self.trend,
            self.volatility,
            self.regime,
            self.sequence,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("weights must be finite and non-negative".to_string());
        }
        if (self.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("weights must sum to 1, got {}", self.sum()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    pub variant: ModelVariant,
    pub weights: ModelWeights,
    pub trend_gain: f64,
    pub sequence_gain: f64,
    pub band_trend_gain: f64,
    /// Jitter amplitude; 0 disables noise.
    pub noise_amplitude: f64,
    /// Fixed seed for jitter. Without one, an enabled noise source is seeded
    /// from the OS.
    pub noise_seed: Option<u64>,
}

impl PredictorConfig {
    pub fn for_variant(variant: ModelVariant) -> Self {
        Self {
            variant,
            weights: ModelWeights::for_variant(variant),
            trend_gain: 0.1,
            sequence_gain: 0.2,
            band_trend_gain: 0.1,
            noise_amplitude: 0.0,
            noise_seed: None,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self::for_variant(ModelVariant::default())
    }
}

/// Optional uniform jitter injected into probabilities.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    amplitude: f64,
    seed: Option<u64>,
    rng: Option<StdRng>,
}

impl NoiseSource {
    pub fn disabled() -> Self {
        Self {
            amplitude: 0.0,
            seed: None,
            rng: None,
        }
    }

    /// Amplitudes that are not finite or not positive give a disabled source;
    /// larger ones are capped at [`MAX_NOISE_AMPLITUDE`].
    pub fn seeded(amplitude: f64, seed: u64) -> Self {
        let Some(amplitude) = usable_amplitude(amplitude) else {
            return Self::disabled();
        };
        Self {
            amplitude,
            seed: Some(seed),
            rng: Some(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_config(config: &PredictorConfig) -> Self {
        let Some(amplitude) = usable_amplitude(config.noise_amplitude) else {
            return Self::disabled();
        };
        match config.noise_seed {
            Some(seed) => Self::seeded(amplitude, seed),
            None => Self {
                amplitude,
                seed: None,
                rng: Some(StdRng::from_os_rng()),
            },
        }
    }

    /// Independent source with the same amplitude. Seeded sources derive the
    /// new seed from `stream`, so each stream stays reproducible on its own.
    pub fn split(&self, stream: u64) -> Self {
        match (self.rng.is_some(), self.seed) {
            (false, _) => Self::disabled(),
            (true, Some(seed)) => Self::seeded(self.amplitude, seed.wrapping_add(stream)),
            (true, None) => Self {
                amplitude: self.amplitude,
                seed: None,
                rng: Some(StdRng::from_os_rng()),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rng.is_some()
    }

    fn sample(&mut self) -> f64 {
        match self.rng.as_mut() {
            Some(rng) => rng.random_range(-self.amplitude..=self.amplitude),
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionSet {
    pub digits: [DigitPrediction; 10],
    pub band: BandPrediction,
}

impl PredictionSet {
    pub fn top_digit(&self) -> DigitPrediction {
        top_digit(&self.digits)
    }

    pub fn top_band(&self) -> (BandLabel, f64) {
        top_band(&self.band)
    }
}

/// `over2` wins ties.
pub fn top_band(band: &BandPrediction) -> (BandLabel, f64) {
    if band.over2 >= band.under7 {
        (BandLabel::Over2, band.over2)
    } else {
        (BandLabel::Under7, band.under7)
    }
}

/// Heuristic digit and band scoring over a [`FeatureSnapshot`]. Deterministic
/// unless a noise source is configured.
#[derive(Debug, Clone)]
pub struct DigitPredictor {
    config: PredictorConfig,
    noise: NoiseSource,
}

impl Default for DigitPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

impl DigitPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        let noise = NoiseSource::from_config(&config);
        Self { config, noise }
    }

    pub fn with_noise(config: PredictorConfig, noise: NoiseSource) -> Self {
        Self { config, noise }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Same model with an independent noise stream.
    pub fn split(&self, stream: u64) -> Self {
        Self {
            config: self.config.clone(),
            noise: self.noise.split(stream),
        }
    }

    /// Both models, with a finiteness check on every output.
    pub fn predict(&mut self, snapshot: &FeatureSnapshot) -> Result<PredictionSet, AnalysisError> {
        let digits = self.predict_digits(snapshot);
        if digits
            .iter()
            .any(|p| !p.probability.is_finite() || !p.confidence.is_finite())
        {
            return Err(AnalysisError::NonFinite("digit prediction"));
        }
        let band = self.predict_band(snapshot);
        if !band.over2.is_finite() || !band.under7.is_finite() || !band.confidence.is_finite() {
            return Err(AnalysisError::NonFinite("band prediction"));
        }
        Ok(PredictionSet { digits, band })
    }

    pub fn predict_digits(&mut self, snapshot: &FeatureSnapshot) -> [DigitPrediction; 10] {
        let w = self.config.weights;
        let saturated = saturated_momentum(snapshot);
        let direction = snapshot.trend_direction();
        let advanced = self.config.variant == ModelVariant::Advanced;

        let mut predictions = [DigitPrediction {
            digit: 0,
            probability: 0.0,
            raw_score: 0.0,
            confidence: 0.0,
            details: None,
        }; 10];

        for (d, prediction) in predictions.iter_mut().enumerate() {
            let freq = snapshot.digit_histogram[d];
            let bias = digit_bias(d);

            let trend_adj = self.config.trend_gain * saturated * bias;
            let volatility_adj = volatility_adjustment(snapshot.volatility_regime, freq);
            let regime_adj = regime_adjustment(snapshot.market_regime, direction, bias, freq);
            let sequence_pattern = snapshot.repeat_rate(d);
            let sequence_adj = self.config.sequence_gain * sequence_pattern;

            let blended = w.frequency * freq
                + w.trend * (freq + trend_adj)
                + w.volatility * (freq + volatility_adj)
                + w.regime * (freq + regime_adj)
                + w.sequence * (freq + sequence_adj)
                + self.noise.sample();
            let raw_score = clamp_or_floor(blended, DIGIT_PROBABILITY_MIN, DIGIT_PROBABILITY_MAX);

            let trend_alignment = direction * bias * snapshot.trend_strength;
            let confidence = digit_confidence(snapshot, trend_alignment);

            *prediction = DigitPrediction {
                digit: d as u8,
                probability: 0.0,
                raw_score,
                confidence,
                details: advanced.then(|| DigitDetails {
                    time_horizon_ticks: time_horizon_ticks(snapshot.market_regime),
                    volatility_impact: volatility_adj,
                    trend_alignment,
                    sequence_pattern,
                    market_regime_alignment: regime_adj,
                }),
            };
        }

        let total: f64 = predictions.iter().map(|p| p.raw_score).sum();
        for p in predictions.iter_mut() {
            p.probability = p.raw_score / total;
        }
        predictions
    }

    pub fn predict_band(&mut self, snapshot: &FeatureSnapshot) -> BandPrediction {
        let h = &snapshot.digit_histogram;
        let mut over2: f64 = h[3..=9].iter().sum();
        let mut under7: f64 = h[0..=6].iter().sum();

        let direction = snapshot.trend_direction();
        let mut shift = self.config.band_trend_gain * saturated_momentum(snapshot);
        if snapshot.market_regime == MarketRegime::Trending {
            shift += 0.05 * direction;
        }
        over2 += shift;
        under7 -= shift;

        let shrink = match snapshot.volatility_regime {
            VolatilityRegime::High => 0.3,
            VolatilityRegime::Extreme => 0.5,
            VolatilityRegime::Low | VolatilityRegime::Medium => 0.0,
        };
        over2 += (BAND_PRIOR - over2) * shrink;
        under7 += (BAND_PRIOR - under7) * shrink;

        over2 += self.noise.sample();
        under7 += self.noise.sample();

        let over2 = clamp_or_floor(over2, BAND_PROBABILITY_MIN, BAND_PROBABILITY_MAX);
        let under7 = clamp_or_floor(under7, BAND_PROBABILITY_MIN, BAND_PROBABILITY_MAX);

        let volatility_bonus = match snapshot.volatility_regime {
            VolatilityRegime::Low => 0.2,
            VolatilityRegime::Medium => 0.1,
            VolatilityRegime::High | VolatilityRegime::Extreme => 0.0,
        };
        let regime_bonus = if snapshot.market_regime == MarketRegime::Trending {
            0.15
        } else {
            0.0
        };
        let confidence =
            (0.3 + volatility_bonus + regime_bonus + 0.5 * (over2 - under7).abs()).clamp(0.0, 1.0);

        let analysis = (self.config.variant == ModelVariant::Advanced).then(|| OverUnderAnalysis {
            over4: h[5..=9].iter().sum(),
            under5: h[0..=4].iter().sum(),
            volatility_adjusted: shrink > 0.0,
            trend_based: shift.abs() > 0.01,
        });

        BandPrediction {
            over2,
            under7,
            confidence,
            analysis,
        }
    }
}

fn usable_amplitude(amplitude: f64) -> Option<f64> {
    (amplitude.is_finite() && amplitude > 0.0).then(|| amplitude.min(MAX_NOISE_AMPLITUDE))
}

/// Maps digits onto `[-1, 1]`: low digits negative, high digits positive.
fn digit_bias(digit: usize) -> f64 {
    (digit as f64 - 4.5) / 4.5
}

/// Momentum scaled by its noise level and squashed so extreme moves saturate.
fn saturated_momentum(snapshot: &FeatureSnapshot) -> f64 {
    let n = snapshot.last_deltas.len();
    if snapshot.std <= f64::EPSILON || n == 0 {
        return 0.0;
    }
    (snapshot.momentum / (snapshot.std * (n as f64).sqrt())).tanh()
}

fn volatility_adjustment(regime: VolatilityRegime, freq: f64) -> f64 {
    match regime {
        VolatilityRegime::Low => (freq - UNIFORM_DIGIT) * 0.5,
        VolatilityRegime::Medium => 0.0,
        VolatilityRegime::High => (UNIFORM_DIGIT - freq) * 0.3,
        VolatilityRegime::Extreme => (UNIFORM_DIGIT - freq) * 0.6,
    }
}

fn regime_adjustment(regime: MarketRegime, direction: f64, bias: f64, freq: f64) -> f64 {
    match regime {
        MarketRegime::Trending => 0.05 * direction * bias,
        MarketRegime::Ranging => (freq - UNIFORM_DIGIT) * 0.2,
        MarketRegime::Volatile => (UNIFORM_DIGIT - freq) * 0.3,
        MarketRegime::Calm => 0.0,
    }
}

fn digit_confidence(snapshot: &FeatureSnapshot, trend_alignment: f64) -> f64 {
    let volatility_bonus = match snapshot.volatility_regime {
        VolatilityRegime::Low => 0.2,
        VolatilityRegime::Medium => 0.1,
        VolatilityRegime::High => 0.0,
        VolatilityRegime::Extreme => -0.1,
    };
    let regime_bonus = match snapshot.market_regime {
        MarketRegime::Trending => 0.1,
        MarketRegime::Calm => 0.05,
        MarketRegime::Ranging => 0.0,
        MarketRegime::Volatile => -0.05,
    };
    let spike_penalty = if snapshot.spike_indicator { 0.15 } else { 0.0 };
    (0.3 + 0.3 * snapshot.trend_strength + volatility_bonus + regime_bonus - spike_penalty
        + 0.1 * trend_alignment.max(0.0))
    .clamp(0.0, 1.0)
}

fn time_horizon_ticks(regime: MarketRegime) -> u32 {
    match regime {
        MarketRegime::Trending => 5,
        MarketRegime::Volatile => 3,
        MarketRegime::Calm => 10,
        MarketRegime::Ranging => 7,
    }
}

/// Clamp that maps NaN to the lower bound instead of propagating it.
fn clamp_or_floor(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
