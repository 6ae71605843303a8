use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::consensus::ConsensusConfig;
use crate::feature::{FeatureConfig, ModelVariant, RegimeThresholds, VolatilityCuts};
use crate::predictor::{ModelWeights, PredictorConfig, MAX_NOISE_AMPLITUDE};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub features: FeatureSettings,
    #[serde(default)]
    pub predictor: PredictorSettings,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    #[default]
    Deriv,
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub ws_base_url: String,
    #[serde(default)]
    pub app_id: String,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub mode: FeedMode,
    #[serde(default = "default_simulation_seed")]
    pub simulation_seed: u64,
    #[serde(default = "default_simulation_interval_ms")]
    pub simulation_interval_ms: u64,
}

fn default_simulation_seed() -> u64 {
    7
}

fn default_simulation_interval_ms() -> u64 {
    1_000
}

impl FeedConfig {
    pub fn tradable_symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sym in &self.symbols {
            let s = sym.trim().to_ascii_uppercase();
            if !s.is_empty() && !out.iter().any(|v| v == &s) {
                out.push(s);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub probability_threshold: f64,
    pub required_runs: u32,
    pub cycle_length: u32,
    pub analysis_interval_ms: u64,
    pub long_horizon_interval_ms: u64,
    pub cross_volatility_interval_ms: u64,
    pub tick_buffer_capacity: usize,
    pub signal_log_capacity: usize,
    pub active_trading: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 0.6,
            required_runs: 3,
            cycle_length: 4,
            analysis_interval_ms: 2_000,
            long_horizon_interval_ms: 10_000,
            cross_volatility_interval_ms: 5_000,
            tick_buffer_capacity: 100,
            signal_log_capacity: 50,
            active_trading: false,
        }
    }
}

impl EngineConfig {
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            probability_threshold: self.probability_threshold,
            required_runs: self.required_runs,
            cycle_length: self.cycle_length,
        }
    }
}

/// `[features]` section. Unset window parameters fall back to the variant's
/// defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub variant: ModelVariant,
    pub min_ticks: Option<usize>,
    pub window: Option<usize>,
    pub spike_multiplier: Option<f64>,
    pub delta_lookback: usize,
    pub min_correlation_points: usize,
    pub regime: RegimeThresholds,
    pub volatility_cuts: VolatilityCuts,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            min_ticks: None,
            window: None,
            spike_multiplier: None,
            delta_lookback: 10,
            min_correlation_points: 3,
            regime: RegimeThresholds::default(),
            volatility_cuts: VolatilityCuts::default(),
        }
    }
}

impl FeatureSettings {
    pub fn to_feature_config(&self) -> FeatureConfig {
        let base = FeatureConfig::for_variant(self.variant);
        FeatureConfig {
            variant: self.variant,
            min_ticks: self.min_ticks.unwrap_or(base.min_ticks),
            window: self.window.unwrap_or(base.window),
            spike_multiplier: self.spike_multiplier.unwrap_or(base.spike_multiplier),
            delta_lookback: self.delta_lookback,
            regime: self.regime,
            volatility_cuts: self.volatility_cuts,
            min_correlation_points: self.min_correlation_points,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    pub baseline_weights: ModelWeights,
    pub advanced_weights: ModelWeights,
    pub trend_gain: f64,
    pub sequence_gain: f64,
    pub band_trend_gain: f64,
    pub noise_amplitude: f64,
    pub noise_seed: Option<u64>,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        let base = PredictorConfig::default();
        Self {
            baseline_weights: ModelWeights::baseline(),
            advanced_weights: ModelWeights::advanced(),
            trend_gain: base.trend_gain,
            sequence_gain: base.sequence_gain,
            band_trend_gain: base.band_trend_gain,
            noise_amplitude: 0.0,
            noise_seed: None,
        }
    }
}

impl PredictorSettings {
    pub fn to_predictor_config(&self, variant: ModelVariant) -> PredictorConfig {
        let weights = match variant {
            ModelVariant::Baseline => self.baseline_weights,
            ModelVariant::Advanced => self.advanced_weights,
        };
        PredictorConfig {
            variant,
            weights,
            trend_gain: self.trend_gain,
            sequence_gain: self.sequence_gain,
            band_trend_gain: self.band_trend_gain,
            noise_amplitude: self.noise_amplitude,
            noise_seed: self.noise_seed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub stake: f64,
    pub currency: String,
    /// Directory for bot XML files of emitted signals; unset disables writing.
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            stake: 1.0,
            currency: "USD".to_string(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("DIGIT_CONSENSUS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_path(&config_path)?;

        if let Ok(app_id) = std::env::var("DERIV_APP_ID") {
            if !app_id.trim().is_empty() {
                config.feed.app_id = app_id.trim().to_string();
            }
        }
        if config.feed.mode == FeedMode::Deriv && config.feed.app_id.is_empty() {
            bail!("feed.app_id is empty and DERIV_APP_ID is not set");
        }

        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&config_str).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.tradable_symbols().is_empty() {
            bail!("feed.symbols must list at least one symbol");
        }

        let e = &self.engine;
        if !(0.0..=1.0).contains(&e.probability_threshold) {
            bail!(
                "engine.probability_threshold must be within [0, 1], got {}",
                e.probability_threshold
            );
        }
        if e.cycle_length == 0 {
            bail!("engine.cycle_length must be > 0");
        }
        if e.required_runs < 2 || e.required_runs > e.cycle_length {
            bail!(
                "engine.required_runs must be within [2, {}], got {}",
                e.cycle_length,
                e.required_runs
            );
        }
        if e.analysis_interval_ms == 0
            || e.long_horizon_interval_ms == 0
            || e.cross_volatility_interval_ms == 0
        {
            bail!("engine intervals must be > 0");
        }
        if e.tick_buffer_capacity == 0 || e.signal_log_capacity == 0 {
            bail!("engine capacities must be > 0");
        }

        let f = self.features.to_feature_config();
        if f.min_ticks < 2 {
            bail!("features.min_ticks must be >= 2, got {}", f.min_ticks);
        }
        if f.window < f.min_ticks {
            bail!(
                "features.window ({}) must be >= features.min_ticks ({})",
                f.window,
                f.min_ticks
            );
        }
        if f.min_ticks > e.tick_buffer_capacity {
            bail!(
                "features.min_ticks ({}) exceeds engine.tick_buffer_capacity ({})",
                f.min_ticks,
                e.tick_buffer_capacity
            );
        }
        if f.spike_multiplier <= 0.0 {
            bail!("features.spike_multiplier must be > 0");
        }
        if f.delta_lookback == 0 {
            bail!("features.delta_lookback must be > 0");
        }
        let cuts = f.volatility_cuts;
        if !(cuts.low < cuts.medium && cuts.medium < cuts.high) {
            bail!("features.volatility_cuts must be strictly increasing");
        }

        self.predictor
            .baseline_weights
            .validate()
            .map_err(|e| anyhow::anyhow!("predictor.baseline_weights: {}", e))?;
        self.predictor
            .advanced_weights
            .validate()
            .map_err(|e| anyhow::anyhow!("predictor.advanced_weights: {}", e))?;
        let noise = self.predictor.noise_amplitude;
        if !noise.is_finite() || !(0.0..=MAX_NOISE_AMPLITUDE).contains(&noise) {
            bail!(
                "predictor.noise_amplitude must be within [0, {}], got {}",
                MAX_NOISE_AMPLITUDE,
                noise
            );
        }

        if self.export.stake <= 0.0 {
            bail!("export.stake must be > 0");
        }
        Ok(())
    }
}
