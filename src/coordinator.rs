use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::consensus::{ConsensusConfig, ConsensusEngine};
use crate::event::{AppEvent, FeedCommand};
use crate::feature::{self, CrossPrices, FeatureConfig, FeatureExtractor, ModelVariant};
use crate::model::features::FeatureSnapshot;
use crate::model::signal::{SignalLog, SignalStatus, TradingSignal};
use crate::model::tick::{Tick, TickBuffer};
use crate::predictor::{DigitPredictor, PredictorConfig};

#[derive(Debug, Clone)]
pub enum CoordinatorCommand {
    Subscribe(String),
    /// Stops analysis for the symbol and releases its buffer.
    Unsubscribe(String),
    SetActiveTrading(bool),
    ForceGenerate(String),
    SetSignalStatus { id: String, status: SignalStatus },
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub feature: FeatureConfig,
    pub predictor: PredictorConfig,
    pub consensus: ConsensusConfig,
    pub tick_buffer_capacity: usize,
    pub signal_log_capacity: usize,
    pub active_trading: bool,
    pub analysis_interval: Duration,
    pub long_horizon_interval: Duration,
    pub cross_volatility_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            feature: FeatureConfig::default(),
            predictor: PredictorConfig::default(),
            consensus: ConsensusConfig::default(),
            tick_buffer_capacity: crate::model::tick::DEFAULT_TICK_BUFFER_CAPACITY,
            signal_log_capacity: crate::model::signal::DEFAULT_SIGNAL_LOG_CAPACITY,
            active_trading: false,
            analysis_interval: Duration::from_millis(2_000),
            long_horizon_interval: Duration::from_millis(10_000),
            cross_volatility_interval: Duration::from_millis(5_000),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &Config) -> Self {
        let feature = config.features.to_feature_config();
        let predictor = config.predictor.to_predictor_config(feature.variant);
        Self {
            feature,
            predictor,
            consensus: config.engine.consensus_config(),
            tick_buffer_capacity: config.engine.tick_buffer_capacity,
            signal_log_capacity: config.engine.signal_log_capacity,
            active_trading: config.engine.active_trading,
            analysis_interval: Duration::from_millis(config.engine.analysis_interval_ms),
            long_horizon_interval: Duration::from_millis(config.engine.long_horizon_interval_ms),
            cross_volatility_interval: Duration::from_millis(
                config.engine.cross_volatility_interval_ms,
            ),
        }
    }
}

#[derive(Debug)]
struct SymbolState {
    buffer: TickBuffer,
    engine: ConsensusEngine,
    last_snapshot: Option<FeatureSnapshot>,
}

/// Single owner of every tick buffer, consensus engine and the signal log.
/// Tick appends and analysis reads are serialized through this one value, so
/// a cycle always sees a consistent buffer.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    symbols: BTreeMap<String, SymbolState>,
    signal_log: SignalLog,
    active_trading: bool,
    feed_tx: Option<mpsc::Sender<FeedCommand>>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let signal_log = SignalLog::new(config.signal_log_capacity);
        let active_trading = config.active_trading;
        Self {
            config,
            symbols: BTreeMap::new(),
            signal_log,
            active_trading,
            feed_tx: None,
        }
    }

    /// Subscribe and unsubscribe commands are forwarded to the tick feed
    /// through `feed_tx`.
    pub fn with_feed(mut self, feed_tx: mpsc::Sender<FeedCommand>) -> Self {
        self.feed_tx = Some(feed_tx);
        self
    }

    pub fn with_symbols(config: CoordinatorConfig, symbols: &[String]) -> Self {
        let mut coordinator = Self::new(config);
        for symbol in symbols {
            coordinator.subscribe(symbol);
        }
        coordinator
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    pub fn is_active_trading(&self) -> bool {
        self.active_trading
    }

    pub fn signal_log(&self) -> &SignalLog {
        &self.signal_log
    }

    pub fn buffer(&self, symbol: &str) -> Option<&TickBuffer> {
        self.symbols.get(symbol).map(|s| &s.buffer)
    }

    pub fn engine(&self, symbol: &str) -> Option<&ConsensusEngine> {
        self.symbols.get(symbol).map(|s| &s.engine)
    }

    pub fn last_snapshot(&self, symbol: &str) -> Option<&FeatureSnapshot> {
        self.symbols
            .get(symbol)
            .and_then(|s| s.last_snapshot.as_ref())
    }

    pub fn subscribe(&mut self, symbol: &str) -> bool {
        if self.symbols.contains_key(symbol) {
            return false;
        }
        let mut engine = ConsensusEngine::new(
            self.config.consensus,
            FeatureExtractor::new(self.config.feature.clone()),
            DigitPredictor::new(self.config.predictor.clone()),
        );
        engine.set_active(self.active_trading);
        self.symbols.insert(
            symbol.to_string(),
            SymbolState {
                buffer: TickBuffer::new(self.config.tick_buffer_capacity),
                engine,
                last_snapshot: None,
            },
        );
        true
    }

    pub fn unsubscribe(&mut self, symbol: &str) -> bool {
        self.symbols.remove(symbol).is_some()
    }

    pub fn set_active_trading(&mut self, active: bool) {
        self.active_trading = active;
        for state in self.symbols.values_mut() {
            state.engine.set_active(active);
        }
    }

    /// Appends the tick to its symbol's buffer. Ticks for untracked symbols
    /// are dropped.
    pub fn ingest(&mut self, tick: Tick) -> bool {
        match self.symbols.get_mut(&tick.symbol) {
            Some(state) => {
                state.buffer.push(tick);
                true
            }
            None => false,
        }
    }

    fn cross_prices(&self, window: usize) -> CrossPrices {
        self.symbols
            .iter()
            .map(|(symbol, state)| (symbol.clone(), state.buffer.recent_prices(window)))
            .collect()
    }

    fn forward_to_feed(&self, command: FeedCommand) {
        let Some(feed_tx) = &self.feed_tx else {
            return;
        };
        if let Err(e) = feed_tx.try_send(command) {
            tracing::warn!(error = %e, "Feed command not delivered");
        }
    }

    fn record_signal(&mut self, signal: TradingSignal, events: &mut Vec<AppEvent>) {
        tracing::info!(
            id = %signal.id,
            symbol = %signal.symbol,
            signal_type = ?signal.signal_type,
            digit = ?signal.predicted_digit,
            band = ?signal.predicted_band,
            confidence = signal.confidence,
            runs = signal.runs,
            "Signal emitted"
        );
        self.signal_log.push(signal.clone());
        events.push(AppEvent::SignalEmitted(signal));
    }

    /// One consensus run for every tracked symbol.
    pub fn run_analysis_cycle(&mut self, now_ms: u64) -> Vec<AppEvent> {
        let cross = if self.config.feature.variant == ModelVariant::Advanced {
            self.cross_prices(self.config.feature.window)
        } else {
            CrossPrices::new()
        };

        let mut events = Vec::new();
        let mut emitted = Vec::new();
        for (symbol, state) in self.symbols.iter_mut() {
            let ticks = state.buffer.tail(state.buffer.len());
            match state.engine.on_cycle(&ticks, &cross, now_ms) {
                Ok(Some(report)) => {
                    tracing::debug!(
                        symbol = %symbol,
                        run_count = report.run_count,
                        top_digit = report.run.digit,
                        top_probability = report.run.digit_probability,
                        evaluation = ?report.evaluation,
                        "Analysis run complete"
                    );
                    state.last_snapshot = Some(report.snapshot.clone());
                    events.push(AppEvent::Features {
                        symbol: symbol.clone(),
                        snapshot: report.snapshot,
                    });
                    events.push(AppEvent::Predictions {
                        symbol: symbol.clone(),
                        digits: report.predictions.digits,
                        band: report.predictions.band,
                        run_count: report.run_count,
                    });
                    if let Some(signal) = report.signal {
                        emitted.push(signal);
                    }
                }
                Ok(None) => {
                    tracing::trace!(symbol = %symbol, len = ticks.len(), "Insufficient ticks");
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Analysis cycle skipped");
                    events.push(AppEvent::AnalysisFailed {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for signal in emitted {
            self.record_signal(signal, &mut events);
        }
        events
    }

    pub fn run_long_horizon(&mut self) -> Vec<AppEvent> {
        let cross = if self.config.feature.variant == ModelVariant::Advanced {
            self.cross_prices(self.config.tick_buffer_capacity)
        } else {
            CrossPrices::new()
        };

        let mut events = Vec::new();
        for (symbol, state) in self.symbols.iter_mut() {
            let ticks = state.buffer.tail(state.buffer.len());
            match state.engine.long_horizon(&ticks, &cross) {
                Ok(Some(report)) => events.push(AppEvent::LongHorizon {
                    symbol: symbol.clone(),
                    window_len: report.snapshot.window_len,
                    top_digit: report.top_digit,
                    band: report.band,
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Long-horizon prediction skipped");
                    events.push(AppEvent::AnalysisFailed {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        events
    }

    pub fn run_cross_volatility(&self) -> Vec<AppEvent> {
        let prices = self.cross_prices(self.config.feature.window);
        let report = feature::cross_volatility(&prices, self.config.feature.min_ticks);
        if report.volatilities.is_empty() {
            return Vec::new();
        }
        vec![AppEvent::CrossVolatility(report)]
    }

    pub fn apply(&mut self, command: CoordinatorCommand, now_ms: u64) -> Vec<AppEvent> {
        let mut events = Vec::new();
        match command {
            CoordinatorCommand::Subscribe(symbol) => {
                if self.subscribe(&symbol) {
                    self.forward_to_feed(FeedCommand::Subscribe(symbol.clone()));
                    events.push(AppEvent::LogMessage(format!("Subscribed {}", symbol)));
                }
            }
            CoordinatorCommand::Unsubscribe(symbol) => {
                if self.unsubscribe(&symbol) {
                    self.forward_to_feed(FeedCommand::Unsubscribe(symbol.clone()));
                    events.push(AppEvent::LogMessage(format!("Unsubscribed {}", symbol)));
                }
            }
            CoordinatorCommand::SetActiveTrading(active) => {
                self.set_active_trading(active);
                tracing::info!(active, "Active trading toggled");
                events.push(AppEvent::LogMessage(format!(
                    "Active trading {}",
                    if active { "ON" } else { "OFF" }
                )));
            }
            CoordinatorCommand::ForceGenerate(symbol) => {
                let forced = self
                    .symbols
                    .get(&symbol)
                    .and_then(|s| s.engine.force_generate(now_ms));
                match forced {
                    Some(signal) => self.record_signal(signal, &mut events),
                    None => events.push(AppEvent::LogMessage(format!(
                        "No prediction above threshold for {}",
                        symbol
                    ))),
                }
            }
            CoordinatorCommand::SetSignalStatus { id, status } => {
                if self.signal_log.update_status(&id, status) {
                    events.push(AppEvent::SignalStatusChanged { id, status });
                }
            }
        }
        events
    }

    /// Drives the three timers, tick intake and commands until shutdown or
    /// until the tick channel closes.
    pub async fn run(
        mut self,
        mut tick_rx: mpsc::Receiver<Tick>,
        mut command_rx: mpsc::Receiver<CoordinatorCommand>,
        event_tx: mpsc::Sender<AppEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut analysis = interval(self.config.analysis_interval);
        let mut long_horizon = interval(self.config.long_horizon_interval);
        let mut cross_volatility = interval(self.config.cross_volatility_interval);

        loop {
            let events = tokio::select! {
                tick = tick_rx.recv() => match tick {
                    Some(tick) => {
                        self.ingest(tick);
                        continue;
                    }
                    None => {
                        tracing::info!("Tick channel closed, coordinator exiting");
                        break;
                    }
                },
                Some(command) = command_rx.recv() => self.apply(command, now_ms()),
                _ = analysis.tick() => self.run_analysis_cycle(now_ms()),
                _ = long_horizon.tick() => self.run_long_horizon(),
                _ = cross_volatility.tick() => self.run_cross_volatility(),
                _ = shutdown.changed() => break,
            };
            for event in events {
                if event_tx.send(event).await.is_err() {
                    tracing::debug!("Event receiver dropped");
                }
            }
        }
        self
    }
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
