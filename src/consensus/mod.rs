use crate::error::AnalysisError;
use crate::feature::{CrossPrices, FeatureExtractor};
use crate::model::features::FeatureSnapshot;
use crate::model::prediction::{BandPrediction, DigitPrediction};
use crate::model::signal::{BandLabel, SignalOrigin, TradingSignal};
use crate::model::tick::Tick;
use crate::predictor::{DigitPredictor, PredictionSet};

const LONG_HORIZON_NOISE_STREAM: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusConfig {
    pub probability_threshold: f64,
    pub required_runs: u32,
    pub cycle_length: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 0.6,
            required_runs: 3,
            cycle_length: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusState {
    Idle,
    Accumulating { run_count: u32 },
    Evaluating,
}

/// Top outcome of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunResult {
    pub digit: u8,
    pub digit_probability: f64,
    /// `None` when the digit alone already cleared the threshold, so the run
    /// is not counted toward both outcome types.
    pub band: Option<BandLabel>,
    pub band_confidence: f64,
}

impl RunResult {
    pub fn from_predictions(predictions: &PredictionSet, probability_threshold: f64) -> Self {
        let top = predictions.top_digit();
        let band = if top.probability >= probability_threshold {
            None
        } else {
            Some(predictions.top_band().0)
        };
        Self {
            digit: top.digit,
            digit_probability: top.probability,
            band,
            band_confidence: predictions.band.confidence,
        }
    }
}

/// Vote counts over a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub digit_votes: [u32; 10],
    pub over2_votes: u32,
    pub under7_votes: u32,
    pub none_votes: u32,
}

impl VoteTally {
    pub fn from_runs(runs: &[RunResult]) -> Self {
        let mut tally = Self::default();
        for run in runs {
            tally.digit_votes[(run.digit % 10) as usize] += 1;
            match run.band {
                Some(BandLabel::Over2) => tally.over2_votes += 1,
                Some(BandLabel::Under7) => tally.under7_votes += 1,
                None => tally.none_votes += 1,
            }
        }
        tally
    }

    /// Most-voted digit; ties go to the lowest digit.
    pub fn winning_digit(&self) -> Option<(u8, u32)> {
        let mut best: Option<(u8, u32)> = None;
        for (digit, &votes) in self.digit_votes.iter().enumerate() {
            if votes == 0 {
                continue;
            }
            if best.map(|(_, v)| votes > v).unwrap_or(true) {
                best = Some((digit as u8, votes));
            }
        }
        best
    }

    /// Most-voted band label; ties resolve in the order over2, under7, none.
    pub fn winning_band(&self) -> (Option<BandLabel>, u32) {
        let mut best = (Some(BandLabel::Over2), self.over2_votes);
        if self.under7_votes > best.1 {
            best = (Some(BandLabel::Under7), self.under7_votes);
        }
        if self.none_votes > best.1 {
            best = (None, self.none_votes);
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Digit { digit: u8, votes: u32, probability: f64 },
    Band { band: BandLabel, votes: u32, confidence: f64 },
    NoConsensus,
}

/// Digit outcome first; the band outcome is only considered when the digit
/// condition fails.
pub fn evaluate(
    tally: &VoteTally,
    latest: &RunResult,
    config: &ConsensusConfig,
) -> Evaluation {
    if let Some((digit, votes)) = tally.winning_digit() {
        if votes >= config.required_runs && latest.digit_probability >= config.probability_threshold
        {
            return Evaluation::Digit {
                digit,
                votes,
                probability: latest.digit_probability,
            };
        }
    }

    let (band, votes) = tally.winning_band();
    match band {
        Some(band)
            if votes >= config.required_runs
                && latest.band_confidence >= config.probability_threshold =>
        {
            Evaluation::Band {
                band,
                votes,
                confidence: latest.band_confidence,
            }
        }
        _ => Evaluation::NoConsensus,
    }
}

/// Output of one analysis run, published whether or not a signal fired.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: FeatureSnapshot,
    pub predictions: PredictionSet,
    pub run: RunResult,
    /// Runs accumulated including this one.
    pub run_count: u32,
    /// Present when this run completed a cycle.
    pub evaluation: Option<Evaluation>,
    pub signal: Option<TradingSignal>,
}

#[derive(Debug, Clone)]
pub struct LongHorizonReport {
    pub snapshot: FeatureSnapshot,
    pub top_digit: DigitPrediction,
    pub band: BandPrediction,
}

#[derive(Debug, Clone)]
struct LatestCycle {
    snapshot: FeatureSnapshot,
    predictions: PredictionSet,
}

/// Accumulates the top outcome of repeated runs and emits a signal when a
/// full cycle agrees.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
    extractor: FeatureExtractor,
    predictor: DigitPredictor,
    /// Separate noise stream so long-horizon calls never shift consensus runs.
    long_horizon_predictor: DigitPredictor,
    runs: Vec<RunResult>,
    state: ConsensusState,
    active: bool,
    latest: Option<LatestCycle>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        extractor: FeatureExtractor,
        predictor: DigitPredictor,
    ) -> Self {
        let config = ConsensusConfig {
            cycle_length: config.cycle_length.max(1),
            ..config
        };
        let long_horizon_predictor = predictor.split(LONG_HORIZON_NOISE_STREAM);
        Self {
            config,
            extractor,
            predictor,
            long_horizon_predictor,
            runs: Vec::with_capacity(config.cycle_length as usize),
            state: ConsensusState::Idle,
            active: false,
            latest: None,
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn state(&self) -> ConsensusState {
        self.state
    }

    pub fn run_count(&self) -> u32 {
        self.runs.len() as u32
    }

    pub fn pending_runs(&self) -> &[RunResult] {
        &self.runs
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// While inactive, cycles still run and report but never carry a signal.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn latest_snapshot(&self) -> Option<&FeatureSnapshot> {
        self.latest.as_ref().map(|l| &l.snapshot)
    }

    pub fn latest_predictions(&self) -> Option<&PredictionSet> {
        self.latest.as_ref().map(|l| &l.predictions)
    }

    pub fn reset(&mut self) {
        self.runs.clear();
        self.state = ConsensusState::Idle;
    }

    /// One timer-driven run. `Ok(None)` while the buffer is too short; on
    /// error the accumulator is left as it was.
    pub fn on_cycle(
        &mut self,
        ticks: &[Tick],
        cross: &CrossPrices,
        now_ms: u64,
    ) -> Result<Option<CycleReport>, AnalysisError> {
        let Some(snapshot) = self.extractor.extract(ticks, cross)? else {
            return Ok(None);
        };
        let predictions = self.predictor.predict(&snapshot)?;

        let run = RunResult::from_predictions(&predictions, self.config.probability_threshold);
        self.runs.push(run);
        let run_count = self.runs.len() as u32;
        self.state = ConsensusState::Accumulating { run_count };
        self.latest = Some(LatestCycle {
            snapshot: snapshot.clone(),
            predictions,
        });

        let mut evaluation = None;
        let mut signal = None;
        if run_count >= self.config.cycle_length {
            self.state = ConsensusState::Evaluating;
            let tally = VoteTally::from_runs(&self.runs);
            let outcome = evaluate(&tally, &run, &self.config);
            if self.active {
                signal = signal_for(outcome, &snapshot, SignalOrigin::Consensus, now_ms);
            }
            evaluation = Some(outcome);
            self.reset();
        }

        Ok(Some(CycleReport {
            snapshot,
            predictions,
            run,
            run_count,
            evaluation,
            signal,
        }))
    }

    /// Manual trigger from the latest run alone, skipping the vote but still
    /// gated by the probability threshold. Leaves the accumulator untouched.
    pub fn force_generate(&self, now_ms: u64) -> Option<TradingSignal> {
        let latest = self.latest.as_ref()?;
        let threshold = self.config.probability_threshold;
        let top = latest.predictions.top_digit();
        let outcome = if top.probability >= threshold {
            Evaluation::Digit {
                digit: top.digit,
                votes: 1,
                probability: top.probability,
            }
        } else if latest.predictions.band.confidence >= threshold {
            Evaluation::Band {
                band: latest.predictions.top_band().0,
                votes: 1,
                confidence: latest.predictions.band.confidence,
            }
        } else {
            Evaluation::NoConsensus
        };
        signal_for(outcome, &latest.snapshot, SignalOrigin::Manual, now_ms)
    }

    /// Prediction over the whole buffer rather than the analysis window.
    /// Does not touch the accumulator.
    pub fn long_horizon(
        &mut self,
        ticks: &[Tick],
        cross: &CrossPrices,
    ) -> Result<Option<LongHorizonReport>, AnalysisError> {
        let extractor = self.extractor.with_window(ticks.len());
        let Some(snapshot) = extractor.extract(ticks, cross)? else {
            return Ok(None);
        };
        let predictions = self.long_horizon_predictor.predict(&snapshot)?;
        Ok(Some(LongHorizonReport {
            top_digit: predictions.top_digit(),
            band: predictions.band,
            snapshot,
        }))
    }
}

fn signal_for(
    outcome: Evaluation,
    snapshot: &FeatureSnapshot,
    origin: SignalOrigin,
    now_ms: u64,
) -> Option<TradingSignal> {
    match outcome {
        Evaluation::Digit {
            digit,
            votes,
            probability,
        } => Some(TradingSignal::exact_digit(
            &snapshot.symbol,
            digit,
            probability,
            votes,
            origin,
            snapshot.clone(),
            now_ms,
        )),
        Evaluation::Band {
            band,
            votes,
            confidence,
        } => Some(TradingSignal::over_under(
            &snapshot.symbol,
            band,
            confidence,
            votes,
            origin,
            snapshot.clone(),
            now_ms,
        )),
        Evaluation::NoConsensus => None,
    }
}
