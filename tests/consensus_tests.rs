mod common;

use digit_consensus::consensus::{
    evaluate, ConsensusConfig, ConsensusEngine, ConsensusState, Evaluation, RunResult, VoteTally,
};
use digit_consensus::error::AnalysisError;
use digit_consensus::feature::{CrossPrices, FeatureConfig, FeatureExtractor, ModelVariant};
use digit_consensus::model::signal::{BandLabel, SignalOrigin, SignalStatus, SignalType};
use digit_consensus::predictor::{DigitPredictor, NoiseSource, PredictorConfig};

use common::{constant_digit_five, scripted_walk, slow_climb, ticks_from_prices};

fn engine(threshold: f64, active: bool) -> ConsensusEngine {
    let config = ConsensusConfig {
        probability_threshold: threshold,
        required_runs: 3,
        cycle_length: 4,
    };
    let mut engine = ConsensusEngine::new(
        config,
        FeatureExtractor::new(FeatureConfig::for_variant(ModelVariant::Advanced)),
        DigitPredictor::new(PredictorConfig::for_variant(ModelVariant::Advanced)),
    );
    engine.set_active(active);
    engine
}

fn run(digit: u8, probability: f64, band: Option<BandLabel>, band_confidence: f64) -> RunResult {
    RunResult {
        digit,
        digit_probability: probability,
        band,
        band_confidence,
    }
}

#[test]
fn digit_ties_go_to_lowest_digit() {
    let runs = [
        run(7, 0.3, None, 0.5),
        run(2, 0.3, None, 0.5),
        run(7, 0.3, None, 0.5),
        run(2, 0.3, None, 0.5),
    ];
    let tally = VoteTally::from_runs(&runs);
    assert_eq!(tally.winning_digit(), Some((2, 2)));
    assert_eq!(VoteTally::default().winning_digit(), None);
}

#[test]
fn band_ties_prefer_over2_then_under7() {
    let runs = [
        run(1, 0.2, Some(BandLabel::Under7), 0.5),
        run(1, 0.2, Some(BandLabel::Over2), 0.5),
        run(1, 0.2, None, 0.5),
    ];
    let tally = VoteTally::from_runs(&runs);
    assert_eq!(tally.winning_band(), (Some(BandLabel::Over2), 1));

    let runs = [
        run(1, 0.2, Some(BandLabel::Under7), 0.5),
        run(1, 0.2, None, 0.5),
    ];
    assert_eq!(
        VoteTally::from_runs(&runs).winning_band(),
        (Some(BandLabel::Under7), 1)
    );
}

#[test]
fn digit_outcome_takes_priority_over_band() {
    let config = ConsensusConfig {
        probability_threshold: 0.6,
        required_runs: 3,
        cycle_length: 4,
    };
    let runs = [
        run(5, 0.7, Some(BandLabel::Over2), 0.9),
        run(5, 0.7, Some(BandLabel::Over2), 0.9),
        run(5, 0.7, Some(BandLabel::Over2), 0.9),
        run(3, 0.7, Some(BandLabel::Over2), 0.9),
    ];
    let tally = VoteTally::from_runs(&runs);

    let latest = run(3, 0.7, Some(BandLabel::Over2), 0.9);
    assert!(matches!(
        evaluate(&tally, &latest, &config),
        Evaluation::Digit { digit: 5, votes: 3, .. }
    ));

    // Latest run below the threshold: the digit vote fails, the band vote holds.
    let weak = run(3, 0.4, Some(BandLabel::Over2), 0.9);
    assert!(matches!(
        evaluate(&tally, &weak, &config),
        Evaluation::Band { band: BandLabel::Over2, votes: 4, .. }
    ));

    let unsure = run(3, 0.4, Some(BandLabel::Over2), 0.5);
    assert_eq!(evaluate(&tally, &unsure, &config), Evaluation::NoConsensus);
}

#[test]
fn none_votes_never_produce_a_band_signal() {
    let config = ConsensusConfig::default();
    let runs = [run(1, 0.2, None, 0.9); 4];
    let tally = VoteTally::from_runs(&runs);
    assert_eq!(tally.none_votes, 4);
    assert_eq!(
        evaluate(&tally, &runs[3], &config),
        Evaluation::NoConsensus
    );
}

#[test]
fn four_agreeing_runs_emit_one_digit_signal() {
    let mut engine = engine(0.75, true);
    let ticks = constant_digit_five("R_50", 40);
    let cross = CrossPrices::new();

    for expected in 1..=3u32 {
        let report = engine.on_cycle(&ticks, &cross, 1_000).unwrap().unwrap();
        assert_eq!(report.run_count, expected);
        assert!(report.evaluation.is_none());
        assert!(report.signal.is_none());
        assert_eq!(report.run.digit, 5);
        assert_eq!(report.run.band, None);
        assert_eq!(
            engine.state(),
            ConsensusState::Accumulating { run_count: expected }
        );
    }

    let report = engine.on_cycle(&ticks, &cross, 2_000).unwrap().unwrap();
    assert_eq!(report.run_count, 4);
    let signal = report.signal.expect("fourth run should signal");
    assert_eq!(signal.signal_type, SignalType::ExactDigit);
    assert_eq!(signal.predicted_digit, Some(5));
    assert_eq!(signal.predicted_band, None);
    assert_eq!(signal.runs, 4);
    assert_eq!(signal.origin, SignalOrigin::Consensus);
    assert_eq!(signal.status, SignalStatus::Pending);
    assert_eq!(signal.timestamp_ms, 2_000);
    assert!(signal.confidence > 0.9);

    assert_eq!(engine.run_count(), 0);
    assert_eq!(engine.state(), ConsensusState::Idle);
}

#[test]
fn inactive_engine_evaluates_without_signalling() {
    let mut engine = engine(0.75, false);
    let ticks = constant_digit_five("R_50", 40);
    let cross = CrossPrices::new();

    let mut last = None;
    for _ in 0..4 {
        last = engine.on_cycle(&ticks, &cross, 0).unwrap();
    }
    let report = last.unwrap();
    assert!(matches!(
        report.evaluation,
        Some(Evaluation::Digit { digit: 5, votes: 4, .. })
    ));
    assert!(report.signal.is_none());
    assert_eq!(engine.run_count(), 0);
}

#[test]
fn low_threshold_can_never_fire_below_required_runs() {
    let mut engine = ConsensusEngine::new(
        ConsensusConfig {
            probability_threshold: 0.0,
            required_runs: 3,
            cycle_length: 2,
        },
        FeatureExtractor::new(FeatureConfig::for_variant(ModelVariant::Advanced)),
        DigitPredictor::default(),
    );
    engine.set_active(true);
    let ticks = constant_digit_five("R_50", 40);
    engine.on_cycle(&ticks, &CrossPrices::new(), 0).unwrap();
    let report = engine.on_cycle(&ticks, &CrossPrices::new(), 0).unwrap().unwrap();
    assert_eq!(report.evaluation, Some(Evaluation::NoConsensus));
    assert!(report.signal.is_none());
}

#[test]
fn steady_climb_emits_under7_band_signal() {
    let mut engine = engine(0.75, true);
    let ticks = slow_climb("R_100", 50);
    let cross = CrossPrices::new();

    let mut signal = None;
    for _ in 0..4 {
        let report = engine.on_cycle(&ticks, &cross, 0).unwrap().unwrap();
        assert_eq!(report.run.band, Some(BandLabel::Under7));
        signal = report.signal;
    }
    let signal = signal.expect("band consensus");
    assert_eq!(signal.signal_type, SignalType::OverUnder);
    assert_eq!(signal.predicted_band, Some(BandLabel::Under7));
    assert_eq!(signal.predicted_digit, None);
    assert!(signal.confidence >= 0.75);
}

#[test]
fn short_buffer_is_insufficient_data() {
    let mut engine = engine(0.6, true);
    let ticks = scripted_walk("R_50", 5);
    assert!(engine.on_cycle(&ticks, &CrossPrices::new(), 0).unwrap().is_none());
    assert_eq!(engine.run_count(), 0);
    assert_eq!(engine.state(), ConsensusState::Idle);
    assert!(engine.latest_snapshot().is_none());
}

#[test]
fn failed_cycle_leaves_accumulator_untouched() {
    let mut engine = engine(0.75, true);
    let cross = CrossPrices::new();
    engine
        .on_cycle(&constant_digit_five("R_50", 40), &cross, 0)
        .unwrap();
    assert_eq!(engine.run_count(), 1);

    let zeros = ticks_from_prices("R_50", &[0.0; 40]);
    let err = engine.on_cycle(&zeros, &cross, 0).unwrap_err();
    assert!(matches!(err, AnalysisError::DegenerateSnapshot(_)));
    assert_eq!(engine.run_count(), 1);
    assert_eq!(engine.state(), ConsensusState::Accumulating { run_count: 1 });
}

#[test]
fn force_generate_uses_latest_run_only() {
    let mut engine = engine(0.75, false);
    assert!(engine.force_generate(0).is_none());

    engine
        .on_cycle(&constant_digit_five("R_50", 40), &CrossPrices::new(), 0)
        .unwrap();
    let signal = engine.force_generate(42).expect("manual signal");
    assert_eq!(signal.origin, SignalOrigin::Manual);
    assert_eq!(signal.predicted_digit, Some(5));
    assert_eq!(signal.runs, 1);
    assert_eq!(signal.timestamp_ms, 42);
    assert_eq!(engine.run_count(), 1);
}

#[test]
fn force_generate_respects_threshold() {
    let mut engine = engine(0.99, true);
    engine
        .on_cycle(&scripted_walk("R_50", 100), &CrossPrices::new(), 0)
        .unwrap();
    assert!(engine.force_generate(0).is_none());
}

#[test]
fn long_horizon_reads_whole_buffer() {
    let mut engine = engine(0.6, true);
    let ticks = scripted_walk("R_50", 100);
    let report = engine
        .long_horizon(&ticks, &CrossPrices::new())
        .unwrap()
        .unwrap();
    assert_eq!(report.snapshot.window_len, 100);
    assert_eq!(engine.run_count(), 0);
}

#[test]
fn identical_ticks_give_identical_predictions() {
    let ticks = scripted_walk("R_50", 80);
    let cross = CrossPrices::new();
    let mut a = engine(0.6, false);
    let mut b = engine(0.6, false);
    let ra = a.on_cycle(&ticks, &cross, 0).unwrap().unwrap();
    let rb = b.on_cycle(&ticks, &cross, 0).unwrap().unwrap();
    assert_eq!(ra.predictions, rb.predictions);
    assert_eq!(ra.snapshot, rb.snapshot);
    assert_eq!(ra.run, rb.run);
}

#[test]
fn each_completed_cycle_emits_exactly_once() {
    let mut engine = engine(0.75, true);
    let ticks = constant_digit_five("R_50", 40);
    let cross = CrossPrices::new();

    let mut emitted = Vec::new();
    for run in 1..=8u32 {
        let report = engine.on_cycle(&ticks, &cross, run as u64).unwrap().unwrap();
        if run % 4 == 0 {
            assert!(report.signal.is_some(), "run {} should signal", run);
            assert_eq!(engine.run_count(), 0);
            assert_eq!(engine.state(), ConsensusState::Idle);
        } else {
            assert!(report.signal.is_none(), "run {} should not signal", run);
            assert_eq!(engine.run_count(), run % 4);
        }
        emitted.extend(report.signal);
    }
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].timestamp_ms, 4);
    assert_eq!(emitted[1].timestamp_ms, 8);
    assert_ne!(emitted[0].id, emitted[1].id);
}

fn noisy_engine(seed: u64) -> ConsensusEngine {
    let config = PredictorConfig::for_variant(ModelVariant::Advanced);
    ConsensusEngine::new(
        ConsensusConfig::default(),
        FeatureExtractor::new(FeatureConfig::for_variant(ModelVariant::Advanced)),
        DigitPredictor::with_noise(config, NoiseSource::seeded(0.05, seed)),
    )
}

#[test]
fn long_horizon_calls_do_not_shift_seeded_consensus_runs() {
    let ticks = scripted_walk("R_50", 100);
    let cross = CrossPrices::new();

    let mut plain = noisy_engine(99);
    let mut interleaved = noisy_engine(99);

    for _ in 0..3 {
        let expected = plain.on_cycle(&ticks, &cross, 0).unwrap().unwrap();
        interleaved.long_horizon(&ticks, &cross).unwrap();
        let actual = interleaved.on_cycle(&ticks, &cross, 0).unwrap().unwrap();
        assert_eq!(expected.predictions, actual.predictions);
        assert_eq!(expected.run, actual.run);
    }
}
