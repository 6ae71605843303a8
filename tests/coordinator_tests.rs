mod common;

use std::time::Duration;

use digit_consensus::coordinator::{Coordinator, CoordinatorCommand, CoordinatorConfig};
use digit_consensus::event::{AppEvent, FeedCommand};
use digit_consensus::model::signal::{SignalOrigin, SignalStatus};
use digit_consensus::model::tick::Tick;
use tokio::sync::{mpsc, watch};

use common::{constant_digit_five, scripted_walk, slow_climb, ticks_from_prices};

fn coordinator(symbols: &[&str]) -> Coordinator {
    let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
    Coordinator::with_symbols(CoordinatorConfig::default(), &symbols)
}

fn feed(coordinator: &mut Coordinator, ticks: Vec<Tick>) {
    for tick in ticks {
        coordinator.ingest(tick);
    }
}

fn signals(events: &[AppEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, AppEvent::SignalEmitted(_)))
        .count()
}

#[test]
fn untracked_symbols_are_ignored() {
    let mut c = coordinator(&["R_50"]);
    assert!(!c.ingest(Tick::new(0, "R_75", 0, 10.0)));
    assert!(c.ingest(Tick::new(0, "R_50", 0, 10.0)));
    assert!(c.buffer("R_75").is_none());
    assert_eq!(c.buffer("R_50").unwrap().len(), 1);
}

#[test]
fn buffer_keeps_most_recent_hundred_ticks() {
    let mut c = coordinator(&["R_50"]);
    feed(&mut c, scripted_walk("R_50", 101));
    let buffer = c.buffer("R_50").unwrap();
    assert_eq!(buffer.len(), 100);
    assert_eq!(buffer.front().unwrap().id, 1);
    assert_eq!(buffer.back().unwrap().id, 100);
}

#[test]
fn every_run_publishes_features_and_predictions() {
    let mut c = coordinator(&["R_50"]);
    feed(&mut c, scripted_walk("R_50", 60));
    let events = c.run_analysis_cycle(0);
    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::Features { symbol, .. } if symbol == "R_50")));
    assert!(events.iter().any(|e| matches!(
        e,
        AppEvent::Predictions { run_count: 1, .. }
    )));
    assert!(c.last_snapshot("R_50").is_some());
}

#[test]
fn short_buffer_produces_no_events() {
    let mut c = coordinator(&["R_50"]);
    feed(&mut c, scripted_walk("R_50", 5));
    assert!(c.run_analysis_cycle(0).is_empty());
    assert_eq!(c.engine("R_50").unwrap().run_count(), 0);
}

#[test]
fn active_trading_gates_the_signal_log() {
    let mut inactive = coordinator(&["R_50"]);
    feed(&mut inactive, constant_digit_five("R_50", 40));
    let mut emitted = 0;
    for _ in 0..4 {
        emitted += signals(&inactive.run_analysis_cycle(0));
    }
    assert_eq!(emitted, 0);
    assert!(inactive.signal_log().is_empty());

    let mut active = coordinator(&["R_50"]);
    active.apply(CoordinatorCommand::SetActiveTrading(true), 0);
    assert!(active.is_active_trading());
    feed(&mut active, constant_digit_five("R_50", 40));
    let mut emitted = 0;
    for _ in 0..4 {
        emitted += signals(&active.run_analysis_cycle(7));
    }
    assert_eq!(emitted, 1);
    let latest = active.signal_log().latest().unwrap();
    assert_eq!(latest.predicted_digit, Some(5));
    assert_eq!(latest.timestamp_ms, 7);
}

#[test]
fn subscribe_after_activation_inherits_flag() {
    let mut c = coordinator(&[]);
    c.set_active_trading(true);
    c.apply(CoordinatorCommand::Subscribe("R_10".to_string()), 0);
    assert!(c.engine("R_10").unwrap().is_active());
}

#[test]
fn unsubscribe_releases_buffer() {
    let mut c = coordinator(&["R_50", "R_100"]);
    feed(&mut c, scripted_walk("R_50", 30));
    let events = c.apply(CoordinatorCommand::Unsubscribe("R_50".to_string()), 0);
    assert_eq!(events.len(), 1);
    assert!(c.buffer("R_50").is_none());
    assert_eq!(c.symbols(), vec!["R_100".to_string()]);
    assert!(!c.ingest(Tick::new(1, "R_50", 0, 10.0)));
}

#[test]
fn manual_generation_and_status_updates() {
    let mut c = coordinator(&["R_50"]);
    feed(&mut c, constant_digit_five("R_50", 40));

    let events = c.apply(CoordinatorCommand::ForceGenerate("R_50".to_string()), 0);
    assert!(matches!(events.as_slice(), [AppEvent::LogMessage(_)]));

    c.run_analysis_cycle(0);
    let events = c.apply(CoordinatorCommand::ForceGenerate("R_50".to_string()), 5);
    assert_eq!(signals(&events), 1);
    let signal = c.signal_log().latest().unwrap().clone();
    assert_eq!(signal.origin, SignalOrigin::Manual);
    assert_eq!(c.engine("R_50").unwrap().run_count(), 1);

    let events = c.apply(
        CoordinatorCommand::SetSignalStatus {
            id: signal.id.clone(),
            status: SignalStatus::Won,
        },
        0,
    );
    assert!(matches!(
        events.as_slice(),
        [AppEvent::SignalStatusChanged { status: SignalStatus::Won, .. }]
    ));
    assert_eq!(c.signal_log().get(&signal.id).unwrap().status, SignalStatus::Won);

    let events = c.apply(
        CoordinatorCommand::SetSignalStatus {
            id: "sig-missing".to_string(),
            status: SignalStatus::Lost,
        },
        0,
    );
    assert!(events.is_empty());
}

#[test]
fn degenerate_buffer_reports_failure_and_keeps_others_running() {
    let mut c = coordinator(&["R_50", "ZERO"]);
    feed(&mut c, scripted_walk("R_50", 40));
    feed(&mut c, ticks_from_prices("ZERO", &[0.0; 40]));

    let events = c.run_analysis_cycle(0);
    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::AnalysisFailed { symbol, .. } if symbol == "ZERO")));
    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::Features { symbol, .. } if symbol == "R_50")));
    assert_eq!(c.engine("ZERO").unwrap().run_count(), 0);
    assert_eq!(c.engine("R_50").unwrap().run_count(), 1);
}

#[test]
fn cross_volatility_covers_every_populated_symbol() {
    let mut c = coordinator(&["R_50", "R_100", "R_10"]);
    feed(&mut c, scripted_walk("R_50", 60));
    feed(&mut c, slow_climb("R_100", 60));
    feed(&mut c, scripted_walk("R_10", 3));

    let events = c.run_cross_volatility();
    let [AppEvent::CrossVolatility(report)] = events.as_slice() else {
        panic!("expected one cross-volatility event, got {:?}", events);
    };
    assert_eq!(report.volatilities.len(), 2);
    assert!(!report.volatilities.contains_key("R_10"));
    assert_eq!(report.correlations.len(), 1);
}

#[test]
fn long_horizon_uses_the_whole_buffer() {
    let mut c = coordinator(&["R_50"]);
    feed(&mut c, scripted_walk("R_50", 90));
    let events = c.run_long_horizon();
    assert!(matches!(
        events.as_slice(),
        [AppEvent::LongHorizon { window_len: 90, .. }]
    ));
    assert_eq!(c.engine("R_50").unwrap().run_count(), 0);
}

#[tokio::test]
async fn run_loop_ingests_until_tick_channel_closes() {
    let config = CoordinatorConfig {
        analysis_interval: Duration::from_secs(3_600),
        long_horizon_interval: Duration::from_secs(3_600),
        cross_volatility_interval: Duration::from_secs(3_600),
        ..CoordinatorConfig::default()
    };
    let c = Coordinator::with_symbols(config, &["R_50".to_string()]);

    let (tick_tx, tick_rx) = mpsc::channel(64);
    let (_command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, _event_rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(c.run(tick_rx, command_rx, event_tx, shutdown_rx));
    for tick in scripted_walk("R_50", 12) {
        tick_tx.send(tick).await.unwrap();
    }
    drop(tick_tx);

    let c = handle.await.unwrap();
    assert_eq!(c.buffer("R_50").unwrap().len(), 12);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let c = Coordinator::with_symbols(CoordinatorConfig::default(), &["R_50".to_string()]);
    let (_tick_tx, tick_rx) = mpsc::channel::<Tick>(8);
    let (_command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, _event_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(c.run(tick_rx, command_rx, event_tx, shutdown_rx));
    shutdown_tx.send(true).unwrap();
    let c = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(c.buffer("R_50").unwrap().is_empty());
}

#[test]
fn subscription_changes_reach_the_feed() {
    let (feed_tx, mut feed_rx) = mpsc::channel(8);
    let mut c = coordinator(&["R_50"]).with_feed(feed_tx);

    c.apply(CoordinatorCommand::Subscribe("R_75".to_string()), 0);
    c.apply(CoordinatorCommand::Subscribe("R_75".to_string()), 0);
    c.apply(CoordinatorCommand::Unsubscribe("R_50".to_string()), 0);
    c.apply(CoordinatorCommand::Unsubscribe("R_10".to_string()), 0);

    assert_eq!(
        feed_rx.try_recv().unwrap(),
        FeedCommand::Subscribe("R_75".to_string())
    );
    assert_eq!(
        feed_rx.try_recv().unwrap(),
        FeedCommand::Unsubscribe("R_50".to_string())
    );
    assert!(feed_rx.try_recv().is_err());
}
