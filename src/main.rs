use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use digit_consensus::config::{Config, FeedMode};
use digit_consensus::coordinator::{Coordinator, CoordinatorCommand, CoordinatorConfig};
use digit_consensus::deriv::ws::DerivWsClient;
use digit_consensus::event::{AppEvent, FeedCommand, WsConnectionStatus};
use digit_consensus::export::BotXmlExporter;
use digit_consensus::input::parse_command;
use digit_consensus::model::tick::Tick;
use digit_consensus::simulator::SimulatedFeed;

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure config/default.toml exists and DERIV_APP_ID is set for live mode");
            std::process::exit(1);
        }
    };

    // Log to file; stdout is reserved for the signal feed
    let log_file = std::fs::File::create("digit-consensus.log")?;
    let default_filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or(default_filter),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let symbols = config.feed.tradable_symbols();
    tracing::info!(
        symbols = ?symbols,
        mode = ?config.feed.mode,
        variant = ?config.features.variant,
        active_trading = config.engine.active_trading,
        "Starting digit-consensus"
    );

    // Channels
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(256);
    let (tick_tx, tick_rx) = mpsc::channel::<Tick>(1024);
    let (command_tx, command_rx) = mpsc::channel::<CoordinatorCommand>(16);
    let (feed_tx, feed_rx) = mpsc::channel::<FeedCommand>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed_handle = match config.feed.mode {
        FeedMode::Deriv => {
            let client =
                DerivWsClient::new(&config.feed.ws_base_url, &config.feed.app_id, symbols.clone())?;
            let feed_event_tx = event_tx.clone();
            let feed_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = client
                    .connect_and_run(tick_tx, feed_event_tx, feed_rx, feed_shutdown)
                    .await
                {
                    tracing::error!(error = %e, "Deriv feed failed");
                }
            })
        }
        FeedMode::Simulated => {
            let feed = SimulatedFeed::new(
                &symbols,
                config.feed.simulation_seed,
                Duration::from_millis(config.feed.simulation_interval_ms),
            );
            tokio::spawn(feed.run(tick_tx, feed_rx, shutdown_rx.clone()))
        }
    };

    let coordinator = Coordinator::with_symbols(CoordinatorConfig::from_config(&config), &symbols)
        .with_feed(feed_tx);
    let coordinator_handle =
        tokio::spawn(coordinator.run(tick_rx, command_rx, event_tx, shutdown_rx));

    // Operator commands, one per line on stdin
    tokio::spawn(read_commands(command_tx.clone(), shutdown_tx.subscribe()));

    let exporter = BotXmlExporter::new(config.export.stake, &config.export.currency);
    let export_dir = config.export.output_dir.clone();

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::SignalEmitted(signal) => {
                        match serde_json::to_string(&signal) {
                            Ok(line) => println!("{}", line),
                            Err(e) => tracing::warn!(error = %e, "Failed to serialize signal"),
                        }
                        if let Some(dir) = &export_dir {
                            match exporter.write_to_dir(dir, &signal) {
                                Ok(path) => tracing::info!(path = %path.display(), "Bot XML written"),
                                Err(e) => tracing::warn!(error = %e, "Bot XML export failed"),
                            }
                        }
                    }
                    AppEvent::AnalysisFailed { symbol, error } => {
                        tracing::warn!(symbol = %symbol, error = %error, "Analysis failed");
                    }
                    AppEvent::WsStatus(WsConnectionStatus::Reconnecting { attempt, delay_ms }) => {
                        tracing::info!(attempt, delay_ms, "Reconnecting to tick feed");
                    }
                    AppEvent::LongHorizon { symbol, window_len, top_digit, band } => {
                        tracing::info!(
                            symbol = %symbol,
                            window_len,
                            digit = top_digit.digit,
                            probability = top_digit.probability,
                            over2 = band.over2,
                            under7 = band.under7,
                            "Long-horizon prediction"
                        );
                    }
                    AppEvent::CrossVolatility(report) => {
                        tracing::debug!(volatilities = ?report.volatilities, "Cross-volatility update");
                    }
                    AppEvent::LogMessage(msg) => tracing::info!("{}", msg),
                    other => tracing::trace!(event = ?other, "Event"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    drop(command_tx);
    let _ = feed_handle.await;
    if let Ok(coordinator) = coordinator_handle.await {
        tracing::info!(signals = coordinator.signal_log().len(), "Coordinator stopped");
    }
    Ok(())
}

async fn read_commands(
    command_tx: mpsc::Sender<CoordinatorCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Some(command) => {
                            if command_tx.send(command).await.is_err() {
                                return;
                            }
                        }
                        None => tracing::warn!(line = %line.trim(), "Unrecognized command"),
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    return;
                }
            },
            _ = shutdown.changed() => return,
        }
    }
}
