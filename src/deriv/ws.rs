use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;

use super::types::{DerivMessage, ForgetAllRequest, ForgetRequest, TicksSubscribeRequest};
use crate::error::AppError;
use crate::event::{AppEvent, FeedCommand, WsConnectionStatus};
use crate::model::tick::Tick;

/// Exponential backoff for reconnection.
struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            current: initial,
            initial,
            max,
            factor,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.factor).min(self.max.as_secs_f64()),
        );
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    tungstenite::Message,
>;

/// Subscribed symbols and, once the first tick arrived, their stream ids.
/// Survives reconnects.
#[derive(Debug, Default)]
struct Subscriptions {
    streams: BTreeMap<String, Option<String>>,
}

impl Subscriptions {
    fn new(symbols: &[String]) -> Self {
        Self {
            streams: symbols.iter().map(|s| (s.clone(), None)).collect(),
        }
    }

    fn contains(&self, symbol: &str) -> bool {
        self.streams.contains_key(symbol)
    }

    fn symbols(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    fn clear_ids(&mut self) {
        for id in self.streams.values_mut() {
            *id = None;
        }
    }

    fn record_id(&mut self, symbol: &str, id: Option<String>) {
        if let (Some(slot), Some(id)) = (self.streams.get_mut(symbol), id) {
            slot.get_or_insert(id);
        }
    }
}

/// Tick ingestor for the Deriv ticks stream. One socket carries every
/// subscribed symbol.
pub struct DerivWsClient {
    url: String,
    symbols: Vec<String>,
}

impl DerivWsClient {
    pub fn new(ws_base_url: &str, app_id: &str, symbols: Vec<String>) -> Result<Self> {
        let mut url = url::Url::parse(ws_base_url)
            .with_context(|| format!("invalid feed.ws_base_url '{}'", ws_base_url))?;
        url.query_pairs_mut().append_pair("app_id", app_id);
        Ok(Self {
            url: url.to_string(),
            symbols,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and run the WebSocket loop with automatic reconnection.
    /// Sends WsStatus events through `status_tx` and ticks through `tick_tx`;
    /// `feed_rx` adds and removes symbols while running.
    pub async fn connect_and_run(
        &self,
        tick_tx: mpsc::Sender<Tick>,
        status_tx: mpsc::Sender<AppEvent>,
        mut feed_rx: mpsc::Receiver<FeedCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut subscriptions = Subscriptions::new(&self.symbols);
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0);
        let mut attempt: u32 = 0;
        let mut next_id: u64 = 0;

        loop {
            attempt += 1;
            subscriptions.clear_ids();
            match self
                .connect_once(
                    &tick_tx,
                    &status_tx,
                    &mut feed_rx,
                    &mut subscriptions,
                    &mut shutdown,
                    &mut backoff,
                    &mut next_id,
                )
                .await
            {
                Ok(()) => {
                    // Clean shutdown requested
                    let _ = status_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Disconnected))
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Deriv stream dropped");
                    let _ = status_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Disconnected))
                        .await;
                    let _ = status_tx
                        .send(AppEvent::LogMessage(format!("WS error: {}", e)))
                        .await;

                    let delay = backoff.next_delay();
                    let _ = status_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Reconnecting {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        }))
                        .await;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown.changed() => {
                            let _ = status_tx
                                .send(AppEvent::LogMessage("Shutdown during reconnect".to_string()))
                                .await;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn connect_once(
        &self,
        tick_tx: &mpsc::Sender<Tick>,
        status_tx: &mpsc::Sender<AppEvent>,
        feed_rx: &mut mpsc::Receiver<FeedCommand>,
        subscriptions: &mut Subscriptions,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut ExponentialBackoff,
        next_id: &mut u64,
    ) -> Result<()> {
        let _ = status_tx
            .send(AppEvent::LogMessage(format!("Connecting to {}", self.url)))
            .await;

        let (ws_stream, _resp) = tokio_tungstenite::connect_async(&self.url)
            .await
            .context("WebSocket connect failed")?;

        let (mut write, mut read) = ws_stream.split();
        for symbol in subscriptions.symbols() {
            subscribe(&mut write, &symbol).await?;
        }

        // Send Connected AFTER the subscriptions went out
        backoff.reset();
        let _ = status_tx
            .send(AppEvent::WsStatus(WsConnectionStatus::Connected))
            .await;
        let _ = status_tx
            .send(AppEvent::LogMessage(format!(
                "Subscribed to {} symbol(s)",
                subscriptions.streams.len()
            )))
            .await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match serde_json::from_str::<DerivMessage>(&text) {
                                Ok(DerivMessage { error: Some(err), .. }) => {
                                    let e = AppError::DerivApi { code: err.code, message: err.message };
                                    tracing::warn!(error = %e, "Deriv API returned an error");
                                    let _ = status_tx.send(AppEvent::LogMessage(e.to_string())).await;
                                }
                                Ok(DerivMessage { tick: Some(t), .. }) => {
                                    if !subscriptions.contains(&t.symbol) {
                                        continue;
                                    }
                                    subscriptions.record_id(&t.symbol, t.id.clone());
                                    *next_id += 1;
                                    let tick = Tick::new(
                                        *next_id,
                                        &t.symbol,
                                        t.epoch.saturating_mul(1_000),
                                        t.quote,
                                    );
                                    if tick_tx.try_send(tick).is_err() {
                                        tracing::warn!("Tick channel full, dropping tick");
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::debug!(error = %e, "Failed to parse WS message");
                                }
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tokio-tungstenite handles pong automatically
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(AppError::WebSocket(format!("read error: {}", e)).into());
                        }
                        None => {
                            return Err(AppError::WebSocket("stream ended".to_string()).into());
                        }
                    }
                }
                Some(command) = feed_rx.recv() => {
                    apply_feed_command(&mut write, subscriptions, command).await?;
                }
                _ = shutdown.changed() => {
                    return Ok(());
                }
            }
        }
    }
}

async fn send_json<T: serde::Serialize>(write: &mut WsWrite, request: &T) -> Result<()> {
    let text = serde_json::to_string(request)?;
    write
        .send(tungstenite::Message::Text(text))
        .await
        .context("WebSocket send failed")
}

async fn subscribe(write: &mut WsWrite, symbol: &str) -> Result<()> {
    send_json(write, &TicksSubscribeRequest::new(symbol))
        .await
        .with_context(|| format!("failed to subscribe {}", symbol))
}

/// Forgets a single stream when its id is known; otherwise drops every tick
/// stream and resubscribes the remaining symbols.
async fn apply_feed_command(
    write: &mut WsWrite,
    subscriptions: &mut Subscriptions,
    command: FeedCommand,
) -> Result<()> {
    match command {
        FeedCommand::Subscribe(symbol) => {
            if subscriptions.contains(&symbol) {
                return Ok(());
            }
            subscriptions.streams.insert(symbol.clone(), None);
            subscribe(write, &symbol).await?;
            tracing::info!(symbol = %symbol, "Subscribed to tick stream");
        }
        FeedCommand::Unsubscribe(symbol) => {
            let Some(stream_id) = subscriptions.streams.remove(&symbol) else {
                return Ok(());
            };
            match stream_id {
                Some(id) => send_json(write, &ForgetRequest { forget: &id }).await?,
                None => {
                    send_json(write, &ForgetAllRequest::ticks()).await?;
                    subscriptions.clear_ids();
                    for remaining in subscriptions.symbols() {
                        subscribe(write, &remaining).await?;
                    }
                }
            }
            tracing::info!(symbol = %symbol, "Unsubscribed from tick stream");
        }
    }
    Ok(())
}
