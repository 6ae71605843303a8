use std::collections::BTreeMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};

use crate::event::FeedCommand;
use crate::model::tick::Tick;

const START_PRICE: f64 = 1_000.0;
const STEP: f64 = 0.5;

/// Seeded random-walk tick source for running without a live feed.
#[derive(Debug)]
pub struct SimulatedFeed {
    rng: StdRng,
    prices: BTreeMap<String, f64>,
    next_id: u64,
    clock_ms: u64,
    interval: Duration,
}

impl SimulatedFeed {
    pub fn new(symbols: &[String], seed: u64, interval: Duration) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            prices: symbols
                .iter()
                .map(|s| (s.clone(), START_PRICE))
                .collect(),
            next_id: 0,
            clock_ms: 0,
            interval,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.prices.keys().cloned().collect()
    }

    /// New symbols start their walk at the common start price.
    pub fn add_symbol(&mut self, symbol: &str) -> bool {
        if self.prices.contains_key(symbol) {
            return false;
        }
        self.prices.insert(symbol.to_string(), START_PRICE);
        true
    }

    pub fn remove_symbol(&mut self, symbol: &str) -> bool {
        self.prices.remove(symbol).is_some()
    }

    pub fn apply(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Subscribe(symbol) => {
                if self.add_symbol(&symbol) {
                    tracing::info!(symbol = %symbol, "Simulated feed added symbol");
                }
            }
            FeedCommand::Unsubscribe(symbol) => {
                if self.remove_symbol(&symbol) {
                    tracing::info!(symbol = %symbol, "Simulated feed removed symbol");
                }
            }
        }
    }

    /// Advances every symbol by one step, in symbol order.
    pub fn step(&mut self) -> Vec<Tick> {
        self.clock_ms += self.interval.as_millis() as u64;
        let mut ticks = Vec::with_capacity(self.prices.len());
        for (symbol, price) in self.prices.iter_mut() {
            let delta = self.rng.random_range(-STEP..=STEP);
            *price = ((*price + delta) * 100.0).round() / 100.0;
            self.next_id += 1;
            ticks.push(Tick::new(self.next_id, symbol, self.clock_ms, *price));
        }
        ticks
    }

    pub async fn run(
        mut self,
        tick_tx: mpsc::Sender<Tick>,
        mut feed_rx: mpsc::Receiver<FeedCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut timer = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    for tick in self.step() {
                        if tick_tx.send(tick).await.is_err() {
                            tracing::info!("Tick receiver dropped, simulated feed exiting");
                            return;
                        }
                    }
                }
                Some(command) = feed_rx.recv() => self.apply(command),
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_path() {
        let symbols = vec!["R_50".to_string(), "R_100".to_string()];
        let mut a = SimulatedFeed::new(&symbols, 42, Duration::from_millis(1000));
        let mut b = SimulatedFeed::new(&symbols, 42, Duration::from_millis(1000));
        for _ in 0..20 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn step_emits_one_tick_per_symbol_with_sequential_ids() {
        let symbols = vec!["R_50".to_string(), "R_100".to_string()];
        let mut feed = SimulatedFeed::new(&symbols, 1, Duration::from_millis(500));
        let ticks = feed.step();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].id, 1);
        assert_eq!(ticks[1].id, 2);
        assert_eq!(ticks[0].timestamp_ms, 500);
    }

    #[test]
    fn run_stops_when_receiver_drops() {
        let symbols = vec!["R_10".to_string()];
        let feed = SimulatedFeed::new(&symbols, 3, Duration::from_millis(1));
        let (tick_tx, mut tick_rx) = mpsc::channel(4);
        let (_feed_tx, feed_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio_test::block_on(async move {
            let handle = tokio::spawn(feed.run(tick_tx, feed_rx, shutdown_rx));
            let first = tick_rx.recv().await.unwrap();
            assert_eq!(first.symbol, "R_10");
            drop(tick_rx);
            handle.await.unwrap();
        });
    }

    #[test]
    fn added_symbol_joins_the_walk_and_removed_one_leaves() {
        let mut feed = SimulatedFeed::new(&["R_50".to_string()], 5, Duration::from_millis(10));
        feed.apply(FeedCommand::Subscribe("R_75".to_string()));
        assert!(!feed.add_symbol("R_75"));
        let ticks = feed.step();
        assert!(ticks.iter().any(|t| t.symbol == "R_75"));

        feed.apply(FeedCommand::Unsubscribe("R_50".to_string()));
        let ticks = feed.step();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "R_75");
    }

    #[test]
    fn subscribe_while_running_streams_new_symbol() {
        let feed = SimulatedFeed::new(&["R_50".to_string()], 11, Duration::from_millis(1));
        let (tick_tx, mut tick_rx) = mpsc::channel(64);
        let (feed_tx, feed_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio_test::block_on(async move {
            let handle = tokio::spawn(feed.run(tick_tx, feed_rx, shutdown_rx));
            feed_tx
                .send(FeedCommand::Subscribe("R_100".to_string()))
                .await
                .unwrap();
            let mut seen = false;
            for _ in 0..200 {
                let tick = tick_rx.recv().await.unwrap();
                if tick.symbol == "R_100" {
                    seen = true;
                    break;
                }
            }
            assert!(seen);
            drop(tick_rx);
            handle.await.unwrap();
        });
    }
}
