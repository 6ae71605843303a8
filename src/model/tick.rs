use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_BUFFER_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub id: u64,
    pub symbol: String,
    pub timestamp_ms: u64,
    pub price: f64,
    pub last_digit: u8,
}

impl Tick {
    pub fn new(id: u64, symbol: &str, timestamp_ms: u64, price: f64) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            timestamp_ms,
            price,
            last_digit: last_digit(price),
        }
    }
}

/// `floor(price * 10) mod 10`, guarded against representation error such as
/// `100.3 * 10 == 1002.9999999999999`.
pub fn last_digit(price: f64) -> u8 {
    if !price.is_finite() {
        return 0;
    }
    let scaled = (price * 10.0 + 1e-9).floor();
    scaled.rem_euclid(10.0) as u8
}

/// Fixed-capacity FIFO of ticks in arrival order.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    capacity: usize,
    ticks: VecDeque<Tick>,
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ticks: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a tick, returning the evicted oldest tick when full.
    pub fn push(&mut self, tick: Tick) -> Option<Tick> {
        let evicted = if self.ticks.len() >= self.capacity {
            self.ticks.pop_front()
        } else {
            None
        };
        self.ticks.push_back(tick);
        evicted
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter()
    }

    pub fn front(&self) -> Option<&Tick> {
        self.ticks.front()
    }

    pub fn back(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    /// The most recent `n` ticks, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Tick> {
        let skip = self.ticks.len().saturating_sub(n);
        self.ticks.iter().skip(skip).cloned().collect()
    }

    /// The most recent `n` prices, oldest first.
    pub fn recent_prices(&self, n: usize) -> Vec<f64> {
        let skip = self.ticks.len().saturating_sub(n);
        self.ticks.iter().skip(skip).map(|t| t.price).collect()
    }
}
