use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::features::FeatureSnapshot;

pub const DEFAULT_SIGNAL_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    ExactDigit,
    OverUnder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandLabel {
    Over2,
    Under7,
}

impl BandLabel {
    /// Digit boundary of the contract: over 2 / under 7.
    pub fn barrier(self) -> u8 {
        match self {
            Self::Over2 => 2,
            Self::Under7 => 7,
        }
    }
}

impl fmt::Display for BandLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Over2 => f.write_str("over2"),
            Self::Under7 => f.write_str("under7"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Executed,
    Won,
    Lost,
    Cancelled,
}

/// How the signal came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    Consensus,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    pub symbol: String,
    pub timestamp_ms: u64,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub predicted_digit: Option<u8>,
    pub predicted_band: Option<BandLabel>,
    pub confidence: f64,
    /// Votes backing the outcome (1 for a manual signal).
    pub runs: u32,
    pub status: SignalStatus,
    pub origin: SignalOrigin,
    pub features: FeatureSnapshot,
}

impl TradingSignal {
    pub fn exact_digit(
        symbol: &str,
        digit: u8,
        confidence: f64,
        runs: u32,
        origin: SignalOrigin,
        features: FeatureSnapshot,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: new_signal_id(),
            symbol: symbol.to_string(),
            timestamp_ms,
            signal_type: SignalType::ExactDigit,
            predicted_digit: Some(digit),
            predicted_band: None,
            confidence,
            runs,
            status: SignalStatus::Pending,
            origin,
            features,
        }
    }

    pub fn over_under(
        symbol: &str,
        band: BandLabel,
        confidence: f64,
        runs: u32,
        origin: SignalOrigin,
        features: FeatureSnapshot,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: new_signal_id(),
            symbol: symbol.to_string(),
            timestamp_ms,
            signal_type: SignalType::OverUnder,
            predicted_digit: None,
            predicted_band: Some(band),
            confidence,
            runs,
            status: SignalStatus::Pending,
            origin,
            features,
        }
    }
}

fn new_signal_id() -> String {
    format!("sig-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

/// Bounded record of emitted signals, most recent first.
#[derive(Debug, Clone)]
pub struct SignalLog {
    capacity: usize,
    entries: VecDeque<TradingSignal>,
}

impl Default for SignalLog {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_LOG_CAPACITY)
    }
}

impl SignalLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert at the front, evicting the oldest entry once over capacity.
    pub fn push(&mut self, signal: TradingSignal) -> Option<TradingSignal> {
        self.entries.push_front(signal);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn update_status(&mut self, id: &str, status: SignalStatus) -> bool {
        match self.entries.iter_mut().find(|s| s.id == id) {
            Some(signal) => {
                signal.status = status;
                true
            }
            None => false,
        }
    }

    pub fn latest(&self) -> Option<&TradingSignal> {
        self.entries.front()
    }

    pub fn get(&self, id: &str) -> Option<&TradingSignal> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradingSignal> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
