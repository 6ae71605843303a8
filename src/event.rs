use crate::feature::CrossVolatilityReport;
use crate::model::features::FeatureSnapshot;
use crate::model::prediction::{BandPrediction, DigitPrediction};
use crate::model::signal::{SignalStatus, TradingSignal};

/// Tells the tick feed which symbols to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Debug, Clone)]
pub enum WsConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay_ms: u64 },
}

/// Observer stream published by the coordinator and the tick feed.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Features {
        symbol: String,
        snapshot: FeatureSnapshot,
    },
    Predictions {
        symbol: String,
        digits: [DigitPrediction; 10],
        band: BandPrediction,
        run_count: u32,
    },
    SignalEmitted(TradingSignal),
    SignalStatusChanged {
        id: String,
        status: SignalStatus,
    },
    AnalysisFailed {
        symbol: String,
        error: String,
    },
    LongHorizon {
        symbol: String,
        window_len: usize,
        top_digit: DigitPrediction,
        band: BandPrediction,
    },
    CrossVolatility(CrossVolatilityReport),
    WsStatus(WsConnectionStatus),
    LogMessage(String),
}
