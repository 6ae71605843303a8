use thiserror::Error;

/// Failures inside one analysis cycle. None of these are fatal: the cycle is
/// skipped and the timer keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("degenerate snapshot: {0}")]
    DegenerateSnapshot(String),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Failures of the tick feed connection.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("deriv API error ({code}): {message}")]
    DerivApi { code: String, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}
