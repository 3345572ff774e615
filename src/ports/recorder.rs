use thiserror::Error;

use crate::domain::TradeDecision;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Failed to write decision: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode decision: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only sink for decision records.
///
/// Callers log failures and carry on; nothing in the trading path waits on
/// persistence succeeding.
pub trait DecisionRecorder: Send + Sync {
    fn record(&self, decision: &TradeDecision) -> Result<(), RecorderError>;
}
