use serde::{Deserialize, Serialize};

use super::market::Side;

/// Pending order already resting at the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub volume: f64,
}

/// Open position reported by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    /// Unix seconds
    pub open_time: i64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

impl OpenPosition {
    /// FIFO ordering key: earliest open time, then lowest ticket
    pub fn fifo_key(&self) -> (i64, u64) {
        (self.open_time, self.ticket)
    }

    /// Seconds held at `now` (Unix seconds)
    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.open_time)
    }
}
