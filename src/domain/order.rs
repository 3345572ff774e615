use serde::{Deserialize, Serialize};

use super::market::Side;

/// How an order enters the market
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    /// Triggers once price crosses `trigger`
    PendingStop { trigger: f64 },
}

impl OrderKind {
    pub fn is_pending(&self) -> bool {
        matches!(self, OrderKind::PendingStop { .. })
    }
}

/// Fully normalized order ready for the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Expected fill price (trigger price for pending orders)
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub comment: String,
}
