use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountState, OpenPosition, OrderSpec, PendingOrder};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Order rejected ({code}): {reason}")]
    Rejected { code: i32, reason: String },
    #[error("Gateway did not acknowledge the request in time")]
    Timeout,
    #[error("Gateway disconnected: {0}")]
    Disconnected(String),
    #[error("Unknown ticket {0}")]
    UnknownTicket(u64),
}

impl GatewayError {
    /// Errors worth another acknowledgement attempt. Rejections never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Disconnected(_))
    }

    /// Grouping key for decision records
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Rejected { .. } => "gateway_rejected",
            GatewayError::Timeout => "gateway_timeout",
            GatewayError::Disconnected(_) => "gateway_disconnected",
            GatewayError::UnknownTicket(_) => "gateway_unknown_ticket",
        }
    }
}

/// Gateway acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ticket: u64,
    /// Fill price, or the resting price for pending orders
    pub price: f64,
    pub volume: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_market(&self, order: &OrderSpec) -> Result<Fill, GatewayError>;

    async fn place_pending(&self, order: &OrderSpec) -> Result<Fill, GatewayError>;

    async fn cancel_pending(&self, ticket: u64) -> Result<(), GatewayError>;

    /// Close `volume` lots of position `ticket` (full close when volume equals the position)
    async fn close_position(&self, ticket: u64, volume: f64) -> Result<Fill, GatewayError>;

    /// Move the protective prices of an open position
    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError>;

    async fn open_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, GatewayError>;

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, GatewayError>;

    async fn account(&self) -> Result<AccountState, GatewayError>;

    /// Route an order to the right placement call
    async fn submit(&self, order: &OrderSpec) -> Result<Fill, GatewayError> {
        if order.kind.is_pending() {
            self.place_pending(order).await
        } else {
            self.place_market(order).await
        }
    }
}
