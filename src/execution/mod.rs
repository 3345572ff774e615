//! Execution Layer - Order construction and FIFO-safe closing
//!
//! Turns accepted gate signals into broker-legal orders and closes positions
//! in first-in-first-out order.

pub mod builder;
pub mod fifo;
pub mod normalize;
pub mod retry;

use thiserror::Error;

pub use builder::{cap_take_profit, OrderBuilder, OrderConfig};
pub use fifo::{fifo_order, plan_fifo_close, reroute_close, ClosePlan, CloseReport, CloseRoute, CloseStep, FifoCloser};
pub use normalize::{find_duplicate, legal_trigger, normalize_volume, split_volume};
pub use retry::with_ack_retry;

/// Why an accepted signal did not become an order
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockReason {
    #[error("invalid lot size: {0}")]
    InvalidLotSize(f64),
    #[error("invalid {0} price: {1}")]
    InvalidPrice(&'static str, f64),
    #[error("duplicate pending order: ticket {ticket} at {price}")]
    DuplicatePending { ticket: u64, price: f64 },
}

impl BlockReason {
    /// Grouping key for decision records
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::InvalidLotSize(_) => "invalid_lot_size",
            BlockReason::InvalidPrice(..) => "invalid_price",
            BlockReason::DuplicatePending { .. } => "duplicate_pending",
        }
    }
}
