//! Companion-module ports consumed by the gate and the order builder
//!
//! Only call contracts live here. Numeric policy belongs to the adapters.

use crate::domain::{AccountState, KeyLevel, MarketRegime, Side};

/// Position sizing and initial stop/target placement
#[cfg_attr(test, mockall::automock)]
pub trait RiskModel: Send {
    /// Lot size for a stop `stop_distance` price units away
    fn size_for(&self, stop_distance: f64, regime: MarketRegime) -> f64;

    fn stop_loss_for(&self, side: Side, entry: f64, volatility: f64) -> f64;

    fn take_profit_for(&self, side: Side, entry: f64, stop_loss: f64) -> f64;

    /// Latest account state, called once per cycle before sizing
    fn update_account(&mut self, _account: &AccountState) {}
}

/// External trend-follower predicate
#[cfg_attr(test, mockall::automock)]
pub trait TrendConfirmation: Send {
    fn is_bullish(&self) -> bool;
    fn is_bearish(&self) -> bool;
}

/// External chart-pattern detector
#[cfg_attr(test, mockall::automock)]
pub trait PatternDetector: Send {
    fn pattern_detected(&self) -> bool;
}

/// Read-only key level source
pub trait KeyLevelProvider: Send {
    fn key_levels(&self, symbol: &str) -> Vec<KeyLevel>;
}
