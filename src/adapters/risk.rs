//! Fixed-fractional risk model
//!
//! Risks a fixed share of equity per trade:
//!
//! ```text
//! risk_money = equity * risk_percent / 100 * regime_scale
//! lot        = risk_money / (stop_distance * value_per_price_unit)
//! stop       = entry -/+ stop_atr_multiple * ATR
//! target     = entry +/- reward_ratio * |entry - stop|
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{AccountState, MarketRegime, Side};
use crate::ports::RiskModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Percent of equity risked per trade
    pub risk_percent: f64,
    pub stop_atr_multiple: f64,
    /// Target distance as a multiple of the stop distance
    pub reward_ratio: f64,
    /// Account currency per 1.0 price move per lot
    pub value_per_price_unit: f64,
    /// Size multiplier for breakout entries
    pub breakout_scale: f64,
    /// Size multiplier while volatility is extreme
    pub high_volatility_scale: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percent: 1.0,
            stop_atr_multiple: 1.5,
            reward_ratio: 2.0,
            value_per_price_unit: 100_000.0,
            breakout_scale: 0.75,
            high_volatility_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixedFractionalRisk {
    config: RiskConfig,
    equity: f64,
}

impl FixedFractionalRisk {
    pub fn new(config: RiskConfig, equity: f64) -> Self {
        Self { config, equity }
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    fn regime_scale(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::BreakoutSetup => self.config.breakout_scale,
            MarketRegime::HighVolatility => self.config.high_volatility_scale,
            MarketRegime::TrendBull | MarketRegime::TrendBear | MarketRegime::Ranging => 1.0,
        }
    }
}

impl RiskModel for FixedFractionalRisk {
    fn size_for(&self, stop_distance: f64, regime: MarketRegime) -> f64 {
        let per_lot = stop_distance * self.config.value_per_price_unit;
        if !(per_lot > 0.0) || !self.equity.is_finite() {
            return 0.0;
        }
        let risk_money = self.equity * self.config.risk_percent / 100.0 * self.regime_scale(regime);
        (risk_money / per_lot).max(0.0)
    }

    fn stop_loss_for(&self, side: Side, entry: f64, volatility: f64) -> f64 {
        entry - side.sign() * volatility * self.config.stop_atr_multiple
    }

    fn take_profit_for(&self, side: Side, entry: f64, stop_loss: f64) -> f64 {
        entry + side.sign() * (entry - stop_loss).abs() * self.config.reward_ratio
    }

    fn update_account(&mut self, account: &AccountState) {
        self.equity = account.equity;
    }
}
