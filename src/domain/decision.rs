//! Trade decision records
//!
//! One `TradeDecision` is produced for every evaluated opportunity. The
//! evaluation starts a `DecisionDraft` with the mandatory fields filled from
//! the current snapshot, and the draft is consumed exactly once by one of the
//! finalizing methods. A finalized record is only ever handed out by shared
//! reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::market::{AccountState, Side};
use super::regime::{MarketRegime, RegimeSnapshot};

/// Which evaluation chain produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Trend,
    Breakout,
    Range,
    /// Regime has no entry chain
    None,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Trend => write!(f, "trend"),
            SignalType::Breakout => write!(f, "breakout"),
            SignalType::Range => write!(f, "range"),
            SignalType::None => write!(f, "none"),
        }
    }
}

/// Final state of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    /// Gate accepted, no order attempted
    Passed,
    /// Gate rejected
    Rejected,
    /// Order accepted by the gateway
    Executed,
    /// Order construction refused the signal
    Blocked,
    /// Gateway refused or never acknowledged the order
    Failed,
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionOutcome::Passed => write!(f, "PASSED"),
            DecisionOutcome::Rejected => write!(f, "REJECTED"),
            DecisionOutcome::Executed => write!(f, "EXECUTED"),
            DecisionOutcome::Blocked => write!(f, "BLOCKED"),
            DecisionOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Every reading the gate looked at (or could have looked at).
///
/// Fields are `None` only when the feed could not provide the value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorReadings {
    pub ema_pullback: Option<f64>,
    pub ema_medium_primary: Option<f64>,
    pub ema_slow_primary: Option<f64>,
    pub ema_medium_secondary: Option<f64>,
    pub ema_slow_secondary: Option<f64>,
    pub momentum: Option<f64>,
    pub momentum_previous: Option<f64>,
    pub htf_oscillator_secondary: Option<f64>,
    pub htf_oscillator_tertiary: Option<f64>,
    pub range_oscillator: Option<f64>,
    pub range_oscillator_previous: Option<f64>,
    pub volume: Option<f64>,
    pub volume_average: Option<f64>,
    pub spread: Option<f64>,
    pub nearest_resistance: Option<f64>,
    pub nearest_support: Option<f64>,
    pub strongest_level: Option<f64>,
}

/// Mandatory market fields shared by every decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketFields {
    pub price: f64,
    pub atr: f64,
    pub atr_average: f64,
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub adx_tertiary: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Order values recorded for passed/executed/blocked/failed decisions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderFields {
    pub lot_size: Option<f64>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub ticket: Option<u64>,
}

/// Append-only decision record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal_type: SignalType,
    pub side: Option<Side>,
    pub regime: MarketRegime,
    pub confidence: f64,
    pub market: MarketFields,
    pub readings: IndicatorReadings,
    pub account: AccountState,
    pub outcome: DecisionOutcome,
    /// Stable grouping key such as `pullback_too_far`
    pub reason_code: Option<String>,
    /// Human readable, parameterized reason
    pub rejection_reason: Option<String>,
    pub order: OrderFields,
}

/// In-progress decision owned by the evaluation that created it
#[derive(Debug, Clone)]
pub struct DecisionDraft {
    timestamp: DateTime<Utc>,
    symbol: String,
    signal_type: SignalType,
    side: Option<Side>,
    regime: MarketRegime,
    confidence: f64,
    market: MarketFields,
    readings: IndicatorReadings,
    account: AccountState,
    order: OrderFields,
}

impl DecisionDraft {
    /// Start a decision with every mandatory field populated
    pub fn start(
        symbol: &str,
        snapshot: &RegimeSnapshot,
        price: f64,
        account: AccountState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            signal_type: SignalType::None,
            side: None,
            regime: snapshot.regime,
            confidence: snapshot.confidence,
            market: MarketFields {
                price,
                atr: snapshot.atr_current,
                atr_average: snapshot.atr_average,
                adx_primary: snapshot.adx_primary,
                adx_secondary: snapshot.adx_secondary,
                adx_tertiary: snapshot.adx_tertiary,
                plus_di: snapshot.plus_di,
                minus_di: snapshot.minus_di,
            },
            readings: IndicatorReadings::default(),
            account,
            order: OrderFields::default(),
        }
    }

    pub fn set_signal(&mut self, signal_type: SignalType, side: Option<Side>) {
        self.signal_type = signal_type;
        self.side = side;
    }

    pub fn set_readings(&mut self, readings: IndicatorReadings) {
        self.readings = readings;
    }

    pub fn set_order(&mut self, order: OrderFields) {
        self.order = order;
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn readings(&self) -> &IndicatorReadings {
        &self.readings
    }

    pub fn market(&self) -> &MarketFields {
        &self.market
    }

    pub fn passed(self) -> TradeDecision {
        self.finish(DecisionOutcome::Passed, None, None)
    }

    pub fn rejected(self, code: &str, reason: impl Into<String>) -> TradeDecision {
        self.finish(DecisionOutcome::Rejected, Some(code.to_string()), Some(reason.into()))
    }

    pub fn executed(mut self, ticket: u64) -> TradeDecision {
        self.order.ticket = Some(ticket);
        self.finish(DecisionOutcome::Executed, None, None)
    }

    pub fn blocked(self, code: &str, reason: impl Into<String>) -> TradeDecision {
        self.finish(DecisionOutcome::Blocked, Some(code.to_string()), Some(reason.into()))
    }

    pub fn failed(self, code: &str, reason: impl Into<String>) -> TradeDecision {
        self.finish(DecisionOutcome::Failed, Some(code.to_string()), Some(reason.into()))
    }

    fn finish(
        self,
        outcome: DecisionOutcome,
        reason_code: Option<String>,
        rejection_reason: Option<String>,
    ) -> TradeDecision {
        TradeDecision {
            timestamp: self.timestamp,
            symbol: self.symbol,
            signal_type: self.signal_type,
            side: self.side,
            regime: self.regime,
            confidence: self.confidence,
            market: self.market,
            readings: self.readings,
            account: self.account,
            outcome,
            reason_code,
            rejection_reason,
            order: self.order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RegimeSnapshot {
        RegimeSnapshot {
            regime: MarketRegime::TrendBull,
            confidence: 0.72,
            timestamp: Utc::now(),
            adx_primary: 31.0,
            adx_secondary: 26.0,
            adx_tertiary: 22.0,
            plus_di: 28.0,
            minus_di: 14.0,
            atr_current: 0.0012,
            atr_average: 0.0010,
        }
    }

    fn account() -> AccountState {
        AccountState { balance: 10_000.0, equity: 10_050.0, open_positions: 1 }
    }

    #[test]
    fn test_draft_carries_mandatory_fields() {
        let draft = DecisionDraft::start("EURUSD", &snapshot(), 1.1000, account(), Utc::now());
        let decision = draft.passed();

        assert_eq!(decision.symbol, "EURUSD");
        assert_eq!(decision.regime, MarketRegime::TrendBull);
        assert_eq!(decision.confidence, 0.72);
        assert_eq!(decision.market.price, 1.1000);
        assert_eq!(decision.market.atr, 0.0012);
        assert_eq!(decision.market.adx_tertiary, 22.0);
        assert_eq!(decision.account.open_positions, 1);
        assert_eq!(decision.outcome, DecisionOutcome::Passed);
        assert!(decision.reason_code.is_none());
    }

    #[test]
    fn test_rejected_keeps_reason_and_code() {
        let mut draft = DecisionDraft::start("EURUSD", &snapshot(), 1.1, account(), Utc::now());
        draft.set_signal(SignalType::Trend, Some(Side::Long));
        let decision = draft.rejected("pullback_too_far", "pullback too far: 14.0 pips, limit 12.0 pips");

        assert_eq!(decision.outcome, DecisionOutcome::Rejected);
        assert_eq!(decision.reason_code.as_deref(), Some("pullback_too_far"));
        assert_eq!(decision.signal_type, SignalType::Trend);
        assert_eq!(decision.side, Some(Side::Long));
    }

    #[test]
    fn test_executed_records_ticket() {
        let mut draft = DecisionDraft::start("EURUSD", &snapshot(), 1.1, account(), Utc::now());
        draft.set_order(OrderFields {
            lot_size: Some(0.25),
            entry_price: Some(1.1),
            stop_loss: Some(1.098),
            take_profit: Some(1.104),
            ticket: None,
        });
        let decision = draft.executed(42);
        assert_eq!(decision.outcome, DecisionOutcome::Executed);
        assert_eq!(decision.order.ticket, Some(42));
        assert_eq!(decision.order.lot_size, Some(0.25));
    }

    #[test]
    fn test_decision_serializes_outcome() {
        let decision = DecisionDraft::start("EURUSD", &snapshot(), 1.1, account(), Utc::now())
            .blocked("invalid_lot_size", "invalid lot size");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["outcome"], "BLOCKED");
        assert_eq!(json["regime"], "TREND_BULL");
        assert_eq!(json["signal_type"], "none");
    }
}
