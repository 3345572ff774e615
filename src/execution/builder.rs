//! Order construction
//!
//! Turns an accepted signal into a broker-legal order: risk-module stops and
//! sizing, side sanity, key-level target capping, normalization and
//! duplicate suppression for pending entries.

use serde::{Deserialize, Serialize};

use super::normalize::{find_duplicate, legal_trigger, normalize_volume};
use super::BlockReason;
use crate::domain::{
    KeyLevel, OrderFields, OrderKind, OrderSpec, PendingOrder, Quote, RegimeSnapshot, Side,
    SignalType, SymbolSpec,
};
use crate::ports::RiskModel;
use crate::strategy::AcceptedSignal;

/// Order construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Levels at least this strong cap take-profit targets
    pub cap_min_strength: f64,
    /// Distance kept short of a capping level, in ATR units
    pub cap_buffer_atr: f64,
    /// Breakout stop entry placed this far beyond the level, in ATR units
    pub breakout_entry_atr: f64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            cap_min_strength: 0.5,
            cap_buffer_atr: 0.1,
            breakout_entry_atr: 0.1,
        }
    }
}

/// Tighten `take_profit` to just short of the nearest strong opposing level
/// between entry and target. Never moves the target further from entry.
pub fn cap_take_profit(
    side: Side,
    entry: f64,
    take_profit: f64,
    levels: &[KeyLevel],
    min_strength: f64,
    buffer: f64,
) -> f64 {
    let blocking = levels
        .iter()
        .filter(|l| l.opposes(side) && l.strength >= min_strength);

    match side {
        Side::Long => blocking
            .filter(|l| l.price > entry && l.price < take_profit)
            .map(|l| l.price)
            .min_by(f64::total_cmp)
            .map(|level| (level - buffer).min(take_profit))
            .unwrap_or(take_profit),
        Side::Short => blocking
            .filter(|l| l.price < entry && l.price > take_profit)
            .map(|l| l.price)
            .max_by(f64::total_cmp)
            .map(|level| (level + buffer).max(take_profit))
            .unwrap_or(take_profit),
    }
}

/// Builds normalized orders for one instrument
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    config: OrderConfig,
    spec: SymbolSpec,
}

impl OrderBuilder {
    pub fn new(config: OrderConfig, spec: SymbolSpec) -> Self {
        Self { config, spec }
    }

    pub fn spec(&self) -> &SymbolSpec {
        &self.spec
    }

    /// Build an order for `signal`, or say why not
    pub fn build(
        &self,
        signal: &AcceptedSignal,
        snapshot: &RegimeSnapshot,
        quote: Quote,
        risk: &dyn RiskModel,
        levels: &[KeyLevel],
        pending: &[PendingOrder],
    ) -> Result<OrderSpec, BlockReason> {
        let side = signal.side;
        let spec = &self.spec;

        if !(signal.atr > 0.0 && signal.atr.is_finite()) {
            return Err(BlockReason::InvalidPrice("volatility", signal.atr));
        }

        let (kind, entry) = self.entry_for(signal, quote);
        if !(entry > 0.0 && entry.is_finite()) {
            return Err(BlockReason::InvalidPrice("entry", entry));
        }

        let stop_loss = risk.stop_loss_for(side, entry, signal.atr);
        let take_profit = risk.take_profit_for(side, entry, stop_loss);
        if !stop_loss.is_finite() || !take_profit.is_finite() {
            return Err(BlockReason::InvalidPrice("stop/target", stop_loss));
        }

        let (stop_loss, take_profit) = self.sane_sides(side, entry, stop_loss, take_profit);
        let take_profit = cap_take_profit(
            side,
            entry,
            take_profit,
            levels,
            self.config.cap_min_strength,
            signal.atr * self.config.cap_buffer_atr,
        );
        // A level hugging the entry leaves no legal target
        if (take_profit - entry) * side.sign() < spec.min_stop_distance() - spec.point / 2.0 {
            return Err(BlockReason::InvalidPrice("take profit", take_profit));
        }

        let entry = spec.round_price(entry);
        let stop_loss = spec.round_price(stop_loss);
        let take_profit = spec.round_price(take_profit);
        let kind = match kind {
            OrderKind::PendingStop { .. } => OrderKind::PendingStop { trigger: entry },
            other => other,
        };

        let stop_distance = (entry - stop_loss).abs();
        let lot = risk.size_for(stop_distance, snapshot.regime);
        if !lot.is_finite() || lot <= 0.0 {
            return Err(BlockReason::InvalidLotSize(lot));
        }
        let volume = normalize_volume(lot, spec)?;

        if kind.is_pending() {
            if let Some(existing) = find_duplicate(pending, &spec.symbol, side, entry, spec) {
                return Err(BlockReason::DuplicatePending {
                    ticket: existing.ticket,
                    price: existing.price,
                });
            }
        }

        Ok(OrderSpec {
            symbol: spec.symbol.clone(),
            side,
            kind,
            entry_price: entry,
            volume,
            stop_loss,
            take_profit,
            comment: format!("{} {}", signal.signal_type, side),
        })
    }

    /// Market entry for trend/range, stop entry beyond the level for breakouts
    fn entry_for(&self, signal: &AcceptedSignal, quote: Quote) -> (OrderKind, f64) {
        match (signal.signal_type, signal.level) {
            (SignalType::Breakout, Some(level)) => {
                let offset = signal.atr * self.config.breakout_entry_atr;
                let beyond = level.price + signal.side.sign() * offset;
                let trigger = legal_trigger(signal.side, beyond, quote.bid, quote.ask, &self.spec);
                (OrderKind::PendingStop { trigger }, trigger)
            }
            _ => (OrderKind::Market, signal.entry_price),
        }
    }

    /// Stop on the losing side, target on the winning side, both at least
    /// the broker stops level away from entry
    fn sane_sides(&self, side: Side, entry: f64, stop_loss: f64, take_profit: f64) -> (f64, f64) {
        let min = self.spec.min_stop_distance();
        let sign = side.sign();

        let stop_gap = (entry - stop_loss) * sign;
        let stop_loss = if stop_gap < min { entry - sign * min } else { stop_loss };

        let target_gap = (take_profit - entry) * sign;
        let take_profit = if target_gap < min { entry + sign * min } else { take_profit };

        (stop_loss, take_profit)
    }
}

impl From<&OrderSpec> for OrderFields {
    fn from(order: &OrderSpec) -> Self {
        OrderFields {
            lot_size: Some(order.volume),
            entry_price: Some(order.entry_price),
            stop_loss: Some(order.stop_loss),
            take_profit: Some(order.take_profit),
            ticket: None,
        }
    }
}
