//! Range chain
//!
//! Width and trend strength are preconditions. The entry trigger is an
//! oscillator turning back from an extreme near a range boundary.

use super::{require, AcceptedSignal, ChainInput, RejectReason};
use crate::domain::key_level::{nearest_resistance_above, nearest_support_below};
use crate::domain::{Side, SignalType};

pub(super) fn evaluate(input: &ChainInput<'_>) -> Result<AcceptedSignal, RejectReason> {
    let config = &input.gate.range;
    let price = input.price();

    // 1. Range must pay for the spread
    let upper = nearest_resistance_above(input.levels, price).ok_or(RejectReason::NoRange)?;
    let lower = nearest_support_below(input.levels, price).ok_or(RejectReason::NoRange)?;
    let width = upper.price - lower.price;
    let required = input.quote.spread() * config.min_width_spreads;
    if width <= required {
        return Err(RejectReason::RangeTooNarrow {
            width_pips: input.pips(width),
            required_pips: input.pips(required),
        });
    }

    // 2. No directional bias
    let limit = input.regime.scaled_ranging_threshold();
    let adx = input.snapshot.adx_primary;
    if adx >= limit {
        return Err(RejectReason::TrendTooStrong { adx, limit });
    }

    // 3. Oscillator turning at a boundary
    let atr = input.atr()?;
    let current = require(input.obs.readings.range_oscillator, "range oscillator")?;
    let previous = require(input.obs.readings.range_oscillator_previous, "range oscillator previous")?;

    let zone = atr * config.boundary_atr_multiple;
    let to_upper = upper.price - price;
    let to_lower = price - lower.price;
    let near_upper = to_upper <= zone;
    let near_lower = to_lower <= zone;

    let side = if near_upper && previous >= config.overbought && current < previous {
        Side::Short
    } else if near_lower && previous <= config.oversold && current > previous {
        Side::Long
    } else if !near_upper && !near_lower {
        return Err(RejectReason::PriceMidRange {
            to_upper_pips: input.pips(to_upper),
            to_lower_pips: input.pips(to_lower),
        });
    } else {
        return Err(RejectReason::NoOscillatorTurn { value: current, previous });
    };

    Ok(AcceptedSignal {
        signal_type: SignalType::Range,
        side,
        entry_price: input.quote.entry_price(side),
        atr,
        level: None,
    })
}
