//! Breakout chain
//!
//! A contraction pattern, a nearby strong level and confirming volume are
//! all required. Any one contraction pattern is enough.

use statrs::statistics::Statistics;

use super::{require, AcceptedSignal, ChainInput, RejectReason};
use crate::domain::key_level::strongest;
use crate::domain::{Candle, Side, SignalType};
use crate::ports::PatternDetector;

pub(super) fn evaluate(
    input: &ChainInput<'_>,
    pattern: Option<&dyn PatternDetector>,
) -> Result<AcceptedSignal, RejectReason> {
    let config = &input.gate.breakout;
    let atr = input.atr()?;

    // 1. Contraction or expansion precondition
    let bars = &input.obs.bars;
    let detector_fired = config.use_pattern_detector
        && pattern.map(|p| p.pattern_detected()).unwrap_or(false);
    let has_pattern = is_inside_bar(bars)
        || is_narrowest_range(bars, config.narrow_range_bars)
        || is_atr_expanding(&input.obs.atr_series, atr, config.atr_expansion_multiple)
        || detector_fired;
    if !has_pattern {
        return Err(RejectReason::NoBreakoutPattern);
    }

    // 2. Proximity to the strongest level
    let level = *strongest(input.levels).ok_or(RejectReason::NoKeyLevel)?;
    let distance = (input.price() - level.price).abs();
    let limit = atr * config.proximity_atr_multiple;
    if distance > limit {
        return Err(RejectReason::LevelTooFar {
            distance_pips: input.pips(distance),
            limit_pips: input.pips(limit),
        });
    }

    // 3. Volume confirmation
    let volume = require(input.obs.readings.volume, "volume")?;
    let average = require(input.obs.readings.volume_average, "volume average")?;
    if average <= 0.0 {
        return Err(RejectReason::MissingReading("volume average"));
    }
    let ratio = volume / average;
    if ratio < config.volume_multiple {
        return Err(RejectReason::VolumeTooLow {
            ratio,
            required: config.volume_multiple,
        });
    }

    // Trade through the level: up through resistance, down through support
    let side = if level.is_resistance { Side::Long } else { Side::Short };

    Ok(AcceptedSignal {
        signal_type: SignalType::Breakout,
        side,
        entry_price: input.quote.entry_price(side),
        atr,
        level: Some(level),
    })
}

/// Latest bar inside the one before it
fn is_inside_bar(bars: &[Candle]) -> bool {
    match bars {
        [latest, previous, ..] => latest.is_inside(previous),
        _ => false,
    }
}

/// Latest bar has the smallest range of the last `window` bars
fn is_narrowest_range(bars: &[Candle], window: usize) -> bool {
    if window < 2 || bars.len() < window {
        return false;
    }
    let latest = bars[0].range();
    bars[1..window].iter().all(|bar| latest < bar.range())
}

/// Current ATR at least `multiple` times its recent average.
/// `series` is newest first; index 0 is the current value and is excluded.
fn is_atr_expanding(series: &[f64], current: f64, multiple: f64) -> bool {
    if series.len() < 2 {
        return false;
    }
    let average = series[1..].iter().mean();
    average > 0.0 && current >= average * multiple
}
