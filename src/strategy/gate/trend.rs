//! Trend chain
//!
//! Buys pullbacks in an established uptrend (sells rallies in a downtrend).
//! Checks run in order and the first failure is the rejection reason.

use super::{require, AcceptedSignal, ChainInput, RejectReason};
use crate::domain::{Side, SignalType};
use crate::ports::TrendConfirmation;

pub(super) fn evaluate(
    input: &ChainInput<'_>,
    confirmation: Option<&dyn TrendConfirmation>,
    side: Side,
) -> Result<AcceptedSignal, RejectReason> {
    let config = &input.gate.trend;
    let readings = &input.obs.readings;

    // 1. External trend follower
    if config.use_trend_confirmation {
        if let Some(follower) = confirmation {
            let agrees = match side {
                Side::Long => follower.is_bullish(),
                Side::Short => follower.is_bearish(),
            };
            if !agrees {
                return Err(RejectReason::TrendNotConfirmed { side });
            }
        }
    }

    // 2. Medium/slow alignment on the operating and next timeframe
    let medium = require(readings.ema_medium_primary, "medium average primary")?;
    let slow = require(readings.ema_slow_primary, "slow average primary")?;
    check_alignment(side, input.regime.primary, medium, slow)?;

    let medium = require(readings.ema_medium_secondary, "medium average secondary")?;
    let slow = require(readings.ema_slow_secondary, "slow average secondary")?;
    check_alignment(side, input.regime.secondary, medium, slow)?;

    // 3. Pullback to the short average
    let atr = input.atr()?;
    let pullback = require(readings.ema_pullback, "pullback average")?;
    let distance = (input.price() - pullback).abs();
    let limit = atr * config.pullback_atr_multiple;
    if distance > limit {
        return Err(RejectReason::PullbackTooFar {
            distance_pips: input.pips(distance),
            limit_pips: input.pips(limit),
        });
    }

    // 4. Higher timeframe oscillator extremes
    if config.htf_oscillator_enabled {
        let value = require(readings.htf_oscillator_secondary, "oscillator secondary")?;
        check_extreme(side, input.regime.secondary, value, config.overbought, config.oversold)?;

        if config.tertiary_oscillator_enabled {
            let value = require(readings.htf_oscillator_tertiary, "oscillator tertiary")?;
            check_extreme(side, input.regime.tertiary, value, config.overbought, config.oversold)?;
        }
    }

    // 5. Momentum reset: neutral band, turning our way
    let current = require(readings.momentum, "momentum")?;
    let previous = require(readings.momentum_previous, "momentum previous")?;
    if current < config.momentum_low || current > config.momentum_high {
        return Err(RejectReason::MomentumOutOfBand {
            value: current,
            low: config.momentum_low,
            high: config.momentum_high,
        });
    }
    let turning = match side {
        Side::Long => current > previous,
        Side::Short => current < previous,
    };
    if !turning {
        return Err(RejectReason::MomentumWrongDirection { current, previous });
    }

    Ok(AcceptedSignal {
        signal_type: SignalType::Trend,
        side,
        entry_price: input.quote.entry_price(side),
        atr,
        level: None,
    })
}

fn check_alignment(
    side: Side,
    timeframe: crate::domain::Timeframe,
    medium: f64,
    slow: f64,
) -> Result<(), RejectReason> {
    let aligned = match side {
        Side::Long => medium > slow,
        Side::Short => medium < slow,
    };
    if aligned {
        Ok(())
    } else {
        Err(RejectReason::AveragesMisaligned { timeframe, medium, slow })
    }
}

fn check_extreme(
    side: Side,
    timeframe: crate::domain::Timeframe,
    value: f64,
    overbought: f64,
    oversold: f64,
) -> Result<(), RejectReason> {
    match side {
        Side::Long if value >= overbought => Err(RejectReason::OscillatorExtreme {
            timeframe,
            value,
            limit: overbought,
        }),
        Side::Short if value <= oversold => Err(RejectReason::OscillatorExtreme {
            timeframe,
            value,
            limit: oversold,
        }),
        _ => Ok(()),
    }
}
