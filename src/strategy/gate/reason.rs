//! Rejection reasons
//!
//! Each variant carries the numbers that caused the rejection so the text
//! reads on its own, and `code()` gives a stable key for grouping.

use std::fmt;

use crate::domain::{Side, Timeframe};

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    LowConfidence { confidence: f64, minimum: f64 },
    MaxPositions { open: usize, max: usize },
    HighVolatility { ratio: f64 },
    MissingReading(&'static str),
    TrendNotConfirmed { side: Side },
    AveragesMisaligned { timeframe: Timeframe, medium: f64, slow: f64 },
    PullbackTooFar { distance_pips: f64, limit_pips: f64 },
    OscillatorExtreme { timeframe: Timeframe, value: f64, limit: f64 },
    MomentumOutOfBand { value: f64, low: f64, high: f64 },
    MomentumWrongDirection { current: f64, previous: f64 },
    NoBreakoutPattern,
    NoKeyLevel,
    LevelTooFar { distance_pips: f64, limit_pips: f64 },
    VolumeTooLow { ratio: f64, required: f64 },
    NoRange,
    RangeTooNarrow { width_pips: f64, required_pips: f64 },
    TrendTooStrong { adx: f64, limit: f64 },
    PriceMidRange { to_upper_pips: f64, to_lower_pips: f64 },
    NoOscillatorTurn { value: f64, previous: f64 },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LowConfidence { .. } => "low_confidence",
            Self::MaxPositions { .. } => "max_positions",
            Self::HighVolatility { .. } => "high_volatility",
            Self::MissingReading(_) => "missing_reading",
            Self::TrendNotConfirmed { .. } => "trend_not_confirmed",
            Self::AveragesMisaligned { .. } => "averages_misaligned",
            Self::PullbackTooFar { .. } => "pullback_too_far",
            Self::OscillatorExtreme { .. } => "htf_oscillator_extreme",
            Self::MomentumOutOfBand { .. } => "momentum_out_of_band",
            Self::MomentumWrongDirection { .. } => "momentum_wrong_direction",
            Self::NoBreakoutPattern => "no_breakout_pattern",
            Self::NoKeyLevel => "no_key_level",
            Self::LevelTooFar { .. } => "level_too_far",
            Self::VolumeTooLow { .. } => "volume_too_low",
            Self::NoRange => "no_range",
            Self::RangeTooNarrow { .. } => "range_too_narrow",
            Self::TrendTooStrong { .. } => "trend_too_strong",
            Self::PriceMidRange { .. } => "price_mid_range",
            Self::NoOscillatorTurn { .. } => "no_oscillator_turn",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence { confidence, minimum } => {
                write!(f, "confidence too low: {:.2}, minimum {:.2}", confidence, minimum)
            }
            Self::MaxPositions { open, max } => {
                write!(f, "too many open positions: {}, limit {}", open, max)
            }
            Self::HighVolatility { ratio } => {
                write!(f, "high volatility: atr {:.2}x baseline", ratio)
            }
            Self::MissingReading(what) => write!(f, "missing reading: {}", what),
            Self::TrendNotConfirmed { side } => {
                write!(f, "trend follower does not confirm {}", side)
            }
            Self::AveragesMisaligned { timeframe, medium, slow } => write!(
                f,
                "averages misaligned on {}: medium {:.5}, slow {:.5}",
                timeframe, medium, slow
            ),
            Self::PullbackTooFar { distance_pips, limit_pips } => write!(
                f,
                "pullback too far: {:.1} pips, limit {:.1} pips",
                distance_pips, limit_pips
            ),
            Self::OscillatorExtreme { timeframe, value, limit } => write!(
                f,
                "oscillator at extreme on {}: {:.1}, limit {:.1}",
                timeframe, value, limit
            ),
            Self::MomentumOutOfBand { value, low, high } => write!(
                f,
                "momentum outside neutral band: {:.1}, band {:.1}-{:.1}",
                value, low, high
            ),
            Self::MomentumWrongDirection { current, previous } => write!(
                f,
                "momentum moving against trade: {:.1} from {:.1}",
                current, previous
            ),
            Self::NoBreakoutPattern => write!(f, "no contraction, narrow range or atr expansion"),
            Self::NoKeyLevel => write!(f, "no key level available"),
            Self::LevelTooFar { distance_pips, limit_pips } => write!(
                f,
                "key level too far: {:.1} pips, limit {:.1} pips",
                distance_pips, limit_pips
            ),
            Self::VolumeTooLow { ratio, required } => write!(
                f,
                "volume too low: {:.2}x average, required {:.2}x",
                ratio, required
            ),
            Self::NoRange => write!(f, "no support/resistance pair around price"),
            Self::RangeTooNarrow { width_pips, required_pips } => write!(
                f,
                "range too narrow: {:.1} pips, required {:.1} pips",
                width_pips, required_pips
            ),
            Self::TrendTooStrong { adx, limit } => {
                write!(f, "trend too strong for range: adx {:.1}, limit {:.1}", adx, limit)
            }
            Self::PriceMidRange { to_upper_pips, to_lower_pips } => write!(
                f,
                "price mid-range: {:.1} pips to upper, {:.1} pips to lower",
                to_upper_pips, to_lower_pips
            ),
            Self::NoOscillatorTurn { value, previous } => write!(
                f,
                "oscillator not turning from extreme: {:.1} from {:.1}",
                value, previous
            ),
        }
    }
}
