//! Strategy Parameters
//!
//! Configuration structs for regime classification and the signal gate.
//! The per-timeframe tables are empirically tuned data, not derived values.

use serde::{Deserialize, Serialize};

use crate::domain::{MarketRegime, Timeframe};
use crate::ports::OscillatorKind;

/// One value per supported timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeTable {
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,
    pub m30: f64,
    pub h1: f64,
    pub h4: f64,
    pub d1: f64,
    pub w1: f64,
    pub mn1: f64,
}

impl TimeframeTable {
    pub fn get(&self, timeframe: Timeframe) -> f64 {
        match timeframe {
            Timeframe::M1 => self.m1,
            Timeframe::M5 => self.m5,
            Timeframe::M15 => self.m15,
            Timeframe::M30 => self.m30,
            Timeframe::H1 => self.h1,
            Timeframe::H4 => self.h4,
            Timeframe::D1 => self.d1,
            Timeframe::W1 => self.w1,
            Timeframe::MN1 => self.mn1,
        }
    }

    /// Values never decrease as bars get longer
    pub fn is_non_decreasing(&self) -> bool {
        Timeframe::ALL
            .windows(2)
            .all(|pair| self.get(pair[0]) <= self.get(pair[1]))
    }

    /// Threshold multipliers: ~21 on M1 rising to ~30 on D1 for a base of 25
    pub fn default_threshold_scale() -> Self {
        Self {
            m1: 0.84,
            m5: 0.88,
            m15: 0.92,
            m30: 0.96,
            h1: 1.0,
            h4: 1.08,
            d1: 1.2,
            w1: 1.2,
            mn1: 1.2,
        }
    }

    /// Confidence offsets, negative on fast timeframes and positive on slow ones
    pub fn default_confidence_bias() -> Self {
        Self {
            m1: -0.10,
            m5: -0.05,
            m15: -0.03,
            m30: 0.0,
            h1: 0.0,
            h4: 0.03,
            d1: 0.05,
            w1: 0.10,
            mn1: 0.10,
        }
    }
}

/// Regime classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// ADX needed for a trend regime (H1 reference, scaled per timeframe)
    pub trend_threshold: f64,
    /// ADX needed for a breakout setup (H1 reference, scaled per timeframe)
    pub breakout_threshold: f64,
    /// ADX below which the range chain accepts the market as directionless
    pub ranging_threshold: f64,
    pub atr_period: usize,
    /// Bars in the ATR baseline
    pub atr_average_period: usize,
    pub high_volatility_multiplier: f64,
    pub primary: Timeframe,
    pub secondary: Timeframe,
    pub tertiary: Timeframe,
    pub threshold_scale: TimeframeTable,
    pub confidence_bias: TimeframeTable,
    pub confidence_base: f64,
    /// Maximum contribution of trend strength to confidence
    pub confidence_trend_weight: f64,
    /// ADX that maps to the full trend weight
    pub adx_normalizer: f64,
    /// Bonus per aligned timeframe pair when the primary is D1 or slower
    pub alignment_weight_slow: f64,
    /// Bonus per aligned timeframe pair otherwise
    pub alignment_weight_fast: f64,
    /// Both timeframes of a pair need ADX above this to count as aligned
    pub alignment_adx_floor: f64,
    /// Confidence per DI point of separation (trending regimes only)
    pub separation_scale: f64,
    pub separation_cap: f64,
    /// Seconds between repeated feed warnings for the same reading
    pub feed_log_cooldown_secs: u64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            trend_threshold: 25.0,
            breakout_threshold: 20.0,
            ranging_threshold: 20.0,
            atr_period: 14,
            atr_average_period: 90,
            high_volatility_multiplier: 2.0,
            primary: Timeframe::H1,
            secondary: Timeframe::H4,
            tertiary: Timeframe::D1,
            threshold_scale: TimeframeTable::default_threshold_scale(),
            confidence_bias: TimeframeTable::default_confidence_bias(),
            confidence_base: 0.4,
            confidence_trend_weight: 0.4,
            adx_normalizer: 50.0,
            alignment_weight_slow: 0.20,
            alignment_weight_fast: 0.15,
            alignment_adx_floor: 20.0,
            separation_scale: 0.01,
            separation_cap: 0.2,
            feed_log_cooldown_secs: 60,
        }
    }
}

impl RegimeConfig {
    /// Primary, secondary and tertiary timeframes
    pub fn timeframes(&self) -> [Timeframe; 3] {
        [self.primary, self.secondary, self.tertiary]
    }

    /// Trend threshold for the operating timeframe
    pub fn scaled_trend_threshold(&self) -> f64 {
        self.trend_threshold_for(self.primary)
    }

    /// Breakout minimum for the operating timeframe
    pub fn scaled_breakout_threshold(&self) -> f64 {
        self.breakout_threshold_for(self.primary)
    }

    /// ADX ceiling the range chain accepts on the operating timeframe
    pub fn scaled_ranging_threshold(&self) -> f64 {
        self.ranging_threshold * self.threshold_scale.get(self.primary)
    }

    pub fn trend_threshold_for(&self, timeframe: Timeframe) -> f64 {
        self.trend_threshold * self.threshold_scale.get(timeframe)
    }

    pub fn breakout_threshold_for(&self, timeframe: Timeframe) -> f64 {
        self.breakout_threshold * self.threshold_scale.get(timeframe)
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        for (name, value) in [
            ("trend_threshold", self.trend_threshold),
            ("breakout_threshold", self.breakout_threshold),
            ("ranging_threshold", self.ranging_threshold),
        ] {
            if value <= 0.0 || value >= 100.0 {
                return Err(ParamError::ThresholdOutOfRange(name, value));
            }
        }
        if self.breakout_threshold > self.trend_threshold {
            return Err(ParamError::InvertedThresholds(self.breakout_threshold, self.trend_threshold));
        }
        if self.atr_period == 0 || self.atr_average_period == 0 {
            return Err(ParamError::ZeroPeriod("atr"));
        }
        if self.high_volatility_multiplier <= 1.0 {
            return Err(ParamError::InvalidMultiplier(self.high_volatility_multiplier));
        }
        if !(self.primary < self.secondary && self.secondary < self.tertiary) {
            return Err(ParamError::TimeframeOrder(self.primary, self.secondary, self.tertiary));
        }
        if !self.threshold_scale.is_non_decreasing() {
            return Err(ParamError::ScaleNotMonotonic);
        }
        if self.adx_normalizer <= 0.0 {
            return Err(ParamError::ThresholdOutOfRange("adx_normalizer", self.adx_normalizer));
        }
        Ok(())
    }
}

/// Trend chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendChainConfig {
    /// Require the external trend follower to agree
    pub use_trend_confirmation: bool,
    /// Short average price must pull back to
    pub pullback_ema_period: usize,
    pub medium_ema_period: usize,
    pub slow_ema_period: usize,
    /// Allowed pullback distance in ATR units
    pub pullback_atr_multiple: f64,
    /// Reject on a secondary-timeframe oscillator extreme
    pub htf_oscillator_enabled: bool,
    /// Also check the tertiary timeframe
    pub tertiary_oscillator_enabled: bool,
    pub htf_oscillator_period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub momentum_period: usize,
    pub momentum_low: f64,
    pub momentum_high: f64,
}

impl Default for TrendChainConfig {
    fn default() -> Self {
        Self {
            use_trend_confirmation: false,
            pullback_ema_period: 20,
            medium_ema_period: 50,
            slow_ema_period: 200,
            pullback_atr_multiple: 1.0,
            htf_oscillator_enabled: true,
            tertiary_oscillator_enabled: false,
            htf_oscillator_period: 14,
            overbought: 70.0,
            oversold: 30.0,
            momentum_period: 14,
            momentum_low: 40.0,
            momentum_high: 60.0,
        }
    }
}

/// Breakout chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutChainConfig {
    /// Window for the narrowest-range-in-N check
    pub narrow_range_bars: usize,
    pub atr_expansion_multiple: f64,
    pub atr_expansion_lookback: usize,
    /// Max distance to the strongest level in ATR units
    pub proximity_atr_multiple: f64,
    pub volume_multiple: f64,
    pub volume_lookback: usize,
    /// Count the external pattern detector as a fourth precondition
    pub use_pattern_detector: bool,
}

impl Default for BreakoutChainConfig {
    fn default() -> Self {
        Self {
            narrow_range_bars: 7,
            atr_expansion_multiple: 1.5,
            atr_expansion_lookback: 10,
            proximity_atr_multiple: 1.0,
            volume_multiple: 1.2,
            volume_lookback: 20,
            use_pattern_detector: false,
        }
    }
}

/// Range chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeChainConfig {
    /// Confidence floor for ranging snapshots, in place of the gate-wide one
    pub min_confidence: f64,
    /// Range must be this many spreads wide
    pub min_width_spreads: f64,
    pub oscillator: OscillatorKind,
    pub oscillator_period: usize,
    pub overbought: f64,
    pub oversold: f64,
    /// How close to a boundary (ATR units) the trigger may fire
    pub boundary_atr_multiple: f64,
}

impl Default for RangeChainConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            min_width_spreads: 10.0,
            oscillator: OscillatorKind::Rsi,
            oscillator_period: 14,
            overbought: 70.0,
            oversold: 30.0,
            boundary_atr_multiple: 0.5,
        }
    }
}

/// Signal gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Snapshots below this confidence are rejected before the trend and
    /// breakout chains run
    pub min_confidence: f64,
    pub max_open_positions: usize,
    pub trend: TrendChainConfig,
    pub breakout: BreakoutChainConfig,
    pub range: RangeChainConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_open_positions: 3,
            trend: TrendChainConfig::default(),
            breakout: BreakoutChainConfig::default(),
            range: RangeChainConfig::default(),
        }
    }
}

impl GateConfig {
    /// Confidence floor applied before the chain for `regime`
    pub fn min_confidence_for(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Ranging => self.range.min_confidence,
            _ => self.min_confidence,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("range.min_confidence", self.range.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ParamError::ThresholdOutOfRange(name, value));
            }
        }

        let t = &self.trend;
        if t.pullback_ema_period == 0 || t.medium_ema_period == 0 || t.slow_ema_period == 0 {
            return Err(ParamError::ZeroPeriod("trend ema"));
        }
        if t.medium_ema_period >= t.slow_ema_period {
            return Err(ParamError::InvertedPeriods(t.medium_ema_period, t.slow_ema_period));
        }
        if t.momentum_low >= t.momentum_high {
            return Err(ParamError::InvalidBand(t.momentum_low, t.momentum_high));
        }
        if t.oversold >= t.overbought {
            return Err(ParamError::InvalidBand(t.oversold, t.overbought));
        }

        let b = &self.breakout;
        if b.narrow_range_bars < 2 || b.atr_expansion_lookback == 0 || b.volume_lookback == 0 {
            return Err(ParamError::ZeroPeriod("breakout lookback"));
        }
        if b.volume_multiple < 1.2 {
            return Err(ParamError::VolumeMultiple(b.volume_multiple));
        }

        let r = &self.range;
        if r.oscillator_period == 0 {
            return Err(ParamError::ZeroPeriod("range oscillator"));
        }
        if r.oversold >= r.overbought {
            return Err(ParamError::InvalidBand(r.oversold, r.overbought));
        }
        if r.min_width_spreads <= 0.0 {
            return Err(ParamError::ThresholdOutOfRange("min_width_spreads", r.min_width_spreads));
        }
        Ok(())
    }
}

/// Parameter validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Invalid {0}: {1} (must be within (0, 100))")]
    ThresholdOutOfRange(&'static str, f64),
    #[error("Breakout threshold {0} exceeds trend threshold {1}")]
    InvertedThresholds(f64, f64),
    #[error("Period for {0} must be > 0")]
    ZeroPeriod(&'static str),
    #[error("Medium period {0} must be shorter than slow period {1}")]
    InvertedPeriods(usize, usize),
    #[error("Invalid high-volatility multiplier: {0} (must be > 1)")]
    InvalidMultiplier(f64),
    #[error("Timeframes must be strictly increasing: {0} < {1} < {2}")]
    TimeframeOrder(Timeframe, Timeframe, Timeframe),
    #[error("Threshold scale must not decrease for longer timeframes")]
    ScaleNotMonotonic,
    #[error("Invalid band: low {0} must be below high {1}")]
    InvalidBand(f64, f64),
    #[error("Volume multiple {0} must be at least 1.2")]
    VolumeMultiple(f64),
    #[error("Invalid {0}: {1} (must be > 0)")]
    NotPositive(&'static str, f64),
}
