//! Market regime and the snapshot produced by each classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete classified market state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    /// Strong trend with +DI above -DI
    TrendBull,
    /// Strong trend with -DI above +DI
    TrendBear,
    /// Trend strength building but below the trend threshold
    BreakoutSetup,
    /// No directional bias (default state)
    Ranging,
    /// Volatility far above its baseline, overrides everything else
    HighVolatility,
}

impl MarketRegime {
    pub fn is_trending(&self) -> bool {
        matches!(self, Self::TrendBull | Self::TrendBear)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrendBull => "TREND_BULL",
            Self::TrendBear => "TREND_BEAR",
            Self::BreakoutSetup => "BREAKOUT_SETUP",
            Self::Ranging => "RANGING",
            Self::HighVolatility => "HIGH_VOLATILITY",
        }
    }
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self::Ranging
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable classification result, replaced wholesale on each refresh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: MarketRegime,
    /// Always within [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Trend strength on the operating timeframe
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub adx_tertiary: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub atr_current: f64,
    pub atr_average: f64,
}

impl RegimeSnapshot {
    /// Snapshot used before the first successful classification
    pub fn initial(timestamp: DateTime<Utc>) -> Self {
        Self {
            regime: MarketRegime::Ranging,
            confidence: 0.0,
            timestamp,
            adx_primary: 0.0,
            adx_secondary: 0.0,
            adx_tertiary: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
            atr_current: 0.0,
            atr_average: 0.0,
        }
    }

    pub fn is_trending(&self) -> bool {
        self.regime.is_trending()
    }

    pub fn is_ranging(&self) -> bool {
        self.regime == MarketRegime::Ranging
    }

    pub fn is_breakout_setup(&self) -> bool {
        self.regime == MarketRegime::BreakoutSetup
    }

    pub fn is_high_volatility(&self) -> bool {
        self.regime == MarketRegime::HighVolatility
    }

    /// Current ATR over its baseline, 0 when the baseline is unknown
    pub fn volatility_ratio(&self) -> f64 {
        if self.atr_average > 0.0 {
            self.atr_current / self.atr_average
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot_is_ranging() {
        let snapshot = RegimeSnapshot::initial(Utc::now());
        assert_eq!(snapshot.regime, MarketRegime::Ranging);
        assert!(snapshot.is_ranging());
        assert_eq!(snapshot.confidence, 0.0);
        assert_eq!(snapshot.volatility_ratio(), 0.0);
    }

    #[test]
    fn test_regime_serializes_screaming_case() {
        let json = serde_json::to_string(&MarketRegime::BreakoutSetup).unwrap();
        assert_eq!(json, "\"BREAKOUT_SETUP\"");
        assert_eq!(MarketRegime::HighVolatility.to_string(), "HIGH_VOLATILITY");
    }

    #[test]
    fn test_predicates() {
        let mut snapshot = RegimeSnapshot::initial(Utc::now());
        snapshot.regime = MarketRegime::TrendBear;
        assert!(snapshot.is_trending());
        assert!(!snapshot.is_breakout_setup());
        snapshot.regime = MarketRegime::HighVolatility;
        assert!(snapshot.is_high_volatility());
        assert!(!snapshot.is_trending());
    }
}
