//! Regime classification and confidence scoring
//!
//! Pure functions over one set of readings. Missing readings have already
//! been replaced by zeros by the time they arrive here.

use crate::domain::MarketRegime;
use crate::strategy::params::RegimeConfig;

/// Fused readings for one classification
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegimeInputs {
    pub adx_primary: f64,
    pub adx_secondary: f64,
    pub adx_tertiary: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub atr_current: f64,
    pub atr_average: f64,
}

/// Volatility gate. An unknown (zero) baseline never triggers it.
pub fn is_high_volatility(inputs: &RegimeInputs, config: &RegimeConfig) -> bool {
    inputs.atr_average > 0.0
        && inputs.atr_current >= inputs.atr_average * config.high_volatility_multiplier
}

pub fn classify(inputs: &RegimeInputs, config: &RegimeConfig) -> MarketRegime {
    if is_high_volatility(inputs, config) {
        return MarketRegime::HighVolatility;
    }

    let trend_threshold = config.scaled_trend_threshold();
    let breakout_threshold = config.scaled_breakout_threshold();
    let adx = inputs.adx_primary;

    if adx >= trend_threshold {
        if inputs.plus_di > inputs.minus_di {
            MarketRegime::TrendBull
        } else {
            MarketRegime::TrendBear
        }
    } else if adx >= breakout_threshold {
        MarketRegime::BreakoutSetup
    } else {
        MarketRegime::Ranging
    }
}

/// Heuristic confidence in [0, 1]
pub fn confidence(inputs: &RegimeInputs, regime: MarketRegime, config: &RegimeConfig) -> f64 {
    let mut score = config.confidence_base;

    let normalized = (inputs.adx_primary / config.adx_normalizer).clamp(0.0, 1.0);
    score += config.confidence_trend_weight * normalized;

    score += alignment_bonus(inputs, config);

    if regime.is_trending() {
        let gap = (inputs.plus_di - inputs.minus_di).abs();
        score += (gap * config.separation_scale).min(config.separation_cap);
    }

    score += config.confidence_bias.get(config.primary);

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Bonus for each adjacent timeframe pair that both show a minor trend
fn alignment_bonus(inputs: &RegimeInputs, config: &RegimeConfig) -> f64 {
    let weight = if config.primary.is_daily_or_slower() {
        config.alignment_weight_slow
    } else {
        config.alignment_weight_fast
    };
    let floor = config.alignment_adx_floor;

    [
        (inputs.adx_primary, inputs.adx_secondary),
        (inputs.adx_secondary, inputs.adx_tertiary),
    ]
    .iter()
    .filter(|(a, b)| *a > floor && *b > floor)
    .count() as f64
        * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use approx::assert_relative_eq;

    fn inputs(adx: f64, plus: f64, minus: f64) -> RegimeInputs {
        RegimeInputs {
            adx_primary: adx,
            adx_secondary: 0.0,
            adx_tertiary: 0.0,
            plus_di: plus,
            minus_di: minus,
            atr_current: 10.0,
            atr_average: 10.0,
        }
    }

    #[test]
    fn test_volatility_gate_scenario() {
        let config = RegimeConfig::default();
        let mut readings = inputs(45.0, 35.0, 10.0);
        readings.atr_current = 30.0;
        readings.atr_average = 10.0;
        assert_eq!(classify(&readings, &config), MarketRegime::HighVolatility);
    }

    #[test]
    fn test_volatility_gate_overrides_any_trend_strength() {
        let config = RegimeConfig::default();
        for adx in [0.0, 15.0, 22.0, 28.0, 60.0, 100.0] {
            for ratio in [2.0, 2.5, 5.0] {
                let mut readings = inputs(adx, 30.0, 15.0);
                readings.atr_average = 0.001;
                readings.atr_current = 0.001 * ratio;
                assert_eq!(classify(&readings, &config), MarketRegime::HighVolatility);
            }
        }
    }

    #[test]
    fn test_unknown_baseline_never_triggers_gate() {
        let config = RegimeConfig::default();
        let mut readings = inputs(10.0, 0.0, 0.0);
        readings.atr_current = 0.0;
        readings.atr_average = 0.0;
        assert_eq!(classify(&readings, &config), MarketRegime::Ranging);
    }

    #[test]
    fn test_trend_bull_scenario() {
        // H1: scaled trend threshold 25
        let config = RegimeConfig::default();
        assert_eq!(classify(&inputs(28.0, 30.0, 15.0), &config), MarketRegime::TrendBull);
    }

    #[test]
    fn test_trend_bear_when_minus_dominates() {
        let config = RegimeConfig::default();
        assert_eq!(classify(&inputs(28.0, 12.0, 26.0), &config), MarketRegime::TrendBear);
    }

    #[test]
    fn test_breakout_setup_scenario() {
        // H1: breakout minimum 20, trend threshold 25
        let config = RegimeConfig::default();
        assert_eq!(classify(&inputs(22.0, 20.0, 18.0), &config), MarketRegime::BreakoutSetup);
    }

    #[test]
    fn test_ranging_below_breakout_minimum() {
        let config = RegimeConfig::default();
        assert_eq!(classify(&inputs(12.0, 20.0, 18.0), &config), MarketRegime::Ranging);
    }

    #[test]
    fn test_same_reading_reads_differently_by_timeframe() {
        // 23 ADX trends on M1 (threshold 21) but is only a setup on H1 (25)
        let mut config = RegimeConfig::default();
        config.primary = Timeframe::M1;
        config.secondary = Timeframe::M5;
        config.tertiary = Timeframe::M15;
        assert_eq!(classify(&inputs(23.0, 25.0, 10.0), &config), MarketRegime::TrendBull);

        let config = RegimeConfig::default();
        assert_eq!(classify(&inputs(23.0, 25.0, 10.0), &config), MarketRegime::BreakoutSetup);
    }

    #[test]
    fn test_confidence_components() {
        let config = RegimeConfig::default();
        let mut readings = inputs(25.0, 30.0, 15.0);
        readings.adx_secondary = 24.0;
        readings.adx_tertiary = 18.0;

        // 0.4 base + 0.4 * 0.5 + one aligned pair 0.15 + separation 0.15 + H1 bias 0
        let score = confidence(&readings, MarketRegime::TrendBull, &config);
        assert_relative_eq!(score, 0.4 + 0.2 + 0.15 + 0.15, epsilon = 1e-9);

        // Separation bonus is for trending regimes only
        let score = confidence(&readings, MarketRegime::BreakoutSetup, &config);
        assert_relative_eq!(score, 0.4 + 0.2 + 0.15, epsilon = 1e-9);
    }

    #[test]
    fn test_alignment_weight_heavier_on_daily() {
        let mut config = RegimeConfig::default();
        config.primary = Timeframe::D1;
        config.secondary = Timeframe::W1;
        config.tertiary = Timeframe::MN1;
        let mut readings = inputs(0.0, 0.0, 0.0);
        readings.adx_primary = 21.0;
        readings.adx_secondary = 21.0;
        readings.adx_tertiary = 21.0;

        // 0.4 + 0.4 * 0.42 + 2 * 0.20 + D1 bias 0.05, clamped
        let score = confidence(&readings, MarketRegime::BreakoutSetup, &config);
        assert_relative_eq!(score, 1.0, epsilon = 1e-9);

        config.primary = Timeframe::H1;
        config.secondary = Timeframe::H4;
        config.tertiary = Timeframe::D1;
        let score = confidence(&readings, MarketRegime::BreakoutSetup, &config);
        assert_relative_eq!(score, 0.4 + 0.4 * 0.42 + 0.30, epsilon = 1e-9);
    }

    #[test]
    fn test_confidence_always_clamped() {
        let config_fast = RegimeConfig {
            primary: Timeframe::M1,
            secondary: Timeframe::M5,
            tertiary: Timeframe::M15,
            ..RegimeConfig::default()
        };
        let config_slow = RegimeConfig {
            primary: Timeframe::D1,
            secondary: Timeframe::W1,
            tertiary: Timeframe::MN1,
            ..RegimeConfig::default()
        };
        let values = [0.0, 5.0, 19.9, 20.1, 35.0, 60.0, 100.0];
        let regimes = [
            MarketRegime::TrendBull,
            MarketRegime::TrendBear,
            MarketRegime::BreakoutSetup,
            MarketRegime::Ranging,
            MarketRegime::HighVolatility,
        ];
        for config in [&config_fast, &config_slow] {
            for &a in &values {
                for &b in &values {
                    for &plus in &[0.0, 50.0, 100.0] {
                        for regime in regimes {
                            let readings = RegimeInputs {
                                adx_primary: a,
                                adx_secondary: b,
                                adx_tertiary: a,
                                plus_di: plus,
                                minus_di: 0.0,
                                atr_current: 1.0,
                                atr_average: 1.0,
                            };
                            let score = confidence(&readings, regime, config);
                            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
                        }
                    }
                }
            }
        }
    }
}
