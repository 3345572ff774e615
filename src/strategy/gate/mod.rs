//! Signal Gate
//!
//! Runs the regime-appropriate evaluation chain against the current
//! snapshot. Every reading a chain could use is collected up front, so the
//! decision record is complete even when the first check rejects.
//!
//! - **Trend chain**: confirmation, average alignment, pullback, HTF oscillator, momentum reset
//! - **Breakout chain**: contraction pattern, key level proximity, volume
//! - **Range chain**: range width, absence of trend, oscillator turn at a boundary

mod breakout;
mod range;
pub mod reason;
mod trend;

pub use reason::RejectReason;

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

use crate::domain::key_level::{nearest_resistance_above, nearest_support_below, strongest};
use crate::domain::{
    AccountState, Candle, DecisionDraft, IndicatorReadings, KeyLevel, MarketRegime, Quote,
    RegimeSnapshot, Side, SignalType, SymbolSpec, TradeDecision,
};
use crate::ports::{IndicatorFeed, OscillatorKind, PatternDetector, TrendConfirmation};
use crate::strategy::params::{GateConfig, RegimeConfig};

/// Everything one evaluation looks at besides the feed
#[derive(Debug, Clone)]
pub struct GateInputs<'a> {
    pub spec: &'a SymbolSpec,
    pub snapshot: &'a RegimeSnapshot,
    pub quote: Quote,
    pub account: AccountState,
    pub levels: &'a [KeyLevel],
    pub timestamp: DateTime<Utc>,
}

/// Parameters handed to the order builder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedSignal {
    pub signal_type: SignalType,
    pub side: Side,
    /// Price the entry would fill at now
    pub entry_price: f64,
    /// Volatility unit used for stops and buffers
    pub atr: f64,
    /// Level a breakout is trading through
    pub level: Option<KeyLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Accepted(AcceptedSignal),
    Rejected(RejectReason),
}

/// Verdict plus the decision draft carrying every reading
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: GateVerdict,
    pub draft: DecisionDraft,
}

impl Evaluation {
    pub fn is_accepted(&self) -> bool {
        matches!(self.verdict, GateVerdict::Accepted(_))
    }

    /// Finalize without an order: accepted becomes PASSED, rejected REJECTED
    pub fn into_decision(self) -> TradeDecision {
        match self.verdict {
            GateVerdict::Accepted(_) => self.draft.passed(),
            GateVerdict::Rejected(reason) => self.draft.rejected(reason.code(), reason.to_string()),
        }
    }
}

/// Feed data gathered once per evaluation
#[derive(Debug, Clone, Default)]
pub(crate) struct Observations {
    pub readings: IndicatorReadings,
    /// Primary timeframe bars, newest first
    pub bars: Vec<Candle>,
    /// Primary timeframe ATR values, newest first
    pub atr_series: Vec<f64>,
}

/// Shared view handed to each chain
pub(crate) struct ChainInput<'a> {
    pub gate: &'a GateConfig,
    pub regime: &'a RegimeConfig,
    pub snapshot: &'a RegimeSnapshot,
    pub spec: &'a SymbolSpec,
    pub quote: Quote,
    pub levels: &'a [KeyLevel],
    pub obs: &'a Observations,
}

impl ChainInput<'_> {
    pub fn price(&self) -> f64 {
        self.quote.mid()
    }

    pub fn atr(&self) -> Result<f64, RejectReason> {
        let atr = self.snapshot.atr_current;
        if atr > 0.0 && atr.is_finite() {
            Ok(atr)
        } else {
            Err(RejectReason::MissingReading("atr"))
        }
    }

    pub fn pips(&self, distance: f64) -> f64 {
        self.spec.to_pips(distance)
    }
}

pub(crate) fn require(value: Option<f64>, what: &'static str) -> Result<f64, RejectReason> {
    value.ok_or(RejectReason::MissingReading(what))
}

/// Regime-gated entry filter for one instrument
pub struct SignalGate {
    config: GateConfig,
    regime: RegimeConfig,
    confirmation: Option<Box<dyn TrendConfirmation>>,
    pattern: Option<Box<dyn PatternDetector>>,
}

impl SignalGate {
    pub fn new(config: GateConfig, regime: RegimeConfig) -> Self {
        Self {
            config,
            regime,
            confirmation: None,
            pattern: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: Box<dyn TrendConfirmation>) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn with_pattern_detector(mut self, pattern: Box<dyn PatternDetector>) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Confirmation is enabled in config but nothing answers it
    pub fn missing_confirmation(&self) -> bool {
        self.config.trend.use_trend_confirmation && self.confirmation.is_none()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Keep the operating timeframes in step with the classifier
    pub fn set_regime_config(&mut self, regime: RegimeConfig) {
        self.regime = regime;
    }

    /// Evaluate the chain selected by the snapshot's regime
    pub fn evaluate<F: IndicatorFeed>(&self, feed: &F, inputs: &GateInputs<'_>) -> Evaluation {
        let snapshot = inputs.snapshot;
        let mut draft = DecisionDraft::start(
            &inputs.spec.symbol,
            snapshot,
            inputs.quote.mid(),
            inputs.account,
            inputs.timestamp,
        );

        let obs = self.observe(feed, inputs);
        draft.set_readings(obs.readings);

        let chain = ChainInput {
            gate: &self.config,
            regime: &self.regime,
            snapshot,
            spec: inputs.spec,
            quote: inputs.quote,
            levels: inputs.levels,
            obs: &obs,
        };

        let (signal_type, side) = match snapshot.regime {
            MarketRegime::TrendBull => (SignalType::Trend, Some(Side::Long)),
            MarketRegime::TrendBear => (SignalType::Trend, Some(Side::Short)),
            MarketRegime::BreakoutSetup => (SignalType::Breakout, None),
            MarketRegime::Ranging => (SignalType::Range, None),
            MarketRegime::HighVolatility => (SignalType::None, None),
        };
        draft.set_signal(signal_type, side);

        let result = self.pre_checks(snapshot, &inputs.account).and_then(|()| match snapshot.regime {
            MarketRegime::TrendBull => {
                trend::evaluate(&chain, self.confirmation.as_deref(), Side::Long)
            }
            MarketRegime::TrendBear => {
                trend::evaluate(&chain, self.confirmation.as_deref(), Side::Short)
            }
            MarketRegime::BreakoutSetup => breakout::evaluate(&chain, self.pattern.as_deref()),
            MarketRegime::Ranging => range::evaluate(&chain),
            MarketRegime::HighVolatility => Err(RejectReason::HighVolatility {
                ratio: snapshot.volatility_ratio(),
            }),
        });

        let verdict = match result {
            Ok(signal) => {
                draft.set_signal(signal.signal_type, Some(signal.side));
                GateVerdict::Accepted(signal)
            }
            Err(reason) => {
                tracing::debug!(
                    "{} {} chain rejected [{}]: {}",
                    inputs.spec.symbol,
                    signal_type,
                    reason.code(),
                    reason
                );
                GateVerdict::Rejected(reason)
            }
        };

        Evaluation { verdict, draft }
    }

    /// Checks shared by every chain
    fn pre_checks(&self, snapshot: &RegimeSnapshot, account: &AccountState) -> Result<(), RejectReason> {
        if snapshot.regime == MarketRegime::HighVolatility {
            return Ok(());
        }
        let minimum = self.config.min_confidence_for(snapshot.regime);
        if snapshot.confidence < minimum {
            return Err(RejectReason::LowConfidence {
                confidence: snapshot.confidence,
                minimum,
            });
        }
        if account.open_positions >= self.config.max_open_positions {
            return Err(RejectReason::MaxPositions {
                open: account.open_positions,
                max: self.config.max_open_positions,
            });
        }
        Ok(())
    }

    /// Read every indicator any chain might use. Unavailable values stay `None`.
    fn observe<F: IndicatorFeed>(&self, feed: &F, inputs: &GateInputs<'_>) -> Observations {
        let [primary, secondary, tertiary] = self.regime.timeframes();
        let trend = &self.config.trend;
        let breakout = &self.config.breakout;
        let range = &self.config.range;
        let price = inputs.quote.mid();

        let ema = |tf, period| feed.moving_average(tf, period, 0).ok();
        let osc = |kind, tf, period, shift| feed.oscillator(kind, tf, period, shift).ok();

        let bar_count = breakout.narrow_range_bars.max(breakout.volume_lookback + 1);
        let bars = feed.bars(primary, bar_count).unwrap_or_default();
        let atr_series = feed
            .volatility_series(primary, self.regime.atr_period, breakout.atr_expansion_lookback + 1)
            .unwrap_or_default();

        let volume = bars.first().map(|bar| bar.volume);
        let history: Vec<f64> = bars
            .iter()
            .skip(1)
            .take(breakout.volume_lookback)
            .map(|bar| bar.volume)
            .collect();
        let volume_average = (!history.is_empty()).then(|| history.iter().mean());

        let readings = IndicatorReadings {
            ema_pullback: ema(primary, trend.pullback_ema_period),
            ema_medium_primary: ema(primary, trend.medium_ema_period),
            ema_slow_primary: ema(primary, trend.slow_ema_period),
            ema_medium_secondary: ema(secondary, trend.medium_ema_period),
            ema_slow_secondary: ema(secondary, trend.slow_ema_period),
            momentum: osc(OscillatorKind::Rsi, primary, trend.momentum_period, 0),
            momentum_previous: osc(OscillatorKind::Rsi, primary, trend.momentum_period, 1),
            htf_oscillator_secondary: osc(OscillatorKind::Rsi, secondary, trend.htf_oscillator_period, 0),
            htf_oscillator_tertiary: osc(OscillatorKind::Rsi, tertiary, trend.htf_oscillator_period, 0),
            range_oscillator: osc(range.oscillator, primary, range.oscillator_period, 0),
            range_oscillator_previous: osc(range.oscillator, primary, range.oscillator_period, 1),
            volume,
            volume_average,
            spread: Some(inputs.quote.spread()),
            nearest_resistance: nearest_resistance_above(inputs.levels, price).map(|l| l.price),
            nearest_support: nearest_support_below(inputs.levels, price).map(|l| l.price),
            strongest_level: strongest(inputs.levels).map(|l| l.price),
        };

        Observations {
            readings,
            bars,
            atr_series,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::Timeframe;
    use crate::ports::mocks::ScriptedFeed;

    pub fn spec() -> SymbolSpec {
        SymbolSpec {
            symbol: "EURUSD".to_string(),
            point: 0.00001,
            digits: 5,
            pip_size: 0.0001,
            volume_min: 0.01,
            volume_max: 50.0,
            volume_step: 0.01,
            stops_level_points: 10,
            duplicate_tolerance_points: 5,
        }
    }

    pub fn snapshot(regime: MarketRegime) -> RegimeSnapshot {
        RegimeSnapshot {
            regime,
            confidence: 0.8,
            timestamp: Utc::now(),
            adx_primary: 30.0,
            adx_secondary: 26.0,
            adx_tertiary: 21.0,
            plus_di: 28.0,
            minus_di: 14.0,
            atr_current: 0.0020,
            atr_average: 0.0018,
        }
    }

    pub fn account() -> AccountState {
        AccountState { balance: 10_000.0, equity: 10_000.0, open_positions: 0 }
    }

    pub fn quote(bid: f64, ask: f64) -> Quote {
        Quote { bid, ask, time: 0 }
    }

    /// Bars with unit range except for the ones overridden by the caller
    pub fn flat_bars(count: usize, volume: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle::new(-(i as i64) * 3600, 1.1000, 1.1010, 1.0990, 1.1000, volume))
            .collect()
    }

    /// Feed where a bullish trend entry passes every check
    pub fn bullish_trend_feed() -> ScriptedFeed {
        ScriptedFeed::new()
            .with_average(Timeframe::H1, 20, vec![1.0995])
            .with_average(Timeframe::H1, 50, vec![1.0980])
            .with_average(Timeframe::H1, 200, vec![1.0900])
            .with_average(Timeframe::H4, 50, vec![1.0950])
            .with_average(Timeframe::H4, 200, vec![1.0850])
            .with_oscillator(OscillatorKind::Rsi, Timeframe::H1, vec![52.0, 48.0])
            .with_oscillator(OscillatorKind::Rsi, Timeframe::H4, vec![55.0])
            .with_oscillator(OscillatorKind::Rsi, Timeframe::D1, vec![50.0])
            .with_bars(Timeframe::H1, flat_bars(25, 1000.0))
            .with_quote(1.1000, 1.1002)
    }

    pub fn gate() -> SignalGate {
        SignalGate::new(GateConfig::default(), RegimeConfig::default())
    }

    pub fn inputs<'a>(
        spec: &'a SymbolSpec,
        snapshot: &'a RegimeSnapshot,
        quote: Quote,
        levels: &'a [KeyLevel],
    ) -> GateInputs<'a> {
        GateInputs {
            spec,
            snapshot,
            quote,
            account: account(),
            levels,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::domain::DecisionOutcome;
    use crate::ports::mocks::ScriptedFeed;

    #[test]
    fn test_high_volatility_rejects_without_chain() {
        let spec = spec();
        let mut snap = snapshot(MarketRegime::HighVolatility);
        snap.atr_current = 0.0050;
        snap.atr_average = 0.0020;
        let eval = gate().evaluate(&bullish_trend_feed(), &inputs(&spec, &snap, quote(1.1, 1.1002), &[]));

        match &eval.verdict {
            GateVerdict::Rejected(RejectReason::HighVolatility { ratio }) => {
                approx::assert_relative_eq!(*ratio, 2.5, epsilon = 1e-9)
            }
            other => panic!("unexpected verdict {:?}", other),
        }
        let decision = eval.into_decision();
        assert_eq!(decision.signal_type, SignalType::None);
        assert_eq!(decision.reason_code.as_deref(), Some("high_volatility"));
    }

    #[test]
    fn test_low_confidence_rejected_before_chain() {
        let spec = spec();
        let mut snap = snapshot(MarketRegime::TrendBull);
        snap.confidence = 0.3;
        let eval = gate().evaluate(&bullish_trend_feed(), &inputs(&spec, &snap, quote(1.1, 1.1002), &[]));
        assert!(matches!(eval.verdict, GateVerdict::Rejected(RejectReason::LowConfidence { .. })));
    }

    #[test]
    fn test_max_open_positions() {
        let spec = spec();
        let snap = snapshot(MarketRegime::TrendBull);
        let mut gate_inputs = inputs(&spec, &snap, quote(1.1, 1.1002), &[]);
        gate_inputs.account.open_positions = 3;
        let eval = gate().evaluate(&bullish_trend_feed(), &gate_inputs);
        assert_eq!(
            eval.verdict,
            GateVerdict::Rejected(RejectReason::MaxPositions { open: 3, max: 3 })
        );
    }

    #[test]
    fn test_rejected_decision_still_carries_all_readings() {
        let spec = spec();
        let snap = snapshot(MarketRegime::TrendBull);
        // Secondary averages missing: the chain stops at alignment
        let feed = ScriptedFeed::new()
            .with_average(crate::domain::Timeframe::H1, 20, vec![1.0995])
            .with_oscillator(OscillatorKind::Rsi, crate::domain::Timeframe::H1, vec![52.0, 48.0])
            .with_bars(crate::domain::Timeframe::H1, flat_bars(25, 1000.0));
        let levels = [KeyLevel::resistance(1.1050, 0.8, 3), KeyLevel::support(1.0950, 0.6, 2)];
        let decision = gate()
            .evaluate(&feed, &inputs(&spec, &snap, quote(1.1000, 1.1002), &levels))
            .into_decision();

        assert_eq!(decision.outcome, DecisionOutcome::Rejected);
        assert_eq!(decision.reason_code.as_deref(), Some("missing_reading"));
        assert_eq!(decision.readings.momentum, Some(52.0));
        assert_eq!(decision.readings.momentum_previous, Some(48.0));
        assert_eq!(decision.readings.range_oscillator, Some(52.0));
        assert_eq!(decision.readings.volume, Some(1000.0));
        assert_eq!(decision.readings.nearest_resistance, Some(1.1050));
        assert_eq!(decision.readings.nearest_support, Some(1.0950));
        assert_eq!(decision.readings.strongest_level, Some(1.1050));
        assert!(decision.readings.ema_slow_secondary.is_none());
        // Mandatory fields
        assert_eq!(decision.market.adx_tertiary, 21.0);
        assert_eq!(decision.market.atr, 0.0020);
        assert_eq!(decision.account.equity, 10_000.0);
        assert_eq!(decision.symbol, "EURUSD");
    }

    #[test]
    fn test_accepted_evaluation_passes() {
        let spec = spec();
        let snap = snapshot(MarketRegime::TrendBull);
        let eval = gate().evaluate(&bullish_trend_feed(), &inputs(&spec, &snap, quote(1.1000, 1.1002), &[]));
        assert!(eval.is_accepted());

        let decision = eval.into_decision();
        assert_eq!(decision.outcome, DecisionOutcome::Passed);
        assert_eq!(decision.side, Some(Side::Long));
        assert_eq!(decision.signal_type, SignalType::Trend);
    }
}
