//! Scripted port implementations for tests and dry runs

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::execution::{ExecutionGateway, Fill, GatewayError};
use super::indicator_feed::{FeedError, FeedResult, IndicatorFeed, OscillatorKind};
use super::recorder::{DecisionRecorder, RecorderError};
use super::strategy::{KeyLevelProvider, PatternDetector, TrendConfirmation};
use crate::domain::{
    AccountState, Candle, KeyLevel, OpenPosition, OrderSpec, PendingOrder, Quote, Timeframe,
    TradeDecision,
};

/// Indicator feed answering from preset values.
///
/// Any reading that was never configured reports `NotReady`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    adx: HashMap<Timeframe, f64>,
    di: HashMap<Timeframe, (f64, f64)>,
    atr: HashMap<Timeframe, f64>,
    atr_series: HashMap<Timeframe, Vec<f64>>,
    oscillators: HashMap<(OscillatorKind, Timeframe), Vec<f64>>,
    averages: HashMap<(Timeframe, usize), Vec<f64>>,
    bars: HashMap<Timeframe, Vec<Candle>>,
    quote: Option<Quote>,
    failure: Option<FeedError>,
    subscriptions: Vec<Timeframe>,
    subscribe_count: usize,
    release_count: usize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adx(mut self, timeframe: Timeframe, adx: f64) -> Self {
        self.adx.insert(timeframe, adx);
        self
    }

    pub fn with_di(mut self, timeframe: Timeframe, plus: f64, minus: f64) -> Self {
        self.di.insert(timeframe, (plus, minus));
        self
    }

    /// Current ATR plus the history used for its baseline (newest first)
    pub fn with_atr(mut self, timeframe: Timeframe, current: f64, history: Vec<f64>) -> Self {
        self.atr.insert(timeframe, current);
        self.atr_series.insert(timeframe, history);
        self
    }

    /// Oscillator values by shift (index 0 = latest)
    pub fn with_oscillator(mut self, kind: OscillatorKind, timeframe: Timeframe, values: Vec<f64>) -> Self {
        self.oscillators.insert((kind, timeframe), values);
        self
    }

    pub fn with_average(mut self, timeframe: Timeframe, period: usize, values: Vec<f64>) -> Self {
        self.averages.insert((timeframe, period), values);
        self
    }

    /// Bars newest first
    pub fn with_bars(mut self, timeframe: Timeframe, bars: Vec<Candle>) -> Self {
        self.bars.insert(timeframe, bars);
        self
    }

    pub fn with_quote(mut self, bid: f64, ask: f64) -> Self {
        self.quote = Some(Quote { bid, ask, time: 0 });
        self
    }

    /// Every reading fails with `error`. A `Stale` failure clears on the next subscribe.
    pub fn failing(mut self, error: FeedError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn set_adx(&mut self, timeframe: Timeframe, adx: f64) {
        self.adx.insert(timeframe, adx);
    }

    pub fn set_failure(&mut self, error: Option<FeedError>) {
        self.failure = error;
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count
    }

    pub fn release_count(&self) -> usize {
        self.release_count
    }

    pub fn subscriptions(&self) -> &[Timeframe] {
        &self.subscriptions
    }

    fn check(&self) -> FeedResult<()> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn missing(what: &str, timeframe: Timeframe) -> FeedError {
        FeedError::NotReady(format!("{} {}", what, timeframe))
    }
}

impl IndicatorFeed for ScriptedFeed {
    fn subscribe(&mut self, timeframes: &[Timeframe]) -> FeedResult<()> {
        self.subscribe_count += 1;
        self.subscriptions = timeframes.to_vec();
        if matches!(self.failure, Some(FeedError::Stale(_))) {
            self.failure = None;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.release_count += 1;
        self.subscriptions.clear();
    }

    fn trend_strength(&self, timeframe: Timeframe) -> FeedResult<f64> {
        self.check()?;
        self.adx.get(&timeframe).copied().ok_or_else(|| Self::missing("adx", timeframe))
    }

    fn directional_components(&self, timeframe: Timeframe) -> FeedResult<(f64, f64)> {
        self.check()?;
        self.di.get(&timeframe).copied().ok_or_else(|| Self::missing("di", timeframe))
    }

    fn volatility(&self, timeframe: Timeframe, _period: usize) -> FeedResult<f64> {
        self.check()?;
        self.atr.get(&timeframe).copied().ok_or_else(|| Self::missing("atr", timeframe))
    }

    fn volatility_series(&self, timeframe: Timeframe, _period: usize, count: usize) -> FeedResult<Vec<f64>> {
        self.check()?;
        self.atr_series
            .get(&timeframe)
            .map(|series| series.iter().take(count).copied().collect())
            .ok_or_else(|| Self::missing("atr series", timeframe))
    }

    fn oscillator(&self, kind: OscillatorKind, timeframe: Timeframe, _period: usize, shift: usize) -> FeedResult<f64> {
        self.check()?;
        self.oscillators
            .get(&(kind, timeframe))
            .and_then(|values| values.get(shift).copied())
            .ok_or_else(|| Self::missing("oscillator", timeframe))
    }

    fn moving_average(&self, timeframe: Timeframe, period: usize, shift: usize) -> FeedResult<f64> {
        self.check()?;
        self.averages
            .get(&(timeframe, period))
            .and_then(|values| values.get(shift).copied())
            .ok_or_else(|| Self::missing("moving average", timeframe))
    }

    fn bars(&self, timeframe: Timeframe, count: usize) -> FeedResult<Vec<Candle>> {
        self.check()?;
        self.bars
            .get(&timeframe)
            .map(|bars| bars.iter().take(count).copied().collect())
            .ok_or_else(|| Self::missing("bars", timeframe))
    }

    fn quote(&self) -> FeedResult<Quote> {
        self.check()?;
        self.quote.ok_or_else(|| FeedError::NotReady("quote".to_string()))
    }
}

/// Recorder that keeps decisions in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
    decisions: Arc<Mutex<Vec<TradeDecision>>>,
    fail: bool,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder whose writes always fail
    pub fn broken() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn decisions(&self) -> Vec<TradeDecision> {
        self.decisions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DecisionRecorder for MemoryRecorder {
    fn record(&self, decision: &TradeDecision) -> Result<(), RecorderError> {
        if self.fail {
            return Err(RecorderError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "recorder offline",
            )));
        }
        self.decisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(decision.clone());
        Ok(())
    }
}

/// Fixed key level list
#[derive(Debug, Default, Clone)]
pub struct StaticKeyLevels {
    pub levels: Vec<KeyLevel>,
}

impl StaticKeyLevels {
    pub fn new(levels: Vec<KeyLevel>) -> Self {
        Self { levels }
    }
}

impl KeyLevelProvider for StaticKeyLevels {
    fn key_levels(&self, _symbol: &str) -> Vec<KeyLevel> {
        self.levels.clone()
    }
}

/// Trend confirmation with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation {
    pub bullish: bool,
    pub bearish: bool,
}

impl TrendConfirmation for FixedConfirmation {
    fn is_bullish(&self) -> bool {
        self.bullish
    }

    fn is_bearish(&self) -> bool {
        self.bearish
    }
}

/// Pattern detector with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPattern(pub bool);

impl PatternDetector for FixedPattern {
    fn pattern_detected(&self) -> bool {
        self.0
    }
}

/// Wraps a gateway and fails the next placement/close calls with queued errors
#[derive(Debug)]
pub struct FlakyGateway<G> {
    inner: G,
    errors: Mutex<VecDeque<GatewayError>>,
    attempts: AtomicUsize,
}

impl<G> FlakyGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            errors: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_errors(self, errors: Vec<GatewayError>) -> Self {
        *self.errors.lock().unwrap_or_else(|e| e.into_inner()) = errors.into();
        self
    }

    /// Placement and close attempts seen so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn next_error(&self) -> Option<GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

#[async_trait]
impl<G: ExecutionGateway> ExecutionGateway for FlakyGateway<G> {
    async fn place_market(&self, order: &OrderSpec) -> Result<Fill, GatewayError> {
        match self.next_error() {
            Some(error) => Err(error),
            None => self.inner.place_market(order).await,
        }
    }

    async fn place_pending(&self, order: &OrderSpec) -> Result<Fill, GatewayError> {
        match self.next_error() {
            Some(error) => Err(error),
            None => self.inner.place_pending(order).await,
        }
    }

    async fn cancel_pending(&self, ticket: u64) -> Result<(), GatewayError> {
        self.inner.cancel_pending(ticket).await
    }

    async fn close_position(&self, ticket: u64, volume: f64) -> Result<Fill, GatewayError> {
        match self.next_error() {
            Some(error) => Err(error),
            None => self.inner.close_position(ticket, volume).await,
        }
    }

    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError> {
        self.inner.modify_position(ticket, stop_loss, take_profit).await
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, GatewayError> {
        self.inner.open_positions(symbol).await
    }

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, GatewayError> {
        self.inner.pending_orders(symbol).await
    }

    async fn account(&self) -> Result<AccountState, GatewayError> {
        self.inner.account().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_feed_reports_not_ready_for_missing_values() {
        let feed = ScriptedFeed::new().with_adx(Timeframe::H1, 27.0);
        assert_eq!(feed.trend_strength(Timeframe::H1), Ok(27.0));
        assert!(feed.trend_strength(Timeframe::H4).unwrap_err().is_not_ready());
    }

    #[test]
    fn test_stale_failure_clears_on_subscribe() {
        let mut feed = ScriptedFeed::new()
            .with_adx(Timeframe::H1, 27.0)
            .failing(FeedError::Stale("tf changed".into()));
        assert!(feed.trend_strength(Timeframe::H1).unwrap_err().is_stale());

        feed.subscribe(&[Timeframe::H1]).unwrap();
        assert_eq!(feed.trend_strength(Timeframe::H1), Ok(27.0));
        assert_eq!(feed.subscribe_count(), 1);
    }

    #[test]
    fn test_memory_recorder() {
        let recorder = MemoryRecorder::new();
        assert!(recorder.decisions().is_empty());
        assert!(MemoryRecorder::broken().decisions().is_empty());
    }
}
