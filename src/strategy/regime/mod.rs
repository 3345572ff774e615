//! Market Regime Classification
//!
//! Fuses trend-strength, directional-movement and volatility readings from
//! three timeframes into one of five regimes plus a confidence score.
//!
//! - **Scoring**: volatility gate, adaptive thresholds, confidence
//! - **Feed state**: NotReady / Ready / Stale readiness machine + log throttle
//! - **ATR**: fallback volatility computed from raw bars

pub mod atr;
pub mod feed_state;
pub mod scoring;

pub use feed_state::{FeedEvent, FeedState, LogThrottle};
pub use scoring::RegimeInputs;

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use std::time::Duration;

use crate::domain::{RegimeSnapshot, RetryPolicy, Timeframe};
use crate::ports::{FeedError, FeedResult, IndicatorFeed};
use crate::strategy::params::{ParamError, RegimeConfig};

/// Outcome of one pass over every reading the classifier needs
#[derive(Debug, Default)]
struct ReadPass {
    inputs: RegimeInputs,
    /// Every reading came back from the feed itself
    complete: bool,
    /// At least one handle reported itself invalidated
    stale: bool,
}

/// Regime classifier for one instrument.
///
/// Owns the instrument's feed subscriptions and the current snapshot. All
/// refreshing methods take `&mut self`, so only one refresh can be in
/// flight at a time.
pub struct RegimeClassifier<F: IndicatorFeed> {
    symbol: String,
    feed: F,
    config: RegimeConfig,
    state: FeedState,
    snapshot: RegimeSnapshot,
    throttle: LogThrottle,
}

impl<F: IndicatorFeed> RegimeClassifier<F> {
    /// Validate `config` and acquire feed handles for its timeframes.
    ///
    /// A failed subscription is not fatal: the classifier starts `Stale` and
    /// re-acquires on the next refresh.
    pub fn new(symbol: impl Into<String>, feed: F, config: RegimeConfig) -> Result<Self, ParamError> {
        config.validate()?;
        let throttle = LogThrottle::new(Duration::from_secs(config.feed_log_cooldown_secs));
        let mut classifier = Self {
            symbol: symbol.into(),
            feed,
            config,
            state: FeedState::Stale,
            snapshot: RegimeSnapshot::initial(Utc::now()),
            throttle,
        };
        classifier.acquire();
        Ok(classifier)
    }

    /// Refresh and return the current regime
    pub fn detect_current_regime(&mut self) -> RegimeSnapshot {
        self.detect_at(Utc::now())
    }

    /// Refresh using `now` as the snapshot timestamp
    pub fn detect_at(&mut self, now: DateTime<Utc>) -> RegimeSnapshot {
        if self.state.is_stale() {
            self.acquire();
        }

        let mut pass = self.read_all();
        if pass.stale {
            // One re-acquire per refresh; a second stale pass degrades to zeros
            self.state = self.state.on(FeedEvent::HandleInvalidated);
            self.acquire();
            pass = self.read_all();
            if pass.stale {
                self.state = self.state.on(FeedEvent::HandleInvalidated);
            }
        }

        if !pass.stale {
            let event = if pass.complete { FeedEvent::ReadingOk } else { FeedEvent::NotReady };
            self.state = self.state.on(event);
        }

        let inputs = pass.inputs;
        let regime = scoring::classify(&inputs, &self.config);
        let confidence = scoring::confidence(&inputs, regime, &self.config);

        self.snapshot = RegimeSnapshot {
            regime,
            confidence,
            timestamp: now,
            adx_primary: inputs.adx_primary,
            adx_secondary: inputs.adx_secondary,
            adx_tertiary: inputs.adx_tertiary,
            plus_di: inputs.plus_di,
            minus_di: inputs.minus_di,
            atr_current: inputs.atr_current,
            atr_average: inputs.atr_average,
        };

        tracing::debug!(
            "{} regime {} (confidence {:.2}, adx {:.1}/{:.1}/{:.1}, atr {:.5}/{:.5})",
            self.symbol,
            regime,
            confidence,
            inputs.adx_primary,
            inputs.adx_secondary,
            inputs.adx_tertiary,
            inputs.atr_current,
            inputs.atr_average
        );

        self.snapshot
    }

    /// Cached snapshot from the last refresh. Never touches the feed.
    pub fn get_last_snapshot(&self) -> RegimeSnapshot {
        self.snapshot
    }

    pub fn is_trending(&self) -> bool {
        self.snapshot.is_trending()
    }

    pub fn is_ranging(&self) -> bool {
        self.snapshot.is_ranging()
    }

    pub fn is_breakout_setup(&self) -> bool {
        self.snapshot.is_breakout_setup()
    }

    pub fn is_high_volatility(&self) -> bool {
        self.snapshot.is_high_volatility()
    }

    pub fn feed_state(&self) -> FeedState {
        self.state
    }

    /// Non-blocking readiness check on the primary timeframe
    pub fn poll_readiness(&mut self) -> FeedState {
        if self.state.is_stale() {
            self.acquire();
        }
        if self.state.is_stale() {
            return self.state;
        }

        let event = match self.feed.trend_strength(self.config.primary) {
            Ok(_) => FeedEvent::ReadingOk,
            Err(FeedError::Stale(_)) => FeedEvent::HandleInvalidated,
            Err(_) => FeedEvent::NotReady,
        };
        self.state = self.state.on(event);
        self.state
    }

    /// Poll until ready or the retry budget runs out
    pub async fn wait_until_ready(&mut self, policy: &RetryPolicy) -> bool {
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            if self.poll_readiness().is_ready() {
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(policy.delay()).await;
            }
        }
        tracing::warn!(
            "{} feed not ready after {} attempts (state {:?})",
            self.symbol,
            attempts,
            self.state
        );
        false
    }

    /// Switch timeframes, releasing the old handles and acquiring new ones
    pub fn change_timeframes(
        &mut self,
        primary: Timeframe,
        secondary: Timeframe,
        tertiary: Timeframe,
    ) -> Result<(), ParamError> {
        let mut config = self.config.clone();
        config.primary = primary;
        config.secondary = secondary;
        config.tertiary = tertiary;
        config.validate()?;

        self.feed.release();
        self.state = self.state.on(FeedEvent::TimeframeChanged);
        self.config = config;
        tracing::info!(
            "{} timeframes changed to {}/{}/{}",
            self.symbol,
            primary,
            secondary,
            tertiary
        );
        self.acquire();
        Ok(())
    }

    /// Release every feed handle
    pub fn shutdown(&mut self) {
        self.feed.release();
        self.state = self.state.on(FeedEvent::Released);
        tracing::info!("{} regime classifier released feed handles", self.symbol);
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    fn acquire(&mut self) {
        match self.feed.subscribe(&self.config.timeframes()) {
            Ok(()) => {
                self.state = self.state.on(FeedEvent::Subscribed);
            }
            Err(e) => {
                self.state = self.state.on(FeedEvent::SubscriptionFailed);
                self.log_feed_problem("subscribe", &e);
            }
        }
    }

    fn read_all(&mut self) -> ReadPass {
        let [primary, secondary, tertiary] = self.config.timeframes();
        let mut pass = ReadPass {
            complete: true,
            ..ReadPass::default()
        };

        let adx_primary = self.feed.trend_strength(primary);
        pass.inputs.adx_primary = self.take(&mut pass, "adx primary", adx_primary);
        let adx_secondary = self.feed.trend_strength(secondary);
        pass.inputs.adx_secondary = self.take(&mut pass, "adx secondary", adx_secondary);
        let adx_tertiary = self.feed.trend_strength(tertiary);
        pass.inputs.adx_tertiary = self.take(&mut pass, "adx tertiary", adx_tertiary);

        let di = self.feed.directional_components(primary);
        let (plus_di, minus_di) = self.take(&mut pass, "directional", di);
        pass.inputs.plus_di = plus_di;
        pass.inputs.minus_di = minus_di;

        pass.inputs.atr_current = self.current_volatility(&mut pass);
        pass.inputs.atr_average = self.average_volatility(&mut pass);

        pass
    }

    /// Feed ATR, or the bar-based estimate when the feed has nothing usable
    fn current_volatility(&mut self, pass: &mut ReadPass) -> f64 {
        let primary = self.config.primary;
        let period = self.config.atr_period;

        match self.feed.volatility(primary, period) {
            Ok(atr) if atr > 0.0 && atr.is_finite() => return atr,
            Ok(_) => {}
            Err(e) => self.note_error(pass, "atr", &e),
        }

        let bars = self.feed.bars(primary, period + 1);
        self.fallback_atr(pass, "atr bars", bars, period)
    }

    /// Mean of the recent ATR series, or a long bar-based estimate
    fn average_volatility(&mut self, pass: &mut ReadPass) -> f64 {
        let primary = self.config.primary;
        let period = self.config.atr_period;
        let window = self.config.atr_average_period;

        match self.feed.volatility_series(primary, period, window) {
            Ok(series) => {
                let usable: Vec<f64> = series
                    .into_iter()
                    .filter(|v| *v > 0.0 && v.is_finite())
                    .collect();
                if !usable.is_empty() {
                    return usable.iter().mean();
                }
            }
            Err(e) => self.note_error(pass, "atr average", &e),
        }

        let bars = self.feed.bars(primary, window + 1);
        self.fallback_atr(pass, "atr average bars", bars, window)
    }

    fn fallback_atr(
        &mut self,
        pass: &mut ReadPass,
        key: &str,
        bars: FeedResult<Vec<crate::domain::Candle>>,
        period: usize,
    ) -> f64 {
        match bars {
            Ok(bars) => atr::average_true_range(&bars, period).unwrap_or(0.0),
            Err(e) => {
                self.note_error(pass, key, &e);
                0.0
            }
        }
    }

    /// Unwrap a reading, degrading to zero and recording why
    fn take<T: Default>(&mut self, pass: &mut ReadPass, key: &str, result: FeedResult<T>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                self.note_error(pass, key, &e);
                T::default()
            }
        }
    }

    fn note_error(&mut self, pass: &mut ReadPass, key: &str, error: &FeedError) {
        pass.complete = false;
        if error.is_stale() {
            pass.stale = true;
        }
        self.log_feed_problem(key, error);
    }

    fn log_feed_problem(&mut self, key: &str, error: &FeedError) {
        let throttle_key = format!("{}:{}", self.symbol, key);
        if self.throttle.allow(&throttle_key) {
            tracing::warn!("{} {} unavailable, using zero: {}", self.symbol, key, error);
        }
    }
}
