//! Indicator feed port
//!
//! Supplies trend-strength, directional-movement, volatility, oscillator and
//! moving-average readings per timeframe. Every series-style accessor uses
//! `shift` the way chart buffers do: 0 is the most recent completed bar,
//! 1 the bar before it, and so on.

use thiserror::Error;

use crate::domain::{Candle, Quote, Timeframe};

/// Feed failure modes
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// Subscription exists but has not warmed up yet
    #[error("Indicator not ready: {0}")]
    NotReady(String),

    /// Genuine fetch failure
    #[error("Indicator fetch failed: {0}")]
    Unavailable(String),

    /// Handle invalidated (e.g. by a timeframe change) and must be re-acquired
    #[error("Indicator handle is stale: {0}")]
    Stale(String),
}

impl FeedError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, FeedError::NotReady(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FeedError::Stale(_))
    }

    /// Grouping key for decision records
    pub fn code(&self) -> &'static str {
        match self {
            FeedError::NotReady(_) => "feed_not_ready",
            FeedError::Unavailable(_) => "feed_unavailable",
            FeedError::Stale(_) => "feed_stale",
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Oscillator families the gate can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OscillatorKind {
    /// Relative strength index, 0-100
    Rsi,
    /// Stochastic %K, 0-100
    Stochastic,
}

/// Streaming indicator source for a single instrument
pub trait IndicatorFeed: Send {
    /// Acquire indicator handles for `timeframes`
    fn subscribe(&mut self, timeframes: &[Timeframe]) -> FeedResult<()>;

    /// Release every handle held by the feed
    fn release(&mut self);

    /// ADX on `timeframe`
    fn trend_strength(&self, timeframe: Timeframe) -> FeedResult<f64>;

    /// (+DI, -DI) on `timeframe`
    fn directional_components(&self, timeframe: Timeframe) -> FeedResult<(f64, f64)>;

    /// ATR(period) on `timeframe`
    fn volatility(&self, timeframe: Timeframe, period: usize) -> FeedResult<f64>;

    /// Last `count` ATR(period) values, newest first
    fn volatility_series(&self, timeframe: Timeframe, period: usize, count: usize) -> FeedResult<Vec<f64>>;

    fn oscillator(&self, kind: OscillatorKind, timeframe: Timeframe, period: usize, shift: usize) -> FeedResult<f64>;

    /// Exponential moving average of closes
    fn moving_average(&self, timeframe: Timeframe, period: usize, shift: usize) -> FeedResult<f64>;

    /// Last `count` completed bars, newest first
    fn bars(&self, timeframe: Timeframe, count: usize) -> FeedResult<Vec<Candle>>;

    fn quote(&self) -> FeedResult<Quote>;
}
