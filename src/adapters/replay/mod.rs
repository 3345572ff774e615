//! Replay Adapter - Indicator feed over historical bars
//!
//! Serves the `IndicatorFeed` port from a base-timeframe bar file. A cursor
//! marks how many base bars have "closed"; higher timeframes are aggregated
//! from the visible base bars only, so nothing leaks from the future.

pub mod adx;
pub mod aggregate;
pub mod indicators;
pub mod levels;
pub mod session;

pub use adx::{AdxReading, WilderAdx};
pub use aggregate::BarAggregator;
pub use levels::{SwingConfig, SwingLevels};
pub use session::{classify_bars, run_session, SessionError, SessionOptions, SessionSummary};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{Candle, Quote, Timeframe};
use crate::ports::{FeedError, FeedResult, IndicatorFeed, OscillatorKind};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read bar file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad bar on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Invalid OHLC data on line {0}")]
    InvalidBar(usize),
    #[error("Bar file contains no bars")]
    Empty,
}

/// Replay settings (`[replay]` config section)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Timeframe of the bars in the file
    pub base: Timeframe,
    /// Quoted spread in price units
    pub spread: f64,
    /// ADX / DI period
    pub adx_period: usize,
    /// Bars handed to indicator math, newest end
    pub window: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            base: Timeframe::M15,
            spread: 0.0001,
            adx_period: 14,
            window: 400,
        }
    }
}

/// Load JSON-lines candles (one `{"time":..,"open":..}` object per line), oldest first
pub fn load_bars(path: &Path) -> Result<Vec<Candle>, ReplayError> {
    let content = fs::read_to_string(path)?;
    let mut bars = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bar: Candle = serde_json::from_str(line).map_err(|source| ReplayError::Parse {
            line: index + 1,
            source,
        })?;
        if !bar.is_valid() {
            return Err(ReplayError::InvalidBar(index + 1));
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        return Err(ReplayError::Empty);
    }
    bars.sort_by_key(|bar| bar.time);
    Ok(bars)
}

/// Indicator feed replaying historical bars
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    settings: ReplaySettings,
    bars: Vec<Candle>,
    cursor: usize,
    subscribed: Vec<Timeframe>,
    aggregators: HashMap<Timeframe, BarAggregator>,
    /// Completed candles per subscribed timeframe, oldest first
    series: HashMap<Timeframe, Vec<Candle>>,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Candle>, settings: ReplaySettings) -> Self {
        Self {
            settings,
            bars,
            cursor: 0,
            subscribed: Vec::new(),
            aggregators: HashMap::new(),
            series: HashMap::new(),
        }
    }

    pub fn from_file(path: &Path, settings: ReplaySettings) -> Result<Self, ReplayError> {
        Ok(Self::new(load_bars(path)?, settings))
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Base bars visible so far
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Base bars closed so far, oldest first
    pub fn visible(&self) -> &[Candle] {
        &self.bars[..self.cursor]
    }

    /// Latest closed base bar
    pub fn current_bar(&self) -> Option<&Candle> {
        self.cursor.checked_sub(1).and_then(|i| self.bars.get(i))
    }

    /// Close time of the latest visible base bar (unix seconds)
    pub fn current_time(&self) -> Option<i64> {
        self.current_bar().map(|bar| bar.time + self.settings.base.seconds())
    }

    /// Close the next base bar. Returns false at the end of the data.
    pub fn advance(&mut self) -> bool {
        let Some(bar) = self.bars.get(self.cursor).copied() else {
            return false;
        };
        self.cursor += 1;
        for (timeframe, aggregator) in self.aggregators.iter_mut() {
            let done = aggregator.push(&bar);
            self.series.entry(*timeframe).or_default().extend(done);
        }
        true
    }

    /// Advance until `count` base bars are visible
    pub fn advance_to(&mut self, count: usize) {
        while self.cursor < count && self.advance() {}
    }

    fn rebuild(&mut self) {
        self.aggregators.clear();
        self.series.clear();
        let visible = &self.bars[..self.cursor];
        for &timeframe in &self.subscribed {
            let mut aggregator = BarAggregator::new(self.settings.base, timeframe);
            let completed: Vec<Candle> = visible.iter().flat_map(|bar| aggregator.push(bar)).collect();
            self.aggregators.insert(timeframe, aggregator);
            self.series.insert(timeframe, completed);
        }
    }

    /// Trailing window of completed candles on `timeframe`
    fn window(&self, timeframe: Timeframe, needed: usize) -> FeedResult<&[Candle]> {
        let series = self
            .series
            .get(&timeframe)
            .ok_or_else(|| FeedError::Stale(format!("no handle for {}", timeframe)))?;
        if series.len() < needed {
            return Err(FeedError::NotReady(format!(
                "{}: {} of {} bars",
                timeframe,
                series.len(),
                needed
            )));
        }
        let size = self.settings.window.max(needed);
        let start = series.len().saturating_sub(size);
        Ok(&series[start..])
    }

    fn shifted(series: Vec<f64>, shift: usize, what: &str, timeframe: Timeframe) -> FeedResult<f64> {
        indicators::at_shift(&series, shift)
            .ok_or_else(|| FeedError::NotReady(format!("{} {} shift {}", what, timeframe, shift)))
    }

    fn adx(&self, timeframe: Timeframe) -> FeedResult<AdxReading> {
        let period = self.settings.adx_period;
        let bars = self.window(timeframe, WilderAdx::warmup_bars(period))?;
        Ok(WilderAdx::over(period, bars))
    }
}

impl IndicatorFeed for ReplayFeed {
    fn subscribe(&mut self, timeframes: &[Timeframe]) -> FeedResult<()> {
        if let Some(tf) = timeframes.iter().find(|tf| **tf < self.settings.base) {
            return Err(FeedError::Unavailable(format!(
                "{} is shorter than the {} replay bars",
                tf, self.settings.base
            )));
        }
        self.subscribed = timeframes.to_vec();
        self.rebuild();
        Ok(())
    }

    fn release(&mut self) {
        self.subscribed.clear();
        self.aggregators.clear();
        self.series.clear();
    }

    fn trend_strength(&self, timeframe: Timeframe) -> FeedResult<f64> {
        Ok(self.adx(timeframe)?.adx)
    }

    fn directional_components(&self, timeframe: Timeframe) -> FeedResult<(f64, f64)> {
        let reading = self.adx(timeframe)?;
        Ok((reading.plus_di, reading.minus_di))
    }

    fn volatility(&self, timeframe: Timeframe, period: usize) -> FeedResult<f64> {
        let bars = self.window(timeframe, period + 1)?;
        Self::shifted(indicators::atr(bars, period), 0, "atr", timeframe)
    }

    fn volatility_series(&self, timeframe: Timeframe, period: usize, count: usize) -> FeedResult<Vec<f64>> {
        let bars = self.window(timeframe, period + 1)?;
        let series = indicators::atr(bars, period);
        Ok(series.iter().rev().take(count).copied().collect())
    }

    fn oscillator(&self, kind: OscillatorKind, timeframe: Timeframe, period: usize, shift: usize) -> FeedResult<f64> {
        match kind {
            OscillatorKind::Rsi => {
                let bars = self.window(timeframe, period + 1 + shift)?;
                Self::shifted(indicators::rsi(bars, period), shift, "rsi", timeframe)
            }
            OscillatorKind::Stochastic => {
                let bars = self.window(timeframe, period + shift)?;
                Self::shifted(indicators::stochastic_k(bars, period), shift, "stochastic", timeframe)
            }
        }
    }

    fn moving_average(&self, timeframe: Timeframe, period: usize, shift: usize) -> FeedResult<f64> {
        let bars = self.window(timeframe, period + shift)?;
        Self::shifted(indicators::ema(bars, period), shift, "ema", timeframe)
    }

    fn bars(&self, timeframe: Timeframe, count: usize) -> FeedResult<Vec<Candle>> {
        let series = self
            .series
            .get(&timeframe)
            .ok_or_else(|| FeedError::Stale(format!("no handle for {}", timeframe)))?;
        Ok(series.iter().rev().take(count).copied().collect())
    }

    fn quote(&self) -> FeedResult<Quote> {
        let bar = self
            .current_bar()
            .ok_or_else(|| FeedError::NotReady("no bars replayed yet".to_string()))?;
        let half = self.settings.spread / 2.0;
        Ok(Quote {
            bid: bar.close - half,
            ask: bar.close + half,
            time: bar.time + self.settings.base.seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Rising M15 bars starting at midnight
    fn rising(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = 1.1 + i as f64 * 0.0005;
                Candle::new(i as i64 * 900, base, base + 0.0008, base - 0.0002, base + 0.0005, 100.0)
            })
            .collect()
    }

    fn feed(count: usize) -> ReplayFeed {
        ReplayFeed::new(rising(count), ReplaySettings::default())
    }

    #[test]
    fn test_not_ready_until_warm() {
        let mut feed = feed(400);
        feed.subscribe(&[Timeframe::M15, Timeframe::H1]).unwrap();
        feed.advance_to(10);
        assert!(matches!(feed.trend_strength(Timeframe::M15), Err(FeedError::NotReady(_))));

        feed.advance_to(40);
        let adx = feed.trend_strength(Timeframe::M15).unwrap();
        assert!(adx > 25.0, "adx {}", adx);
        let (plus, minus) = feed.directional_components(Timeframe::M15).unwrap();
        assert!(plus > minus);
    }

    #[test]
    fn test_unsubscribed_timeframe_is_stale() {
        let mut feed = feed(100);
        feed.subscribe(&[Timeframe::M15]).unwrap();
        feed.advance_to(50);
        assert!(matches!(feed.trend_strength(Timeframe::H4), Err(FeedError::Stale(_))));

        feed.release();
        assert!(matches!(feed.trend_strength(Timeframe::M15), Err(FeedError::Stale(_))));
    }

    #[test]
    fn test_higher_timeframe_sees_only_completed_buckets() {
        let mut feed = feed(100);
        feed.subscribe(&[Timeframe::M15, Timeframe::H1]).unwrap();
        feed.advance_to(7);
        // 7 quarters = 1 complete hour
        assert_eq!(feed.bars(Timeframe::H1, 10).unwrap().len(), 1);
        feed.advance_to(8);
        let hours = feed.bars(Timeframe::H1, 10).unwrap();
        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0].time, 3600);
    }

    #[test]
    fn test_subscribe_after_advance_rebuilds_history() {
        let mut feed = feed(100);
        feed.advance_to(16);
        feed.subscribe(&[Timeframe::M15, Timeframe::H1]).unwrap();
        assert_eq!(feed.bars(Timeframe::H1, 10).unwrap().len(), 4);
        assert_eq!(feed.bars(Timeframe::M15, 100).unwrap().len(), 16);
    }

    #[test]
    fn test_shorter_timeframe_rejected() {
        let mut feed = feed(10);
        assert!(matches!(feed.subscribe(&[Timeframe::M5]), Err(FeedError::Unavailable(_))));
    }

    #[test]
    fn test_quote_from_latest_close() {
        let mut feed = feed(10);
        assert!(feed.quote().is_err());
        feed.advance_to(3);
        let quote = feed.quote().unwrap();
        let close = feed.current_bar().unwrap().close;
        approx::assert_relative_eq!(quote.mid(), close, epsilon = 1e-12);
        approx::assert_relative_eq!(quote.spread(), 0.0001, epsilon = 1e-12);
        assert_eq!(quote.time, 3 * 900);
    }

    #[test]
    fn test_load_bars_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# EURUSD M15").unwrap();
        writeln!(file, r#"{{"time":900,"open":1.1,"high":1.2,"low":1.0,"close":1.15,"volume":5}}"#).unwrap();
        writeln!(file, r#"{{"time":0,"open":1.1,"high":1.2,"low":1.0,"close":1.1}}"#).unwrap();
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 0);
        assert_eq!(bars[0].volume, 0.0);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, r#"{{"time":0,"open":1.1,"high":1.0,"low":1.2,"close":1.1}}"#).unwrap();
        assert!(matches!(load_bars(bad.path()), Err(ReplayError::InvalidBar(1))));
    }
}
