//! Open position management
//!
//! Reviewed once per cycle before new entries are considered. Positions on
//! a side are closed when the slow-timeframe oscillator crosses its exit
//! level or the fast trend average crosses the slow one, but only once they
//! have been held for the minimum duration. Every position that stays open
//! has its stop trailed at a multiple of ATR behind the market.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

use crate::domain::{OpenPosition, Quote, Side, SymbolSpec, Timeframe};
use crate::execution::fifo_order;
use crate::ports::{FeedResult, IndicatorFeed, OscillatorKind};
use crate::strategy::ParamError;

/// Exit and trailing-stop rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub enabled: bool,
    /// Timeframe the oscillator and trend exits read
    pub timeframe: Timeframe,
    pub oscillator_exit: bool,
    pub oscillator_period: usize,
    /// Longs close on a cross above this level, shorts on a cross below its mirror
    pub oscillator_level: f64,
    pub trend_exit: bool,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
    pub trailing_stop: bool,
    /// ATR period on the primary timeframe
    pub trailing_atr_period: usize,
    pub trailing_atr_multiple: f64,
    /// Signal exits wait this long after the open; trailing does not
    pub min_hold_minutes: u32,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeframe: Timeframe::D1,
            oscillator_exit: true,
            oscillator_period: 8,
            oscillator_level: 50.0,
            trend_exit: true,
            trend_fast_period: 20,
            trend_slow_period: 100,
            trailing_stop: true,
            trailing_atr_period: 14,
            trailing_atr_multiple: 3.0,
            min_hold_minutes: 60,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.oscillator_period == 0 {
            return Err(ParamError::ZeroPeriod("exits.oscillator_period"));
        }
        if self.trend_fast_period == 0 {
            return Err(ParamError::ZeroPeriod("exits.trend_fast_period"));
        }
        if self.trailing_atr_period == 0 {
            return Err(ParamError::ZeroPeriod("exits.trailing_atr_period"));
        }
        if self.trend_fast_period >= self.trend_slow_period {
            return Err(ParamError::InvertedPeriods(self.trend_fast_period, self.trend_slow_period));
        }
        if self.oscillator_level <= 0.0 || self.oscillator_level >= 100.0 {
            return Err(ParamError::ThresholdOutOfRange("exits.oscillator_level", self.oscillator_level));
        }
        if !(self.trailing_atr_multiple > 0.0) {
            return Err(ParamError::NotPositive("exits.trailing_atr_multiple", self.trailing_atr_multiple));
        }
        Ok(())
    }

    fn min_hold_secs(&self) -> i64 {
        i64::from(self.min_hold_minutes) * 60
    }
}

/// Why a side was closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitReason {
    OscillatorCross { value: f64, level: f64 },
    TrendCross { fast: f64, slow: f64 },
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::OscillatorCross { value, level } => {
                write!(f, "oscillator {:.1} crossed exit level {:.1}", value, level)
            }
            ExitReason::TrendCross { fast, slow } => {
                write!(f, "trend average {:.5} crossed {:.5}", fast, slow)
            }
        }
    }
}

/// Close of every held-long-enough position on one side
#[derive(Debug, Clone, PartialEq)]
pub struct SideExit {
    pub side: Side,
    pub volume: f64,
    /// Oldest first, matching the FIFO close order
    pub tickets: Vec<u64>,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopUpdate {
    pub ticket: u64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
}

/// What one review wants done
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExitPlan {
    pub closes: Vec<SideExit>,
    pub stop_updates: Vec<StopUpdate>,
    /// Positions an exit fired for inside the minimum hold
    pub held: usize,
}

impl ExitPlan {
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty() && self.stop_updates.is_empty()
    }
}

/// Running totals of what position management did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionActivity {
    /// Individual close fills, partial ones included
    pub closes: usize,
    pub closed_volume: f64,
    pub stops_trailed: usize,
    pub held_back: usize,
}

impl AddAssign for PositionActivity {
    fn add_assign(&mut self, other: Self) {
        self.closes += other.closes;
        self.closed_volume += other.closed_volume;
        self.stops_trailed += other.stops_trailed;
        self.held_back += other.held_back;
    }
}

pub struct PositionManager {
    config: ExitConfig,
    /// Timeframe the trailing ATR reads
    primary: Timeframe,
}

impl PositionManager {
    pub fn new(config: ExitConfig, primary: Timeframe) -> Result<Self, ParamError> {
        config.validate()?;
        Ok(Self { config, primary })
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Decide closes and stop moves for the open positions on `spec.symbol`
    pub fn review<F: IndicatorFeed + ?Sized>(
        &self,
        feed: &F,
        spec: &SymbolSpec,
        positions: &[OpenPosition],
        quote: Quote,
        now: DateTime<Utc>,
    ) -> ExitPlan {
        let mut plan = ExitPlan::default();
        let now_secs = now.timestamp();
        let trail_distance = self.trail_distance(feed);

        for side in [Side::Long, Side::Short] {
            let open = fifo_order(positions, &spec.symbol, side);
            if open.is_empty() {
                continue;
            }

            let mut closing: Vec<u64> = Vec::new();
            if let Some(reason) = self.exit_signal(feed, side) {
                let min_hold = self.config.min_hold_secs();
                let (eligible, young): (Vec<&OpenPosition>, Vec<&OpenPosition>) =
                    open.iter().copied().partition(|p| p.age_secs(now_secs) >= min_hold);
                if !young.is_empty() {
                    tracing::info!(
                        "{} {} exit ({}) held back for {} position(s) inside the {} minute hold",
                        spec.symbol,
                        side,
                        reason,
                        young.len(),
                        self.config.min_hold_minutes
                    );
                    plan.held += young.len();
                }
                if let Some(volume) = total_volume(&eligible) {
                    tracing::info!("{} closing {} {} lots: {}", spec.symbol, side, volume, reason);
                    closing = eligible.iter().map(|p| p.ticket).collect();
                    plan.closes.push(SideExit { side, volume, tickets: closing.clone(), reason });
                }
            }

            let Some(distance) = trail_distance else {
                continue;
            };
            for position in open.into_iter().filter(|p| !closing.contains(&p.ticket)) {
                if let Some(stop_loss) = trailed_stop(position, quote, distance, spec) {
                    tracing::info!(
                        "{} ticket {} {} trailing stop -> {}",
                        spec.symbol,
                        position.ticket,
                        side,
                        stop_loss
                    );
                    plan.stop_updates.push(StopUpdate {
                        ticket: position.ticket,
                        stop_loss,
                        take_profit: position.take_profit,
                    });
                }
            }
        }
        plan
    }

    fn trail_distance<F: IndicatorFeed + ?Sized>(&self, feed: &F) -> Option<f64> {
        if !self.config.trailing_stop {
            return None;
        }
        match feed.volatility(self.primary, self.config.trailing_atr_period) {
            Ok(atr) if atr.is_finite() && atr > 0.0 => Some(atr * self.config.trailing_atr_multiple),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Trailing stop skipped: {}", e);
                None
            }
        }
    }

    /// First exit rule that fires for `side`. Unreadable rules never fire.
    fn exit_signal<F: IndicatorFeed + ?Sized>(&self, feed: &F, side: Side) -> Option<ExitReason> {
        [self.oscillator_cross(feed, side), self.trend_cross(feed, side)]
            .into_iter()
            .find_map(|reading| {
                reading.unwrap_or_else(|e| {
                    tracing::debug!("{} exit rule unreadable: {}", side, e);
                    None
                })
            })
    }

    fn oscillator_cross<F: IndicatorFeed + ?Sized>(&self, feed: &F, side: Side) -> FeedResult<Option<ExitReason>> {
        if !self.config.oscillator_exit {
            return Ok(None);
        }
        let (tf, period) = (self.config.timeframe, self.config.oscillator_period);
        let current = feed.oscillator(OscillatorKind::Rsi, tf, period, 0)?;
        let previous = feed.oscillator(OscillatorKind::Rsi, tf, period, 1)?;
        let level = match side {
            Side::Long => self.config.oscillator_level,
            Side::Short => 100.0 - self.config.oscillator_level,
        };
        let crossed = match side {
            Side::Long => previous <= level && current > level,
            Side::Short => previous >= level && current < level,
        };
        Ok(crossed.then_some(ExitReason::OscillatorCross { value: current, level }))
    }

    fn trend_cross<F: IndicatorFeed + ?Sized>(&self, feed: &F, side: Side) -> FeedResult<Option<ExitReason>> {
        if !self.config.trend_exit {
            return Ok(None);
        }
        let tf = self.config.timeframe;
        let fast = feed.moving_average(tf, self.config.trend_fast_period, 0)?;
        let fast_prev = feed.moving_average(tf, self.config.trend_fast_period, 1)?;
        let slow = feed.moving_average(tf, self.config.trend_slow_period, 0)?;
        let slow_prev = feed.moving_average(tf, self.config.trend_slow_period, 1)?;
        let crossed = match side {
            Side::Long => fast_prev > slow_prev && fast < slow,
            Side::Short => fast_prev < slow_prev && fast > slow,
        };
        Ok(crossed.then_some(ExitReason::TrendCross { fast, slow }))
    }
}

/// Sum of lots, exact to the broker step
fn total_volume(positions: &[&OpenPosition]) -> Option<f64> {
    positions
        .iter()
        .map(|p| Decimal::from_f64(p.volume))
        .sum::<Option<Decimal>>()
        .filter(|total| *total > Decimal::ZERO)
        .and_then(|total| total.to_f64())
}

/// New stop `distance` behind the market, when legal and tighter than the current one
fn trailed_stop(position: &OpenPosition, quote: Quote, distance: f64, spec: &SymbolSpec) -> Option<f64> {
    let (candidate, room) = match position.side {
        Side::Long => {
            let stop = spec.round_price(quote.bid - distance);
            (stop, quote.bid - stop)
        }
        Side::Short => {
            let stop = spec.round_price(quote.ask + distance);
            (stop, stop - quote.ask)
        }
    };
    if !(candidate > 0.0) || room < spec.min_stop_distance() {
        return None;
    }
    let tighter = match (position.side, position.stop_loss) {
        (_, None) => true,
        (Side::Long, Some(current)) => candidate > current,
        (Side::Short, Some(current)) => candidate < current,
    };
    tighter.then_some(candidate)
}
