//! Replay session
//!
//! Drives the full decision pipeline over a historical bar file: each base
//! bar closes, the paper account marks stops and targets at the new quote,
//! key levels are refreshed and the engine runs one cycle at the bar's
//! close time.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::{ReplayFeed, SwingLevels};
use crate::adapters::paper::{PaperExit, PaperGateway};
use crate::adapters::risk::FixedFractionalRisk;
use crate::application::{CycleOutcome, DecisionEngine, EngineParts, PositionActivity, PositionManager};
use crate::config::Config;
use crate::domain::{Candle, RegimeSnapshot};
use crate::execution::OrderBuilder;
use crate::ports::{DecisionRecorder, ExecutionGateway, GatewayError, IndicatorFeed};
use crate::strategy::{ParamError, RegimeClassifier, SignalGate};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid parameters: {0}")]
    Params(#[from] ParamError),
    #[error("Paper account unavailable: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Bar time {0} out of range")]
    BadTime(i64),
}

/// Replay run options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Paper account starting balance
    pub balance: f64,
    /// Send accepted orders to the paper gateway
    pub submit_orders: bool,
    /// Base bars closed before the first cycle
    pub warmup_bars: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            balance: 10_000.0,
            submit_orders: true,
            warmup_bars: 0,
        }
    }
}

/// What a replay run produced
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    /// Engine cycles run
    pub cycles: usize,
    /// Decisions by outcome label
    pub outcomes: BTreeMap<String, usize>,
    /// Cycles skipped by the signal cooldown
    pub cooling_down: usize,
    /// Stop and target hits settled by the paper account
    pub exits: Vec<PaperExit>,
    /// Exit-rule closes and trailed stops
    pub managed: PositionActivity,
    pub final_balance: f64,
    pub open_positions: usize,
    pub last_snapshot: Option<RegimeSnapshot>,
}

impl SessionSummary {
    pub fn decisions(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: &str) -> usize {
        self.outcomes.get(outcome).copied().unwrap_or(0)
    }
}

/// Replay `bars` (oldest first) through a fresh engine on a paper account
pub async fn run_session(
    config: &Config,
    bars: Vec<Candle>,
    recorder: Arc<dyn DecisionRecorder>,
    options: SessionOptions,
) -> Result<SessionSummary, SessionError> {
    let symbol = config.instrument.symbol.clone();
    let feed = ReplayFeed::new(bars, config.replay);
    let paper = Arc::new(PaperGateway::new(
        symbol.clone(),
        options.balance,
        config.risk.value_per_price_unit,
    ));
    let levels = SwingLevels::new(config.levels.clone());

    let classifier = RegimeClassifier::new(symbol.clone(), feed, config.regime.clone())?;
    let gate = SignalGate::new(config.gate.clone(), config.regime.clone());
    let builder = OrderBuilder::new(config.orders.clone(), config.instrument.clone());
    let parts = EngineParts {
        gateway: paper.clone(),
        risk: Box::new(FixedFractionalRisk::new(config.risk.clone(), options.balance)),
        levels: Box::new(levels.clone()),
        recorder,
    };
    let mut engine_config = config.engine.clone();
    engine_config.submit_orders = options.submit_orders;
    let mut engine = DecisionEngine::new(classifier, gate, builder, parts, engine_config);
    if config.exits.enabled {
        let manager = PositionManager::new(config.exits.clone(), config.regime.primary)?;
        engine = engine.with_position_manager(manager);
    }

    engine.feed_mut().advance_to(options.warmup_bars);
    tracing::info!(
        "Replaying {} bars of {} ({} warmup)",
        engine.classifier().feed().len(),
        symbol,
        engine.classifier().feed().cursor()
    );

    let mut summary = SessionSummary::default();
    while engine.feed_mut().advance() {
        let feed = engine.classifier().feed();
        let Some(close_time) = feed.current_time() else {
            continue;
        };
        levels.refresh(feed.visible());

        if let Ok(quote) = feed.quote() {
            let exits = paper.mark(quote).await;
            for exit in &exits {
                tracing::info!(
                    "{} ticket {} closed @ {} ({:+.2})",
                    symbol,
                    exit.ticket,
                    exit.price,
                    exit.profit
                );
            }
            summary.exits.extend(exits);
        }

        let now = DateTime::<Utc>::from_timestamp(close_time, 0).ok_or(SessionError::BadTime(close_time))?;
        summary.cycles += 1;
        match engine.cycle_at(now).await {
            CycleOutcome::Decided(decision) => {
                *summary.outcomes.entry(decision.outcome.to_string()).or_default() += 1;
            }
            CycleOutcome::CoolingDown => summary.cooling_down += 1,
        }
    }
    engine.shutdown();

    summary.managed = engine.position_activity();
    summary.final_balance = paper.balance().await;
    summary.open_positions = paper.open_positions(&symbol).await?.len();
    summary.last_snapshot = Some(engine.classifier().get_last_snapshot());
    Ok(summary)
}

/// Classify the regime after every bar in `bars` has closed
pub fn classify_bars(config: &Config, bars: Vec<Candle>, at: DateTime<Utc>) -> Result<RegimeSnapshot, SessionError> {
    let count = bars.len();
    let mut feed = ReplayFeed::new(bars, config.replay);
    feed.advance_to(count);
    let mut classifier = RegimeClassifier::new(config.instrument.symbol.clone(), feed, config.regime.clone())?;
    let snapshot = classifier.detect_at(at);
    classifier.shutdown();
    Ok(snapshot)
}
