//! Decision Engine
//!
//! Periodic driver for one instrument: manage open positions, classify the
//! regime, run the gate, build and submit the order, and hand every outcome
//! to the recorder. Nothing inside a cycle aborts the loop; failures end up
//! as decision outcomes and log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::context::InstrumentContext;
use super::positions::{PositionActivity, PositionManager};
use crate::domain::{AccountState, DecisionDraft, OrderFields, Quote, RetryPolicy, TradeDecision};
use crate::execution::{with_ack_retry, FifoCloser, OrderBuilder};
use crate::ports::{DecisionRecorder, ExecutionGateway, IndicatorFeed, KeyLevelProvider, RiskModel};
use crate::strategy::{GateInputs, GateVerdict, RegimeClassifier, SignalGate};

/// Driver cadence and retry budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between regime refreshes
    pub regime_interval_secs: u64,
    /// Seconds between key level re-reads
    pub key_level_interval_secs: u64,
    /// Seconds without new entries after an executed order
    pub signal_cooldown_secs: u64,
    /// When false, accepted signals are recorded as PASSED and never sent
    pub submit_orders: bool,
    pub feed_retry: RetryPolicy,
    pub gateway_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regime_interval_secs: 5,
            key_level_interval_secs: 300,
            signal_cooldown_secs: 900,
            submit_orders: true,
            feed_retry: RetryPolicy::new(20, 50),
            gateway_retry: RetryPolicy::new(5, 50),
        }
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A decision was produced (and handed to the recorder)
    Decided(TradeDecision),
    /// Entries paused after a recent execution
    CoolingDown,
}

impl CycleOutcome {
    pub fn decision(&self) -> Option<&TradeDecision> {
        match self {
            CycleOutcome::Decided(decision) => Some(decision),
            CycleOutcome::CoolingDown => None,
        }
    }
}

/// Cloneable stop switch for a running engine
#[derive(Debug, Clone, Default)]
pub struct EngineHandle {
    running: Arc<RwLock<bool>>,
}

impl EngineHandle {
    pub async fn stop(&self) {
        *self.running.write().await = false;
        tracing::info!("Stop signal sent to decision engine");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Collaborators the engine drives but does not own the logic of
pub struct EngineParts {
    pub gateway: Arc<dyn ExecutionGateway>,
    pub risk: Box<dyn RiskModel>,
    pub levels: Box<dyn KeyLevelProvider>,
    pub recorder: Arc<dyn DecisionRecorder>,
}

pub struct DecisionEngine<F: IndicatorFeed> {
    classifier: RegimeClassifier<F>,
    gate: SignalGate,
    builder: OrderBuilder,
    gateway: Arc<dyn ExecutionGateway>,
    risk: Box<dyn RiskModel>,
    levels: Box<dyn KeyLevelProvider>,
    recorder: Arc<dyn DecisionRecorder>,
    context: InstrumentContext,
    positions: Option<PositionManager>,
    activity: PositionActivity,
    config: EngineConfig,
    handle: EngineHandle,
}

impl<F: IndicatorFeed> DecisionEngine<F> {
    pub fn new(
        classifier: RegimeClassifier<F>,
        gate: SignalGate,
        builder: OrderBuilder,
        parts: EngineParts,
        config: EngineConfig,
    ) -> Self {
        if gate.missing_confirmation() {
            tracing::warn!(
                "{} trend confirmation enabled but no confirmation module attached; check skipped",
                classifier.symbol()
            );
        }
        let context = InstrumentContext::new(
            classifier.symbol(),
            config.signal_cooldown_secs,
            config.key_level_interval_secs,
        );
        Self {
            classifier,
            gate,
            builder,
            gateway: parts.gateway,
            risk: parts.risk,
            levels: parts.levels,
            recorder: parts.recorder,
            context,
            positions: None,
            activity: PositionActivity::default(),
            config,
            handle: EngineHandle::default(),
        }
    }

    /// Review open positions at the start of every cycle
    pub fn with_position_manager(mut self, manager: PositionManager) -> Self {
        self.positions = Some(manager);
        self
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn classifier(&self) -> &RegimeClassifier<F> {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut RegimeClassifier<F> {
        &mut self.classifier
    }

    pub fn feed_mut(&mut self) -> &mut F {
        self.classifier.feed_mut()
    }

    pub fn context(&self) -> &InstrumentContext {
        &self.context
    }

    /// Totals of closes and stop moves made so far
    pub fn position_activity(&self) -> PositionActivity {
        self.activity
    }

    /// FIFO closer bound to this engine's gateway and instrument
    fn closer(&self) -> FifoCloser<'_, dyn ExecutionGateway> {
        FifoCloser::new(self.gateway.as_ref(), self.builder.spec(), self.config.gateway_retry)
    }

    /// Run cycles on the regime cadence until stopped
    pub async fn run(&mut self) {
        *self.handle.running.write().await = true;
        let interval = Duration::from_secs(self.config.regime_interval_secs.max(1));

        tracing::info!(
            "Starting decision engine for {} - interval: {:?}, submit orders: {}",
            self.classifier.symbol(),
            interval,
            self.config.submit_orders
        );

        let feed_retry = self.config.feed_retry;
        if !self.classifier.wait_until_ready(&feed_retry).await {
            tracing::warn!(
                "{} indicator feed not ready after {} attempts, starting with degraded readings",
                self.classifier.symbol(),
                feed_retry.attempts()
            );
        }

        while self.handle.is_running().await {
            self.cycle().await;
            tokio::time::sleep(interval).await;
        }

        self.classifier.shutdown();
        tracing::info!("Decision engine for {} stopped", self.classifier.symbol());
    }

    pub async fn cycle(&mut self) -> CycleOutcome {
        self.cycle_at(Utc::now()).await
    }

    /// One manage/classify/gate/build/submit pass with `now` as the decision time
    pub async fn cycle_at(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let snapshot = self.classifier.detect_at(now);
        let symbol = self.classifier.symbol().to_string();

        if let Some(change) = self.context.observe(&snapshot) {
            tracing::info!(
                "{} regime changed: {} -> {} (confidence {:.2})",
                symbol,
                change.from,
                change.to,
                change.confidence
            );
        }

        let quote = self.classifier.feed().quote();
        if let Ok(quote) = quote {
            self.manage_positions(quote, now).await;
        }

        if self.context.in_cooldown(now) {
            return CycleOutcome::CoolingDown;
        }

        let quote = match quote {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!("{} quote unavailable: {}", symbol, e);
                let draft = DecisionDraft::start(&symbol, &snapshot, 0.0, AccountState::default(), now);
                return self.finish(draft.failed(e.code(), e.to_string()));
            }
        };
        let account = match self.gateway.account().await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!("{} account read failed: {}", symbol, e);
                let draft = DecisionDraft::start(&symbol, &snapshot, quote.mid(), AccountState::default(), now);
                return self.finish(draft.failed(e.code(), e.to_string()));
            }
        };
        self.risk.update_account(&account);

        let levels = self.context.levels(now, self.levels.as_ref()).to_vec();
        let spec = self.builder.spec().clone();
        let inputs = GateInputs {
            spec: &spec,
            snapshot: &snapshot,
            quote,
            account,
            levels: &levels,
            timestamp: now,
        };
        let evaluation = self.gate.evaluate(self.classifier.feed(), &inputs);

        let decision = match evaluation.verdict {
            GateVerdict::Rejected(reason) => evaluation.draft.rejected(reason.code(), reason.to_string()),
            GateVerdict::Accepted(signal) => {
                let mut draft = evaluation.draft;
                let pending = match self.gateway.pending_orders(&symbol).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        tracing::warn!("{} pending order query failed: {}", symbol, e);
                        return self.finish(draft.failed(e.code(), e.to_string()));
                    }
                };

                match self
                    .builder
                    .build(&signal, &snapshot, quote, self.risk.as_ref(), &levels, &pending)
                {
                    Err(block) => {
                        tracing::info!("{} {} signal blocked: {}", symbol, signal.signal_type, block);
                        draft.blocked(block.code(), block.to_string())
                    }
                    Ok(order) => {
                        draft.set_order(OrderFields::from(&order));
                        if !self.config.submit_orders {
                            tracing::info!(
                                "{} {} {} signal passed (not submitted): {} lots @ {}",
                                symbol,
                                signal.signal_type,
                                order.side,
                                order.volume,
                                order.entry_price
                            );
                            draft.passed()
                        } else {
                            let gateway = self.gateway.as_ref();
                            let submitted = with_ack_retry(&self.config.gateway_retry, "order", || {
                                gateway.submit(&order)
                            })
                            .await;
                            match submitted {
                                Ok(fill) => {
                                    tracing::info!(
                                        "{} EXECUTED {} {} {} lots @ {} (sl {}, tp {}) ticket {}",
                                        symbol,
                                        signal.signal_type,
                                        order.side,
                                        fill.volume,
                                        fill.price,
                                        order.stop_loss,
                                        order.take_profit,
                                        fill.ticket
                                    );
                                    self.context.start_cooldown(now);
                                    draft.executed(fill.ticket)
                                }
                                Err(e) => {
                                    tracing::warn!("{} order failed: {}", symbol, e);
                                    draft.failed(e.code(), e.to_string())
                                }
                            }
                        }
                    }
                }
            }
        };

        self.finish(decision)
    }

    /// Close positions whose exit fired and trail stops on the rest
    async fn manage_positions(&mut self, quote: Quote, now: DateTime<Utc>) {
        let Some(manager) = &self.positions else {
            return;
        };
        let symbol = self.classifier.symbol();
        let positions = match self.gateway.open_positions(symbol).await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!("{} open position query failed: {}", symbol, e);
                return;
            }
        };
        if positions.is_empty() {
            return;
        }

        let plan = manager.review(self.classifier.feed(), self.builder.spec(), &positions, quote, now);
        let mut activity = PositionActivity { held_back: plan.held, ..PositionActivity::default() };

        let closer = self.closer();
        for exit in &plan.closes {
            match closer.close_volume(exit.side, exit.volume).await {
                Ok(report) => {
                    activity.closes += report.fills.len();
                    activity.closed_volume += report.closed_volume();
                    if let Some(e) = report.error {
                        tracing::warn!("{} {} exit stopped part way: {}", symbol, exit.side, e);
                    }
                }
                Err(e) => tracing::warn!("{} {} exit failed: {}", symbol, exit.side, e),
            }
        }

        let gateway = self.gateway.as_ref();
        for update in &plan.stop_updates {
            let moved = with_ack_retry(&self.config.gateway_retry, "stop update", || {
                gateway.modify_position(update.ticket, update.stop_loss, update.take_profit)
            })
            .await;
            match moved {
                Ok(()) => activity.stops_trailed += 1,
                Err(e) => tracing::warn!("{} ticket {} stop not moved: {}", symbol, update.ticket, e),
            }
        }

        self.activity += activity;
    }

    fn finish(&self, decision: TradeDecision) -> CycleOutcome {
        self.record(&decision);
        CycleOutcome::Decided(decision)
    }

    /// Release feed handles
    pub fn shutdown(&mut self) {
        self.classifier.shutdown();
    }

    fn record(&self, decision: &TradeDecision) {
        if let Err(e) = self.recorder.record(decision) {
            tracing::warn!("{} decision not recorded: {}", decision.symbol, e);
        }
    }
}
