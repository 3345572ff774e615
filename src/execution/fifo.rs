//! FIFO-safe position closing
//!
//! Positions on one symbol and side are always closed oldest first (earliest
//! open time, then lowest ticket). A request to close a specific position
//! is rerouted to the oldest same-size position when it is not that one.

use super::normalize::split_volume;
use super::retry::with_ack_retry;
use crate::domain::{OpenPosition, RetryPolicy, Side, SymbolSpec};
use crate::ports::{ExecutionGateway, Fill, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseStep {
    pub ticket: u64,
    pub volume: f64,
}

/// Ordered closes that together cover a requested volume
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClosePlan {
    pub steps: Vec<CloseStep>,
    /// Requested volume no open position could cover
    pub unfilled: f64,
}

impl ClosePlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Close destination for a specific ticket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseRoute {
    pub ticket: u64,
    pub volume: f64,
    /// Set when the requested ticket was not the oldest candidate
    pub rerouted_from: Option<u64>,
}

/// Positions on `symbol`/`side`, oldest first
pub fn fifo_order<'a>(positions: &'a [OpenPosition], symbol: &str, side: Side) -> Vec<&'a OpenPosition> {
    let mut matching: Vec<&OpenPosition> = positions
        .iter()
        .filter(|p| p.symbol == symbol && p.side == side)
        .collect();
    matching.sort_by_key(|p| p.fifo_key());
    matching
}

/// Plan closing `volume` lots on `side`, partially closing the oldest
/// position first and moving on to the next-oldest for the remainder
pub fn plan_fifo_close(
    positions: &[OpenPosition],
    side: Side,
    volume: f64,
    spec: &SymbolSpec,
) -> ClosePlan {
    let mut plan = ClosePlan::default();
    let Some((mut remaining, _)) = split_volume(volume, volume, spec) else {
        plan.unfilled = volume;
        return plan;
    };

    for position in fifo_order(positions, &spec.symbol, side) {
        if remaining <= 0.0 {
            break;
        }
        let Some((take, rest)) = split_volume(remaining, position.volume, spec) else {
            break;
        };
        if take > 0.0 {
            plan.steps.push(CloseStep { ticket: position.ticket, volume: take });
        }
        remaining = rest;
    }

    plan.unfilled = remaining.max(0.0);
    plan
}

/// Route a close of `ticket` to the oldest same-side, same-size position
pub fn reroute_close(positions: &[OpenPosition], ticket: u64) -> Option<CloseRoute> {
    let requested = positions.iter().find(|p| p.ticket == ticket)?;
    let oldest = fifo_order(positions, &requested.symbol, requested.side)
        .into_iter()
        .find(|p| (p.volume - requested.volume).abs() < 1e-9)
        .unwrap_or(requested);

    Some(CloseRoute {
        ticket: oldest.ticket,
        volume: oldest.volume,
        rerouted_from: (oldest.ticket != ticket).then_some(ticket),
    })
}

/// What a close attempt actually did
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseReport {
    pub fills: Vec<Fill>,
    pub rerouted_from: Option<u64>,
    pub unfilled: f64,
    /// Set when the gateway stopped the sequence part way
    pub error: Option<GatewayError>,
}

impl CloseReport {
    pub fn closed_volume(&self) -> f64 {
        self.fills.iter().map(|f| f.volume).sum()
    }
}

/// Drives the gateway through FIFO-ordered closes for one instrument
pub struct FifoCloser<'a, G: ExecutionGateway + ?Sized> {
    gateway: &'a G,
    spec: &'a SymbolSpec,
    retry: RetryPolicy,
}

impl<'a, G: ExecutionGateway + ?Sized> FifoCloser<'a, G> {
    pub fn new(gateway: &'a G, spec: &'a SymbolSpec, retry: RetryPolicy) -> Self {
        Self { gateway, spec, retry }
    }

    /// Close `volume` lots on `side`, oldest positions first
    pub async fn close_volume(&self, side: Side, volume: f64) -> Result<CloseReport, GatewayError> {
        let positions = self.gateway.open_positions(&self.spec.symbol).await?;
        let plan = plan_fifo_close(&positions, side, volume, self.spec);
        if plan.unfilled > 0.0 {
            tracing::warn!(
                "{} close of {} {} lots leaves {} uncovered",
                self.spec.symbol,
                side,
                volume,
                plan.unfilled
            );
        }

        let mut report = CloseReport {
            unfilled: plan.unfilled,
            ..CloseReport::default()
        };
        for step in plan.steps {
            match self.close_one(step.ticket, step.volume).await {
                Ok(fill) => report.fills.push(fill),
                Err(e) => {
                    tracing::warn!("{} close of ticket {} failed: {}", self.spec.symbol, step.ticket, e);
                    report.error = Some(e);
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Close one position, rerouting to the oldest same-size position
    pub async fn close_ticket(&self, ticket: u64) -> Result<CloseReport, GatewayError> {
        let positions = self.gateway.open_positions(&self.spec.symbol).await?;
        let route = reroute_close(&positions, ticket).ok_or(GatewayError::UnknownTicket(ticket))?;
        if let Some(requested) = route.rerouted_from {
            tracing::info!(
                "{} FIFO reroute: close of ticket {} sent to older ticket {}",
                self.spec.symbol,
                requested,
                route.ticket
            );
        }

        let fill = self.close_one(route.ticket, route.volume).await?;
        Ok(CloseReport {
            fills: vec![fill],
            rerouted_from: route.rerouted_from,
            unfilled: 0.0,
            error: None,
        })
    }

    async fn close_one(&self, ticket: u64, volume: f64) -> Result<Fill, GatewayError> {
        let gateway = self.gateway;
        with_ack_retry(&self.retry, "close", move || gateway.close_position(ticket, volume)).await
    }
}
