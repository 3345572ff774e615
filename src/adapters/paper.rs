//! Paper execution gateway
//!
//! Simulated broker for replay and dry runs. Market orders fill at the
//! current quote, pending stops trigger when the quote crosses them, and
//! stops/targets are checked on every `mark`.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AccountState, OpenPosition, OrderKind, OrderSpec, PendingOrder, Quote, Side};
use crate::ports::{ExecutionGateway, Fill, GatewayError};

const VOLUME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Resting {
    order: PendingOrder,
    stop_loss: f64,
    take_profit: f64,
}

#[derive(Debug)]
struct PaperState {
    next_ticket: u64,
    quote: Option<Quote>,
    balance: f64,
    positions: Vec<OpenPosition>,
    pending: Vec<Resting>,
    closed_trades: usize,
}

/// Closed trade summary returned by `mark`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperExit {
    pub ticket: u64,
    pub price: f64,
    pub profit: f64,
}

pub struct PaperGateway {
    symbol: String,
    /// Account currency per 1.0 price move per lot
    value_per_price_unit: f64,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(symbol: impl Into<String>, balance: f64, value_per_price_unit: f64) -> Self {
        Self {
            symbol: symbol.into(),
            value_per_price_unit,
            state: Mutex::new(PaperState {
                next_ticket: 1,
                quote: None,
                balance,
                positions: Vec::new(),
                pending: Vec::new(),
                closed_trades: 0,
            }),
        }
    }

    /// Move the market: trigger pending stops, then settle stops and targets
    pub async fn mark(&self, quote: Quote) -> Vec<PaperExit> {
        let mut state = self.state.lock().await;
        state.quote = Some(quote);

        let (triggered, resting): (Vec<Resting>, Vec<Resting>) =
            state.pending.drain(..).partition(|r| match r.order.side {
                Side::Long => quote.ask >= r.order.price,
                Side::Short => quote.bid <= r.order.price,
            });
        state.pending = resting;
        for r in triggered {
            tracing::info!(
                "PAPER pending {} {} triggered at {}",
                r.order.ticket,
                r.order.side,
                r.order.price
            );
            state.positions.push(OpenPosition {
                ticket: r.order.ticket,
                symbol: r.order.symbol,
                side: r.order.side,
                volume: r.order.volume,
                open_price: r.order.price,
                open_time: quote.time,
                stop_loss: Some(r.stop_loss),
                take_profit: Some(r.take_profit),
            });
        }

        let mut exits = Vec::new();
        let mut open = Vec::with_capacity(state.positions.len());
        for p in std::mem::take(&mut state.positions) {
            let exit_price = match (p.side, p.stop_loss, p.take_profit) {
                (Side::Long, Some(sl), _) if quote.bid <= sl => Some(sl),
                (Side::Long, _, Some(tp)) if quote.bid >= tp => Some(tp),
                (Side::Short, Some(sl), _) if quote.ask >= sl => Some(sl),
                (Side::Short, _, Some(tp)) if quote.ask <= tp => Some(tp),
                _ => None,
            };
            match exit_price {
                Some(price) => {
                    let profit = self.profit(&p, price, p.volume);
                    state.balance += profit;
                    state.closed_trades += 1;
                    exits.push(PaperExit { ticket: p.ticket, price, profit });
                }
                None => open.push(p),
            }
        }
        state.positions = open;
        exits
    }

    /// Put an existing position on the book (restoring state, tests)
    pub async fn insert_position(&self, position: OpenPosition) {
        let mut state = self.state.lock().await;
        state.next_ticket = state.next_ticket.max(position.ticket + 1);
        state.positions.push(position);
    }

    pub async fn balance(&self) -> f64 {
        self.state.lock().await.balance
    }

    pub async fn closed_trades(&self) -> usize {
        self.state.lock().await.closed_trades
    }

    fn profit(&self, position: &OpenPosition, exit: f64, volume: f64) -> f64 {
        position.side.sign() * (exit - position.open_price) * volume * self.value_per_price_unit
    }

    fn unrealized(&self, state: &PaperState) -> f64 {
        let Some(quote) = state.quote else {
            return 0.0;
        };
        state
            .positions
            .iter()
            .map(|p| {
                let exit = quote.entry_price(p.side.opposite());
                self.profit(p, exit, p.volume)
            })
            .sum()
    }

    fn check_symbol(&self, order: &OrderSpec) -> Result<(), GatewayError> {
        if order.symbol != self.symbol {
            return Err(GatewayError::Rejected {
                code: 4106,
                reason: format!("unknown symbol {}", order.symbol),
            });
        }
        if !(order.volume > 0.0) {
            return Err(GatewayError::Rejected { code: 10014, reason: "invalid volume".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn place_market(&self, order: &OrderSpec) -> Result<Fill, GatewayError> {
        self.check_symbol(order)?;
        let mut state = self.state.lock().await;
        let quote = state
            .quote
            .ok_or_else(|| GatewayError::Rejected { code: 10021, reason: "no quote".into() })?;
        let price = quote.entry_price(order.side);
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.push(OpenPosition {
            ticket,
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            open_price: price,
            open_time: quote.time,
            stop_loss: Some(order.stop_loss),
            take_profit: Some(order.take_profit),
        });
        tracing::info!("PAPER {} {} {} lots @ {} (ticket {})", order.symbol, order.side, order.volume, price, ticket);
        Ok(Fill { ticket, price, volume: order.volume })
    }

    async fn place_pending(&self, order: &OrderSpec) -> Result<Fill, GatewayError> {
        self.check_symbol(order)?;
        let OrderKind::PendingStop { trigger } = order.kind else {
            return Err(GatewayError::Rejected { code: 10035, reason: "not a pending order".into() });
        };
        let mut state = self.state.lock().await;
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.push(Resting {
            order: PendingOrder {
                ticket,
                symbol: order.symbol.clone(),
                side: order.side,
                price: trigger,
                volume: order.volume,
            },
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
        });
        tracing::info!("PAPER {} {} stop {} lots @ {} (ticket {})", order.symbol, order.side, order.volume, trigger, ticket);
        Ok(Fill { ticket, price: trigger, volume: order.volume })
    }

    async fn cancel_pending(&self, ticket: u64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|r| r.order.ticket != ticket);
        if state.pending.len() == before {
            return Err(GatewayError::UnknownTicket(ticket));
        }
        Ok(())
    }

    async fn close_position(&self, ticket: u64, volume: f64) -> Result<Fill, GatewayError> {
        let mut state = self.state.lock().await;
        let quote = state
            .quote
            .ok_or_else(|| GatewayError::Rejected { code: 10021, reason: "no quote".into() })?;
        let index = state
            .positions
            .iter()
            .position(|p| p.ticket == ticket)
            .ok_or(GatewayError::UnknownTicket(ticket))?;

        let held = state.positions[index].volume;
        if !(volume > 0.0) || volume > held + VOLUME_EPSILON {
            return Err(GatewayError::Rejected {
                code: 10014,
                reason: format!("close volume {} exceeds position volume {}", volume, held),
            });
        }

        let price = quote.entry_price(state.positions[index].side.opposite());
        let profit = self.profit(&state.positions[index], price, volume);
        state.balance += profit;

        let remaining = held - volume;
        if remaining <= VOLUME_EPSILON {
            state.positions.remove(index);
            state.closed_trades += 1;
        } else {
            // Keep lot precision stable across partial closes
            state.positions[index].volume = (remaining * 1e8).round() / 1e8;
        }
        Ok(Fill { ticket, price, volume })
    }

    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let quote = state.quote;
        let position = state
            .positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or(GatewayError::UnknownTicket(ticket))?;

        // A stop already through the market would fill immediately
        let crossed = quote.is_some_and(|q| match position.side {
            Side::Long => stop_loss >= q.bid,
            Side::Short => stop_loss <= q.ask,
        });
        if crossed || !(stop_loss > 0.0) {
            return Err(GatewayError::Rejected { code: 10016, reason: format!("invalid stop {}", stop_loss) });
        }

        position.stop_loss = Some(stop_loss);
        position.take_profit = take_profit;
        tracing::info!("PAPER ticket {} stop moved to {}", ticket, stop_loss);
        Ok(())
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn pending_orders(&self, symbol: &str) -> Result<Vec<PendingOrder>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .pending
            .iter()
            .filter(|r| r.order.symbol == symbol)
            .map(|r| r.order.clone())
            .collect())
    }

    async fn account(&self) -> Result<AccountState, GatewayError> {
        let state = self.state.lock().await;
        Ok(AccountState {
            balance: state.balance,
            equity: state.balance + self.unrealized(&state),
            open_positions: state.positions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quote(bid: f64, time: i64) -> Quote {
        Quote { bid, ask: bid + 0.0002, time }
    }

    fn order(side: Side, kind: OrderKind, sl: f64, tp: f64) -> OrderSpec {
        OrderSpec {
            symbol: "EURUSD".into(),
            side,
            kind,
            entry_price: 1.1,
            volume: 0.5,
            stop_loss: sl,
            take_profit: tp,
            comment: "test".into(),
        }
    }

    fn gateway() -> PaperGateway {
        PaperGateway::new("EURUSD", 10_000.0, 100_000.0)
    }

    #[tokio::test]
    async fn test_market_fill_and_take_profit() {
        let gw = gateway();
        gw.mark(quote(1.1000, 0)).await;
        let fill = gw.place_market(&order(Side::Long, OrderKind::Market, 1.0970, 1.1060)).await.unwrap();
        assert_relative_eq!(fill.price, 1.1002, epsilon = 1e-12);
        assert_eq!(gw.account().await.unwrap().open_positions, 1);

        let exits = gw.mark(quote(1.1061, 60)).await;
        assert_eq!(exits.len(), 1);
        // 58 pips on half a lot
        assert_relative_eq!(exits[0].profit, 290.0, epsilon = 1e-6);
        assert_relative_eq!(gw.balance().await, 10_290.0, epsilon = 1e-6);
        assert_eq!(gw.account().await.unwrap().open_positions, 0);
    }

    #[tokio::test]
    async fn test_pending_stop_triggers_on_cross() {
        let gw = gateway();
        gw.mark(quote(1.1000, 0)).await;
        let kind = OrderKind::PendingStop { trigger: 1.1020 };
        let fill = gw.place_pending(&order(Side::Long, kind, 1.0990, 1.1080)).await.unwrap();
        assert_eq!(gw.pending_orders("EURUSD").await.unwrap().len(), 1);

        gw.mark(quote(1.1010, 60)).await;
        assert!(gw.open_positions("EURUSD").await.unwrap().is_empty());

        gw.mark(quote(1.1019, 120)).await;
        let open = gw.open_positions("EURUSD").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticket, fill.ticket);
        assert_eq!(open[0].open_time, 120);
        assert!(gw.pending_orders("EURUSD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_then_full_close() {
        let gw = gateway();
        gw.mark(quote(1.1000, 0)).await;
        let fill = gw.place_market(&order(Side::Short, OrderKind::Market, 1.1100, 1.0900)).await.unwrap();

        gw.close_position(fill.ticket, 0.2).await.unwrap();
        let open = gw.open_positions("EURUSD").await.unwrap();
        assert_relative_eq!(open[0].volume, 0.3, epsilon = 1e-12);

        let err = gw.close_position(fill.ticket, 0.4).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: 10014, .. }));

        gw.close_position(fill.ticket, 0.3).await.unwrap();
        assert!(gw.open_positions("EURUSD").await.unwrap().is_empty());
        assert_eq!(gw.closed_trades().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_ticket_and_cancel() {
        let gw = gateway();
        gw.mark(quote(1.1000, 0)).await;
        assert_eq!(gw.close_position(77, 0.1).await, Err(GatewayError::UnknownTicket(77)));
        assert_eq!(gw.cancel_pending(77).await, Err(GatewayError::UnknownTicket(77)));

        let kind = OrderKind::PendingStop { trigger: 1.0980 };
        let fill = gw.place_pending(&order(Side::Short, kind, 1.1010, 1.0920)).await.unwrap();
        gw.cancel_pending(fill.ticket).await.unwrap();
        assert!(gw.pending_orders("EURUSD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_modified_stop_settles_the_position() {
        let gw = gateway();
        gw.mark(quote(1.1000, 0)).await;
        let fill = gw.place_market(&order(Side::Long, OrderKind::Market, 1.0970, 1.1060)).await.unwrap();

        gw.mark(quote(1.1040, 60)).await;
        gw.modify_position(fill.ticket, 1.1020, Some(1.1060)).await.unwrap();
        let open = gw.open_positions("EURUSD").await.unwrap();
        assert_eq!(open[0].stop_loss, Some(1.1020));

        // Stop above the bid is refused
        let err = gw.modify_position(fill.ticket, 1.1045, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: 10016, .. }));
        assert_eq!(gw.modify_position(99, 1.1, None).await, Err(GatewayError::UnknownTicket(99)));

        let exits = gw.mark(quote(1.1019, 120)).await;
        assert_eq!(exits.len(), 1);
        assert_relative_eq!(exits[0].price, 1.1020, epsilon = 1e-12);
        // 18 pips on half a lot
        assert_relative_eq!(exits[0].profit, 90.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_market_without_quote_rejected() {
        let gw = gateway();
        let err = gw.place_market(&order(Side::Long, OrderKind::Market, 1.0, 1.2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: 10021, .. }));
    }
}
