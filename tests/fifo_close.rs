//! FIFO Close Integration Tests
//!
//! Drives the FIFO closer against the paper gateway:
//! 1. Volume closes walk positions oldest first, splitting the last one
//! 2. A close of a younger ticket is rerouted to the oldest same-size position
//! 3. Transient gateway errors are retried, rejections stop the sequence

use regime_trader::adapters::paper::PaperGateway;
use regime_trader::domain::{OpenPosition, Quote, RetryPolicy, Side, SymbolSpec};
use regime_trader::execution::FifoCloser;
use regime_trader::ports::mocks::FlakyGateway;
use regime_trader::ports::{ExecutionGateway, GatewayError};

// ============================================================================
// Test Fixtures
// ============================================================================

fn spec() -> SymbolSpec {
    SymbolSpec {
        symbol: "EURUSD".to_string(),
        point: 0.00001,
        digits: 5,
        pip_size: 0.0001,
        volume_min: 0.01,
        volume_max: 50.0,
        volume_step: 0.01,
        stops_level_points: 20,
        duplicate_tolerance_points: 10,
    }
}

fn position(ticket: u64, side: Side, volume: f64, open_time: i64) -> OpenPosition {
    OpenPosition {
        ticket,
        symbol: "EURUSD".to_string(),
        side,
        volume,
        open_price: 1.1000,
        open_time,
        stop_loss: None,
        take_profit: None,
    }
}

async fn paper_with(positions: Vec<OpenPosition>) -> PaperGateway {
    let paper = PaperGateway::new("EURUSD", 10_000.0, 100_000.0);
    for p in positions {
        paper.insert_position(p).await;
    }
    paper.mark(Quote { bid: 1.1010, ask: 1.1011, time: 10_000 }).await;
    paper
}

fn retry() -> RetryPolicy {
    RetryPolicy::new(3, 0)
}

fn volumes(positions: &[OpenPosition]) -> Vec<(u64, f64)> {
    let mut out: Vec<(u64, f64)> = positions.iter().map(|p| (p.ticket, p.volume)).collect();
    out.sort_by_key(|(ticket, _)| *ticket);
    out
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_close_volume_walks_oldest_first() {
    let paper = paper_with(vec![
        position(1, Side::Long, 0.30, 100),
        position(2, Side::Long, 0.20, 50),
        position(3, Side::Long, 0.50, 200),
        position(4, Side::Short, 1.00, 10),
    ])
    .await;
    let spec = spec();
    let closer = FifoCloser::new(&paper, &spec, retry());

    let report = closer.close_volume(Side::Long, 0.4).await.unwrap();

    let closed: Vec<(u64, f64)> = report.fills.iter().map(|f| (f.ticket, f.volume)).collect();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].0, 2);
    assert!((closed[0].1 - 0.2).abs() < 1e-9);
    assert_eq!(closed[1].0, 1);
    assert!((closed[1].1 - 0.2).abs() < 1e-9);
    assert!(report.error.is_none());
    assert_eq!(report.unfilled, 0.0);

    let left = volumes(&paper.open_positions("EURUSD").await.unwrap());
    assert_eq!(left.len(), 3);
    assert_eq!(left[0].0, 1);
    assert!((left[0].1 - 0.1).abs() < 1e-9);
    assert_eq!(left[1], (3, 0.5));
    assert_eq!(left[2], (4, 1.0));
}

#[tokio::test]
async fn test_close_volume_beyond_book_reports_unfilled() {
    let paper = paper_with(vec![position(1, Side::Short, 0.25, 100)]).await;
    let spec = spec();
    let closer = FifoCloser::new(&paper, &spec, retry());

    let report = closer.close_volume(Side::Short, 1.0).await.unwrap();

    assert!((report.closed_volume() - 0.25).abs() < 1e-9);
    assert!((report.unfilled - 0.75).abs() < 1e-9);
    assert!(paper.open_positions("EURUSD").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_close_ticket_reroutes_to_oldest_same_size() {
    let paper = paper_with(vec![
        position(5, Side::Long, 0.50, 300),
        position(6, Side::Long, 0.50, 100),
        position(7, Side::Long, 0.40, 50),
    ])
    .await;
    let spec = spec();
    let closer = FifoCloser::new(&paper, &spec, retry());

    let report = closer.close_ticket(5).await.unwrap();

    assert_eq!(report.rerouted_from, Some(5));
    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].ticket, 6);
    let left: Vec<u64> = volumes(&paper.open_positions("EURUSD").await.unwrap())
        .into_iter()
        .map(|(ticket, _)| ticket)
        .collect();
    assert_eq!(left, vec![5, 7]);
}

#[tokio::test]
async fn test_close_oldest_ticket_is_not_rerouted() {
    let paper = paper_with(vec![position(5, Side::Long, 0.50, 300), position(6, Side::Long, 0.50, 100)]).await;
    let spec = spec();
    let closer = FifoCloser::new(&paper, &spec, retry());

    let report = closer.close_ticket(6).await.unwrap();

    assert_eq!(report.rerouted_from, None);
    assert_eq!(report.fills[0].ticket, 6);
}

#[tokio::test]
async fn test_close_unknown_ticket() {
    let paper = paper_with(vec![position(1, Side::Long, 0.10, 100)]).await;
    let spec = spec();
    let closer = FifoCloser::new(&paper, &spec, retry());

    let err = closer.close_ticket(42).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnknownTicket(42)));
}

#[tokio::test]
async fn test_transient_close_errors_are_retried() {
    let paper = paper_with(vec![position(1, Side::Long, 0.10, 100)]).await;
    let flaky = FlakyGateway::new(paper).with_errors(vec![
        GatewayError::Timeout,
        GatewayError::Disconnected("socket reset".to_string()),
    ]);
    let spec = spec();
    let closer = FifoCloser::new(&flaky, &spec, retry());

    let report = closer.close_ticket(1).await.unwrap();

    assert_eq!(flaky.attempts(), 3);
    assert_eq!(report.fills[0].ticket, 1);
    assert!(flaky.inner().open_positions("EURUSD").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejection_stops_the_sequence() {
    let paper = paper_with(vec![position(1, Side::Long, 0.10, 100), position(2, Side::Long, 0.10, 200)]).await;
    let flaky = FlakyGateway::new(paper).with_errors(vec![GatewayError::Rejected {
        code: 10018,
        reason: "market closed".to_string(),
    }]);
    let spec = spec();
    let closer = FifoCloser::new(&flaky, &spec, retry());

    let report = closer.close_volume(Side::Long, 0.2).await.unwrap();

    assert_eq!(flaky.attempts(), 1);
    assert!(report.fills.is_empty());
    assert!(matches!(report.error, Some(GatewayError::Rejected { code: 10018, .. })));
    assert_eq!(flaky.inner().open_positions("EURUSD").await.unwrap().len(), 2);
}
