//! Fallback volatility estimator
//!
//! Computes ATR directly from raw bars so the classifier still has a
//! volatility reading when the feed's own ATR is missing or reports zero.

use statrs::statistics::Statistics;

use crate::domain::Candle;

/// True range of every bar, oldest first. Input bars are newest first.
pub fn true_ranges(bars_newest_first: &[Candle]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    bars_newest_first
        .iter()
        .rev()
        .map(|bar| {
            let tr = bar.true_range(prev_close);
            prev_close = Some(bar.close);
            tr
        })
        .collect()
}

/// Mean true range of the most recent `period` bars.
///
/// Pass `period + 1` bars so the oldest counted bar has a previous close.
/// Returns `None` when there is nothing to average.
pub fn average_true_range(bars_newest_first: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || bars_newest_first.is_empty() {
        return None;
    }
    let ranges = true_ranges(bars_newest_first);
    let start = ranges.len().saturating_sub(period);
    let recent = &ranges[start..];
    let atr = recent.iter().mean();
    atr.is_finite().then_some(atr)
}
