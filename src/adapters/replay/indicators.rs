//! Indicator math over completed bars
//!
//! Every function takes bars oldest first and returns its series oldest
//! first. Series that cannot be computed yet come back empty.

use statrs::statistics::Statistics;

use crate::domain::Candle;

/// Value `shift` bars back from the newest end of `series`
pub fn at_shift(series: &[f64], shift: usize) -> Option<f64> {
    series.len().checked_sub(shift + 1).map(|i| series[i])
}

/// Exponential moving average of closes, seeded with the simple average
pub fn ema(bars: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = bars[..period].iter().map(|b| b.close).mean();
    let mut out = Vec::with_capacity(bars.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for bar in &bars[period..] {
        prev += k * (bar.close - prev);
        out.push(prev);
    }
    out
}

/// Wilder's RSI of closes
pub fn rsi(bars: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() <= period {
        return Vec::new();
    }
    let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();
    let n = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / n;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / n;
    let mut out = vec![rsi_value(avg_gain, avg_loss)];

    for change in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss > 0.0 {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    } else if avg_gain > 0.0 {
        100.0
    } else {
        50.0
    }
}

/// Stochastic %K: close position within the `period`-bar high/low range
pub fn stochastic_k(bars: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period {
        return Vec::new();
    }
    bars.windows(period)
        .map(|window| {
            let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let close = window[period - 1].close;
            if high > low {
                (close - low) / (high - low) * 100.0
            } else {
                50.0
            }
        })
        .collect()
}

/// Rolling mean of true range over `period` bars
pub fn atr(bars: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() <= period {
        return Vec::new();
    }
    let ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| w[1].true_range(Some(w[0].close)))
        .collect();
    ranges.windows(period).map(|w| w.iter().mean()).collect()
}
