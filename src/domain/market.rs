//! Market data value types shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for longs, -1.0 for shorts
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// OHLCV bar. `time` is the bar open time in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { time, open, high, low, close, volume }
    }

    /// Validate OHLC data integrity
    pub fn is_valid(&self) -> bool {
        self.high >= self.low
            && self.close >= self.low
            && self.close <= self.high
            && self.open >= self.low
            && self.open <= self.high
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.open.is_finite()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range against the previous bar's close
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(prev_close) => {
                let hl = self.high - self.low;
                let hc = (self.high - prev_close).abs();
                let lc = (self.low - prev_close).abs();
                hl.max(hc).max(lc)
            }
            None => self.high - self.low,
        }
    }

    /// Range fully contained in `other`
    pub fn is_inside(&self, other: &Candle) -> bool {
        self.high <= other.high && self.low >= other.low
    }
}

/// Top of book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub time: i64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        (self.ask - self.bid).max(0.0)
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Price a new order on `side` would fill at
    pub fn entry_price(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.ask,
            Side::Short => self.bid,
        }
    }
}

/// Account state captured at evaluation time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub equity: f64,
    pub open_positions: usize,
}

/// Broker constraints for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Smallest price increment
    pub point: f64,
    /// Price precision in decimal places
    pub digits: u32,
    /// Size of one pip in price units
    pub pip_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Broker minimum stop distance in points
    pub stops_level_points: u32,
    /// Pending orders closer than this (in points) count as duplicates
    pub duplicate_tolerance_points: u32,
}

impl SymbolSpec {
    /// Minimum legal distance between a price and its stop, never below one point
    pub fn min_stop_distance(&self) -> f64 {
        self.stops_level_points.max(1) as f64 * self.point
    }

    pub fn duplicate_tolerance(&self) -> f64 {
        self.duplicate_tolerance_points as f64 * self.point
    }

    /// Round a price to instrument precision
    pub fn round_price(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        (price * scale).round() / scale
    }

    /// Convert a price distance to pips
    pub fn to_pips(&self, distance: f64) -> f64 {
        if self.pip_size > 0.0 {
            distance / self.pip_size
        } else {
            distance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn eurusd() -> SymbolSpec {
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

    #[test]
    fn test_candle_validation() {
        let valid = Candle::new(0, 100.0, 105.0, 95.0, 102.0, 1000.0);
        assert!(valid.is_valid());

        // Invalid: high < low
        let invalid = Candle::new(0, 100.0, 95.0, 105.0, 100.0, 1000.0);
        assert!(!invalid.is_valid());

        // Invalid: close outside range
        let invalid2 = Candle::new(0, 100.0, 105.0, 95.0, 110.0, 1000.0);
        assert!(!invalid2.is_valid());
    }

    #[test]
    fn test_true_range_accounts_for_gaps() {
        let bar = Candle::new(0, 101.0, 102.0, 100.5, 101.5, 0.0);
        assert_eq!(bar.true_range(None), 1.5);
        // Gap up from 98: high - prev_close dominates
        assert_eq!(bar.true_range(Some(98.0)), 4.0);
        // Gap down from 105: prev_close - low dominates
        assert_eq!(bar.true_range(Some(105.0)), 4.5);
    }

    #[test]
    fn test_inside_bar() {
        let mother = Candle::new(0, 100.0, 105.0, 95.0, 101.0, 0.0);
        let inside = Candle::new(1, 101.0, 103.0, 97.0, 100.0, 0.0);
        assert!(inside.is_inside(&mother));
        assert!(!mother.is_inside(&inside));
    }

    #[test]
    fn test_symbol_spec_helpers() {
        let spec = eurusd();
        assert!((spec.min_stop_distance() - 0.0002).abs() < 1e-12);
        assert_eq!(spec.round_price(1.234_567_8), 1.23457);
        assert!((spec.to_pips(0.0015) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_quote_entry_price() {
        let quote = Quote { bid: 1.1000, ask: 1.1002, time: 0 };
        assert_eq!(quote.entry_price(Side::Long), 1.1002);
        assert_eq!(quote.entry_price(Side::Short), 1.1000);
        assert!((quote.spread() - 0.0002).abs() < 1e-12);
    }
}
