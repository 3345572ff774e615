//! Wilder's ADX / +DI / -DI
//!
//! Incremental: feed completed bars oldest first through `update`.
//!
//! - Bars 1..=n accumulate the first smoothed TR / +DM / -DM sums
//! - Bars n+1..2n-1 accumulate DX for the first ADX
//! - After that ADX = (prev * (n-1) + DX) / n

use crate::domain::Candle;

/// Latest ADX output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdxReading {
    pub plus_di: f64,
    pub minus_di: f64,
    pub adx: f64,
    /// True once warmup complete
    pub is_valid: bool,
}

#[derive(Debug, Clone)]
pub struct WilderAdx {
    period: usize,

    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,

    // Wilder's smoothed values
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,

    bars_processed: usize,
    dx_sum: f64,

    plus_di: f64,
    minus_di: f64,
    adx: f64,
}

impl WilderAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_high: None,
            prev_low: None,
            prev_close: None,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            bars_processed: 0,
            dx_sum: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
            adx: 0.0,
        }
    }

    /// Bars needed before ADX is valid
    pub fn warmup_bars(period: usize) -> usize {
        2 * period.max(1) - 1
    }

    /// Run every bar in `bars` (oldest first) and return the final reading
    pub fn over(period: usize, bars: &[Candle]) -> AdxReading {
        let mut adx = Self::new(period);
        let mut reading = AdxReading::default();
        for bar in bars {
            reading = adx.update(bar);
        }
        reading
    }

    pub fn update(&mut self, candle: &Candle) -> AdxReading {
        let n = self.period as f64;
        let tr = candle.true_range(self.prev_close);
        let (plus_dm, minus_dm) = self.directional_movement(candle);

        self.prev_high = Some(candle.high);
        self.prev_low = Some(candle.low);
        self.prev_close = Some(candle.close);
        self.bars_processed += 1;

        if self.bars_processed <= self.period {
            self.smoothed_tr += tr;
            self.smoothed_plus_dm += plus_dm;
            self.smoothed_minus_dm += minus_dm;
            if self.bars_processed == self.period {
                self.update_di();
                self.dx_sum += self.dx();
            }
        } else {
            self.smoothed_tr = self.smoothed_tr - (self.smoothed_tr / n) + tr;
            self.smoothed_plus_dm = self.smoothed_plus_dm - (self.smoothed_plus_dm / n) + plus_dm;
            self.smoothed_minus_dm = self.smoothed_minus_dm - (self.smoothed_minus_dm / n) + minus_dm;
            self.update_di();
            let dx = self.dx();

            let warmup = Self::warmup_bars(self.period);
            if self.bars_processed < warmup {
                self.dx_sum += dx;
            } else if self.bars_processed == warmup {
                self.dx_sum += dx;
                self.adx = self.dx_sum / n;
            } else {
                self.adx = (self.adx * (n - 1.0) + dx) / n;
            }
        }

        self.reading()
    }

    pub fn reading(&self) -> AdxReading {
        AdxReading {
            plus_di: self.plus_di,
            minus_di: self.minus_di,
            adx: self.adx,
            is_valid: self.is_valid(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bars_processed >= Self::warmup_bars(self.period)
    }

    fn directional_movement(&self, candle: &Candle) -> (f64, f64) {
        match (self.prev_high, self.prev_low) {
            (Some(prev_high), Some(prev_low)) => {
                let up_move = candle.high - prev_high;
                let down_move = prev_low - candle.low;

                if up_move > down_move && up_move > 0.0 {
                    (up_move, 0.0)
                } else if down_move > up_move && down_move > 0.0 {
                    (0.0, down_move)
                } else {
                    (0.0, 0.0)
                }
            }
            _ => (0.0, 0.0),
        }
    }

    fn update_di(&mut self) {
        if self.smoothed_tr > 0.0 {
            self.plus_di = (self.smoothed_plus_dm / self.smoothed_tr) * 100.0;
            self.minus_di = (self.smoothed_minus_dm / self.smoothed_tr) * 100.0;
        } else {
            self.plus_di = 0.0;
            self.minus_di = 0.0;
        }
    }

    fn dx(&self) -> f64 {
        let di_sum = self.plus_di + self.minus_di;
        if di_sum > 0.0 {
            ((self.plus_di - self.minus_di).abs() / di_sum) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uptrend(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                Candle::new(i as i64 * 60, base, base + 2.5, base - 0.5, base + 2.0, 10.0)
            })
            .collect()
    }

    fn chop(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let offset = if i % 2 == 0 { 1.0 } else { -1.0 };
                Candle::new(i as i64 * 60, 100.0, 101.0 + offset, 99.0 + offset, 100.0, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_warmup() {
        let bars = uptrend(30);
        let mut adx = WilderAdx::new(14);
        for (i, bar) in bars.iter().enumerate() {
            let reading = adx.update(bar);
            assert_eq!(reading.is_valid, i + 1 >= 27, "bar {}", i + 1);
        }
    }

    #[test]
    fn test_strong_uptrend() {
        let reading = WilderAdx::over(14, &uptrend(60));
        assert!(reading.is_valid);
        assert!(reading.adx > 40.0, "adx {}", reading.adx);
        assert!(reading.plus_di > reading.minus_di);
    }

    #[test]
    fn test_choppy_market_weak_trend() {
        let reading = WilderAdx::over(14, &chop(60));
        assert!(reading.is_valid);
        assert!(reading.adx < 25.0, "adx {}", reading.adx);
    }

    #[test]
    fn test_flat_bars_yield_zero() {
        let flat: Vec<Candle> = (0..40).map(|i| Candle::new(i, 1.0, 1.0, 1.0, 1.0, 0.0)).collect();
        let reading = WilderAdx::over(14, &flat);
        assert_eq!(reading.adx, 0.0);
        assert_eq!(reading.plus_di, 0.0);
    }
}
