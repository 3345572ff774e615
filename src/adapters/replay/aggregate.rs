//! Bar Aggregator - Builds higher-timeframe candles from base bars
//!
//! Accumulates base-timeframe bars into buckets aligned on the target
//! timeframe and emits each candle once its bucket is complete. Weekly
//! buckets start on Monday 00:00 UTC and monthly buckets on the first of the
//! calendar month.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};

use crate::domain::{Candle, Timeframe};

#[derive(Debug, Clone)]
pub struct BarAggregator {
    base_secs: i64,
    target: Timeframe,
    /// Candle being built and the end of its bucket
    current: Option<(Candle, i64)>,
}

impl BarAggregator {
    pub fn new(base: Timeframe, target: Timeframe) -> Self {
        Self {
            base_secs: base.seconds(),
            target: target.max(base),
            current: None,
        }
    }

    /// Bucket start and exclusive end for a bar opening at `time`
    fn bucket(&self, time: i64) -> (i64, i64) {
        calendar_bucket(self.target, time).unwrap_or_else(|| {
            let period = self.target.seconds();
            let start = time - time.rem_euclid(period);
            (start, start + period)
        })
    }

    /// Add one base bar. Returns every candle it completed (at most two when
    /// the bar jumps a gap and also closes its own bucket).
    pub fn push(&mut self, bar: &Candle) -> Vec<Candle> {
        let mut completed = Vec::new();
        let (bucket, end) = self.bucket(bar.time);

        match self.current.as_mut() {
            Some((candle, _)) if candle.time == bucket => {
                candle.high = candle.high.max(bar.high);
                candle.low = candle.low.min(bar.low);
                candle.close = bar.close;
                candle.volume += bar.volume;
            }
            _ => {
                // A bar from a new bucket closes whatever was open
                if let Some((open, _)) = self.current.take() {
                    completed.push(open);
                }
                let candle = Candle::new(bucket, bar.open, bar.high, bar.low, bar.close, bar.volume);
                self.current = Some((candle, end));
            }
        }

        if bar.time + self.base_secs >= end {
            if let Some((done, _)) = self.current.take() {
                completed.push(done);
            }
        }
        completed
    }

    /// Aggregate a whole series (oldest first) into completed candles
    pub fn aggregate(base: Timeframe, target: Timeframe, bars: &[Candle]) -> Vec<Candle> {
        let mut aggregator = Self::new(base, target);
        bars.iter().flat_map(|bar| aggregator.push(bar)).collect()
    }

    pub fn is_building(&self) -> bool {
        self.current.is_some()
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Calendar bounds for weekly and monthly buckets, `None` for fixed-length timeframes
fn calendar_bucket(target: Timeframe, time: i64) -> Option<(i64, i64)> {
    let date = DateTime::<Utc>::from_timestamp(time, 0)?.date_naive();
    let (start, end) = match target {
        Timeframe::W1 => {
            let start = date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))?;
            (start, start.checked_add_days(Days::new(7))?)
        }
        Timeframe::MN1 => {
            let start = date.with_day(1)?;
            (start, start.checked_add_months(Months::new(1))?)
        }
        _ => return None,
    };
    Some((midnight(start)?, midnight(end)?))
}

fn midnight(date: NaiveDate) -> Option<i64> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m15(index: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(index * 900, open, high, low, close, 1.0)
    }

    #[test]
    fn test_four_quarters_make_an_hour() {
        let bars = vec![
            m15(0, 1.0, 1.5, 0.9, 1.2),
            m15(1, 1.2, 1.8, 1.1, 1.6),
            m15(2, 1.6, 1.7, 0.8, 1.0),
            m15(3, 1.0, 1.3, 0.95, 1.1),
        ];
        let hours = BarAggregator::aggregate(Timeframe::M15, Timeframe::H1, &bars);
        assert_eq!(hours.len(), 1);
        let hour = hours[0];
        assert_eq!(hour.time, 0);
        assert_eq!(hour.open, 1.0);
        assert_eq!(hour.high, 1.8);
        assert_eq!(hour.low, 0.8);
        assert_eq!(hour.close, 1.1);
        assert_eq!(hour.volume, 4.0);
    }

    #[test]
    fn test_incomplete_bucket_not_emitted() {
        let mut aggregator = BarAggregator::new(Timeframe::M15, Timeframe::H1);
        assert!(aggregator.push(&m15(0, 1.0, 1.1, 0.9, 1.0)).is_empty());
        assert!(aggregator.push(&m15(1, 1.0, 1.1, 0.9, 1.0)).is_empty());
        assert!(aggregator.is_building());
    }

    #[test]
    fn test_gap_closes_open_bucket() {
        let mut aggregator = BarAggregator::new(Timeframe::M15, Timeframe::H1);
        aggregator.push(&m15(0, 1.0, 1.1, 0.9, 1.0));
        // Next bar belongs to the following hour
        let done = aggregator.push(&m15(5, 2.0, 2.1, 1.9, 2.0));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].time, 0);
        assert_eq!(done[0].close, 1.0);
    }

    fn d1(date: (i32, u32, u32), close: f64) -> Candle {
        let time = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .and_then(midnight)
            .unwrap();
        Candle::new(time, close, close + 0.01, close - 0.01, close, 1.0)
    }

    #[test]
    fn test_weeks_start_on_monday() {
        // Thu 2024-01-04 through Tue 2024-01-09
        let bars: Vec<Candle> = (4..=9).map(|day| d1((2024, 1, day), day as f64)).collect();
        let weeks = BarAggregator::aggregate(Timeframe::D1, Timeframe::W1, &bars);

        // Thu..Sun close the week that began Mon 2024-01-01
        assert_eq!(weeks.len(), 1);
        assert_eq!(weeks[0].time, d1((2024, 1, 1), 0.0).time);
        assert_eq!(weeks[0].open, 4.0);
        assert_eq!(weeks[0].close, 7.0);

        let monday = DateTime::<Utc>::from_timestamp(weeks[0].time, 0).unwrap();
        assert_eq!(monday.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn test_months_follow_the_calendar() {
        // 2024-01-30 .. 2024-02-02 spans a month boundary after 31 days, not 30
        let bars = vec![
            d1((2024, 1, 30), 1.0),
            d1((2024, 1, 31), 2.0),
            d1((2024, 2, 1), 3.0),
            d1((2024, 2, 2), 4.0),
        ];
        let mut aggregator = BarAggregator::new(Timeframe::D1, Timeframe::MN1);
        assert!(aggregator.push(&bars[0]).is_empty());
        let january = aggregator.push(&bars[1]);
        assert_eq!(january.len(), 1);
        assert_eq!(january[0].time, d1((2024, 1, 1), 0.0).time);
        assert_eq!(january[0].close, 2.0);

        assert!(aggregator.push(&bars[2]).is_empty());
        assert!(aggregator.push(&bars[3]).is_empty());
        assert!(aggregator.is_building());
    }

    #[test]
    fn test_same_timeframe_passes_through() {
        let bars = vec![m15(0, 1.0, 1.1, 0.9, 1.0), m15(1, 1.0, 1.2, 0.9, 1.1)];
        let out = BarAggregator::aggregate(Timeframe::M15, Timeframe::M15, &bars);
        assert_eq!(out, bars);
    }
}
