//! Swing-point key levels
//!
//! Finds swing highs/lows in recent bars, merges nearby swings into levels
//! and scores each level by how often price turned there.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::domain::{Candle, KeyLevel};
use crate::ports::KeyLevelProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// Bars on each side a swing must dominate
    pub swing_bars: usize,
    /// Bars scanned for swings
    pub lookback: usize,
    /// Swings closer than this (price units) merge into one level
    pub merge_distance: f64,
    /// Touches that map to full strength
    pub full_strength_touches: u32,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            swing_bars: 3,
            lookback: 200,
            merge_distance: 0.0010,
            full_strength_touches: 4,
        }
    }
}

/// Key levels from swing points in `bars` (oldest first)
pub fn swing_levels(bars: &[Candle], config: &SwingConfig) -> Vec<KeyLevel> {
    let k = config.swing_bars.max(1);
    let start = bars.len().saturating_sub(config.lookback);
    let bars = &bars[start..];
    let Some(last) = bars.last() else {
        return Vec::new();
    };
    if bars.len() < 2 * k + 1 {
        return Vec::new();
    }

    let mut swings: Vec<f64> = Vec::new();
    for i in k..bars.len() - k {
        let window = &bars[i - k..=i + k];
        let bar = &bars[i];
        if window.iter().all(|b| b.high <= bar.high) {
            swings.push(bar.high);
        }
        if window.iter().all(|b| b.low >= bar.low) {
            swings.push(bar.low);
        }
    }
    swings.sort_by(f64::total_cmp);

    // Merge neighbours into clusters
    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for price in swings {
        match clusters.last_mut() {
            Some(cluster) if cluster.last().is_some_and(|p| price - p <= config.merge_distance) => {
                cluster.push(price)
            }
            _ => clusters.push(vec![price]),
        }
    }

    let full = config.full_strength_touches.max(1) as f64;
    clusters
        .into_iter()
        .map(|cluster| {
            let touches = cluster.len() as u32;
            let price = cluster.iter().sum::<f64>() / cluster.len() as f64;
            let strength = (touches as f64 / full).min(1.0);
            if price > last.close {
                KeyLevel::resistance(price, strength, touches)
            } else {
                KeyLevel::support(price, strength, touches)
            }
        })
        .collect()
}

/// Shared swing-level provider; the replay loop refreshes it from bars
#[derive(Debug, Clone, Default)]
pub struct SwingLevels {
    config: SwingConfig,
    levels: Arc<Mutex<Vec<KeyLevel>>>,
}

impl SwingLevels {
    pub fn new(config: SwingConfig) -> Self {
        Self { config, levels: Arc::default() }
    }

    /// Recompute levels from `bars` (oldest first)
    pub fn refresh(&self, bars: &[Candle]) {
        let levels = swing_levels(bars, &self.config);
        *self.levels.lock().unwrap_or_else(|e| e.into_inner()) = levels;
    }
}

impl KeyLevelProvider for SwingLevels {
    fn key_levels(&self, _symbol: &str) -> Vec<KeyLevel> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(i: i64, high: f64, low: f64) -> Candle {
        let mid = (high + low) / 2.0;
        Candle::new(i, mid, high, low, mid, 0.0)
    }

    /// Oscillates between 1.0950 and 1.1050 with a 4-bar half cycle
    fn range_bars() -> Vec<Candle> {
        let highs = [1.1000, 1.1025, 1.1050, 1.1025, 1.1000, 1.0975, 1.0950, 1.0975];
        (0..48)
            .map(|i| {
                let h = highs[i % highs.len()];
                bar(i as i64, h, h - 0.0010)
            })
            .collect()
    }

    #[test]
    fn test_range_edges_become_levels() {
        let config = SwingConfig { swing_bars: 2, ..SwingConfig::default() };
        let levels = swing_levels(&range_bars(), &config);

        let resistance = levels.iter().find(|l| l.is_resistance).unwrap();
        assert!((resistance.price - 1.1050).abs() < 1e-9);
        assert!(resistance.touch_count >= 4);
        assert_eq!(resistance.strength, 1.0);

        let support = levels.iter().find(|l| !l.is_resistance).unwrap();
        assert!((support.price - 1.0940).abs() < 1e-9);
    }

    #[test]
    fn test_short_history_has_no_levels() {
        let bars: Vec<Candle> = range_bars().into_iter().take(3).collect();
        assert!(swing_levels(&bars, &SwingConfig::default()).is_empty());
    }

    #[test]
    fn test_provider_shares_refreshed_levels() {
        let provider = SwingLevels::new(SwingConfig { swing_bars: 2, ..SwingConfig::default() });
        assert!(provider.key_levels("EURUSD").is_empty());
        let handle = provider.clone();
        handle.refresh(&range_bars());
        assert!(!provider.key_levels("EURUSD").is_empty());
    }
}
