use serde::{Deserialize, Serialize};

use super::market::Side;

/// Support/resistance price owned by an external detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyLevel {
    pub price: f64,
    /// true = resistance, false = support
    pub is_resistance: bool,
    pub strength: f64,
    pub touch_count: u32,
}

impl KeyLevel {
    pub fn resistance(price: f64, strength: f64, touch_count: u32) -> Self {
        Self { price, is_resistance: true, strength, touch_count }
    }

    pub fn support(price: f64, strength: f64, touch_count: u32) -> Self {
        Self { price, is_resistance: false, strength, touch_count }
    }

    /// A level that stands in the way of a trade on `side`
    pub fn opposes(&self, side: Side) -> bool {
        match side {
            Side::Long => self.is_resistance,
            Side::Short => !self.is_resistance,
        }
    }
}

/// Highest-strength level, ties broken by touch count
pub fn strongest(levels: &[KeyLevel]) -> Option<&KeyLevel> {
    levels.iter().max_by(|a, b| {
        a.strength
            .total_cmp(&b.strength)
            .then(a.touch_count.cmp(&b.touch_count))
    })
}

/// Closest resistance above `price`
pub fn nearest_resistance_above(levels: &[KeyLevel], price: f64) -> Option<&KeyLevel> {
    levels
        .iter()
        .filter(|l| l.is_resistance && l.price > price)
        .min_by(|a, b| a.price.total_cmp(&b.price))
}

/// Closest support below `price`
pub fn nearest_support_below(levels: &[KeyLevel], price: f64) -> Option<&KeyLevel> {
    levels
        .iter()
        .filter(|l| !l.is_resistance && l.price < price)
        .max_by(|a, b| a.price.total_cmp(&b.price))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<KeyLevel> {
        vec![
            KeyLevel::resistance(1.1050, 0.6, 3),
            KeyLevel::resistance(1.1100, 0.9, 5),
            KeyLevel::support(1.0950, 0.7, 4),
            KeyLevel::support(1.0900, 0.9, 2),
        ]
    }

    #[test]
    fn test_strongest_breaks_ties_by_touches() {
        let levels = levels();
        let best = strongest(&levels).unwrap();
        assert_eq!(best.price, 1.1100);
        assert!(strongest(&[]).is_none());
    }

    #[test]
    fn test_nearest_bounds() {
        let levels = levels();
        assert_eq!(nearest_resistance_above(&levels, 1.1000).unwrap().price, 1.1050);
        assert_eq!(nearest_support_below(&levels, 1.1000).unwrap().price, 1.0950);
        assert!(nearest_resistance_above(&levels, 1.2000).is_none());
    }

    #[test]
    fn test_opposes() {
        assert!(KeyLevel::resistance(1.0, 1.0, 1).opposes(Side::Long));
        assert!(KeyLevel::support(1.0, 1.0, 1).opposes(Side::Short));
        assert!(!KeyLevel::support(1.0, 1.0, 1).opposes(Side::Long));
    }
}
