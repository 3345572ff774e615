//! Broker constraint normalization
//!
//! Volume math runs in `Decimal` so a lot is an exact multiple of the broker
//! step, never `0.30000000000000004` lots.

use rust_decimal::prelude::*;

use super::BlockReason;
use crate::domain::{PendingOrder, Side, SymbolSpec};

fn decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Largest multiple of `step` not above `value`
fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    value.checked_div(step)?.floor().checked_mul(step)
}

/// Round `lot` down to the volume step and clamp it to the broker range
pub fn normalize_volume(lot: f64, spec: &SymbolSpec) -> Result<f64, BlockReason> {
    if !lot.is_finite() || lot <= 0.0 {
        return Err(BlockReason::InvalidLotSize(lot));
    }
    let (Some(lot_d), Some(step), Some(min), Some(max)) = (
        decimal(lot),
        decimal(spec.volume_step),
        decimal(spec.volume_min),
        decimal(spec.volume_max),
    ) else {
        return Err(BlockReason::InvalidLotSize(lot));
    };
    if step <= Decimal::ZERO {
        return Err(BlockReason::InvalidLotSize(lot));
    }

    // Clamp first so the step division stays in range for any finite lot
    let clamped = lot_d.max(min).min(max);
    let legal = floor_to_step(clamped, step).ok_or(BlockReason::InvalidLotSize(lot))?;
    if legal <= Decimal::ZERO || legal < min {
        return Err(BlockReason::InvalidLotSize(lot));
    }

    legal.normalize().to_f64().ok_or(BlockReason::InvalidLotSize(lot))
}

/// Split `volume` into `(take, rest)` with `take <= available`, both on the step grid
pub fn split_volume(volume: f64, available: f64, spec: &SymbolSpec) -> Option<(f64, f64)> {
    let volume = decimal(volume)?;
    let available = decimal(available)?;
    let step = decimal(spec.volume_step)?;
    if step <= Decimal::ZERO {
        return None;
    }
    let take = floor_to_step(volume.min(available), step)?;
    let rest = volume.checked_sub(take)?;
    Some((take.normalize().to_f64()?, rest.normalize().to_f64()?))
}

/// Move a stop-entry trigger at least the broker stops level away from market
pub fn legal_trigger(side: Side, trigger: f64, bid: f64, ask: f64, spec: &SymbolSpec) -> f64 {
    let min = spec.min_stop_distance();
    match side {
        Side::Long => trigger.max(ask + min),
        Side::Short => trigger.min(bid - min),
    }
}

/// An existing pending order on the same side within the duplicate tolerance
pub fn find_duplicate<'a>(
    pending: &'a [PendingOrder],
    symbol: &str,
    side: Side,
    price: f64,
    spec: &SymbolSpec,
) -> Option<&'a PendingOrder> {
    let tolerance = spec.duplicate_tolerance() + spec.point * 1e-3;
    pending
        .iter()
        .find(|o| o.symbol == symbol && o.side == side && (o.price - price).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> SymbolSpec {
        SymbolSpec {
            symbol: "EURUSD".to_string(),
            point: 0.00001,
            digits: 5,
            pip_size: 0.0001,
            volume_min: 0.01,
            volume_max: 5.0,
            volume_step: 0.01,
            stops_level_points: 30,
            duplicate_tolerance_points: 5,
        }
    }

    #[test]
    fn test_volume_rounds_down_to_step() {
        let spec = spec();
        assert_eq!(normalize_volume(0.379, &spec).unwrap(), 0.37);
        assert_eq!(normalize_volume(0.3, &spec).unwrap(), 0.3);
        assert_eq!(normalize_volume(1.0 / 3.0, &spec).unwrap(), 0.33);
    }

    #[test]
    fn test_volume_clamped_to_range() {
        let spec = spec();
        assert_eq!(normalize_volume(12.5, &spec).unwrap(), 5.0);
        assert_eq!(normalize_volume(0.004, &spec).unwrap(), 0.01);
    }

    #[test]
    fn test_non_positive_lot_blocks() {
        let spec = spec();
        assert!(matches!(normalize_volume(0.0, &spec), Err(BlockReason::InvalidLotSize(_))));
        assert!(matches!(normalize_volume(-1.0, &spec), Err(BlockReason::InvalidLotSize(_))));
        assert!(matches!(normalize_volume(f64::NAN, &spec), Err(BlockReason::InvalidLotSize(_))));
    }

    #[test]
    fn test_every_result_is_on_grid_and_in_range() {
        for step in [0.01, 0.1, 0.5] {
            let mut spec = spec();
            spec.volume_step = step;
            spec.volume_min = step;
            spec.volume_max = 10.0;
            let step_d = Decimal::from_f64(step).unwrap();
            let mut lot = 0.001;
            while lot < 20.0 {
                let v = normalize_volume(lot, &spec).unwrap();
                let v_d = Decimal::from_f64(v).unwrap();
                assert_eq!(v_d % step_d, dec!(0), "{} not a multiple of {}", v, step);
                assert!(v >= spec.volume_min && v <= spec.volume_max);
                if lot >= spec.volume_min {
                    assert!(v <= lot + 1e-12, "{} rounded up to {}", lot, v);
                }
                lot *= 1.37;
            }
        }
    }

    #[test]
    fn test_huge_lot_clamps_to_maximum() {
        let spec = spec();
        assert_eq!(normalize_volume(1e27, &spec).unwrap(), 5.0);
        // Too large for a Decimal at all
        assert!(matches!(normalize_volume(1e30, &spec), Err(BlockReason::InvalidLotSize(_))));
    }

    #[test]
    fn test_split_volume_overflow_is_none() {
        let mut spec = spec();
        spec.volume_step = 1e-20;
        assert_eq!(split_volume(1e27, 1e27, &spec), None);
    }

    #[test]
    fn test_split_volume() {
        let spec = spec();
        assert_eq!(split_volume(0.5, 0.3, &spec), Some((0.3, 0.2)));
        assert_eq!(split_volume(0.2, 0.3, &spec), Some((0.2, 0.0)));
    }

    #[test]
    fn test_trigger_pushed_past_stops_level() {
        let spec = spec();
        // 30 points = 0.0003
        let long = legal_trigger(Side::Long, 1.1003, 1.1000, 1.1002, &spec);
        assert!((long - 1.1005).abs() < 1e-9);
        let short = legal_trigger(Side::Short, 1.0990, 1.1000, 1.1002, &spec);
        assert_eq!(short, 1.0990);
    }

    #[test]
    fn test_duplicate_detection() {
        let spec = spec();
        let pending = vec![PendingOrder {
            ticket: 7,
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            price: 1.10120,
            volume: 0.1,
        }];
        assert_eq!(find_duplicate(&pending, "EURUSD", Side::Long, 1.10124, &spec).map(|o| o.ticket), Some(7));
        assert!(find_duplicate(&pending, "EURUSD", Side::Short, 1.10120, &spec).is_none());
        assert!(find_duplicate(&pending, "EURUSD", Side::Long, 1.10130, &spec).is_none());
        assert!(find_duplicate(&pending, "GBPUSD", Side::Long, 1.10120, &spec).is_none());
    }
}
