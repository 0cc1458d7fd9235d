//! Yield attribution: split a position's outcome into yield and
//! impermanent loss.
//!
//! Everything here is a pure function of its arguments. The current time,
//! price ratio and APR are always passed in, never read from shared state.

use crate::domain::{EpochDay, Figure, PositionEntry, PriceRatio, TimeMs, YieldReport};

const DAYS_PER_YEAR: f64 = 365.0;

/// Impermanent loss of a 50/50 constant-product position, in percent, for a
/// price ratio multiple `k = current / entry`.
///
/// `(2·sqrt(k) / (1 + k) − 1) × 100`. Zero at `k = 1`, symmetric under
/// `k → 1/k`, never positive. `None` unless `k` is finite and positive.
pub fn impermanent_loss_pct(k: f64) -> Option<f64> {
    if !k.is_finite() || k <= 0.0 {
        return None;
    }
    Some((2.0 * k.sqrt() / (1.0 + k) - 1.0) * 100.0)
}

/// `current / entry`, when both ratios are known.
pub fn price_ratio_multiple(entry: Option<PriceRatio>, current: Option<PriceRatio>) -> Option<f64> {
    let k = current?.value() / entry?.value();
    (k.is_finite() && k > 0.0).then_some(k)
}

/// Whole days from `entry_date` to `now`; `None` if unknown or in the future.
pub fn holding_days(entry_date: Option<EpochDay>, now: TimeMs) -> Option<i64> {
    let days = now.day().as_i64() - entry_date?.as_i64();
    (days >= 0).then_some(days)
}

/// Yield earned at a constant `apr_pct` over `days`.
///
/// Approximation: assumes today's APR held for the whole window.
pub fn simple_yield_pct(apr_pct: f64, days: i64) -> f64 {
    apr_pct * (days as f64 / DAYS_PER_YEAR)
}

/// Build the report for one position.
pub fn compute_report(
    entry: &PositionEntry,
    current_price_ratio: Option<PriceRatio>,
    actual_apr_pct: Option<f64>,
    now: TimeMs,
) -> YieldReport {
    let held = holding_days(entry.entry_date, now);
    let apr = actual_apr_pct.filter(|a| a.is_finite());

    let actual_yield_pct = match (apr, held) {
        (Some(apr), Some(days)) => Some(simple_yield_pct(apr, days)),
        _ => None,
    };

    let (il_pct, price_ratio_delta_pct, net_gain_loss_pct) = if entry.position_type.is_lp() {
        let k = price_ratio_multiple(entry.entry_price_ratio, current_price_ratio);
        let il = k.and_then(impermanent_loss_pct);
        let net = match (actual_yield_pct, il) {
            (Some(y), Some(il)) => Some(y + il),
            _ => None,
        };
        (
            Figure::from_option(il),
            Figure::from_option(k.map(|k| (k - 1.0) * 100.0)),
            Figure::from_option(net),
        )
    } else {
        (
            Figure::NotApplicable,
            Figure::NotApplicable,
            Figure::from_option(actual_yield_pct),
        )
    };

    YieldReport {
        days_held: held.unwrap_or(0),
        holding_period_known: held.is_some(),
        actual_apr: Figure::from_option(apr),
        actual_yield_pct: Figure::from_option(actual_yield_pct),
        il_pct,
        net_gain_loss_pct,
        price_ratio_delta_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_il_known_points() {
        assert_eq!(impermanent_loss_pct(1.0), Some(0.0));
        let il4 = impermanent_loss_pct(4.0).unwrap();
        assert!((il4 + 20.0).abs() < 1e-9);
        // 2x price move loses about 5.72%
        let il2 = impermanent_loss_pct(2.0).unwrap();
        assert!((il2 + 5.719_095_841_793_65).abs() < 1e-9);
    }

    #[test]
    fn test_il_rejects_invalid_k() {
        assert_eq!(impermanent_loss_pct(0.0), None);
        assert_eq!(impermanent_loss_pct(-1.0), None);
        assert_eq!(impermanent_loss_pct(f64::NAN), None);
        assert_eq!(impermanent_loss_pct(f64::INFINITY), None);
    }

    #[test]
    fn test_holding_days() {
        let now = TimeMs::new(100 * 86_400_000 + 5);
        assert_eq!(holding_days(Some(EpochDay::new(90)), now), Some(10));
        assert_eq!(holding_days(Some(EpochDay::new(100)), now), Some(0));
        assert_eq!(holding_days(Some(EpochDay::new(101)), now), None);
        assert_eq!(holding_days(None, now), None);
    }

    #[test]
    fn test_simple_yield() {
        assert!((simple_yield_pct(36.5, 10) - 1.0).abs() < 1e-12);
        assert_eq!(simple_yield_pct(10.0, 0), 0.0);
    }

    #[test]
    fn test_price_ratio_multiple() {
        let one = PriceRatio::new(1.0);
        let four = PriceRatio::new(4.0);
        assert_eq!(price_ratio_multiple(one, four), Some(4.0));
        assert_eq!(price_ratio_multiple(None, four), None);
        assert_eq!(price_ratio_multiple(one, None), None);
    }
}
