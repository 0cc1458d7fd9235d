//! Pool price ratios and the reserves they are derived from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserves of a two-asset constant-product pool as reported by the indexer.
///
/// Token A is always the quote asset (e.g. ADA in `NIGHT/ADA`), so a ratio
/// derived from these reserves reads "units of A per unit of B".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserves {
    pub reserve_a: u128,
    pub reserve_b: u128,
    /// Outstanding LP token supply, when the indexer knows it.
    pub total_supply: Option<u128>,
    pub decimals_a: u32,
    pub decimals_b: u32,
}

impl PoolReserves {
    pub fn new(reserve_a: u128, reserve_b: u128) -> Self {
        Self {
            reserve_a,
            reserve_b,
            total_supply: None,
            decimals_a: 0,
            decimals_b: 0,
        }
    }

    pub fn with_total_supply(mut self, total_supply: u128) -> Self {
        self.total_supply = Some(total_supply);
        self
    }

    pub fn with_decimals(mut self, decimals_a: u32, decimals_b: u32) -> Self {
        self.decimals_a = decimals_a;
        self.decimals_b = decimals_b;
        self
    }

    /// Reserve A in display units.
    pub fn scaled_a(&self) -> f64 {
        scale(self.reserve_a, self.decimals_a)
    }

    /// Reserve B in display units.
    pub fn scaled_b(&self) -> f64 {
        scale(self.reserve_b, self.decimals_b)
    }
}

fn scale(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Relative price of the pooled assets, `reserve_a / reserve_b` in display units.
///
/// Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct PriceRatio(f64);

impl PriceRatio {
    /// Returns None for zero, negative, or non-finite values.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value > 0.0 {
            Some(PriceRatio(value))
        } else {
            None
        }
    }

    /// Ratio implied by pool reserves; None when either side is empty.
    pub fn from_reserves(reserves: &PoolReserves) -> Option<Self> {
        if reserves.reserve_a == 0 || reserves.reserve_b == 0 {
            return None;
        }
        Self::new(reserves.scaled_a() / reserves.scaled_b())
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Amount-weighted mean of two ratios.
    ///
    /// Returns `incoming` unchanged when the prior weight is zero.
    pub fn weighted_with(&self, prior_weight: f64, incoming: PriceRatio, incoming_weight: f64) -> PriceRatio {
        let total = prior_weight + incoming_weight;
        if prior_weight <= 0.0 || total <= 0.0 {
            return incoming;
        }
        let blended = (prior_weight * self.0 + incoming_weight * incoming.0) / total;
        PriceRatio::new(blended).unwrap_or(incoming)
    }
}

impl<'de> Deserialize<'de> for PriceRatio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        PriceRatio::new(value)
            .ok_or_else(|| serde::de::Error::custom("price ratio must be finite and > 0"))
    }
}

impl fmt::Display for PriceRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive() {
        assert!(PriceRatio::new(0.0).is_none());
        assert!(PriceRatio::new(-1.0).is_none());
        assert!(PriceRatio::new(f64::NAN).is_none());
        assert!(PriceRatio::new(f64::INFINITY).is_none());
        assert!(PriceRatio::new(1e-12).is_some());
    }

    #[test]
    fn test_from_reserves_uses_a_over_b_in_display_units() {
        // 2_000 A (6 dp) against 500 B (0 dp) -> 4 A per B
        let reserves = PoolReserves::new(2_000_000_000, 500).with_decimals(6, 0);
        let ratio = PriceRatio::from_reserves(&reserves).unwrap();
        assert!((ratio.value() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_reserves_empty_pool() {
        assert!(PriceRatio::from_reserves(&PoolReserves::new(0, 10)).is_none());
        assert!(PriceRatio::from_reserves(&PoolReserves::new(10, 0)).is_none());
    }

    #[test]
    fn test_weighted_with() {
        let r1 = PriceRatio::new(1.0).unwrap();
        let r3 = PriceRatio::new(3.0).unwrap();
        assert_eq!(r1.weighted_with(1000.0, r3, 1000.0).value(), 2.0);
        assert_eq!(r1.weighted_with(0.0, r3, 1000.0).value(), 3.0);
        let skewed = r1.weighted_with(3000.0, r3, 1000.0).value();
        assert!((skewed - 1.5).abs() < 1e-12);
    }
}
