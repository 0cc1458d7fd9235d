//! Derived, never-persisted yield attribution output.

use serde::{Serialize, Serializer};

/// A reported value, or an explicit marker that it could not be computed.
///
/// Serializes as the bare value, the string `"unavailable"`, or `null` for
/// figures that do not apply to the position type (e.g. IL on a lending
/// position).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Figure<T> {
    Available(T),
    Unavailable,
    NotApplicable,
}

impl<T> Figure<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Figure::Available(v),
            None => Figure::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Figure::Available(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Figure::Available(v) => Some(v),
            Figure::Unavailable | Figure::NotApplicable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Figure<U> {
        match self {
            Figure::Available(v) => Figure::Available(f(v)),
            Figure::Unavailable => Figure::Unavailable,
            Figure::NotApplicable => Figure::NotApplicable,
        }
    }
}

impl<T: Copy> Figure<T> {
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

impl<T> From<Option<T>> for Figure<T> {
    fn from(value: Option<T>) -> Self {
        Figure::from_option(value)
    }
}

impl<T: Serialize> Serialize for Figure<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Figure::Available(v) => v.serialize(serializer),
            Figure::Unavailable => serializer.serialize_str("unavailable"),
            Figure::NotApplicable => serializer.serialize_none(),
        }
    }
}

/// Point-in-time decomposition of a position's outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldReport {
    /// Whole days since the weighted entry date; 0 when unknown.
    pub days_held: i64,
    /// False when `entry_date` is missing or in the future.
    pub holding_period_known: bool,
    pub actual_apr: Figure<f64>,
    pub actual_yield_pct: Figure<f64>,
    pub il_pct: Figure<f64>,
    pub net_gain_loss_pct: Figure<f64>,
    pub price_ratio_delta_pct: Figure<f64>,
}
