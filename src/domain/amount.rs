//! Raw integer token quantities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Non-negative quantity of a position token in raw on-chain units.
///
/// Never decimal-scaled: balances are compared and averaged as integers so
/// that repeated reconciliation cannot accumulate rounding drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("token amount must not be negative, got {0}")]
    Negative(i128),
    #[error("invalid token amount {0:?}")]
    Unparsable(String),
}

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);
    /// Largest representable amount; every signed delta between two amounts
    /// fits in an `i128`.
    pub const MAX: TokenAmount = TokenAmount(i128::MAX as u128);

    /// Wrap a raw magnitude.
    ///
    /// Values above [`TokenAmount::MAX`] are truncated to it in release
    /// builds and panic in debug builds. Callers only pass magnitudes of
    /// deltas between two valid amounts, which never exceed the bound.
    pub fn new(raw: u128) -> Self {
        debug_assert!(
            raw <= Self::MAX.0,
            "token amount {} exceeds i128::MAX",
            raw
        );
        TokenAmount(raw.min(Self::MAX.0))
    }

    /// Validate a signed observation from an upstream source.
    pub fn from_observed(raw: i128) -> Result<Self, AmountError> {
        if raw < 0 {
            return Err(AmountError::Negative(raw));
        }
        Ok(TokenAmount(raw as u128))
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Signed difference `self - earlier`.
    pub fn delta_from(&self, earlier: TokenAmount) -> i128 {
        (self.0 as i128) - (earlier.0 as i128)
    }

    /// Lossy conversion for weighting and share calculations.
    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    /// Canonical base-10 string, as persisted.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_string()
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(stripped) = trimmed.strip_prefix('-') {
            let magnitude = stripped
                .parse::<i128>()
                .map_err(|_| AmountError::Unparsable(s.to_string()))?;
            return Err(AmountError::Negative(-magnitude));
        }
        match trimmed.parse::<u128>() {
            Ok(raw) if raw <= i128::MAX as u128 => Ok(TokenAmount(raw)),
            _ => Err(AmountError::Unparsable(s.to_string())),
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Serialized as a string: JSON numbers lose precision above 2^53.
impl Serialize for TokenAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenAmount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
