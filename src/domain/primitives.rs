//! Domain primitives: TimeMs, EpochDay, WalletAddress, TokenUnit, PositionKey.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const MS_PER_DAY: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// The UTC calendar day this instant falls on.
    pub fn day(&self) -> EpochDay {
        EpochDay(self.0.div_euclid(MS_PER_DAY))
    }
}

/// Whole days since 1970-01-01 UTC.
///
/// Entry-date arithmetic is done on this integer so that averaging two dates
/// never goes through timezone-aware date objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpochDay(pub i64);

impl EpochDay {
    pub fn new(days: i64) -> Self {
        EpochDay(days)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Shift by a signed number of days.
    pub fn plus_days(&self, days: i64) -> Self {
        EpochDay(self.0 + days)
    }

    /// Midnight UTC at the start of this day.
    pub fn start_ms(&self) -> TimeMs {
        TimeMs(self.0.saturating_mul(MS_PER_DAY))
    }

    /// Calendar date, or None when out of chrono's supported range.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(self.start_ms().as_ms()).map(|dt| dt.date_naive())
    }

    /// `YYYY-MM-DD` rendering for reports.
    pub fn to_iso_string(&self) -> String {
        match self.to_naive_date() {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => format!("day:{}", self.0),
        }
    }

    pub fn from_naive_date(date: NaiveDate) -> Self {
        let ms = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        TimeMs(ms).day()
    }
}

impl std::fmt::Display for EpochDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierParseError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Wallet address as supplied by the chain indexer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn new(addr: String) -> Self {
        WalletAddress(addr)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentifierParseError::Empty("wallet address"));
        }
        Ok(WalletAddress(trimmed.to_string()))
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On-chain unit of a position token (LP token or qToken), e.g. `policy_id + asset_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenUnit(pub String);

impl TokenUnit {
    pub fn new(unit: String) -> Self {
        TokenUnit(unit)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TokenUnit {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentifierParseError::Empty("token unit"));
        }
        Ok(TokenUnit(trimmed.to_string()))
    }
}

impl std::fmt::Display for TokenUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a position row: one per (wallet, token unit).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub wallet: WalletAddress,
    pub token_unit: TokenUnit,
}

impl PositionKey {
    pub fn new(wallet: WalletAddress, token_unit: TokenUnit) -> Self {
        Self { wallet, token_unit }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.wallet, self.token_unit)
    }
}
