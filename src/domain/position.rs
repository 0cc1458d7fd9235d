//! Position rows and the descriptors used to create them.

use crate::domain::{EpochDay, PositionKey, PriceRatio, TimeMs, TokenAmount};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Kind of receipt token held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    /// Lending supply (qToken).
    Supply,
    /// Lending borrow.
    Borrow,
    /// Liquidity-pool share token.
    Lp,
}

impl PositionType {
    pub fn is_lp(&self) -> bool {
        matches!(self, PositionType::Lp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Supply => "supply",
            PositionType::Borrow => "borrow",
            PositionType::Lp => "lp",
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} {value:?}")]
pub struct EnumParseError {
    kind: &'static str,
    value: String,
}

impl FromStr for PositionType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supply" => Ok(PositionType::Supply),
            "borrow" => Ok(PositionType::Borrow),
            "lp" => Ok(PositionType::Lp),
            other => Err(EnumParseError {
                kind: "position type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    /// Balance went to zero; kept for history, hidden from active views.
    Closed,
    /// Stored state failed a consistency check; no further automatic updates.
    Frozen,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Closed => "closed",
            PositionStatus::Frozen => "frozen",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PositionStatus::Active),
            "closed" => Ok(PositionStatus::Closed),
            "frozen" => Ok(PositionStatus::Frozen),
            other => Err(EnumParseError {
                kind: "position status",
                value: other.to_string(),
            }),
        }
    }
}

/// A (wallet, token) pair the sweep should reconcile, with the metadata
/// needed to create its row on first discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub key: PositionKey,
    pub protocol: String,
    pub market: String,
    pub position_type: PositionType,
    /// Pool identifier for reserve lookups (LP only).
    pub pool_id: Option<String>,
    pub token_decimals: u32,
}

/// Durable state of one (wallet, token) position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub key: PositionKey,
    pub protocol: String,
    pub market: String,
    pub position_type: PositionType,
    pub pool_id: Option<String>,
    pub token_decimals: u32,
    /// First day the position was ever observed. Never rewritten once known;
    /// `None` only for legacy rows created before it was recorded.
    pub original_entry_date: Option<EpochDay>,
    /// Amount-weighted entry day, used for holding-period math.
    pub entry_date: Option<EpochDay>,
    /// Amount-weighted entry price ratio (LP only).
    pub entry_price_ratio: Option<PriceRatio>,
    pub last_known_amount: TokenAmount,
    pub last_amount_check: TimeMs,
    pub status: PositionStatus,
    pub frozen_reason: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl PositionEntry {
    /// Fresh row for a first observation.
    pub fn discovered(
        target: &TrackedPosition,
        amount: TokenAmount,
        ratio: Option<PriceRatio>,
        as_of: TimeMs,
    ) -> Self {
        let day = as_of.day();
        Self {
            key: target.key.clone(),
            protocol: target.protocol.clone(),
            market: target.market.clone(),
            position_type: target.position_type,
            pool_id: target.pool_id.clone(),
            token_decimals: target.token_decimals,
            original_entry_date: Some(day),
            entry_date: Some(day),
            entry_price_ratio: if target.position_type.is_lp() {
                ratio
            } else {
                None
            },
            last_known_amount: amount,
            last_amount_check: as_of,
            status: PositionStatus::Active,
            frozen_reason: None,
            created_at: as_of,
            updated_at: as_of,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    pub fn is_frozen(&self) -> bool {
        self.status == PositionStatus::Frozen
    }
}
