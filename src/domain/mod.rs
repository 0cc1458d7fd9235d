//! Domain types for position reconciliation and yield attribution.
//!
//! This module provides:
//! - Raw integer token amounts and validated pool price ratios
//! - Integer day arithmetic for entry dates
//! - Position rows, inferred deposit/withdrawal events, and derived reports

pub mod amount;
pub mod decimal;
pub mod event;
pub mod position;
pub mod primitives;
pub mod ratio;
pub mod report;

pub use amount::{AmountError, TokenAmount};
pub use decimal::Decimal;
pub use event::{PositionEvent, PositionEventType};
pub use position::{PositionEntry, PositionStatus, PositionType, TrackedPosition};
pub use primitives::{EpochDay, IdentifierParseError, PositionKey, TimeMs, TokenUnit, WalletAddress};
pub use ratio::{PoolReserves, PriceRatio};
pub use report::{Figure, YieldReport};
