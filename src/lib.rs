pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    BalanceSource, DataSourceError, IndexerDataSource, MockDataSource, RateFeedDataSource,
    RateSource, ReserveSource, Throttled,
};
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, EpochDay, Figure, PoolReserves, PositionEntry, PositionEvent, PositionKey,
    PositionStatus, PositionType, PriceRatio, TimeMs, TokenAmount, TokenUnit, TrackedPosition,
    WalletAddress, YieldReport,
};
pub use engine::{ChangeKind, Reconciler, Reconciliation};
pub use error::{AppError, PositionError};
pub use orchestration::{ReportService, SweepSummary, Sweeper};
