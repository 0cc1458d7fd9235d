//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and schema application
//! - SQLite pragma configuration
//! - Repository layer over `positions` and `position_events`

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{PositionRow, Repository};
