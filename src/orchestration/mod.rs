pub mod report;
pub mod sweep;
pub mod targets;

pub use report::{EventView, PositionReport, ReportService};
pub use sweep::{SweepSummary, Sweeper};
pub use targets::{load_tracked_positions, parse_tracked_positions, TargetsError};
