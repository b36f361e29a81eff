//! operations on a snapshot store

mod diff;
mod log;
mod reset;
mod snapshot;

pub use diff::{count_changes, diff_trees, FileDiffs};
pub use log::{log, LogEntry};
pub use reset::{reset_to, ResetReport};
pub use snapshot::{create_snapshot, stage, SnapshotOutcome, StagingFailure, StagingReport};
