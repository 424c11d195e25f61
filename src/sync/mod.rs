//! Incremental synchronization engine
//!
//! - `activity`: watermark-bounded backward pagination of the activity feed
//! - `scores`: point-in-time scoreboard snapshots
//! - `aggregate`: per-matchup projection series built from stored snapshots
//! - `runner`: per-league-year entry points and batch runs

pub mod activity;
pub mod aggregate;
pub mod clock;
pub mod runner;
pub mod scores;

pub use activity::{collect_new_events, sync_activity, ActivityScan, ActivitySyncReport};
pub use aggregate::{aggregate, build_series, merge_rows};
pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{BatchReport, RunKind, RunOutcome, SyncRunner};
pub use scores::{capture_snapshot, SnapshotReport};
