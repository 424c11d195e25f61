pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod source;
pub mod store;
pub mod sync;

pub use crate::config::AppConfig;
pub use domain::{
    ActivityAction, ActivityEvent, LeagueYearKey, LeagueYearMutation, LeagueYearRecord,
    MatchupSeries, ProviderKind, ScoreSnapshot, ScoreboardMatchup, SeriesPoint,
};
pub use error::{ErrorKind, Result, SyncError};
pub use source::{build_league_source, build_league_sources, LeagueSource};
pub use store::{ChildRows, MemoryStore, PostgresStore, WatermarkStore};
pub use sync::{
    BatchReport, Clock, ManualClock, RunKind, RunOutcome, SyncRunner, SystemClock,
};
