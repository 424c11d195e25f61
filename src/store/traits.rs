use async_trait::async_trait;

use crate::domain::{ActivityEvent, LeagueYearKey, LeagueYearMutation, LeagueYearRecord, ScoreSnapshot};
use crate::error::Result;

/// New rows committed together with a record mutation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChildRows {
    #[default]
    None,
    /// Upserted by event id
    Activity(Vec<ActivityEvent>),
    /// Upserted by (period, timestamp, team id)
    Scores { period: u32, rows: Vec<ScoreSnapshot> },
}

impl ChildRows {
    pub fn len(&self) -> usize {
        match self {
            ChildRows::None => 0,
            ChildRows::Activity(events) => events.len(),
            ChildRows::Scores { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// `None` until the first successful commit for the league-year
    async fn read_league_year(&self, key: &LeagueYearKey) -> Result<Option<LeagueYearRecord>>;

    /// Apply `mutation` and insert `rows` as one all-or-nothing write.
    ///
    /// Creates the record if needed. Fails with `SyncError::CommitFailure`
    /// and leaves no trace of either part on error.
    async fn commit_atomic(
        &self,
        key: &LeagueYearKey,
        mutation: &LeagueYearMutation,
        rows: &ChildRows,
    ) -> Result<()>;

    /// All snapshot rows stored for a scoring period
    async fn read_snapshots(&self, key: &LeagueYearKey, period: u32) -> Result<Vec<ScoreSnapshot>>;

    /// Most recent activity events, newest first
    async fn recent_activity(&self, key: &LeagueYearKey, limit: usize) -> Result<Vec<ActivityEvent>>;
}
