use async_trait::async_trait;

use crate::domain::{ActivityEvent, LeagueYearKey, ScoreboardMatchup};
use crate::error::Result;

/// Read-only view of one provider league-year.
///
/// Implementations are bound to a single league and season when they are
/// built, so the sync engine never branches on the provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeagueSource: Send + Sync {
    fn key(&self) -> &LeagueYearKey;

    /// Newest-first activity page; an empty page means the feed is exhausted
    async fn fetch_activity_page(&self, page_size: u32, offset: u32) -> Result<Vec<ActivityEvent>>;

    /// Scoreboard for one scoring period, one entry per matchup
    async fn fetch_scoreboard(&self, period: u32) -> Result<Vec<ScoreboardMatchup>>;

    /// Current scoring period (week)
    async fn current_period(&self) -> Result<u32>;

    /// Opaque roster/member configuration stored once per league-year
    async fn fetch_roster_config(&self) -> Result<serde_json::Value>;

    async fn resolve_participant_name(&self, participant_id: i64) -> Result<String>;

    async fn resolve_team_name(&self, team_id: i64) -> Result<String>;
}
