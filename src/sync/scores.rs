use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::info;

use super::Clock;
use crate::domain::{LeagueYearKey, LeagueYearMutation, ScoreSnapshot};
use crate::error::{Result, SyncError};
use crate::source::LeagueSource;
use crate::store::{ChildRows, WatermarkStore};

/// Result of one snapshot capture
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotReport {
    pub key: LeagueYearKey,
    pub period: u32,
    pub captured_at: DateTime<Utc>,
    pub rows: Vec<ScoreSnapshot>,
}

/// Capture the current scoreboard as one row per team, all sharing the
/// run-start timestamp, and commit them with the score watermark.
pub async fn capture_snapshot(
    source: &dyn LeagueSource,
    store: &dyn WatermarkStore,
    clock: &dyn Clock,
) -> Result<SnapshotReport> {
    let key = source.key().clone();
    let captured_at = clock.run_start();
    let timestamp = captured_at.timestamp_millis();

    let period = source.current_period().await?;
    let scoreboard = source.fetch_scoreboard(period).await?;

    let rows: Vec<ScoreSnapshot> = scoreboard
        .iter()
        .flat_map(|m| m.to_snapshots(timestamp))
        .collect();

    // (timestamp, team) identity must be unique inside one capture
    let mut teams = HashSet::with_capacity(rows.len());
    if let Some(dup) = rows.iter().find(|r| !teams.insert(r.team_id)) {
        return Err(SyncError::InvalidSourceData(format!(
            "{}: team {} appears in more than one matchup",
            key, dup.team_id
        )));
    }

    let mutation = LeagueYearMutation {
        score_watermark: Some(captured_at),
        ..Default::default()
    };
    let child_rows = ChildRows::Scores {
        period,
        rows: rows.clone(),
    };
    store.commit_atomic(&key, &mutation, &child_rows).await?;

    info!(
        "{}: captured {} projections for period {} at {}",
        key,
        rows.len(),
        period,
        timestamp
    );

    Ok(SnapshotReport {
        key,
        period,
        captured_at,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProviderKind, ScoreboardMatchup};
    use crate::source::MockLeagueSource;
    use crate::store::MemoryStore;
    use crate::sync::ManualClock;
    use mockall::predicate::eq;
    use tokio_test::{assert_err, assert_ok};

    fn key() -> LeagueYearKey {
        LeagueYearKey::new(ProviderKind::Sleeper, "99", "2023")
    }

    fn matchup(matchup_id: i64, team_a: i64, team_b: i64) -> ScoreboardMatchup {
        ScoreboardMatchup {
            matchup_id,
            team_a,
            score_a: 100.0,
            team_b,
            score_b: 90.0,
        }
    }

    #[tokio::test]
    async fn test_capture_shares_one_timestamp() {
        let store = MemoryStore::new();
        let clock = ManualClock::at(1_000);
        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(key());
        source.expect_current_period().times(1).returning(|| Ok(6));
        source
            .expect_fetch_scoreboard()
            .with(eq(6))
            .times(1)
            .returning(|_| Ok(vec![matchup(1, 1, 2), matchup(2, 3, 4)]));

        let report = assert_ok!(capture_snapshot(&source, &store, &clock).await);
        assert_eq!(report.period, 6);
        assert_eq!(report.rows.len(), 4);
        assert!(report.rows.iter().all(|r| r.timestamp == 1_000));

        let stored = store.read_snapshots(&key(), 6).await.unwrap();
        assert_eq!(stored.len(), 4);
        let record = store.read_league_year(&key()).await.unwrap().unwrap();
        assert_eq!(record.score_watermark, Some(report.captured_at));
        assert!(record.activity_watermark.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_team_aborts_before_commit() {
        let store = MemoryStore::new();
        let clock = ManualClock::at(1_000);
        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(key());
        source.expect_current_period().returning(|| Ok(6));
        source
            .expect_fetch_scoreboard()
            .returning(|_| Ok(vec![matchup(1, 1, 2), matchup(2, 2, 3)]));

        let err = assert_err!(capture_snapshot(&source, &store, &clock).await);
        assert!(matches!(err, SyncError::InvalidSourceData(_)));
        assert!(store.read_league_year(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_scoreboard_still_records_watermark() {
        let store = MemoryStore::new();
        let clock = ManualClock::at(5_000);
        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(key());
        source.expect_current_period().returning(|| Ok(18));
        source.expect_fetch_scoreboard().returning(|_| Ok(vec![]));

        let report = capture_snapshot(&source, &store, &clock).await.unwrap();
        assert!(report.rows.is_empty());
        let record = store.read_league_year(&key()).await.unwrap().unwrap();
        assert_eq!(record.score_watermark.map(|t| t.timestamp_millis()), Some(5_000));
    }
}
