use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::domain::{LeagueYearKey, MatchupSeries, ScoreSnapshot, SeriesPoint};
use crate::error::{Result, SyncError};
use crate::store::WatermarkStore;

/// Combine stored rows with rows captured by the current run.
///
/// A fresh row replaces a stored row with the same (timestamp, team) identity.
pub fn merge_rows(stored: Vec<ScoreSnapshot>, fresh: &[ScoreSnapshot]) -> Vec<ScoreSnapshot> {
    let fresh_ids: HashSet<(i64, i64)> = fresh.iter().map(ScoreSnapshot::identity).collect();

    let mut merged: Vec<ScoreSnapshot> = stored
        .into_iter()
        .filter(|row| !fresh_ids.contains(&row.identity()))
        .collect();
    merged.extend_from_slice(fresh);
    merged
}

/// Group snapshot rows into one series per matchup, ordered by matchup id.
///
/// Fails with `DataIntegrity` when a matchup does not hold exactly two
/// distinct teams.
pub fn build_series(rows: &[ScoreSnapshot]) -> Result<Vec<MatchupSeries>> {
    let mut matchups: BTreeMap<i64, BTreeMap<i64, Vec<SeriesPoint>>> = BTreeMap::new();
    for row in rows {
        matchups
            .entry(row.matchup_id)
            .or_default()
            .entry(row.team_id)
            .or_default()
            .push(SeriesPoint {
                timestamp: row.timestamp,
                value: row.projected_value,
            });
    }

    let mut series = Vec::with_capacity(matchups.len());
    for (matchup_id, teams) in matchups {
        if teams.len() != 2 {
            let ids: Vec<i64> = teams.keys().copied().collect();
            return Err(SyncError::DataIntegrity(format!(
                "matchup {} has {} teams {:?}, expected 2",
                matchup_id,
                ids.len(),
                ids
            )));
        }

        // BTreeMap iterates ascending, so side a holds the lower team id
        let mut sides = teams.into_iter();
        let (Some((participant_a, mut points_a)), Some((participant_b, mut points_b))) =
            (sides.next(), sides.next())
        else {
            return Err(SyncError::DataIntegrity(format!(
                "matchup {} lost a side while grouping",
                matchup_id
            )));
        };

        points_a.sort_by_key(|p| p.timestamp);
        points_b.sort_by_key(|p| p.timestamp);

        series.push(MatchupSeries {
            matchup_id,
            participant_a,
            participant_b,
            points_a,
            points_b,
        });
    }

    Ok(series)
}

/// Load every stored row for `period`, fold in `fresh`, and build series.
pub async fn aggregate(
    store: &dyn WatermarkStore,
    key: &LeagueYearKey,
    period: u32,
    fresh: &[ScoreSnapshot],
) -> Result<Vec<MatchupSeries>> {
    let stored = store.read_snapshots(key, period).await?;
    let stored_count = stored.len();
    let rows = merge_rows(stored, fresh);

    debug!(
        "{}: aggregating {} rows for period {} ({} stored, {} fresh)",
        key,
        rows.len(),
        period,
        stored_count,
        fresh.len()
    );

    build_series(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(matchup_id: i64, team_id: i64, timestamp: i64, value: f64) -> ScoreSnapshot {
        ScoreSnapshot {
            matchup_id,
            team_id,
            projected_value: value,
            timestamp,
        }
    }

    fn point(timestamp: i64, value: f64) -> SeriesPoint {
        SeriesPoint { timestamp, value }
    }

    #[test]
    fn test_groups_by_matchup_then_team() {
        let rows = vec![
            row(1, 11, 2000, 58.0),
            row(1, 10, 1000, 50.0),
            row(1, 11, 1000, 60.0),
            row(1, 10, 2000, 55.0),
        ];

        let series = build_series(&rows).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].matchup_id, 1);
        assert_eq!(series[0].participant_a, 10);
        assert_eq!(series[0].points_a, vec![point(1000, 50.0), point(2000, 55.0)]);
        assert_eq!(series[0].participant_b, 11);
        assert_eq!(series[0].points_b, vec![point(1000, 60.0), point(2000, 58.0)]);
    }

    #[test]
    fn test_series_ordered_by_matchup_id() {
        let rows = vec![
            row(5, 1, 100, 1.0),
            row(5, 2, 100, 2.0),
            row(2, 3, 100, 3.0),
            row(2, 4, 100, 4.0),
        ];

        let ids: Vec<i64> = build_series(&rows).unwrap().iter().map(|s| s.matchup_id).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn test_three_teams_is_integrity_error() {
        let rows = vec![
            row(1, 10, 1000, 50.0),
            row(1, 11, 1000, 60.0),
            row(1, 12, 2000, 40.0),
        ];

        let err = build_series(&rows).unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_single_team_is_integrity_error() {
        let err = build_series(&[row(1, 10, 1000, 50.0)]).unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity(_)));
    }

    #[test]
    fn test_empty_rows_give_no_series() {
        assert!(build_series(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_merge_prefers_fresh_rows() {
        let stored = vec![row(1, 10, 1000, 50.0), row(1, 11, 1000, 60.0)];
        let fresh = vec![row(1, 10, 1000, 51.0), row(1, 10, 2000, 55.0)];

        let merged = merge_rows(stored, &fresh);
        assert_eq!(merged.len(), 3);
        let replaced = merged
            .iter()
            .find(|r| r.identity() == (1000, 10))
            .unwrap();
        assert_eq!(replaced.projected_value, 51.0);
    }
}
