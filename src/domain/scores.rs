use serde::{Deserialize, Serialize};

/// One matchup as reported by a provider scoreboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardMatchup {
    pub matchup_id: i64,
    pub team_a: i64,
    pub score_a: f64,
    pub team_b: i64,
    pub score_b: f64,
}

/// One team's projected score at one capture instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub matchup_id: i64,
    pub team_id: i64,
    pub projected_value: f64,
    /// Epoch milliseconds shared by every row of one capture
    pub timestamp: i64,
}

impl ScoreSnapshot {
    /// Row identity within a scoring period
    pub fn identity(&self) -> (i64, i64) {
        (self.timestamp, self.team_id)
    }
}

impl ScoreboardMatchup {
    /// Expand into one snapshot row per team, stamped with `timestamp`
    pub fn to_snapshots(&self, timestamp: i64) -> [ScoreSnapshot; 2] {
        [
            ScoreSnapshot {
                matchup_id: self.matchup_id,
                team_id: self.team_a,
                projected_value: self.score_a,
                timestamp,
            },
            ScoreSnapshot {
                matchup_id: self.matchup_id,
                team_id: self.team_b,
                projected_value: self.score_b,
                timestamp,
            },
        ]
    }
}

/// A (timestamp, value) sample in a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Chronological projection series for both sides of a matchup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupSeries {
    pub matchup_id: i64,
    /// Lower of the two team ids
    pub participant_a: i64,
    pub participant_b: i64,
    pub points_a: Vec<SeriesPoint>,
    pub points_b: Vec<SeriesPoint>,
}

impl MatchupSeries {
    /// Latest sample of each side, if any
    pub fn latest(&self) -> (Option<SeriesPoint>, Option<SeriesPoint>) {
        (self.points_a.last().copied(), self.points_b.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchup_expands_to_two_rows_with_shared_timestamp() {
        let matchup = ScoreboardMatchup {
            matchup_id: 7,
            team_a: 3,
            score_a: 101.5,
            team_b: 9,
            score_b: 88.2,
        };
        let rows = matchup.to_snapshots(1_700_000_000_000);
        assert_eq!(rows[0].team_id, 3);
        assert_eq!(rows[1].team_id, 9);
        assert_eq!(rows[0].timestamp, rows[1].timestamp);
        assert_eq!(rows[1].projected_value, 88.2);
        assert_ne!(rows[0].identity(), rows[1].identity());
    }
}
