use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// League provider behind a league-year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Espn,
    Sleeper,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Espn => "espn",
            Self::Sleeper => "sleeper",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "espn" => Ok(Self::Espn),
            "sleeper" => Ok(Self::Sleeper),
            _ => Err("invalid provider; expected espn|sleeper"),
        }
    }
}

pub fn parse_provider_kind(raw: &str) -> Result<ProviderKind> {
    ProviderKind::from_str(raw).map_err(|e| SyncError::Validation(e.to_string()))
}

/// One provider league for one season
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeagueYearKey {
    pub provider: ProviderKind,
    pub league_id: String,
    pub season: String,
}

impl LeagueYearKey {
    pub fn new(provider: ProviderKind, league_id: impl Into<String>, season: impl Into<String>) -> Self {
        Self {
            provider,
            league_id: league_id.into(),
            season: season.into(),
        }
    }

    /// Parse `{provider}-{league_id}/{season}`, the short form accepted on the CLI
    pub fn parse_short(raw: &str) -> Result<Self> {
        let (league, season) = raw.trim().split_once('/').ok_or_else(|| {
            SyncError::Validation(format!("expected provider-id/season, got '{}'", raw))
        })?;
        let (provider, league_id) = league.split_once('-').ok_or_else(|| {
            SyncError::Validation(format!("expected provider-id/season, got '{}'", raw))
        })?;
        if league_id.is_empty() || season.is_empty() {
            return Err(SyncError::Validation(format!(
                "league id and season must be non-empty in '{}'",
                raw
            )));
        }
        Ok(Self::new(parse_provider_kind(provider)?, league_id, season))
    }
}

impl std::fmt::Display for LeagueYearKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "leagues/{}-{}/years/{}",
            self.provider, self.league_id, self.season
        )
    }
}

/// Persisted per-league-year watermark record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueYearRecord {
    pub key: LeagueYearKey,
    /// Start instant of the last run that committed activity
    pub activity_watermark: Option<DateTime<Utc>>,
    /// Capture instant of the last committed score snapshot
    pub score_watermark: Option<DateTime<Utc>>,
    pub bootstrapped: bool,
    pub roster_config: Option<serde_json::Value>,
}

impl LeagueYearRecord {
    pub fn empty(key: LeagueYearKey) -> Self {
        Self {
            key,
            activity_watermark: None,
            score_watermark: None,
            bootstrapped: false,
            roster_config: None,
        }
    }

    /// Activity watermark in epoch milliseconds, epoch origin when absent
    pub fn activity_watermark_ms(&self) -> i64 {
        self.activity_watermark
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

/// Record changes applied together with a batch of child rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueYearMutation {
    pub activity_watermark: Option<DateTime<Utc>>,
    pub score_watermark: Option<DateTime<Utc>>,
    /// Roster/config blob committed once, together with the bootstrap flag
    pub bootstrap: Option<serde_json::Value>,
}

impl LeagueYearMutation {
    /// Apply to a record; watermarks never move backwards and bootstrap is sticky
    pub fn apply_to(&self, record: &mut LeagueYearRecord) {
        if let Some(ts) = self.activity_watermark {
            record.activity_watermark = Some(later(record.activity_watermark, ts));
        }
        if let Some(ts) = self.score_watermark {
            record.score_watermark = Some(later(record.score_watermark, ts));
        }
        if let Some(blob) = &self.bootstrap {
            if !record.bootstrapped {
                record.roster_config = Some(blob.clone());
                record.bootstrapped = true;
            }
        }
    }
}

fn later(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(existing) if existing > candidate => existing,
        _ => candidate,
    }
}

/// Convert epoch milliseconds to a UTC instant
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_matches_document_path() {
        let key = LeagueYearKey::new(ProviderKind::Espn, "123456", "2022");
        assert_eq!(key.to_string(), "leagues/espn-123456/years/2022");
    }

    #[test]
    fn test_parse_short_key() {
        let key = LeagueYearKey::parse_short("sleeper-7890/2023").unwrap();
        assert_eq!(key.provider, ProviderKind::Sleeper);
        assert_eq!(key.league_id, "7890");
        assert_eq!(key.season, "2023");

        assert!(LeagueYearKey::parse_short("sleeper-7890").is_err());
        assert!(LeagueYearKey::parse_short("yahoo-1/2023").is_err());
        assert!(LeagueYearKey::parse_short("espn-/2023").is_err());
    }

    #[test]
    fn test_watermark_defaults_to_epoch() {
        let record = LeagueYearRecord::empty(LeagueYearKey::new(ProviderKind::Espn, "1", "2022"));
        assert_eq!(record.activity_watermark_ms(), 0);
    }

    #[test]
    fn test_mutation_never_rewinds_watermark() {
        let mut record =
            LeagueYearRecord::empty(LeagueYearKey::new(ProviderKind::Espn, "1", "2022"));
        let newer = millis_to_datetime(2_000).unwrap();
        let older = millis_to_datetime(1_000).unwrap();

        LeagueYearMutation {
            activity_watermark: Some(newer),
            ..Default::default()
        }
        .apply_to(&mut record);
        LeagueYearMutation {
            activity_watermark: Some(older),
            ..Default::default()
        }
        .apply_to(&mut record);

        assert_eq!(record.activity_watermark, Some(newer));
    }

    #[test]
    fn test_bootstrap_is_sticky() {
        let mut record =
            LeagueYearRecord::empty(LeagueYearKey::new(ProviderKind::Sleeper, "1", "2023"));
        LeagueYearMutation {
            bootstrap: Some(serde_json::json!({"teams": [1]})),
            ..Default::default()
        }
        .apply_to(&mut record);
        LeagueYearMutation {
            bootstrap: Some(serde_json::json!({"teams": [2]})),
            ..Default::default()
        }
        .apply_to(&mut record);

        assert!(record.bootstrapped);
        assert_eq!(record.roster_config, Some(serde_json::json!({"teams": [1]})));
    }
}
