//! In-process store for dry runs and tests.
//!
//! Commits build the next league-year state on a copy and swap it in under
//! the write lock, so readers see either all of a commit or none of it.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChildRows, WatermarkStore};
use crate::domain::{ActivityEvent, LeagueYearKey, LeagueYearMutation, LeagueYearRecord, ScoreSnapshot};
use crate::error::Result;

#[derive(Debug, Clone)]
struct LeagueYearState {
    record: LeagueYearRecord,
    activity: BTreeMap<String, ActivityEvent>,
    /// (period, timestamp, team id)
    snapshots: BTreeMap<(u32, i64, i64), ScoreSnapshot>,
}

#[derive(Default)]
pub struct MemoryStore {
    leagues: RwLock<HashMap<LeagueYearKey, LeagueYearState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored activity events for a league-year
    pub async fn activity_count(&self, key: &LeagueYearKey) -> usize {
        self.leagues
            .read()
            .await
            .get(key)
            .map(|s| s.activity.len())
            .unwrap_or(0)
    }

    /// Stored activity ids, in id order
    pub async fn activity_ids(&self, key: &LeagueYearKey) -> Vec<String> {
        self.leagues
            .read()
            .await
            .get(key)
            .map(|s| s.activity.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn read_league_year(&self, key: &LeagueYearKey) -> Result<Option<LeagueYearRecord>> {
        Ok(self.leagues.read().await.get(key).map(|s| s.record.clone()))
    }

    async fn commit_atomic(
        &self,
        key: &LeagueYearKey,
        mutation: &LeagueYearMutation,
        rows: &ChildRows,
    ) -> Result<()> {
        let mut leagues = self.leagues.write().await;

        let mut next = leagues.get(key).cloned().unwrap_or_else(|| LeagueYearState {
            record: LeagueYearRecord::empty(key.clone()),
            activity: BTreeMap::new(),
            snapshots: BTreeMap::new(),
        });

        mutation.apply_to(&mut next.record);
        match rows {
            ChildRows::None => {}
            ChildRows::Activity(events) => {
                for event in events {
                    next.activity.insert(event.id.clone(), event.clone());
                }
            }
            ChildRows::Scores { period, rows } => {
                for row in rows {
                    next.snapshots
                        .insert((*period, row.timestamp, row.team_id), *row);
                }
            }
        }

        leagues.insert(key.clone(), next);
        debug!("Committed {} rows for {} (memory)", rows.len(), key);
        Ok(())
    }

    async fn read_snapshots(&self, key: &LeagueYearKey, period: u32) -> Result<Vec<ScoreSnapshot>> {
        Ok(self
            .leagues
            .read()
            .await
            .get(key)
            .map(|s| {
                s.snapshots
                    .range((period, i64::MIN, i64::MIN)..=(period, i64::MAX, i64::MAX))
                    .map(|(_, row)| *row)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_activity(&self, key: &LeagueYearKey, limit: usize) -> Result<Vec<ActivityEvent>> {
        let leagues = self.leagues.read().await;
        let Some(state) = leagues.get(key) else {
            return Ok(Vec::new());
        };

        let mut events: Vec<ActivityEvent> = state.activity.values().cloned().collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}
