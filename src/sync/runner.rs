use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{ActivitySyncReport, Clock, SnapshotReport, SystemClock};
use crate::config::SyncConfig;
use crate::domain::{LeagueYearKey, MatchupSeries, ScoreSnapshot};
use crate::error::{Result, SyncError};
use crate::source::LeagueSource;
use crate::store::WatermarkStore;

/// Which entry point a run went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Activity,
    Scores,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Activity => write!(f, "activity"),
            RunKind::Scores => write!(f, "scores"),
        }
    }
}

/// Successful run summary returned to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub kind: RunKind,
    pub key: LeagueYearKey,
    pub rows_written: usize,
}

/// Result of running every registered league-year
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RunOutcome>,
    pub failures: Vec<(LeagueYearKey, SyncError)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_written).sum()
    }
}

/// Drives sync runs for a set of league-years against one store.
///
/// Runs are sequential. Each one is bounded by `run_timeout_secs`; a run cut
/// off by the deadline is dropped along with any open transaction.
pub struct SyncRunner {
    config: SyncConfig,
    store: Arc<dyn WatermarkStore>,
    clock: Arc<dyn Clock>,
    sources: BTreeMap<LeagueYearKey, Arc<dyn LeagueSource>>,
}

impl SyncRunner {
    pub fn new(config: SyncConfig, store: Arc<dyn WatermarkStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SyncConfig,
        store: Arc<dyn WatermarkStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            sources: BTreeMap::new(),
        }
    }

    /// Register a source; replaces any source already registered for its key
    pub fn register(&mut self, source: Arc<dyn LeagueSource>) {
        let key = source.key().clone();
        if self.sources.insert(key.clone(), source).is_some() {
            warn!("Replaced source for {}", key);
        }
    }

    /// Registered league-years in key order
    pub fn keys(&self) -> Vec<LeagueYearKey> {
        self.sources.keys().cloned().collect()
    }

    pub fn source(&self, key: &LeagueYearKey) -> Result<Arc<dyn LeagueSource>> {
        self.sources
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::UnknownLeagueYear(key.to_string()))
    }

    pub fn store(&self) -> Arc<dyn WatermarkStore> {
        Arc::clone(&self.store)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let secs = self.config.run_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(secs)),
        }
    }

    /// Activity sync with the full report
    pub async fn sync_activity(&self, key: &LeagueYearKey) -> Result<ActivitySyncReport> {
        let source = self.source(key)?;
        self.bounded(super::sync_activity(
            source.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
            self.config.page_size,
        ))
        .await
    }

    /// Snapshot capture with the full report
    pub async fn capture_snapshot(&self, key: &LeagueYearKey) -> Result<SnapshotReport> {
        let source = self.source(key)?;
        self.bounded(super::capture_snapshot(
            source.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
        ))
        .await
    }

    pub async fn run_activity_sync(&self, key: &LeagueYearKey) -> Result<RunOutcome> {
        let report = self.sync_activity(key).await?;
        Ok(RunOutcome {
            kind: RunKind::Activity,
            key: report.key,
            rows_written: report.new_event_count,
        })
    }

    pub async fn run_score_snapshot(&self, key: &LeagueYearKey) -> Result<RunOutcome> {
        let report = self.capture_snapshot(key).await?;
        Ok(RunOutcome {
            kind: RunKind::Scores,
            key: report.key,
            rows_written: report.rows.len(),
        })
    }

    /// Series for a period from stored rows plus rows just captured
    pub async fn aggregate(
        &self,
        key: &LeagueYearKey,
        period: u32,
        fresh: &[ScoreSnapshot],
    ) -> Result<Vec<MatchupSeries>> {
        super::aggregate(self.store.as_ref(), key, period, fresh).await
    }

    /// Run `kind` for every registered league-year; failures are isolated.
    pub async fn run_all(&self, kind: RunKind) -> BatchReport {
        let mut report = BatchReport::default();

        for key in self.sources.keys() {
            let result = match kind {
                RunKind::Activity => self.run_activity_sync(key).await,
                RunKind::Scores => self.run_score_snapshot(key).await,
            };

            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    if e.is_retryable() {
                        warn!("{} run for {} failed, will retry next tick: {}", kind, key, e);
                    } else {
                        error!("{} run for {} failed: {}", kind, key, e);
                    }
                    report.failures.push((key.clone(), e));
                }
            }
        }

        info!(
            "{} batch complete: {} succeeded, {} failed, {} rows written",
            kind,
            report.succeeded(),
            report.failed(),
            report.rows_written()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityEvent, ProviderKind, ScoreboardMatchup};
    use crate::source::MockLeagueSource;
    use crate::store::MemoryStore;
    use crate::sync::ManualClock;

    fn config() -> SyncConfig {
        SyncConfig {
            page_size: 10,
            run_timeout_secs: 5,
        }
    }

    fn espn_key(id: &str) -> LeagueYearKey {
        LeagueYearKey::new(ProviderKind::Espn, id, "2022")
    }

    fn runner(store: Arc<MemoryStore>) -> SyncRunner {
        SyncRunner::with_clock(config(), store, Arc::new(ManualClock::at(50_000)))
    }

    #[tokio::test]
    async fn test_unknown_league_year() {
        let runner = runner(Arc::new(MemoryStore::new()));
        let err = runner.run_activity_sync(&espn_key("404")).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownLeagueYear(_)));
    }

    #[tokio::test]
    async fn test_score_run_counts_rows() {
        let store = Arc::new(MemoryStore::new());
        let mut runner = runner(store.clone());

        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(espn_key("1"));
        source.expect_current_period().returning(|| Ok(2));
        source.expect_fetch_scoreboard().returning(|_| {
            Ok(vec![ScoreboardMatchup {
                matchup_id: 9,
                team_a: 4,
                score_a: 80.0,
                team_b: 2,
                score_b: 95.5,
            }])
        });
        runner.register(Arc::new(source));

        let outcome = tokio_test::assert_ok!(runner.run_score_snapshot(&espn_key("1")).await);
        assert_eq!(outcome.kind, RunKind::Scores);
        assert_eq!(outcome.rows_written, 2);

        let series = runner.aggregate(&espn_key("1"), 2, &[]).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].participant_a, 2);
        assert_eq!(series[0].points_a[0].value, 95.5);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let store = Arc::new(MemoryStore::new());
        let mut runner = runner(store.clone());

        let mut failing = MockLeagueSource::new();
        failing.expect_key().return_const(espn_key("1"));
        failing
            .expect_fetch_activity_page()
            .returning(|_, _| Err(SyncError::RateLimited("slow down".to_string())));
        runner.register(Arc::new(failing));

        let mut healthy = MockLeagueSource::new();
        healthy.expect_key().return_const(espn_key("2"));
        healthy
            .expect_fetch_activity_page()
            .returning(|_, offset| {
                if offset == 0 {
                    Ok(vec![ActivityEvent::new("x", 40_000, vec![])])
                } else {
                    Ok(vec![])
                }
            });
        healthy
            .expect_fetch_roster_config()
            .returning(|| Ok(serde_json::json!({})));
        runner.register(Arc::new(healthy));

        let report = runner.run_all(RunKind::Activity).await;
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].0, espn_key("1"));
        assert_eq!(report.rows_written(), 1);
        assert_eq!(store.activity_count(&espn_key("2")).await, 1);
        assert!(store.read_league_year(&espn_key("1")).await.unwrap().is_none());
    }
}
