use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::Clock;
use crate::domain::{ActivityEvent, LeagueYearKey, LeagueYearMutation, LeagueYearRecord};
use crate::error::{Result, SyncError};
use crate::source::LeagueSource;
use crate::store::{ChildRows, WatermarkStore};

/// Result of one activity sync run
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySyncReport {
    pub key: LeagueYearKey,
    pub new_event_count: usize,
    /// Watermark after the run (unchanged when nothing was committed)
    pub new_watermark: Option<DateTime<Utc>>,
    /// Roster/config blob was committed by this run
    pub bootstrapped: bool,
    pub pages_fetched: u32,
    pub committed: bool,
}

/// Events newer than the watermark, in feed order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityScan {
    pub events: Vec<ActivityEvent>,
    pub pages_fetched: u32,
    /// Scan stopped at an already processed event rather than feed exhaustion
    pub reached_watermark: bool,
}

/// Walk the feed newest first until the watermark or an empty page.
///
/// The feed is trusted to be non-increasing in timestamp within and across
/// pages; a violation is logged but does not change where the scan stops.
pub async fn collect_new_events(
    source: &dyn LeagueSource,
    watermark_ms: i64,
    page_size: u32,
) -> Result<ActivityScan> {
    if page_size == 0 {
        return Err(SyncError::Validation("page_size must be positive".to_string()));
    }

    let key = source.key();
    let mut scan = ActivityScan::default();
    let mut seen = HashSet::new();
    let mut previous: Option<i64> = None;
    let mut offset = 0u32;

    'pages: loop {
        debug!("{}: fetching activity offset {}", key, offset);
        let page = source.fetch_activity_page(page_size, offset).await?;
        scan.pages_fetched += 1;
        offset += page_size;

        if page.is_empty() {
            debug!("{}: reached end of activity feed", key);
            break;
        }

        for event in page {
            if let Some(prev) = previous {
                if event.timestamp > prev {
                    warn!(
                        "{}: activity {} at {} is newer than preceding event at {}",
                        key, event.id, event.timestamp, prev
                    );
                }
            }
            previous = Some(event.timestamp);

            if event.timestamp <= watermark_ms {
                debug!(
                    "{}: activity {} at {} not newer than watermark {}, stopping",
                    key, event.id, event.timestamp, watermark_ms
                );
                scan.reached_watermark = true;
                break 'pages;
            }

            // A page boundary shifting under us can repeat an event
            if seen.insert(event.id.clone()) {
                scan.events.push(event);
            }
        }
    }

    Ok(scan)
}

/// Fetch new activity for the source's league-year and commit it atomically
/// together with the advanced watermark (and the one-time bootstrap blob).
pub async fn sync_activity(
    source: &dyn LeagueSource,
    store: &dyn WatermarkStore,
    clock: &dyn Clock,
    page_size: u32,
) -> Result<ActivitySyncReport> {
    let key = source.key().clone();
    let run_started = clock.run_start();

    let record = store
        .read_league_year(&key)
        .await?
        .unwrap_or_else(|| LeagueYearRecord::empty(key.clone()));
    let watermark_ms = record.activity_watermark_ms();

    let scan = collect_new_events(source, watermark_ms, page_size).await?;

    let bootstrap = if record.bootstrapped {
        None
    } else {
        info!("{}: bootstrapping roster config", key);
        Some(source.fetch_roster_config().await?)
    };

    let new_event_count = scan.events.len();
    let child_rows = ChildRows::Activity(scan.events);
    if child_rows.is_empty() && bootstrap.is_none() {
        info!("{}: no new activity since {}", key, watermark_ms);
        return Ok(ActivitySyncReport {
            key,
            new_event_count: 0,
            new_watermark: record.activity_watermark,
            bootstrapped: false,
            pages_fetched: scan.pages_fetched,
            committed: false,
        });
    }

    let mutation = LeagueYearMutation {
        activity_watermark: Some(run_started),
        bootstrap,
        ..Default::default()
    };
    let did_bootstrap = mutation.bootstrap.is_some();

    store.commit_atomic(&key, &mutation, &child_rows).await?;

    let mut updated = record;
    mutation.apply_to(&mut updated);

    info!(
        "{}: committed {} activity events over {} pages{}",
        key,
        new_event_count,
        scan.pages_fetched,
        if did_bootstrap { " with roster config" } else { "" }
    );

    Ok(ActivitySyncReport {
        key,
        new_event_count,
        new_watermark: updated.activity_watermark,
        bootstrapped: did_bootstrap,
        pages_fetched: scan.pages_fetched,
        committed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::domain::{millis_to_datetime, ProviderKind};
    use crate::source::MockLeagueSource;
    use crate::store::MemoryStore;
    use crate::sync::ManualClock;
    use mockall::predicate::eq;

    fn key() -> LeagueYearKey {
        LeagueYearKey::new(ProviderKind::Espn, "1", "2022")
    }

    fn event(id: &str, timestamp: i64) -> ActivityEvent {
        ActivityEvent::new(id, timestamp, vec![])
    }

    fn source_with_pages(pages: Vec<Vec<ActivityEvent>>, page_size: u32) -> MockLeagueSource {
        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(key());
        for (i, page) in pages.into_iter().enumerate() {
            source
                .expect_fetch_activity_page()
                .with(eq(page_size), eq(i as u32 * page_size))
                .times(1)
                .return_once(move |_, _| Ok(page));
        }
        source
    }

    #[tokio::test]
    async fn test_scan_stops_at_watermark() {
        let source = source_with_pages(
            vec![
                vec![event("e500", 500), event("e400", 400)],
                vec![event("e300", 300), event("e200", 200)],
            ],
            2,
        );

        let scan = collect_new_events(&source, 300, 2).await.unwrap();
        let ids: Vec<_> = scan.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e500", "e400"]);
        assert_eq!(scan.pages_fetched, 2);
        assert!(scan.reached_watermark);
    }

    #[tokio::test]
    async fn test_scan_stops_on_empty_page() {
        let source = source_with_pages(vec![vec![event("a", 20), event("b", 10)], vec![]], 2);

        let scan = collect_new_events(&source, 0, 2).await.unwrap();
        assert_eq!(scan.events.len(), 2);
        assert!(!scan.reached_watermark);
    }

    #[tokio::test]
    async fn test_scan_drops_repeated_ids() {
        let source = source_with_pages(
            vec![vec![event("a", 30), event("b", 20)], vec![event("b", 20)], vec![]],
            2,
        );

        let scan = collect_new_events(&source, 0, 2).await.unwrap();
        assert_eq!(scan.events.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_rejects_zero_page_size() {
        let source = MockLeagueSource::new();
        let err = collect_new_events(&source, 0, 0).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_feed_error_leaves_store_untouched() {
        let store = MemoryStore::new();
        let clock = ManualClock::at(10_000);
        let mut source = MockLeagueSource::new();
        source.expect_key().return_const(key());
        source
            .expect_fetch_activity_page()
            .returning(|_, _| Err(SyncError::SourceUnavailable("503".to_string())));
        source.expect_fetch_roster_config().never();

        let err = sync_activity(&source, &store, &clock, 25).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.read_league_year(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_run_bootstraps_and_advances_watermark() {
        let store = MemoryStore::new();
        let clock = ManualClock::at(10_000);
        let mut source = source_with_pages(vec![vec![event("a", 900)], vec![]], 25);
        source
            .expect_fetch_roster_config()
            .times(1)
            .returning(|| Ok(serde_json::json!({"teams": []})));

        let report = sync_activity(&source, &store, &clock, 25).await.unwrap();
        assert_eq!(report.new_event_count, 1);
        assert!(report.bootstrapped);
        assert_eq!(report.new_watermark, millis_to_datetime(10_000));

        let record = store.read_league_year(&key()).await.unwrap().unwrap();
        assert!(record.bootstrapped);
        assert_eq!(record.activity_watermark_ms(), 10_000);
    }

    struct SubMillisClock;

    impl Clock for SubMillisClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(20, 999_999).unwrap()
        }
    }

    #[tokio::test]
    async fn test_watermark_is_stored_at_millisecond_precision() {
        let store = MemoryStore::new();
        let mut source = source_with_pages(vec![vec![event("a", 900)], vec![]], 25);
        source
            .expect_fetch_roster_config()
            .returning(|| Ok(serde_json::json!({})));

        let report = sync_activity(&source, &store, &SubMillisClock, 25).await.unwrap();
        assert_eq!(report.new_watermark, millis_to_datetime(20_000));

        let record = store.read_league_year(&key()).await.unwrap().unwrap();
        let stored = record.activity_watermark.unwrap();
        assert_eq!(stored.timestamp_subsec_nanos(), 0);
        assert_eq!(millis_to_datetime(record.activity_watermark_ms()), Some(stored));
    }
}
