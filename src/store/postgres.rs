use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::transaction::{CommitScope, ManagedTransaction};
use super::{ChildRows, WatermarkStore};
use crate::domain::{
    ActivityAction, ActivityEvent, LeagueYearKey, LeagueYearMutation, LeagueYearRecord,
    ScoreSnapshot,
};
use crate::error::{Result, SyncError};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_all(
        &self,
        key: &LeagueYearKey,
        mutation: &LeagueYearMutation,
        rows: &ChildRows,
    ) -> Result<()> {
        let scope = match rows {
            ChildRows::Activity(_) => CommitScope::ActivitySync,
            ChildRows::Scores { .. } => CommitScope::ScoreSnapshot,
            ChildRows::None => CommitScope::RecordUpdate,
        };
        let mut tx = ManagedTransaction::begin(&self.pool, scope).await?;

        // Parent row first so child foreign keys hold
        sqlx::query(
            r#"
            INSERT INTO league_years (provider, league_id, season, activity_updated, scores_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider, league_id, season) DO UPDATE SET
                activity_updated = GREATEST(league_years.activity_updated, EXCLUDED.activity_updated),
                scores_updated = GREATEST(league_years.scores_updated, EXCLUDED.scores_updated),
                updated_at = NOW()
            "#,
        )
        .bind(key.provider.as_str())
        .bind(&key.league_id)
        .bind(&key.season)
        .bind(mutation.activity_watermark)
        .bind(mutation.score_watermark)
        .execute(tx.executor()?)
        .await?;

        if let Some(config) = &mutation.bootstrap {
            sqlx::query(
                r#"
                UPDATE league_years SET
                    roster_config = $4,
                    bootstrapped = TRUE,
                    updated_at = NOW()
                WHERE provider = $1 AND league_id = $2 AND season = $3 AND NOT bootstrapped
                "#,
            )
            .bind(key.provider.as_str())
            .bind(&key.league_id)
            .bind(&key.season)
            .bind(config)
            .execute(tx.executor()?)
            .await?;
        }

        match rows {
            ChildRows::None => {}
            ChildRows::Activity(events) => {
                for event in events {
                    sqlx::query(
                        r#"
                        INSERT INTO league_activity (
                            provider, league_id, season, activity_id, occurred_at_ms, actions
                        ) VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (provider, league_id, season, activity_id) DO UPDATE SET
                            occurred_at_ms = EXCLUDED.occurred_at_ms,
                            actions = EXCLUDED.actions
                        "#,
                    )
                    .bind(key.provider.as_str())
                    .bind(&key.league_id)
                    .bind(&key.season)
                    .bind(&event.id)
                    .bind(event.timestamp)
                    .bind(Json(&event.actions))
                    .execute(tx.executor()?)
                    .await?;
                }
            }
            ChildRows::Scores { period, rows } => {
                for row in rows {
                    sqlx::query(
                        r#"
                        INSERT INTO score_snapshots (
                            provider, league_id, season, period,
                            captured_at_ms, team_id, matchup_id, projection
                        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        ON CONFLICT (provider, league_id, season, period, captured_at_ms, team_id)
                        DO UPDATE SET
                            matchup_id = EXCLUDED.matchup_id,
                            projection = EXCLUDED.projection
                        "#,
                    )
                    .bind(key.provider.as_str())
                    .bind(&key.league_id)
                    .bind(&key.season)
                    .bind(*period as i32)
                    .bind(row.timestamp)
                    .bind(row.team_id)
                    .bind(row.matchup_id)
                    .bind(row.projected_value)
                    .execute(tx.executor()?)
                    .await?;
                }
            }
        }

        tx.commit().await
    }
}

#[async_trait]
impl WatermarkStore for PostgresStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn read_league_year(&self, key: &LeagueYearKey) -> Result<Option<LeagueYearRecord>> {
        let row = sqlx::query(
            r#"
            SELECT activity_updated, scores_updated, bootstrapped, roster_config
            FROM league_years
            WHERE provider = $1 AND league_id = $2 AND season = $3
            "#,
        )
        .bind(key.provider.as_str())
        .bind(&key.league_id)
        .bind(&key.season)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| LeagueYearRecord {
            key: key.clone(),
            activity_watermark: r.get::<Option<DateTime<Utc>>, _>("activity_updated"),
            score_watermark: r.get::<Option<DateTime<Utc>>, _>("scores_updated"),
            bootstrapped: r.get("bootstrapped"),
            roster_config: r.get::<Option<serde_json::Value>, _>("roster_config"),
        }))
    }

    #[instrument(skip(self, mutation, rows), fields(key = %key, rows = rows.len()))]
    async fn commit_atomic(
        &self,
        key: &LeagueYearKey,
        mutation: &LeagueYearMutation,
        rows: &ChildRows,
    ) -> Result<()> {
        self.write_all(key, mutation, rows).await.map_err(|e| match e {
            SyncError::CommitFailure { .. } => e,
            other => SyncError::commit_failure(key, other),
        })?;

        debug!("Committed {} rows for {}", rows.len(), key);
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn read_snapshots(&self, key: &LeagueYearKey, period: u32) -> Result<Vec<ScoreSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT matchup_id, team_id, projection, captured_at_ms
            FROM score_snapshots
            WHERE provider = $1 AND league_id = $2 AND season = $3 AND period = $4
            ORDER BY captured_at_ms ASC, team_id ASC
            "#,
        )
        .bind(key.provider.as_str())
        .bind(&key.league_id)
        .bind(&key.season)
        .bind(period as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ScoreSnapshot {
                matchup_id: r.get("matchup_id"),
                team_id: r.get("team_id"),
                projected_value: r.get("projection"),
                timestamp: r.get("captured_at_ms"),
            })
            .collect())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn recent_activity(&self, key: &LeagueYearKey, limit: usize) -> Result<Vec<ActivityEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT activity_id, occurred_at_ms, actions
            FROM league_activity
            WHERE provider = $1 AND league_id = $2 AND season = $3
            ORDER BY occurred_at_ms DESC
            LIMIT $4
            "#,
        )
        .bind(key.provider.as_str())
        .bind(&key.league_id)
        .bind(&key.season)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ActivityEvent {
                id: r.get("activity_id"),
                timestamp: r.get("occurred_at_ms"),
                actions: r.get::<Json<Vec<ActivityAction>>, _>("actions").0,
            })
            .collect())
    }
}
