//! Managed PostgreSQL transactions for league-year commits

use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Transaction scope identifier for tracking and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitScope {
    /// Activity rows plus activity watermark (and bootstrap)
    ActivitySync,
    /// Snapshot rows plus score watermark
    ScoreSnapshot,
    /// Record-only change
    RecordUpdate,
}

impl std::fmt::Display for CommitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActivitySync => write!(f, "activity_sync"),
            Self::ScoreSnapshot => write!(f, "score_snapshot"),
            Self::RecordUpdate => write!(f, "record_update"),
        }
    }
}

/// A managed transaction with automatic rollback on drop
pub struct ManagedTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
    scope: CommitScope,
    committed: bool,
}

impl<'a> ManagedTransaction<'a> {
    pub async fn begin(pool: &'a PgPool, scope: CommitScope) -> Result<Self> {
        let tx = pool.begin().await?;
        debug!("Started transaction for scope: {}", scope);
        Ok(Self {
            tx: Some(tx),
            scope,
            committed: false,
        })
    }

    /// Connection for executing queries inside the transaction.
    /// Use as: `.execute(tx.executor()?).await`
    pub fn executor(&mut self) -> Result<&mut sqlx::PgConnection> {
        let scope = self.scope;
        let tx = self.tx.as_mut().ok_or_else(|| {
            SyncError::Validation(format!("transaction for scope {} already consumed", scope))
        })?;
        Ok(&mut **tx)
    }

    /// Commit the transaction
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.committed = true;
            debug!("Committed transaction for scope: {}", self.scope);
        }
        Ok(())
    }
}

impl<'a> Drop for ManagedTransaction<'a> {
    fn drop(&mut self) {
        if self.tx.is_some() && !self.committed {
            // sqlx rolls back uncommitted transactions on drop
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}
