use thiserror::Error;

/// Main error type for the sync engine
#[derive(Error, Debug)]
pub enum SyncError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Provider errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid source data: {0}")]
    InvalidSourceData(String),

    #[error("Run timed out after {0}s")]
    Timeout(u64),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Persisted data errors
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Commit failed for {key}: {reason}")]
    CommitFailure { key: String, reason: String },

    // Runner errors
    #[error("League year not registered: {0}")]
    UnknownLeagueYear(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse classification used by callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider request failed; nothing was written
    SourceUnavailable,
    /// Stored rows violate an aggregation invariant
    DataIntegrity,
    /// The atomic store transaction failed; nothing was written
    CommitFailure,
    Other,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Http(_)
            | SyncError::RateLimited(_)
            | SyncError::SourceUnavailable(_)
            | SyncError::InvalidSourceData(_)
            | SyncError::Timeout(_) => ErrorKind::SourceUnavailable,
            SyncError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            SyncError::CommitFailure { .. } => ErrorKind::CommitFailure,
            _ => ErrorKind::Other,
        }
    }

    /// Whether the next scheduled tick may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SourceUnavailable | ErrorKind::CommitFailure
        ) || matches!(self, SyncError::Database(_))
    }

    pub fn commit_failure(key: impl ToString, reason: impl ToString) -> Self {
        SyncError::CommitFailure {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
