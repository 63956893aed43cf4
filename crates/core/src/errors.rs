//! Error types shared by the offline sync engine.

use thiserror::Error;

/// Result alias used across the core crate and its storage backends.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for engine operations.
///
/// Only [`Error::Unavailable`] and [`Error::QueueWrite`] are meant to reach the
/// UI; everything else is converted into state (cache miss, queued action,
/// pending count) by the boundary components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable pending-action queue could not persist a mutation.
    #[error("Could not save change for later delivery: {0}")]
    QueueWrite(String),

    /// Neither the remote API nor the local cache has the record.
    #[error("Record '{0}' is not available offline")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for the errors the UI is expected to render.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::QueueWrite(_))
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create connection pool: {0}")]
    PoolCreationFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}
