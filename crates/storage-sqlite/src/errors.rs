//! Storage-layer errors and their mapping into core errors.

use fieldkit_core::errors::{DatabaseError, Error as CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Core(inner) => inner,
            StorageError::ConnectionFailed(e) => {
                CoreError::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::Pool(e) => CoreError::Database(DatabaseError::ConnectionFailed(e.to_string())),
            StorageError::QueryFailed(diesel::result::Error::NotFound) => {
                CoreError::Database(DatabaseError::NotFound("No matching row".to_string()))
            }
            StorageError::QueryFailed(e) => CoreError::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::MigrationFailed(msg) => CoreError::Database(DatabaseError::MigrationFailed(msg)),
            StorageError::Decode(msg) => CoreError::Database(DatabaseError::Internal(msg)),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Core(CoreError::Serialization(err))
    }
}
