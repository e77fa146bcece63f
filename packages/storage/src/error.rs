// ABOUTME: Error types for the index store
// ABOUTME: Wraps sqlx and serde failures raised while reading or writing records

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index not found: {0}")]
    NotFound(i64),

    #[error("Index already queued for repository {repository_id} at {commit}")]
    AlreadyQueued { repository_id: i64, commit: String },

    #[error("Invalid index state: {0}")]
    InvalidState(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
