use thiserror::Error;

use crate::store::Table;

/// Sync config could not be parsed or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Semantically invalid value.
    #[error("config validation error: {0}")]
    Validation(String),
}

/// An upstream collaborator (order feed, customer directory) failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_name} request failed: {message}")]
    Request { source_name: String, message: String },
    #[error("{source_name} returned malformed data: {message}")]
    Malformed { source_name: String, message: String },
    #[error("IO error: {0}")]
    Io(String),
}

/// An attendance-store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert or replace failed. `written` is how many rows are durable.
    #[error("write to {table} failed ({written}/{attempted} rows written): {message}")]
    Write {
        table: Table,
        attempted: usize,
        written: usize,
        message: String,
    },
    #[error("read from {table} failed: {message}")]
    Read { table: Table, message: String },
    #[error("no row in {table} matches key {key}")]
    NotFound { table: Table, key: String },
    #[error("sync lock error: {0}")]
    Lock(String),
}

impl StoreError {
    /// Rows durably written before the failure (0 for non-write errors).
    pub fn written(&self) -> usize {
        match self {
            Self::Write { written, .. } => *written,
            _ => 0,
        }
    }
}

/// Unexpected failure that aborts a sync without a partial report.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync failed: could not acquire lock: {0}")]
    LockAcquire(StoreError),
    #[error("sync failed: could not release lock: {0}")]
    LockRelease(StoreError),
}
