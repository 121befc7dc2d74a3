//! Error types for store access and dashboard aggregation

use thiserror::Error;

/// Failure raised by a [`crate::db::RecordStore`] implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite query or connection failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store is unreachable (poisoned lock, closed handle, ...)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a whole aggregation run
///
/// Any variant fails the whole request; no partial payload is returned.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The record store failed while the snapshot was being captured
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Snapshot capture did not finish within the configured budget
    #[error("Aggregation timed out after {0}s")]
    Timeout(u64),

    /// The worker running the capture stopped before returning
    #[error("Aggregation worker failed: {0}")]
    Worker(String),
}
