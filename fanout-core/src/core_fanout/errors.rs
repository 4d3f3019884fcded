//! Error types for core_fanout module

use super::types::{BatchId, OriginRef};
use std::time::Duration;
use thiserror::Error;

/// Result type for command-level operations
pub type FanoutResult<T> = Result<T, FanoutError>;

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced to the caller of a broadcast, retraction or registration
#[derive(Error, Debug)]
pub enum FanoutError {
    /// No batch is recorded for the origin message
    #[error("No record found for that broadcast ({0})")]
    NotFound(OriginRef),

    /// Persistence layer failed; fatal to the current call
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The command could not be interpreted
    #[error("{0}")]
    InvalidCommand(String),
}

impl FanoutError {
    /// Whether the error is an expected, user-actionable outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, FanoutError::NotFound(_))
    }
}

/// Errors raised by the batch store and destination registry
#[derive(Error, Debug)]
pub enum StoreError {
    /// No connection could be taken from the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// SQLite rejected the statement
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The batch identifier was issued before
    #[error("Batch id already issued: {0}")]
    DuplicateBatch(BatchId),

    /// A member was written for a batch that does not exist
    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchId),

    /// A persisted row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Per-destination failure of a copy or delete
///
/// These never abort a batch-level operation; coordinators count them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Rejected by destination: {0}")]
    Rejected(String),

    #[error("Message not found at destination")]
    NotFound,

    #[error("Not allowed to post or delete in destination")]
    Forbidden,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}
