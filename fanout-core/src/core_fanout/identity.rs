//! Batch identity generation
//!
//! Batch identifiers are produced by an injected generator so that uniqueness
//! never depends on wall-clock resolution. The store still rejects any id it
//! has seen before.

use super::types::{now_millis, BatchId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh batch identifiers
pub trait BatchIdGenerator: Send + Sync {
    /// Produce an identifier that has not been returned before
    fn next_id(&self) -> BatchId;
}

/// Random UUIDv4 identifiers (the default)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidBatchIds;

impl BatchIdGenerator for UuidBatchIds {
    fn next_id(&self) -> BatchId {
        BatchId::new(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Time-prefixed, strictly increasing identifiers
///
/// Each id is the number of microsecond slots since the Unix epoch, bumped
/// past the previous id when two calls land in the same slot. Ids stay sortable
/// by creation time.
#[derive(Debug, Default)]
pub struct SequentialBatchIds {
    last: AtomicU64,
}

impl SequentialBatchIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchIdGenerator for SequentialBatchIds {
    fn next_id(&self) -> BatchId {
        let now = now_millis().saturating_mul(1000);
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return BatchId::new(format!("{:020}", next)),
                Err(observed) => current = observed,
            }
        }
    }
}
