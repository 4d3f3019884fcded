//! Batch store trait
//!
//! Durable mapping from a batch identity to the remote copies it produced.
//! This mapping is the only state that makes an earlier broadcast retractable,
//! so implementations must persist every write before returning.

use super::errors::StoreResult;
use super::types::{BatchId, BatchMember, BroadcastBatch, DestinationId, MessageId, OriginRef};

/// Persistence for broadcast batches
pub trait BatchStore: Send + Sync {
    /// Record an empty batch shell for `origin` under a fresh identifier
    ///
    /// The batch starts out `Broadcasting` and cannot be claimed until
    /// [`activate_batch`](Self::activate_batch) is called.
    ///
    /// Fails with `StoreError::DuplicateBatch` if the identifier was ever
    /// issued before, including for batches that have since been purged.
    fn create_batch(&self, batch_id: &BatchId, origin: OriginRef) -> StoreResult<()>;

    /// Append one successful copy to a batch
    fn add_member(
        &self,
        batch_id: &BatchId,
        destination_id: DestinationId,
        remote_message_id: MessageId,
    ) -> StoreResult<()>;

    /// Mark a batch's fan-out as finished, making it retractable
    fn activate_batch(&self, batch_id: &BatchId) -> StoreResult<()>;

    /// Most recent claimable batch broadcast from `origin`
    ///
    /// Batches still broadcasting or claimed by a retraction are skipped,
    /// unless they have been stuck in that state for longer than the store's
    /// claim lease.
    fn find_batch_by_origin(&self, origin: OriginRef) -> StoreResult<Option<BatchId>>;

    /// Members of a batch in insertion order
    fn list_members(&self, batch_id: &BatchId) -> StoreResult<Vec<BatchMember>>;

    /// Move an active batch to the retracting state
    ///
    /// Returns `false` when the batch is missing, still broadcasting, or
    /// claimed by another retraction whose lease has not expired.
    fn claim_batch(&self, batch_id: &BatchId) -> StoreResult<bool>;

    /// Hand a claimed batch back so a later retraction can take it
    fn release_batch(&self, batch_id: &BatchId) -> StoreResult<()>;

    /// Remove a batch and all of its members
    fn purge_batch(&self, batch_id: &BatchId) -> StoreResult<()>;

    /// Load a batch together with its members
    fn get_batch(&self, batch_id: &BatchId) -> StoreResult<Option<BroadcastBatch>>;

    /// Newest batches first
    fn recent_batches(&self, limit: usize) -> StoreResult<Vec<BroadcastBatch>>;
}
