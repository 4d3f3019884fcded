//! Retraction Coordinator - deletes every copy of a batch
//!
//! The batch is resolved from the origin message, claimed so that no second
//! retraction can take it, emptied via the transport and finally purged. The
//! purge happens whatever the per-member outcome was.
//!
//! If the store fails after the claim, the claim is released so the batch
//! stays retractable.

use super::errors::{FanoutError, FanoutResult};
use super::store::BatchStore;
use super::transport::{with_deadline, DispatchSettings, Transport};
use super::types::{BatchId, OriginRef, RetractionSummary};
use crate::metrics::{self, Timer};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrates deletion of a broadcast batch
pub struct RetractionCoordinator {
    store: Arc<dyn BatchStore>,
    transport: Arc<dyn Transport>,
    settings: DispatchSettings,
}

impl RetractionCoordinator {
    pub fn new(
        store: Arc<dyn BatchStore>,
        transport: Arc<dyn Transport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            transport,
            settings,
        }
    }

    /// Delete every copy of the most recent batch broadcast from `origin`
    ///
    /// # Errors
    ///
    /// `FanoutError::NotFound` if no batch is recorded for `origin` (or a
    /// concurrent retraction claimed it first); no transport call is made.
    pub async fn retract(&self, origin: OriginRef) -> FanoutResult<RetractionSummary> {
        let timer = Timer::new(metrics::RETRACTION_DURATION_MS);

        let batch_id = match self.store.find_batch_by_origin(origin)? {
            Some(batch_id) => batch_id,
            None => {
                info!(origin = %origin, "No batch recorded for origin");
                return Err(FanoutError::NotFound(origin));
            }
        };

        if !self.store.claim_batch(&batch_id)? {
            info!(batch_id = %batch_id, origin = %origin, "Batch already being retracted");
            return Err(FanoutError::NotFound(origin));
        }

        let summary = match self.retract_claimed(&batch_id).await {
            Ok(summary) => summary,
            Err(err) => {
                if let Err(release_err) = self.store.release_batch(&batch_id) {
                    error!(
                        batch_id = %batch_id,
                        error = %release_err,
                        "Failed to release batch; it is retractable again once the claim lease expires"
                    );
                }
                return Err(err);
            }
        };

        metrics::record_counter(metrics::BATCHES_PURGED, 1);
        metrics::record_counter(metrics::DELETES_SUCCESS, summary.deleted_count as u64);
        metrics::record_counter(metrics::DELETES_FAILED, summary.failed_count as u64);
        timer.stop();

        info!(
            batch_id = %batch_id,
            deleted = summary.deleted_count,
            failed = summary.failed_count,
            total = summary.total_members,
            "Delete complete"
        );

        Ok(summary)
    }

    async fn retract_claimed(&self, batch_id: &BatchId) -> FanoutResult<RetractionSummary> {
        let members = self.store.list_members(batch_id)?;
        info!(
            batch_id = %batch_id,
            members = members.len(),
            "Retracting batch"
        );

        let transport = self.transport.as_ref();
        let deadline = self.settings.transport_timeout;
        let results: Vec<_> = stream::iter(members.iter().copied())
            .map(|member| async move {
                let result = with_deadline(
                    deadline,
                    transport.delete(member.destination_id, member.remote_message_id),
                )
                .await;
                (member, result)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut summary = RetractionSummary {
            batch_id: batch_id.clone(),
            deleted_count: 0,
            failed_count: 0,
            total_members: members.len(),
        };

        for (member, result) in results {
            match result {
                Ok(()) => {
                    debug!(
                        batch_id = %batch_id,
                        destination = %member.destination_id,
                        "Deleted copy"
                    );
                    summary.deleted_count += 1;
                }
                Err(err) => {
                    warn!(
                        batch_id = %batch_id,
                        destination = %member.destination_id,
                        remote_message_id = %member.remote_message_id,
                        error = %err,
                        "Delete failed"
                    );
                    summary.failed_count += 1;
                }
            }
        }

        if let Err(err) = self.store.purge_batch(batch_id) {
            error!(
                batch_id = %batch_id,
                deleted = summary.deleted_count,
                failed = summary.failed_count,
                error = %err,
                "Failed to purge batch after deleting its copies"
            );
            return Err(err.into());
        }

        Ok(summary)
    }
}
