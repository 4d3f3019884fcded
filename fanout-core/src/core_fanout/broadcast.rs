//! Broadcast Coordinator - fans one origin message out to every destination
//!
//! # Flow
//!
//! ```text
//! registry ──► destinations
//!                  │
//!   create_batch ◄─┤ (empty shell, before any copy)
//!                  ▼
//!        copy × N (bounded concurrency, per-call deadline)
//!                  │
//!   add_member ◄───┘ (only for copies that returned a remote id)
//!                  │
//!   activate_batch ◄┘ (also after a store failure)
//! ```
//!
//! The batch stays `Broadcasting`, and so cannot be retracted, until fan-out
//! has finished. One destination failing never stops the others. A store
//! failure aborts the call; copies that were already delivered stay delivered
//! and the members recorded so far remain retractable.

use super::errors::FanoutResult;
use super::identity::{BatchIdGenerator, UuidBatchIds};
use super::registry::DestinationRegistry;
use super::store::BatchStore;
use super::transport::{with_deadline, DispatchSettings, Transport};
use super::types::{BatchId, BroadcastSummary, DestinationId, MessageId, OriginRef};
use crate::metrics::{self, Timer};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrates fan-out of one origin message
pub struct BroadcastCoordinator {
    store: Arc<dyn BatchStore>,
    registry: Arc<dyn DestinationRegistry>,
    transport: Arc<dyn Transport>,
    batch_ids: Arc<dyn BatchIdGenerator>,
    settings: DispatchSettings,
}

impl BroadcastCoordinator {
    /// Create a coordinator issuing UUID batch ids
    pub fn new(
        store: Arc<dyn BatchStore>,
        registry: Arc<dyn DestinationRegistry>,
        transport: Arc<dyn Transport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            batch_ids: Arc::new(UuidBatchIds),
            settings,
        }
    }

    /// Replace the batch id generator
    pub fn with_batch_ids(mut self, batch_ids: Arc<dyn BatchIdGenerator>) -> Self {
        self.batch_ids = batch_ids;
        self
    }

    /// Copy `origin` to every registered destination and record the batch
    ///
    /// An empty registry still allocates a batch, which then has no members.
    pub async fn broadcast(&self, origin: OriginRef) -> FanoutResult<BroadcastSummary> {
        let timer = Timer::new(metrics::BROADCAST_DURATION_MS);
        let destinations = self.registry.list_destinations()?;

        let batch_id = self.batch_ids.next_id();
        self.store.create_batch(&batch_id, origin)?;
        metrics::record_counter(metrics::BATCHES_CREATED, 1);

        info!(
            batch_id = %batch_id,
            origin = %origin,
            destinations = destinations.len(),
            "Starting broadcast"
        );

        let outcome = self.fan_out(batch_id.clone(), origin, &destinations).await;
        let activated = self.store.activate_batch(&batch_id);

        let summary = match (outcome, activated) {
            (Ok(summary), Ok(())) => summary,
            (Ok(_), Err(err)) => {
                error!(batch_id = %batch_id, error = %err, "Failed to activate batch");
                return Err(err.into());
            }
            (Err(err), activated) => {
                if let Err(activate_err) = activated {
                    error!(
                        batch_id = %batch_id,
                        error = %activate_err,
                        "Failed to activate batch after aborted broadcast"
                    );
                }
                return Err(err);
            }
        };

        timer.stop();

        info!(
            batch_id = %batch_id,
            success = summary.success_count,
            failed = summary.failure_count,
            total = summary.total_destinations,
            "Broadcast done"
        );

        Ok(summary)
    }

    async fn fan_out(
        &self,
        batch_id: BatchId,
        origin: OriginRef,
        destinations: &[DestinationId],
    ) -> FanoutResult<BroadcastSummary> {
        let transport = self.transport.as_ref();
        let deadline = self.settings.transport_timeout;
        let mut outcomes = stream::iter(destinations.iter().copied())
            .map(|destination| async move {
                let result = with_deadline(deadline, transport.copy(destination, origin)).await;
                (destination, result)
            })
            .buffered(self.settings.max_concurrency.max(1));

        let mut summary = BroadcastSummary::new(batch_id, destinations.len());

        while let Some((destination, result)) = outcomes.next().await {
            match result {
                Ok(remote_message_id) => {
                    self.record_copy(&summary, destination, remote_message_id)?;
                    summary.success_count += 1;
                }
                Err(err) => {
                    warn!(
                        batch_id = %summary.batch_id,
                        destination = %destination,
                        error = %err,
                        "Broadcast to destination failed"
                    );
                    summary.record_failure(destination);
                }
            }
        }

        metrics::record_counter(metrics::COPIES_SUCCESS, summary.success_count as u64);
        metrics::record_counter(metrics::COPIES_FAILED, summary.failure_count as u64);

        Ok(summary)
    }

    fn record_copy(
        &self,
        summary: &BroadcastSummary,
        destination: DestinationId,
        remote_message_id: MessageId,
    ) -> FanoutResult<()> {
        debug!(
            batch_id = %summary.batch_id,
            destination = %destination,
            remote_message_id = %remote_message_id,
            "Recording copy"
        );

        self.store
            .add_member(&summary.batch_id, destination, remote_message_id)
            .map_err(|err| {
                error!(
                    batch_id = %summary.batch_id,
                    destination = %destination,
                    delivered = summary.success_count + 1,
                    error = %err,
                    "Failed to record copy; delivered copies are not rolled back"
                );
                err.into()
            })
    }
}
