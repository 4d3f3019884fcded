//! Loopback transport for the operator CLI
//!
//! Pretends every destination accepted the copy and hands out local remote
//! ids. Destinations listed as unreachable fail every call, which makes the
//! partial-failure paths observable without a chat platform.

use async_trait::async_trait;
use fanout_core::core_fanout::{DestinationId, MessageId, OriginRef, Transport, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub struct LoopbackTransport {
    next_message_id: AtomicI64,
    unreachable: HashSet<DestinationId>,
}

impl LoopbackTransport {
    pub fn new(unreachable: impl IntoIterator<Item = DestinationId>) -> Self {
        // Seeded from the clock so separate runs do not reuse remote ids
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(1);

        Self {
            next_message_id: AtomicI64::new(seed),
            unreachable: unreachable.into_iter().collect(),
        }
    }

    fn check_reachable(&self, destination: DestinationId) -> Result<(), TransportError> {
        if self.unreachable.contains(&destination) {
            return Err(TransportError::Unavailable(format!(
                "destination {} is unreachable",
                destination
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn copy(
        &self,
        destination: DestinationId,
        origin: OriginRef,
    ) -> Result<MessageId, TransportError> {
        self.check_reachable(destination)?;

        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        info!(
            destination = %destination,
            origin = %origin,
            remote_message_id = %message_id,
            "Loopback copy"
        );
        Ok(message_id)
    }

    async fn delete(
        &self,
        destination: DestinationId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        self.check_reachable(destination)?;

        info!(destination = %destination, remote_message_id = %message_id, "Loopback delete");
        Ok(())
    }
}
