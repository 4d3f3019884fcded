//! Transport Trait - Abstraction over the chat platform client
//!
//! The coordinators never talk to a chat platform directly. They go through
//! this trait, which keeps them testable with [`MockTransport`] and lets the
//! operator CLI run against a local loopback.
//!
//! ```text
//! BroadcastCoordinator / RetractionCoordinator
//!       |
//!       v
//! Transport (trait)
//!       |
//!       +---> platform client (outside this crate)
//!       |
//!       +---> MockTransport (for testing)
//! ```
//!
//! [`MockTransport`]: super::adapters::MockTransport

use super::errors::TransportError;
use super::types::{DestinationId, MessageId, OriginRef};
use crate::config::BroadcastConfig;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Copy and delete operations against destination channels
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy the origin message into `destination`
    ///
    /// # Returns
    ///
    /// Identifier of the new message at the destination
    async fn copy(
        &self,
        destination: DestinationId,
        origin: OriginRef,
    ) -> Result<MessageId, TransportError>;

    /// Delete a previously copied message from `destination`
    async fn delete(
        &self,
        destination: DestinationId,
        message_id: MessageId,
    ) -> Result<(), TransportError>;
}

/// How many transport calls may be in flight and how long each may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub max_concurrency: usize,
    pub transport_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            transport_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&BroadcastConfig> for DispatchSettings {
    fn from(config: &BroadcastConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            transport_timeout: config.transport_timeout,
        }
    }
}

/// Run one transport call, turning an elapsed deadline into a failure
pub(crate) async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}
