//! Fanout Service - command surface for the presentation layer
//!
//! A bot or CLI front-end needs only these entry points:
//!
//! - `/start` → [`FanoutService::status`]
//! - `/broadcast` (as a reply) → [`FanoutService::handle_broadcast`]
//! - `/delete` (as a reply) → [`FanoutService::handle_retract`]
//! - a channel post forwarded into the registration chat →
//!   [`FanoutService::handle_forward`]

use super::broadcast::BroadcastCoordinator;
use super::errors::{FanoutError, FanoutResult};
use super::identity::BatchIdGenerator;
use super::registry::DestinationRegistry;
use super::retraction::RetractionCoordinator;
use super::store::BatchStore;
use super::transport::{DispatchSettings, Transport};
use super::types::{
    BroadcastSummary, ChatId, DestinationId, MessageId, OriginRef, RegisterOutcome,
    RetractionSummary,
};
use crate::config::BroadcastConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Bot commands understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Broadcast,
    Delete,
}

impl Command {
    /// Parse the leading command of a message text
    ///
    /// Accepts an optional `@botname` suffix; ignores trailing arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "broadcast" => Some(Command::Broadcast),
            "delete" => Some(Command::Delete),
            _ => None,
        }
    }
}

/// Snapshot reported by `/start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub registered_destinations: usize,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bot is online.")?;
        write!(f, "Registered channels: {}", self.registered_destinations)
    }
}

/// Reply produced for a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Status(ServiceStatus),
    Broadcast(BroadcastSummary),
    Retraction(RetractionSummary),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(status) => fmt::Display::fmt(status, f),
            Reply::Broadcast(summary) => fmt::Display::fmt(summary, f),
            Reply::Retraction(summary) => fmt::Display::fmt(summary, f),
        }
    }
}

/// Entry points for broadcasting, retracting and registering
pub struct FanoutService {
    registry: Arc<dyn DestinationRegistry>,
    broadcaster: BroadcastCoordinator,
    retractor: RetractionCoordinator,
    registration_chat: Option<ChatId>,
}

impl FanoutService {
    /// Build a service over a store that is both batch store and registry
    pub fn new<S>(store: Arc<S>, transport: Arc<dyn Transport>, config: &BroadcastConfig) -> Self
    where
        S: BatchStore + DestinationRegistry + 'static,
    {
        Self::from_parts(store.clone(), store, transport, config)
    }

    /// Build a service from separate collaborators
    pub fn from_parts(
        store: Arc<dyn BatchStore>,
        registry: Arc<dyn DestinationRegistry>,
        transport: Arc<dyn Transport>,
        config: &BroadcastConfig,
    ) -> Self {
        let settings = DispatchSettings::from(config);

        Self {
            registry: registry.clone(),
            broadcaster: BroadcastCoordinator::new(
                store.clone(),
                registry,
                transport.clone(),
                settings,
            ),
            retractor: RetractionCoordinator::new(store, transport, settings),
            registration_chat: config.registration_chat_id.map(ChatId),
        }
    }

    /// Replace the batch id generator used for new broadcasts
    pub fn with_batch_ids(mut self, batch_ids: Arc<dyn BatchIdGenerator>) -> Self {
        self.broadcaster = self.broadcaster.with_batch_ids(batch_ids);
        self
    }

    /// Copy `origin` to every registered destination
    pub async fn handle_broadcast(&self, origin: OriginRef) -> FanoutResult<BroadcastSummary> {
        self.broadcaster.broadcast(origin).await
    }

    /// Delete every copy of the latest broadcast of `origin`
    pub async fn handle_retract(&self, origin: OriginRef) -> FanoutResult<RetractionSummary> {
        self.retractor.retract(origin).await
    }

    /// Register a destination channel
    pub fn handle_register(&self, destination: DestinationId) -> FanoutResult<RegisterOutcome> {
        let outcome = self.registry.register(destination)?;
        info!(destination = %destination, outcome = ?outcome, "Register destination");
        Ok(outcome)
    }

    /// Register the source channel of a message forwarded into the registration chat
    ///
    /// Returns `None` when the message is ignored: it arrived elsewhere, no
    /// registration chat is configured, or it was not forwarded from a channel.
    pub fn handle_forward(
        &self,
        chat_id: ChatId,
        forwarded_from: Option<DestinationId>,
    ) -> FanoutResult<Option<RegisterOutcome>> {
        if self.registration_chat != Some(chat_id) {
            return Ok(None);
        }

        match forwarded_from {
            Some(destination) => self.handle_register(destination).map(Some),
            None => {
                debug!(chat_id = %chat_id, "Ignoring forward without a source channel");
                Ok(None)
            }
        }
    }

    /// Registered destinations, in registration order
    pub fn destinations(&self) -> FanoutResult<Vec<DestinationId>> {
        Ok(self.registry.list_destinations()?)
    }

    /// Number of registered destinations
    pub fn status(&self) -> FanoutResult<ServiceStatus> {
        Ok(ServiceStatus {
            registered_destinations: self.registry.count()?,
        })
    }

    /// Dispatch a parsed command sent in `chat_id`
    ///
    /// `reply_to` is the message the command replied to; `/broadcast` and
    /// `/delete` require one.
    pub async fn handle_command(
        &self,
        command: Command,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
    ) -> FanoutResult<Reply> {
        match command {
            Command::Start => self.status().map(Reply::Status),
            Command::Broadcast => {
                let message_id = reply_to.ok_or_else(|| {
                    FanoutError::InvalidCommand(
                        "Please reply to a message to broadcast.".to_string(),
                    )
                })?;
                self.handle_broadcast(OriginRef::new(chat_id, message_id))
                    .await
                    .map(Reply::Broadcast)
            }
            Command::Delete => {
                let message_id = reply_to.ok_or_else(|| {
                    FanoutError::InvalidCommand(
                        "Reply to your broadcast message to delete.".to_string(),
                    )
                })?;
                self.handle_retract(OriginRef::new(chat_id, message_id))
                    .await
                    .map(Reply::Retraction)
            }
        }
    }
}
