//! Mock Transport for testing
//!
//! Keeps every delivered copy in memory so tests can check exactly which
//! remote messages exist after a broadcast or a retraction. Failures and slow
//! destinations are scripted per destination.

use crate::core_fanout::{
    errors::TransportError,
    transport::Transport,
    types::{DestinationId, MessageId, OriginRef},
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    next_message_id: i64,
    failing_copies: HashMap<DestinationId, TransportError>,
    failing_deletes: HashMap<DestinationId, TransportError>,
    copy_delays: HashMap<DestinationId, Duration>,
    live: BTreeSet<(DestinationId, MessageId)>,
    copy_calls: Vec<(DestinationId, OriginRef)>,
    delete_calls: Vec<(DestinationId, MessageId)>,
}

/// Mock Transport for testing without a chat platform
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport; remote ids start at 1000
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_message_id: 1000,
                ..MockState::default()
            })),
        }
    }

    /// Make every copy to `destination` fail with `error`
    pub fn fail_copies_to(&self, destination: DestinationId, error: TransportError) {
        self.state.lock().unwrap().failing_copies.insert(destination, error);
    }

    /// Make every delete in `destination` fail with `error`
    pub fn fail_deletes_in(&self, destination: DestinationId, error: TransportError) {
        self.state.lock().unwrap().failing_deletes.insert(destination, error);
    }

    /// Delay copies to `destination` before answering
    pub fn delay_copies_to(&self, destination: DestinationId, delay: Duration) {
        self.state.lock().unwrap().copy_delays.insert(destination, delay);
    }

    /// Remove a delivered copy behind the engine's back
    pub fn drop_remote(&self, destination: DestinationId, message_id: MessageId) {
        self.state.lock().unwrap().live.remove(&(destination, message_id));
    }

    /// Copies that currently exist at destinations
    pub fn live_messages(&self) -> Vec<(DestinationId, MessageId)> {
        self.state.lock().unwrap().live.iter().copied().collect()
    }

    /// Every copy attempt, in call order
    pub fn copy_calls(&self) -> Vec<(DestinationId, OriginRef)> {
        self.state.lock().unwrap().copy_calls.clone()
    }

    /// Every delete attempt, in call order
    pub fn delete_calls(&self) -> Vec<(DestinationId, MessageId)> {
        self.state.lock().unwrap().delete_calls.clone()
    }

    /// Destinations a delete was attempted for
    pub fn deleted_destinations(&self) -> HashSet<DestinationId> {
        self.delete_calls().into_iter().map(|(d, _)| d).collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn copy(
        &self,
        destination: DestinationId,
        origin: OriginRef,
    ) -> Result<MessageId, TransportError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.copy_calls.push((destination, origin));
            state.copy_delays.get(&destination).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failing_copies.get(&destination) {
            return Err(error.clone());
        }

        let message_id = MessageId(state.next_message_id);
        state.next_message_id += 1;
        state.live.insert((destination, message_id));

        Ok(message_id)
    }

    async fn delete(
        &self,
        destination: DestinationId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push((destination, message_id));

        if let Some(error) = state.failing_deletes.get(&destination) {
            return Err(error.clone());
        }

        if state.live.remove(&(destination, message_id)) {
            Ok(())
        } else {
            Err(TransportError::NotFound)
        }
    }
}
