//! Type definitions for broadcast batches and their members

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a destination channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        DestinationId(id)
    }
}

/// Identifier of a chat (private chat or registration chat)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message within a chat or channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the private source message of a broadcast
///
/// This pair is the only key a retraction can be requested by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl OriginRef {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self { chat_id, message_id }
    }
}

impl fmt::Display for OriginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

/// Unique identifier of one broadcast batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        BatchId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One successful copy of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchMember {
    pub destination_id: DestinationId,
    pub remote_message_id: MessageId,
}

impl BatchMember {
    pub fn new(destination_id: DestinationId, remote_message_id: MessageId) -> Self {
        Self {
            destination_id,
            remote_message_id,
        }
    }
}

/// Lifecycle state of a persisted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    /// Fan-out in progress; members are still being recorded
    Broadcasting,
    /// Fan-out finished; retractable
    Active,
    /// Claimed by a retraction; no other retraction may take it
    Retracting,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Broadcasting => "Broadcasting",
            BatchState::Active => "Active",
            BatchState::Retracting => "Retracting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Broadcasting" => Some(BatchState::Broadcasting),
            "Active" => Some(BatchState::Active),
            "Retracting" => Some(BatchState::Retracting),
            _ => None,
        }
    }
}

/// A broadcast batch together with its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastBatch {
    pub batch_id: BatchId,
    pub origin: OriginRef,
    pub state: BatchState,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: u64,
    pub members: Vec<BatchMember>,
}

/// Outcome of one broadcast call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub batch_id: BatchId,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_destinations: usize,
    /// Destinations whose copy failed, in destination order
    pub failed_destinations: Vec<DestinationId>,
}

impl BroadcastSummary {
    pub(crate) fn new(batch_id: BatchId, total_destinations: usize) -> Self {
        Self {
            batch_id,
            success_count: 0,
            failure_count: 0,
            total_destinations,
            failed_destinations: Vec::new(),
        }
    }

    pub(crate) fn record_failure(&mut self, destination: DestinationId) {
        self.failure_count += 1;
        self.failed_destinations.push(destination);
    }
}

impl fmt::Display for BroadcastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Broadcast done!")?;
        writeln!(f, "Success: {}", self.success_count)?;
        writeln!(f, "Failed:  {}", self.failure_count)?;
        write!(f, "Total channels: {}", self.total_destinations)
    }
}

/// Outcome of one retraction call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractionSummary {
    pub batch_id: BatchId,
    pub deleted_count: usize,
    pub failed_count: usize,
    pub total_members: usize,
}

impl fmt::Display for RetractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Delete complete.")?;
        writeln!(f, "Deleted:     {}", self.deleted_count)?;
        writeln!(f, "Not found:   {}", self.failed_count)?;
        write!(f, "Total in batch: {}", self.total_members)
    }
}

/// Result of registering a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display() {
        let origin = OriginRef::new(ChatId(42), MessageId(7));
        assert_eq!(origin.to_string(), "42/7");
    }

    #[test]
    fn test_batch_state_round_trip() {
        for state in [BatchState::Broadcasting, BatchState::Active, BatchState::Retracting] {
            assert_eq!(BatchState::parse(state.as_str()), Some(state));
        }
        assert_eq!(BatchState::parse("Deleted"), None);
    }

    #[test]
    fn test_broadcast_summary_text() {
        let mut summary = BroadcastSummary::new(BatchId::new("b1"), 2);
        summary.success_count = 1;
        summary.record_failure(DestinationId(-1002));

        let text = summary.to_string();
        assert!(text.starts_with("Broadcast done!"));
        assert!(text.contains("Success: 1"));
        assert!(text.contains("Failed:  1"));
        assert!(text.ends_with("Total channels: 2"));
        assert_eq!(summary.failed_destinations, vec![DestinationId(-1002)]);
    }

    #[test]
    fn test_retraction_summary_text() {
        let summary = RetractionSummary {
            batch_id: BatchId::new("b1"),
            deleted_count: 3,
            failed_count: 1,
            total_members: 4,
        };
        let text = summary.to_string();
        assert!(text.contains("Deleted:     3"));
        assert!(text.contains("Not found:   1"));
        assert!(text.contains("Total in batch: 4"));
    }
}
