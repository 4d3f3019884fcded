//! Destination registry trait

use super::errors::StoreResult;
use super::types::{DestinationId, RegisterOutcome};

/// The set of channels a broadcast fans out to
pub trait DestinationRegistry: Send + Sync {
    /// All registered destinations, in registration order
    fn list_destinations(&self) -> StoreResult<Vec<DestinationId>>;

    /// Add a destination; registering twice keeps a single entry
    fn register(&self, destination: DestinationId) -> StoreResult<RegisterOutcome>;

    /// Number of registered destinations
    fn count(&self) -> StoreResult<usize>;
}
