//! Broadcast fan-out and batch retraction
//!
//! This module copies one origin message to every registered destination,
//! records which remote message each copy became, and later deletes the whole
//! batch given only the origin message.
//!
//! ## Architecture
//!
//! - **DestinationRegistry**: the channels a broadcast fans out to
//! - **Transport**: copy/delete against the chat platform
//! - **BatchStore**: durable batch → (destination, remote message) mapping
//! - **BroadcastCoordinator** / **RetractionCoordinator**: the two flows
//! - **FanoutService**: command surface over both
//!
//! ## Key Design Principles
//!
//! 1. Per-destination failures are counted, never propagated
//! 2. Store failures always propagate
//! 3. A member row exists only for a copy that succeeded
//! 4. A batch is retracted at most once

pub mod adapters;
pub mod broadcast;
pub mod errors;
pub mod identity;
pub mod registry;
pub mod retraction;
pub mod service;
pub mod storage;
pub mod store;
pub mod transport;
pub mod types;

pub use broadcast::BroadcastCoordinator;
pub use errors::{FanoutError, FanoutResult, StoreError, StoreResult, TransportError};
pub use identity::{BatchIdGenerator, SequentialBatchIds, UuidBatchIds};
pub use registry::DestinationRegistry;
pub use retraction::RetractionCoordinator;
pub use service::{Command, FanoutService, Reply, ServiceStatus};
pub use storage::FanoutSqlStore;
pub use store::BatchStore;
pub use transport::{DispatchSettings, Transport};
pub use types::{
    BatchId, BatchMember, BatchState, BroadcastBatch, BroadcastSummary, ChatId, DestinationId,
    MessageId, OriginRef, RegisterOutcome, RetractionSummary,
};
