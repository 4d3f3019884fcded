//! Storage layer for destinations and broadcast batches
//!
//! Provides SQL-based persistence for the fan-out engine.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_FANOUT_SCHEMA_VERSION};
pub use sql_store::FanoutSqlStore;
