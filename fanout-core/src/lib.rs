pub mod config;
pub mod core_fanout;
pub mod logging;
pub mod metrics;

pub use core_fanout::{FanoutError, FanoutService, FanoutSqlStore};
pub use logging::{init_logging, LogLevel};
