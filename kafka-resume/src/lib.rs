//! Kafka consumer that resumes every newly assigned partition from an
//! external position store.
//!
//! On each rebalance the assignment handler looks up the last processed
//! offset of every assigned partition (one batched lookup per topic) and
//! tells librdkafka to fetch from the offset after it, or from the beginning
//! of the partition when nothing was recorded.
//!
//! ## Error logging
//!
//! Log errors with `error = ?e` (Debug) so the `#[source]` chain is visible,
//! and wrap with `.context()` rather than formatting the error into a new one.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod kafka;
pub mod metrics_consts;
pub mod rebalance_handler;
pub mod resolver;
pub mod server;
pub mod store;
pub mod test_utils;
pub mod types;
pub mod waiter;

// Re-export commonly used types for convenience
pub use error::{PositionStoreError, ResumeError};
pub use rebalance_handler::ResumeHandler;
pub use types::{Partition, Position, ResumeOffset, RevokedPartition, StartOffset};
