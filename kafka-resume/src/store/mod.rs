//! Position stores: durable "last processed offset" per partition.
//!
//! The rebalance handlers only ever read through [`PositionStore`]. Writing
//! positions is the consumer loop's business and goes through
//! [`PositionWriter`].

use async_trait::async_trait;

use crate::error::PositionStoreError;
use crate::types::{Partition, Position};

pub mod file;
pub mod memory;

pub use file::FilePositionStore;
pub use memory::InMemoryPositionStore;

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Batch lookup of positions for the given partitions of one topic.
    ///
    /// Implementations may omit partitions they know nothing about or return
    /// them as unset; callers treat both the same. Must be safe to call
    /// concurrently for different topics.
    async fn get(&self, topic: &str, partitions: &[i32])
        -> Result<Vec<Position>, PositionStoreError>;
}

#[async_trait]
pub trait PositionWriter: Send + Sync {
    /// Record `offset` as the last processed offset of `partition`
    async fn set(&self, partition: &Partition, offset: i64) -> Result<(), PositionStoreError>;
}
