use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::PositionStoreError;
use crate::store::{PositionStore, PositionWriter};
use crate::types::{Partition, Position};

/// Non-durable position store, positions live as long as the process
#[derive(Debug, Default)]
pub struct InMemoryPositionStore {
    positions: DashMap<Partition, i64>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = (Partition, i64)>,
    {
        Self {
            positions: positions.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn get(
        &self,
        topic: &str,
        partitions: &[i32],
    ) -> Result<Vec<Position>, PositionStoreError> {
        Ok(partitions
            .iter()
            .map(|&number| {
                let partition = Partition::new(topic, number);
                let offset = self.positions.get(&partition).map(|entry| *entry);
                Position::new(partition, offset)
            })
            .collect())
    }
}

#[async_trait]
impl PositionWriter for InMemoryPositionStore {
    async fn set(&self, partition: &Partition, offset: i64) -> Result<(), PositionStoreError> {
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }
}
