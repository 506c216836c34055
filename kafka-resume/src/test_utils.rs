//! Helpers shared by unit tests and the tests/ directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::diagnostics::{DiagnosticRecord, DiagnosticsSink, Severity};
use crate::error::PositionStoreError;
use crate::store::PositionStore;
use crate::types::{Partition, Position, TopicPartitions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDiagnostic {
    pub severity: Severity,
    pub message: String,
    pub topics: Vec<TopicPartitions>,
}

/// Sink that keeps every record it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<RecordedDiagnostic>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<RecordedDiagnostic> {
        self.records.lock().unwrap().clone()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn emit(&self, record: DiagnosticRecord<'_>) {
        self.records.lock().unwrap().push(RecordedDiagnostic {
            severity: record.severity,
            message: record.message.to_string(),
            topics: record.topics.to_vec(),
        });
    }
}

/// Store whose lookups never complete, for timeout and shutdown tests
#[derive(Debug, Default)]
pub struct PendingPositionStore {
    calls: AtomicUsize,
}

impl PendingPositionStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionStore for PendingPositionStore {
    async fn get(
        &self,
        _topic: &str,
        _partitions: &[i32],
    ) -> Result<Vec<Position>, PositionStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

pub fn partitions(topic: &str, numbers: &[i32]) -> Vec<Partition> {
    numbers
        .iter()
        .map(|&number| Partition::new(topic, number))
        .collect()
}
