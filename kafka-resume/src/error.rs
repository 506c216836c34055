use std::time::Duration;

use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::types::Partition;

/// Failures surfaced by the assignment handler. None of these are recovered
/// locally: the broker client must not start fetching on a guessed offset.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("position lookup for topic {topic} timed out after {timeout:?}")]
    LookupTimeout { topic: String, timeout: Duration },

    #[error("position lookup for topic {topic} failed")]
    LookupFailure {
        topic: String,
        #[source]
        source: PositionStoreError,
    },

    #[error("malformed assignment for {partition}: {reason}")]
    MalformedAssignment { partition: String, reason: String },

    #[error("position lookup cancelled by shutdown")]
    Cancelled,

    #[error("cannot block on position lookup from a current-thread runtime")]
    BlockingUnsupported,
}

impl ResumeError {
    pub fn malformed(partition: &Partition, reason: &str) -> Self {
        ResumeError::MalformedAssignment {
            partition: partition.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ResumeError::LookupTimeout { .. } => "timeout",
            ResumeError::LookupFailure { .. } => "failure",
            ResumeError::MalformedAssignment { .. } => "malformed",
            ResumeError::Cancelled => "cancelled",
            ResumeError::BlockingUnsupported => "blocking_unsupported",
        }
    }
}

#[derive(Debug, Error)]
pub enum PositionStoreError {
    #[error("position store I/O error")]
    Io(#[from] std::io::Error),

    #[error("failed to decode stored positions")]
    Decode(#[from] serde_json::Error),

    #[error("invalid topic name for position store: {0:?}")]
    InvalidTopic(String),

    #[error("position store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("unknown log severity {0}")]
    UnknownSeverity(i32),
}

/// Why an assignment could not be turned into fetch positions
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Resume(#[from] ResumeError),

    #[error("failed to apply resume offsets")]
    Apply(#[from] KafkaError),
}
