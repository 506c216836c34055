use std::collections::BTreeMap;

use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use crate::error::DiagnosticsError;
use crate::types::{format_topics, TopicPartitions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
}

impl Severity {
    /// Maps a syslog level (as used by librdkafka) onto our severities.
    /// Anything outside 0..=7 is an error, not a guess.
    pub fn from_syslog(level: i32) -> Result<Self, DiagnosticsError> {
        match level {
            0..=3 => Ok(Severity::Error),
            4 | 5 => Ok(Severity::Warn),
            6 => Ok(Severity::Info),
            7 => Ok(Severity::Debug),
            other => Err(DiagnosticsError::UnknownSeverity(other)),
        }
    }
}

/// One structured diagnostic emitted by the rebalance handlers
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticRecord<'a> {
    pub severity: Severity,
    pub message: &'a str,
    pub topics: &'a [TopicPartitions],
}

/// Where rebalance summaries go. Production uses [`TracingSink`]; tests
/// swap in a recorder to count emissions.
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, record: DiagnosticRecord<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, record: DiagnosticRecord<'_>) {
        let topics = format_topics(record.topics);
        match record.severity {
            Severity::Error => error!(topics = %topics, "{}", record.message),
            Severity::Warn => warn!(topics = %topics, "{}", record.message),
            Severity::Info => info!(topics = %topics, "{}", record.message),
            Severity::Debug => debug!(topics = %topics, "{}", record.message),
        }
    }
}

/// Forwards a librdkafka log line at its mapped severity
pub fn forward_client_log(
    level: i32,
    facility: &str,
    message: &str,
) -> Result<(), DiagnosticsError> {
    match Severity::from_syslog(level)? {
        Severity::Error => error!(facility, "{message}"),
        Severity::Warn => warn!(facility, "{message}"),
        Severity::Info => info!(facility, "{message}"),
        Severity::Debug => debug!(facility, "{message}"),
    }
    Ok(())
}

/// Renders a partition list grouped by topic, e.g. `orders=[0=42, 1=7]`
pub fn offsets_summary(offsets: &TopicPartitionList) -> String {
    let mut by_topic: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for elem in offsets.elements() {
        let offset = match elem.offset() {
            Offset::Offset(offset) => offset.to_string(),
            other => format!("{other:?}"),
        };
        by_topic
            .entry(elem.topic().to_string())
            .or_default()
            .push(format!("{}={}", elem.partition(), offset));
    }

    by_topic
        .into_iter()
        .map(|(topic, entries)| format!("{topic}=[{}]", entries.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syslog_mapping() {
        for level in 0..=3 {
            assert_eq!(Severity::from_syslog(level).unwrap(), Severity::Error);
        }
        assert_eq!(Severity::from_syslog(4).unwrap(), Severity::Warn);
        assert_eq!(Severity::from_syslog(5).unwrap(), Severity::Warn);
        assert_eq!(Severity::from_syslog(6).unwrap(), Severity::Info);
        assert_eq!(Severity::from_syslog(7).unwrap(), Severity::Debug);
    }

    #[test]
    fn test_unknown_severity_fails() {
        assert!(matches!(
            Severity::from_syslog(8),
            Err(DiagnosticsError::UnknownSeverity(8))
        ));
        assert!(matches!(
            Severity::from_syslog(-1),
            Err(DiagnosticsError::UnknownSeverity(-1))
        ));
        assert!(forward_client_log(42, "FAC", "msg").is_err());
        assert!(forward_client_log(6, "FAC", "msg").is_ok());
    }

    #[test]
    fn test_offsets_summary() {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset("users", 3, Offset::Offset(7)).unwrap();
        list.add_partition_offset("orders", 0, Offset::Offset(42)).unwrap();
        list.add_partition_offset("orders", 1, Offset::Invalid).unwrap();

        assert_eq!(offsets_summary(&list), "orders=[0=42, 1=Invalid] users=[3=7]");
    }
}
