// ==== Rebalance metrics ====
/// Counter for rebalance events handled (label event_type: assign/revoke)
pub const REBALANCE_EVENTS_TOTAL: &str = "kafka_resume_rebalance_events_total";

/// Counter for empty assign/revoke events skipped (cooperative-sticky no-ops)
pub const REBALANCE_EMPTY_SKIPPED: &str = "kafka_resume_rebalance_empty_skipped_total";

/// Counter for partitions assigned to this consumer
pub const PARTITIONS_ASSIGNED_TOTAL: &str = "kafka_resume_partitions_assigned_total";

/// Counter for partitions revoked from this consumer
pub const PARTITIONS_REVOKED_TOTAL: &str = "kafka_resume_partitions_revoked_total";

/// Counter for resolved resume offsets (label start: beginning/position)
pub const RESUME_OFFSETS_TOTAL: &str = "kafka_resume_resume_offsets_total";

/// Counter for assignments that could not be resolved (label error)
pub const ASSIGNMENT_FAILURES_TOTAL: &str = "kafka_resume_assignment_failures_total";

// ==== Position store metrics ====
/// Histogram for per-topic position lookup duration (label outcome)
pub const POSITION_LOOKUP_DURATION_MS: &str = "kafka_resume_position_lookup_duration_ms";

/// Counter for position writes (label outcome: success/failure)
pub const POSITION_WRITES_TOTAL: &str = "kafka_resume_position_writes_total";

// ==== Consumer metrics ====
/// Counter for messages received by the consumer loop
pub const MESSAGES_CONSUMED_TOTAL: &str = "kafka_resume_messages_consumed_total";

/// Counter for errors reported by the Kafka client
pub const KAFKA_CLIENT_ERRORS_TOTAL: &str = "kafka_resume_kafka_client_errors_total";

/// Counter for librdkafka log lines with an unmappable severity
pub const UNKNOWN_LOG_SEVERITY_TOTAL: &str = "kafka_resume_unknown_log_severity_total";
