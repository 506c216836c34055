use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;

use crate::diagnostics::{DiagnosticRecord, DiagnosticsSink, Severity, TracingSink};
use crate::error::ResumeError;
use crate::metrics_consts::{
    ASSIGNMENT_FAILURES_TOTAL, PARTITIONS_ASSIGNED_TOTAL, PARTITIONS_REVOKED_TOTAL,
    POSITION_LOOKUP_DURATION_MS, REBALANCE_EVENTS_TOTAL, RESUME_OFFSETS_TOTAL,
};
use crate::resolver::resolve;
use crate::store::PositionStore;
use crate::types::{
    group_by_topic, Partition, Position, ResumeOffset, RevokedPartition, StartOffset,
    TopicPartitions,
};
use crate::waiter::LookupWaiter;

/// Decides resume offsets for newly assigned partitions and reports revocations.
///
/// # Rebalance flow
///
/// ```text
/// Unassigned ──assign──► Assigning ──offsets resolved──► Assigned
///     ▲                  (lookup in flight)                  │
///     └──────────────────── Revoking ◄────────revoke─────────┘
/// ```
///
/// The handler only runs the side effects of `Assigning` and `Revoking`; the
/// current assignment is tracked by the Kafka client and positions by the
/// [`PositionStore`]. Nothing is kept between events.
///
/// ## Assign
///
/// ```text
/// on_assigned(partitions)                [SYNC, inside the rebalance callback]
///     └─► LookupWaiter::block_on
///             └─► resume_offsets()       [async]
///                     ├─► group by topic, emit "Assignment"
///                     ├─► one PositionStore::get per topic (concurrent, bounded)
///                     └─► resolve every partition
/// ```
///
/// ## Revoke
///
/// ```text
/// on_revoked(partitions)                 [SYNC, no I/O]
///     └─► group by topic, emit "Revocation"
/// ```
pub struct ResumeHandler {
    store: Arc<dyn PositionStore>,
    waiter: LookupWaiter,
    sink: Arc<dyn DiagnosticsSink>,
}

impl ResumeHandler {
    pub fn new(store: Arc<dyn PositionStore>, waiter: LookupWaiter) -> Self {
        Self {
            store,
            waiter,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn waiter(&self) -> &LookupWaiter {
        &self.waiter
    }

    /// Synchronous entry point for the rebalance callback.
    ///
    /// Empty assignments return immediately: no lookup, no diagnostics.
    pub fn on_assigned(&self, partitions: &[Partition]) -> Result<Vec<ResumeOffset>, ResumeError> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        self.waiter.block_on(self.resume_offsets(partitions))
    }

    /// Resolves one resume offset per distinct input partition, in input order.
    ///
    /// Store failures are returned as-is; no partition of a failed event gets
    /// an offset.
    pub async fn resume_offsets(
        &self,
        partitions: &[Partition],
    ) -> Result<Vec<ResumeOffset>, ResumeError> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.resolve_assignment(partitions).await;
        if let Err(e) = &result {
            metrics::counter!(ASSIGNMENT_FAILURES_TOTAL, "error" => e.kind()).increment(1);
        }
        result
    }

    async fn resolve_assignment(
        &self,
        partitions: &[Partition],
    ) -> Result<Vec<ResumeOffset>, ResumeError> {
        for partition in partitions {
            partition.validate()?;
        }

        let requested = group_by_topic(partitions);

        // Logged before any lookup so the request is visible even if the store fails
        self.sink.emit(DiagnosticRecord {
            severity: Severity::Info,
            message: "Assignment",
            topics: &requested,
        });
        metrics::counter!(REBALANCE_EVENTS_TOTAL, "event_type" => "assign").increment(1);

        let lookups = requested.iter().map(|group| self.lookup(group));
        let positions: HashMap<Partition, Position> = try_join_all(lookups)
            .await?
            .into_iter()
            .flatten()
            .map(|position| (position.partition().clone(), position))
            .collect();

        let mut seen = HashSet::with_capacity(partitions.len());
        let resume_offsets: Vec<ResumeOffset> = partitions
            .iter()
            .filter(|partition| seen.insert(*partition))
            .map(|partition| resolve(partition, positions.get(partition)))
            .collect();

        for resume in &resume_offsets {
            let start = match resume.start() {
                StartOffset::Beginning => "beginning",
                StartOffset::Offset(_) => "position",
            };
            metrics::counter!(RESUME_OFFSETS_TOTAL, "start" => start).increment(1);
        }
        metrics::counter!(PARTITIONS_ASSIGNED_TOTAL).increment(resume_offsets.len() as u64);

        Ok(resume_offsets)
    }

    async fn lookup(&self, group: &TopicPartitions) -> Result<Vec<Position>, ResumeError> {
        let start = Instant::now();
        let result = self
            .waiter
            .bounded(&group.topic, self.store.get(&group.topic, &group.partitions))
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::histogram!(POSITION_LOOKUP_DURATION_MS, "outcome" => outcome)
            .record(start.elapsed().as_millis() as f64);

        result
    }

    /// Reports revoked partitions. Committing their offsets is left to the client.
    pub fn on_revoked(&self, revoked: &[RevokedPartition]) {
        if revoked.is_empty() {
            return;
        }

        let groups = group_by_topic(revoked.iter().map(RevokedPartition::partition));
        self.sink.emit(DiagnosticRecord {
            severity: Severity::Info,
            message: "Revocation",
            topics: &groups,
        });

        metrics::counter!(REBALANCE_EVENTS_TOTAL, "event_type" => "revoke").increment(1);
        metrics::counter!(PARTITIONS_REVOKED_TOTAL).increment(revoked.len() as u64);
    }
}
