use std::sync::Arc;

use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, RebalanceProtocol};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::types::RDKafkaRespErr;
use rdkafka::{ClientContext, TopicPartitionList};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::diagnostics::{forward_client_log, offsets_summary};
use crate::error::{AssignmentError, ResumeError};
use crate::metrics_consts::{
    KAFKA_CLIENT_ERRORS_TOTAL, REBALANCE_EMPTY_SKIPPED, UNKNOWN_LOG_SEVERITY_TOTAL,
};
use crate::rebalance_handler::ResumeHandler;
use crate::types::{Partition, ResumeOffset, RevokedPartition};

/// Events sent from the rebalance callback to the consumer loop
#[derive(Debug)]
pub enum ConsumerEvent {
    /// No safe resume offset exists for an assignment. `paused` lists the
    /// partitions that were assigned but held back from fetching.
    AssignmentFailed {
        error: AssignmentError,
        paused: Vec<Partition>,
    },
}

pub type ConsumerEventSender = mpsc::UnboundedSender<ConsumerEvent>;
pub type ConsumerEventReceiver = mpsc::UnboundedReceiver<ConsumerEvent>;

/// rdkafka context that owns the whole rebalance.
///
/// librdkafka's own assign step would start fetching from committed offsets,
/// so the context replaces it: assigned partitions are handed to librdkafka
/// together with their resume offsets in a single `assign` (eager) or
/// `incremental_assign` (cooperative) call. Seeking afterwards doesn't work
/// inside the callback, the partitions aren't fetchable until the next poll.
pub struct ResumeConsumerContext {
    handler: Arc<ResumeHandler>,
    events_tx: ConsumerEventSender,
}

impl ResumeConsumerContext {
    pub fn new(handler: Arc<ResumeHandler>, events_tx: ConsumerEventSender) -> Self {
        Self { handler, events_tx }
    }

    /// Copies the assigned list with every element set to its resume offset
    pub fn resolve_assignment(
        &self,
        assigned: &TopicPartitionList,
    ) -> Result<TopicPartitionList, AssignmentError> {
        let partitions = assigned_partitions(assigned)?;
        let resume_offsets = self.handler.on_assigned(&partitions)?;

        let mut resume_list = assigned.clone();
        set_resume_offsets(&mut resume_list, &resume_offsets)?;
        Ok(resume_list)
    }

    fn assign_partitions(
        &self,
        base_consumer: &BaseConsumer<Self>,
        protocol: RebalanceProtocol,
        assigned: &TopicPartitionList,
    ) {
        if assigned.count() == 0 {
            // cooperative-sticky sends these whenever group membership changes
            debug!("Skipping empty assign rebalance");
            metrics::counter!(REBALANCE_EMPTY_SKIPPED, "event_type" => "assign").increment(1);

            if let Err(e) = add_partitions(base_consumer, &protocol, assigned) {
                error!("Failed to complete empty assignment: {e}");
            }
            return;
        }

        let result = self.resolve_assignment(assigned).and_then(|resume_list| {
            debug!(
                offsets = %offsets_summary(&resume_list),
                "Applying resume offsets"
            );
            add_partitions(base_consumer, &protocol, &resume_list).map_err(AssignmentError::from)
        });

        match result {
            Ok(()) => info!("Resumed {} assigned partitions", assigned.count()),
            Err(e) => self.fail_assignment(base_consumer, protocol, assigned, e),
        }
    }

    fn fail_assignment(
        &self,
        base_consumer: &BaseConsumer<Self>,
        protocol: RebalanceProtocol,
        assigned: &TopicPartitionList,
        error: AssignmentError,
    ) {
        error!(
            error = ?error,
            "Failed to resolve resume offsets for {} assigned partitions",
            assigned.count()
        );

        // The rebalance still has to complete, but never fetch from a guessed offset
        let paused = match add_partitions(base_consumer, &protocol, assigned)
            .and_then(|()| base_consumer.pause(assigned))
        {
            Ok(()) => {
                warn!("Paused {} assigned partitions until the next rebalance", assigned.count());
                list_partitions(assigned)
            }
            Err(e) => {
                error!("Failed to pause {} assigned partitions: {e}", assigned.count());
                Vec::new()
            }
        };

        let event = ConsumerEvent::AssignmentFailed { error, paused };
        if let Err(send_err) = self.events_tx.send(event) {
            error!("Failed to report assignment failure to consumer loop: {send_err}");
        }
    }

    fn revoke_partitions(
        &self,
        base_consumer: &BaseConsumer<Self>,
        protocol: RebalanceProtocol,
        revoked: &TopicPartitionList,
    ) {
        if revoked.count() == 0 {
            debug!("Skipping empty revoke rebalance");
            metrics::counter!(REBALANCE_EMPTY_SKIPPED, "event_type" => "revoke").increment(1);
        } else {
            self.handler.on_revoked(&revoked_partitions(revoked));
        }

        release_partitions(base_consumer, protocol, revoked);
    }
}

fn add_partitions<C: ConsumerContext>(
    base_consumer: &BaseConsumer<C>,
    protocol: &RebalanceProtocol,
    partitions: &TopicPartitionList,
) -> KafkaResult<()> {
    match protocol {
        RebalanceProtocol::Cooperative => base_consumer.incremental_assign(partitions),
        _ => base_consumer.assign(partitions),
    }
}

fn release_partitions<C: ConsumerContext>(
    base_consumer: &BaseConsumer<C>,
    protocol: RebalanceProtocol,
    partitions: &TopicPartitionList,
) {
    let result = match protocol {
        RebalanceProtocol::Cooperative => base_consumer.incremental_unassign(partitions),
        _ => base_consumer.unassign(),
    };
    if let Err(e) = result {
        error!("Failed to release {} revoked partitions: {e}", partitions.count());
    }
}

/// Converts an assigned list, rejecting elements the resolver can't interpret
pub fn assigned_partitions(list: &TopicPartitionList) -> Result<Vec<Partition>, ResumeError> {
    list.elements()
        .into_iter()
        .map(Partition::try_from)
        .collect()
}

pub fn revoked_partitions(list: &TopicPartitionList) -> Vec<RevokedPartition> {
    list.elements()
        .into_iter()
        .map(RevokedPartition::from)
        .collect()
}

fn list_partitions(list: &TopicPartitionList) -> Vec<Partition> {
    list.elements()
        .into_iter()
        .map(|elem| Partition::new(elem.topic(), elem.partition()))
        .collect()
}

/// Sets each resume offset on its element of `list`
pub fn set_resume_offsets(
    list: &mut TopicPartitionList,
    resume_offsets: &[ResumeOffset],
) -> KafkaResult<()> {
    for resume in resume_offsets {
        list.set_partition_offset(
            resume.topic(),
            resume.partition_number(),
            resume.start().into(),
        )?;
    }
    Ok(())
}

impl ClientContext for ResumeConsumerContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        if let Err(e) = forward_client_log(level as i32, fac, log_message) {
            metrics::counter!(UNKNOWN_LOG_SEVERITY_TOTAL).increment(1);
            error!(facility = fac, "Kafka client log with {e}: {log_message}");
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        metrics::counter!(KAFKA_CLIENT_ERRORS_TOTAL).increment(1);
        error!(error = ?error, "Error in Kafka consumer: {reason}");
    }
}

impl ConsumerContext for ResumeConsumerContext {
    fn rebalance(
        &self,
        base_consumer: &BaseConsumer<Self>,
        err: RDKafkaRespErr,
        tpl: &mut TopicPartitionList,
    ) {
        let protocol = base_consumer.rebalance_protocol();

        match err {
            RDKafkaRespErr::RD_KAFKA_RESP_ERR__ASSIGN_PARTITIONS => {
                self.assign_partitions(base_consumer, protocol, tpl);
            }
            RDKafkaRespErr::RD_KAFKA_RESP_ERR__REVOKE_PARTITIONS => {
                self.revoke_partitions(base_consumer, protocol, tpl);
            }
            _ => {
                let code: RDKafkaErrorCode = err.into();
                error!("Rebalance error: {code}");
                release_partitions(base_consumer, protocol, tpl);
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => {
                debug!(
                    offsets = %offsets_summary(offsets),
                    "Committed offsets"
                );
            }
            Err(e) => {
                warn!("Failed to commit offsets: {}", e);
            }
        }
    }
}
