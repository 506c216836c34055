use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AssignmentError, ResumeError};
use crate::kafka::context::{ConsumerEvent, ConsumerEventReceiver, ResumeConsumerContext};
use crate::metrics_consts::{MESSAGES_CONSUMED_TOTAL, POSITION_WRITES_TOTAL};
use crate::rebalance_handler::ResumeHandler;
use crate::store::PositionWriter;
use crate::types::Partition;

/// Group consumer whose fetch positions always come from the position store.
///
/// Each handled message is recorded as the partition's last processed
/// position, so the next owner of the partition resumes right after it.
pub struct ResumeConsumer {
    consumer: StreamConsumer<ResumeConsumerContext>,
    events_rx: ConsumerEventReceiver,
    recorder: PositionRecorder,
    shutdown: CancellationToken,
}

impl ResumeConsumer {
    pub fn new(
        config: &ClientConfig,
        handler: Arc<ResumeHandler>,
        recorder: PositionRecorder,
        topics: &[String],
    ) -> Result<Self> {
        // Shutdown also aborts any lookup blocking a rebalance callback
        let shutdown = handler.waiter().shutdown_token().clone();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let context = ResumeConsumerContext::new(handler, events_tx);

        let consumer: StreamConsumer<ResumeConsumerContext> = config
            .create_with_context(context)
            .context("Failed to create Kafka consumer")?;

        let topic_names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_names)
            .with_context(|| format!("Failed to subscribe to topics: {topics:?}"))?;

        Ok(Self {
            consumer,
            events_rx,
            recorder,
            shutdown,
        })
    }

    /// Consume until shutdown. Returns an error if an assignment could not be
    /// resolved or positions can't be recorded, leaving retry/restart to the
    /// process supervisor.
    pub async fn run(mut self) -> Result<()> {
        info!("Starting Kafka message consumption");

        let mut stream = self.consumer.stream();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping consumption");
                    break;
                }

                Some(event) = self.events_rx.recv() => {
                    match event {
                        ConsumerEvent::AssignmentFailed { error, paused } => {
                            failed_assignment(error, &paused, &self.shutdown)?;
                            break;
                        }
                    }
                }

                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            let partition = Partition::new(message.topic(), message.partition());
                            metrics::counter!(MESSAGES_CONSUMED_TOTAL).increment(1);
                            debug!(
                                partition = %partition,
                                offset = message.offset(),
                                "Received message"
                            );

                            self.recorder.record(&partition, message.offset()).await?;
                        }
                        Some(Err(e)) => {
                            warn!("Kafka consumer error: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        None => {
                            info!("Consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }

        info!("Graceful shutdown completed");
        Ok(())
    }
}

/// Decides how the loop ends after a failed assignment. A lookup cut short by
/// shutdown is part of stopping, anything else is an error.
fn failed_assignment(
    error: AssignmentError,
    paused: &[Partition],
    shutdown: &CancellationToken,
) -> Result<()> {
    if shutdown.is_cancelled()
        && matches!(error, AssignmentError::Resume(ResumeError::Cancelled))
    {
        info!("Assignment interrupted by shutdown");
        return Ok(());
    }

    error!(
        error = ?error,
        paused = paused.len(),
        "Stopping consumer after failed assignment"
    );
    Err(error).context("Failed to resume assigned partitions")
}

/// Records handled offsets through a [`PositionWriter`].
///
/// A single failed write only costs some redelivery after the next
/// rebalance, so it is logged and skipped. After `max_consecutive_failures`
/// failures in a row the store is considered down and recording fails.
pub struct PositionRecorder {
    positions: Arc<dyn PositionWriter>,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl PositionRecorder {
    pub fn new(positions: Arc<dyn PositionWriter>, max_consecutive_failures: u32) -> Self {
        Self {
            positions,
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub async fn record(&mut self, partition: &Partition, offset: i64) -> Result<()> {
        match self.positions.set(partition, offset).await {
            Ok(()) => {
                metrics::counter!(POSITION_WRITES_TOTAL, "outcome" => "success").increment(1);
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(e) => {
                metrics::counter!(POSITION_WRITES_TOTAL, "outcome" => "failure").increment(1);
                self.consecutive_failures += 1;
                error!(
                    error = ?e,
                    partition = %partition,
                    offset,
                    consecutive_failures = self.consecutive_failures,
                    "Failed to record position"
                );

                if self.consecutive_failures >= self.max_consecutive_failures {
                    return Err(e).with_context(|| {
                        format!(
                            "Position store failed {} times in a row",
                            self.consecutive_failures
                        )
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PositionStoreError;
    use crate::store::InMemoryPositionStore;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Writer {}
        #[async_trait::async_trait]
        impl PositionWriter for Writer {
            async fn set(&self, partition: &Partition, offset: i64)
                -> Result<(), PositionStoreError>;
        }
    }

    fn unavailable() -> PositionStoreError {
        PositionStoreError::Unavailable("disk full".to_string())
    }

    #[tokio::test]
    async fn test_records_positions() {
        let store = Arc::new(InMemoryPositionStore::new());
        let mut recorder = PositionRecorder::new(store.clone(), 3);

        recorder.record(&Partition::new("orders", 0), 41).await.unwrap();
        recorder.record(&Partition::new("orders", 0), 42).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(recorder.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_isolated_write_failures_are_tolerated() {
        let mut writer = MockWriter::new();
        writer
            .expect_set()
            .with(eq(Partition::new("orders", 0)), eq(1))
            .returning(|_, _| Err(unavailable()));
        writer
            .expect_set()
            .with(eq(Partition::new("orders", 0)), eq(2))
            .returning(|_, _| Ok(()));
        let mut recorder = PositionRecorder::new(Arc::new(writer), 2);

        recorder.record(&Partition::new("orders", 0), 1).await.unwrap();
        assert_eq!(recorder.consecutive_failures(), 1);

        recorder.record(&Partition::new("orders", 0), 2).await.unwrap();
        assert_eq!(recorder.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_repeated_write_failures_stop_recording() {
        let mut writer = MockWriter::new();
        writer.expect_set().times(3).returning(|_, _| Err(unavailable()));
        let mut recorder = PositionRecorder::new(Arc::new(writer), 3);
        let partition = Partition::new("orders", 0);

        assert!(recorder.record(&partition, 1).await.is_ok());
        assert!(recorder.record(&partition, 2).await.is_ok());
        let err = recorder.record(&partition, 3).await.unwrap_err();

        assert!(err.to_string().contains("3 times in a row"));
        assert!(matches!(
            err.downcast_ref::<PositionStoreError>(),
            Some(PositionStoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_cancelled_assignment_during_shutdown_is_graceful() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let paused = vec![Partition::new("orders", 0)];

        let result = failed_assignment(
            AssignmentError::Resume(ResumeError::Cancelled),
            &paused,
            &shutdown,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn test_failed_assignment_is_an_error() {
        let shutdown = CancellationToken::new();

        let result = failed_assignment(
            AssignmentError::Resume(ResumeError::LookupTimeout {
                topic: "orders".to_string(),
                timeout: Duration::from_secs(10),
            }),
            &[],
            &shutdown,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_other_errors_fail_even_during_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = failed_assignment(
            AssignmentError::Resume(ResumeError::BlockingUnsupported),
            &[],
            &shutdown,
        );

        assert!(result.is_err());
    }
}
