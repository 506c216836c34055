//! Bridge between the synchronous rebalance callback and asynchronous
//! position lookups.
//!
//! librdkafka calls rebalance callbacks synchronously and won't fetch until
//! they return, but position lookups are async. [`LookupWaiter`] is the one
//! place that blocks: it owns the lookup timeout, the shutdown token, and the
//! runtime handle the lookups run on.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{PositionStoreError, ResumeError};

#[derive(Debug, Clone)]
pub struct LookupWaiter {
    handle: Handle,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl LookupWaiter {
    pub fn new(handle: Handle, timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            handle,
            timeout,
            shutdown,
        }
    }

    /// Waiter bound to the runtime we're currently running on
    pub fn current(timeout: Duration, shutdown: CancellationToken) -> Self {
        Self::new(Handle::current(), timeout, shutdown)
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Runs one store lookup under the timeout, giving up early on shutdown.
    pub async fn bounded<T, F>(&self, topic: &str, lookup: F) -> Result<T, ResumeError>
    where
        F: Future<Output = Result<T, PositionStoreError>>,
    {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(ResumeError::Cancelled),

            result = tokio::time::timeout(self.timeout, lookup) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(ResumeError::LookupFailure {
                    topic: topic.to_string(),
                    source,
                }),
                Err(_) => Err(ResumeError::LookupTimeout {
                    topic: topic.to_string(),
                    timeout: self.timeout,
                }),
            },
        }
    }

    /// Blocks the calling thread until `future` completes.
    ///
    /// Works from plain threads and from multi-thread runtime workers (via
    /// `block_in_place`). A current-thread runtime can't make progress while
    /// its only thread is blocked, so that case is refused.
    pub fn block_on<T, F>(&self, future: F) -> Result<T, ResumeError>
    where
        F: Future<Output = Result<T, ResumeError>>,
    {
        if self.shutdown.is_cancelled() {
            return Err(ResumeError::Cancelled);
        }

        match Handle::try_current() {
            Err(_) => self.handle.block_on(future),
            Ok(current) => match current.runtime_flavor() {
                RuntimeFlavor::CurrentThread => {
                    warn!("Refusing to block a current-thread runtime on a position lookup");
                    Err(ResumeError::BlockingUnsupported)
                }
                _ => tokio::task::block_in_place(|| self.handle.block_on(future)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn waiter(timeout: Duration) -> (tokio::runtime::Runtime, LookupWaiter) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let waiter = LookupWaiter::new(rt.handle().clone(), timeout, CancellationToken::new());
        (rt, waiter)
    }

    #[test]
    fn test_block_on_from_plain_thread() {
        let (_rt, waiter) = waiter(Duration::from_secs(1));

        let value = waiter
            .block_on(waiter.bounded("orders", async { Ok::<_, PositionStoreError>(7) }))
            .unwrap();

        assert_eq!(value, 7);
    }

    #[test]
    fn test_bounded_times_out() {
        let (_rt, waiter) = waiter(Duration::from_millis(50));

        let result = waiter.block_on(waiter.bounded(
            "orders",
            std::future::pending::<Result<(), PositionStoreError>>(),
        ));

        match result {
            Err(ResumeError::LookupTimeout { topic, timeout }) => {
                assert_eq!(topic, "orders");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_bounded_wraps_store_errors() {
        let (_rt, waiter) = waiter(Duration::from_secs(1));

        let result = waiter.block_on(waiter.bounded("orders", async {
            Err::<(), _>(PositionStoreError::Unavailable("down".to_string()))
        }));

        assert!(matches!(
            result,
            Err(ResumeError::LookupFailure { ref topic, .. }) if topic == "orders"
        ));
    }

    #[test]
    fn test_cancellation_interrupts_pending_lookup() {
        let (_rt, waiter) = waiter(Duration::from_secs(60));
        let token = waiter.shutdown_token().clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let start = Instant::now();
        let result = waiter.block_on(waiter.bounded(
            "orders",
            std::future::pending::<Result<(), PositionStoreError>>(),
        ));

        assert!(matches!(result, Err(ResumeError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_already_cancelled_returns_immediately() {
        let (_rt, waiter) = waiter(Duration::from_secs(60));
        waiter.shutdown_token().cancel();

        let result = waiter.block_on(async { Ok::<_, ResumeError>(1) });

        assert!(matches!(result, Err(ResumeError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_from_multi_thread_worker() {
        let waiter = LookupWaiter::current(Duration::from_secs(1), CancellationToken::new());

        let value = waiter
            .block_on(waiter.bounded("orders", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, PositionStoreError>("done")
            }))
            .unwrap();

        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_block_on_refuses_current_thread_runtime() {
        let waiter = LookupWaiter::current(Duration::from_secs(1), CancellationToken::new());

        let result = waiter.block_on(async { Ok::<_, ResumeError>(1) });

        assert!(matches!(result, Err(ResumeError::BlockingUnsupported)));
    }
}
