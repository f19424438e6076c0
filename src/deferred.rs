// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deferred Operations
//!
//! Bounded background operations for steps that can only run after another
//! resource exists (auto-discovered zones, out-of-band remote peering). Each
//! operation runs on its own task with a fixed timeout. A timeout fails the
//! run; the task itself is left to finish so an issued create is never torn
//! down halfway.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::errors::{ProvisioningError, ProvisioningResult};

/// Default bound for a deferred operation
pub const DEFAULT_DEFERRED_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs deferred operations with a fixed timeout
#[derive(Debug, Clone)]
pub struct DeferredExecutor {
    timeout: Duration,
    scheduled: Arc<AtomicUsize>,
}

impl Default for DeferredExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_DEFERRED_TIMEOUT)
    }
}

impl DeferredExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scheduled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of operations scheduled so far (shared across clones)
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Schedule `operation` in the background and wait for it within the bound
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> ProvisioningResult<T>
    where
        T: Send + 'static,
        F: Future<Output = ProvisioningResult<T>> + Send + 'static,
    {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        info!(operation, timeout = ?self.timeout, "⏳ Scheduling deferred operation");

        let handle = tokio::spawn(fut);
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => {
                debug!(operation, ok = result.is_ok(), "Deferred operation finished");
                result
            }
            Ok(Err(join_error)) => {
                error!(operation, error = %join_error, "Deferred operation aborted");
                Err(ProvisioningError::DeferredOperationAborted {
                    operation: operation.to_string(),
                    reason: join_error.to_string(),
                })
            }
            Err(_) => {
                error!(operation, timeout = ?self.timeout, "Deferred operation timed out");
                Err(ProvisioningError::DeferredOperationTimeout {
                    operation: operation.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_result_is_returned() {
        let executor = DeferredExecutor::new(Duration::from_secs(1));
        let value = executor.run("answer", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(executor.scheduled_count(), 1);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let executor = DeferredExecutor::default();
        let err = executor
            .run::<(), _>("guard", async {
                Err(ProvisioningError::StateGuardViolation("nope".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::StateGuardViolation(_)));
    }

    #[tokio::test]
    async fn test_timeout_fails_instead_of_skipping() {
        let executor = DeferredExecutor::new(Duration::from_millis(50));
        let err = executor
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::DeferredOperationTimeout { timeout, .. } if timeout == Duration::from_millis(50)
        ));
    }

    #[test]
    fn test_clones_share_the_counter() {
        let executor = DeferredExecutor::default();
        let clone = executor.clone();
        tokio_test::block_on(clone.run("count", async { Ok(()) })).unwrap();
        assert_eq!(executor.scheduled_count(), 1);
    }
}
