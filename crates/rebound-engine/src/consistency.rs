//! Read-after-write and delete confirmation loops.
//!
//! After a create or update the remote side may keep answering with the
//! old state (or 404) for a while. [`confirm_read`] keeps re-reading until
//! the change is visible, retrying only what the read table of
//! [`rebound_core::retry`] allows. [`confirm_delete`] does the same for
//! deletes with the delete table, where a 404 means the job is done.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rebound_core::{ErrorDescriptor, OperationKind, RetryDecision};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ConsistencyError;

/// Timing for one confirmation loop.
///
/// Each call to [`confirm_read`] or [`confirm_delete`] starts its own timer
/// from these settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencySettings {
    /// Give up once this much time has passed since the first attempt.
    pub timeout: Duration,
    /// First backoff delay.
    pub min_backoff: Duration,
    /// Backoff delays never grow past this.
    pub max_backoff: Duration,
}

impl Default for ConsistencySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            min_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl ConsistencySettings {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_jitter()
            .without_max_times()
            .build()
    }
}

/// How a confirmed delete ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The delete call itself succeeded.
    Deleted,
    /// The remote answered 404: nothing left to delete.
    AlreadyGone,
}

/// Re-read a just-written resource until the remote reflects it.
///
/// Retryable failures (per the read table) are retried with exponential
/// backoff until `settings.timeout` elapses; anything else is returned
/// straight away as [`ConsistencyError::NotRetryable`].
///
/// # Errors
/// [`ConsistencyError::Timeout`] when the deadline passes,
/// [`ConsistencyError::NotRetryable`] for failures the read table does not
/// allow retrying, and [`ConsistencyError::Cancelled`] when `cancel` fires.
pub async fn confirm_read<T, E, F, Fut>(
    mut getter: F,
    settings: &ConsistencySettings,
    cancel: &CancellationToken,
) -> Result<T, ConsistencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorDescriptor>,
{
    converge(OperationKind::Read, settings, cancel, || {
        let call = getter();
        async move { call.await.map_err(Into::into) }
    })
    .await
}

/// Delete a resource, retrying transient failures per the delete table.
///
/// A 404 counts as success ([`DeleteOutcome::AlreadyGone`]).
///
/// # Errors
/// Same as [`confirm_read`], evaluated against the delete table.
pub async fn confirm_delete<E, F, Fut>(
    mut deleter: F,
    settings: &ConsistencySettings,
    cancel: &CancellationToken,
) -> Result<DeleteOutcome, ConsistencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<ErrorDescriptor>,
{
    converge(OperationKind::Delete, settings, cancel, || {
        let call = deleter();
        async move {
            match call.await {
                Ok(()) => Ok(DeleteOutcome::Deleted),
                Err(e) => {
                    let descriptor: ErrorDescriptor = e.into();
                    if descriptor.status_code() == 404 {
                        Ok(DeleteOutcome::AlreadyGone)
                    } else {
                        Err(descriptor)
                    }
                }
            }
        }
    })
    .await
}

async fn converge<T, F, Fut>(
    kind: OperationKind,
    settings: &ConsistencySettings,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, ConsistencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ErrorDescriptor>>,
{
    let started = Instant::now();
    let deadline = started + settings.timeout;
    let mut backoff = settings.backoff();
    let mut last_error: Option<ErrorDescriptor> = None;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ConsistencyError::Cancelled),
            () = sleep_until(deadline) => {
                return Err(ConsistencyError::Timeout {
                    elapsed: started.elapsed(),
                    last_error,
                });
            }
            outcome = attempt() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    log::debug!("{} converged after {} attempts", kind, attempts);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match error.retry_decision(kind) {
            RetryDecision::Retry => {}
            RetryDecision::Stop | RetryDecision::Indeterminate => {
                log::debug!("{} attempt {} failed, not retrying: {}", kind, attempts, error);
                return Err(ConsistencyError::NotRetryable { kind, error });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ConsistencyError::Timeout {
                elapsed: started.elapsed(),
                last_error: Some(error),
            });
        }
        let delay = backoff
            .next()
            .unwrap_or(settings.max_backoff)
            .min(deadline - now);
        log::debug!(
            "{} attempt {} failed ({}), retrying in {:?}",
            kind,
            attempts,
            error,
            delay
        );
        last_error = Some(error);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ConsistencyError::Cancelled),
            () = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebound_core::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(timeout: Duration) -> ConsistencySettings {
        ConsistencySettings::new(timeout)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_read_succeeds_immediately() {
        let calls = AtomicU32::new(0);
        let result = confirm_read(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, RemoteError>("device-1") }
            },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap(), "device-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_retries_not_found_until_visible() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = std::time::Instant::now();
        let timeout = Duration::from_secs(2);

        let result = confirm_read(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RemoteError::api(404, "ResourceNotFound", "not yet"))
                    } else {
                        Ok(42)
                    }
                }
            },
            &fast(timeout),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < timeout);
    }

    #[tokio::test]
    async fn test_read_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result = confirm_read(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RemoteError::api(403, "Forbidden", "nope")) }
            },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(ConsistencyError::NotRetryable { kind, error }) => {
                assert_eq!(kind, OperationKind::Read);
                assert_eq!(error.status_code(), 403);
            }
            other => panic!("expected NotRetryable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_indeterminate_is_not_retried() {
        let result = confirm_read(
            || async { Err::<(), _>(RemoteError::api(418, "Teapot", "short and stout")) },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ConsistencyError::NotRetryable { .. })));
    }

    #[tokio::test]
    async fn test_read_times_out_with_last_error() {
        let result = confirm_read(
            || async { Err::<(), _>(RemoteError::api(404, "", "still missing")) },
            &fast(Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(ConsistencyError::Timeout { last_error, .. }) => {
                assert_eq!(last_error.unwrap().status_code(), 404);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_times_out_while_getter_hangs() {
        let result = confirm_read(
            || async {
                sleep(Duration::from_secs(30)).await;
                Ok::<_, RemoteError>(())
            },
            &fast(Duration::from_millis(30)),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(ConsistencyError::Timeout { last_error, .. }) => assert!(last_error.is_none()),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_cancellation_is_not_timeout() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = confirm_read(
            || async { Err::<(), _>(RemoteError::api(503, "", "unavailable")) },
            &fast(Duration::from_secs(30)),
            &cancel,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_delete_not_found_is_already_gone() {
        let calls = AtomicU32::new(0);
        let result = confirm_delete(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::api(404, "ResourceNotFound", "gone")) }
            },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap(), DeleteOutcome::AlreadyGone);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_retries_throttling() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = confirm_delete(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RemoteError::api(429, "RequestThrottled", "slow down"))
                    } else {
                        Ok(())
                    }
                }
            },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_conflict_is_not_retried() {
        let result = confirm_delete(
            || async { Err(RemoteError::api(409, "Conflict", "in use")) },
            &fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(ConsistencyError::NotRetryable { kind, .. }) => {
                assert_eq!(kind, OperationKind::Delete);
            }
            other => panic!("expected NotRetryable, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_respects_bounds() {
        let settings = ConsistencySettings::default()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40));
        // Jitter may add up to one extra delay on top of the computed value.
        for delay in settings.backoff().take(10) {
            assert!(delay <= Duration::from_millis(80), "{delay:?}");
        }
    }
}
