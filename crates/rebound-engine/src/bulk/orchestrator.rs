//! Fan-out/fan-in over independent per-item remote calls.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rebound_core::{Category, ErrorDescriptor, OperationId};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::bulk::progress::{NoProgress, Progress, ProgressSink};
use crate::bulk::report::{BulkItemResult, BulkOperationReport, Interruption, ReportBuilder, Verdict};
use crate::error::{batch_timeout_descriptor, cancelled_descriptor, panic_descriptor, BulkError};
use crate::limit::ConcurrencyLimit;

/// Knobs for one orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Run at most this many actions at once; `None` runs them all at once.
    pub max_concurrency: Option<usize>,
    /// Deadline for the whole batch, not per item.
    pub timeout: Option<Duration>,
    /// Report partial (and complete) failure without escalating to an error.
    pub ignore_partial_failures: bool,
}

impl BulkOptions {
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn ignoring_partial_failures(mut self, ignore: bool) -> Self {
        self.ignore_partial_failures = ignore;
        self
    }
}

/// Runs one action per item concurrently and aggregates the outcomes.
///
/// Every item is attempted exactly once and no item waits on a sibling.
/// The orchestrator never retries; actions that want retries wrap
/// themselves in [`confirm_read`](crate::confirm_read) or similar.
#[derive(Debug, Clone, Default)]
pub struct BulkOrchestrator {
    options: BulkOptions,
}

impl BulkOrchestrator {
    #[must_use]
    pub const fn new(options: BulkOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub const fn options(&self) -> &BulkOptions {
        &self.options
    }

    /// Run `action` once for every ID in `item_ids`.
    ///
    /// Per-item failures (including panics) end up in the report. Progress
    /// is pushed to `progress` after every completion. When `cancel` fires
    /// or the batch timeout passes, in-flight items are aborted and
    /// recorded with a cancellation or timeout error.
    ///
    /// # Errors
    /// [`BulkError::EmptyBatch`], [`BulkError::DuplicateItem`] and
    /// [`BulkError::InvalidConcurrency`] before anything runs, and
    /// [`BulkError::CompleteFailure`] when every item failed and partial
    /// failures are not being ignored.
    pub async fn run<I, T, E, F, Fut>(
        &self,
        item_ids: I,
        action: F,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BulkOperationReport<T>, BulkError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<ErrorDescriptor> + Send + 'static,
    {
        let item_ids: Vec<String> = item_ids.into_iter().map(Into::into).collect();
        self.validate(&item_ids)?;

        let operation_id = OperationId::new();
        let total = item_ids.len();
        log::info!(
            "Bulk operation {} starting: {} items, concurrency {}",
            operation_id,
            total,
            self.options
                .max_concurrency
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );

        let action = Arc::new(action);
        let limit = ConcurrencyLimit::new(self.options.max_concurrency);
        let mut tasks = JoinSet::new();
        for (index, item_id) in item_ids.iter().cloned().enumerate() {
            let action = Arc::clone(&action);
            let limit = limit.clone();
            tasks.spawn(async move {
                let _permit = limit.acquire().await;
                let call = AssertUnwindSafe(async { action(item_id.clone()).await });
                let outcome = match call.catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(e.into()),
                    Err(panic) => Err(panic_descriptor(&panic_message(&*panic))),
                };
                (index, BulkItemResult::new(item_id, outcome))
            });
        }

        let mut report = ReportBuilder::new(operation_id, item_ids);
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);

        let interruption = loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => break Some(Interruption::Cancelled),
                () = deadline_elapsed(deadline) => break Some(Interruption::TimedOut),
                joined = tasks.join_next() => joined,
            };

            match joined {
                None => break None,
                Some(Ok((index, result))) => {
                    record(&mut report, operation_id, index, result, progress);
                }
                Some(Err(e)) => {
                    log::error!("Bulk operation {} lost a task: {}", operation_id, e);
                }
            }
        };

        if let Some(interruption) = interruption {
            log::warn!(
                "Bulk operation {} interrupted ({:?}) with {} of {} items done",
                operation_id,
                interruption,
                report.completed(),
                total
            );
            tasks.abort_all();
            // Keep whatever finished before the abort landed.
            while let Some(joined) = tasks.join_next().await {
                if let Ok((index, result)) = joined {
                    record(&mut report, operation_id, index, result, progress);
                }
            }
        }

        let missing = match interruption {
            Some(Interruption::Cancelled) => cancelled_descriptor(),
            Some(Interruption::TimedOut) => {
                batch_timeout_descriptor(self.options.timeout.unwrap_or_default())
            }
            None => ErrorDescriptor::new(500, "TaskFailed", "item task ended without a result"),
        };
        for (index, item_id) in report.pending() {
            let result = BulkItemResult::new(item_id, Err(missing.clone()));
            record(&mut report, operation_id, index, result, progress);
        }

        let report = report.finish(interruption);
        self.conclude(report)
    }

    fn validate(&self, item_ids: &[String]) -> Result<(), BulkError> {
        if item_ids.is_empty() {
            return Err(BulkError::EmptyBatch);
        }
        if self.options.max_concurrency == Some(0) {
            return Err(BulkError::InvalidConcurrency);
        }
        let mut seen = HashSet::with_capacity(item_ids.len());
        for id in item_ids {
            if !seen.insert(id.as_str()) {
                return Err(BulkError::DuplicateItem(id.clone()));
            }
        }
        Ok(())
    }

    fn conclude<T>(
        &self,
        report: BulkOperationReport<T>,
    ) -> Result<BulkOperationReport<T>, BulkError> {
        let ignore = self.options.ignore_partial_failures;
        let verdict = report.verdict();
        let summary = report.diagnostic(ignore).summary;

        match (verdict, ignore) {
            (Verdict::CompleteSuccess, _) | (Verdict::PartialSuccess, true) => {
                log::info!("Bulk operation {}: {}", report.operation_id(), summary);
            }
            (Verdict::PartialSuccess, false) | (Verdict::CompleteFailure, true) => {
                log::warn!(
                    "Bulk operation {}: {} (failed: {})",
                    report.operation_id(),
                    summary,
                    report.failed_items().join(", ")
                );
            }
            (Verdict::CompleteFailure, false) => {
                let last_error = report
                    .last_error()
                    .cloned()
                    .unwrap_or_else(|| rebound_core::extract(None));
                log::error!(
                    "Bulk operation {}: {}; last error: {}",
                    report.operation_id(),
                    summary,
                    last_error
                );
                return Err(BulkError::CompleteFailure {
                    total: report.total(),
                    failed_items: report.failed_items().to_vec(),
                    last_error,
                    interruption: report.interruption(),
                });
            }
        }

        Ok(report)
    }
}

/// Run a bulk operation with default progress and no external cancellation.
///
/// # Errors
/// See [`BulkOrchestrator::run`].
pub async fn run_bulk<I, T, E, F, Fut>(
    item_ids: I,
    action: F,
    options: BulkOptions,
) -> Result<BulkOperationReport<T>, BulkError>
where
    I: IntoIterator,
    I::Item: Into<String>,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<ErrorDescriptor> + Send + 'static,
{
    BulkOrchestrator::new(options)
        .run(item_ids, action, &NoProgress, &CancellationToken::new())
        .await
}

fn record<T>(
    report: &mut ReportBuilder<T>,
    operation_id: OperationId,
    index: usize,
    result: BulkItemResult<T>,
    progress: &dyn ProgressSink,
) {
    if let Some(error) = result.error() {
        log::log!(
            failure_level(error.category()),
            "Bulk operation {}: item {} failed: {}",
            operation_id,
            result.item_id(),
            error
        );
    }
    if report.record(index, result) {
        progress.report(Progress {
            completed: report.completed(),
            total: report.total(),
        });
    }
}

/// Log level for a single item failure. Transient trouble is expected
/// noise in large batches; credential and permission problems are not.
fn failure_level(category: Category) -> log::Level {
    match category {
        Category::Throttling => log::Level::Debug,
        Category::Network | Category::Service | Category::Unknown => log::Level::Warn,
        Category::Validation | Category::Authentication | Category::Authorization => {
            log::Level::Error
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
