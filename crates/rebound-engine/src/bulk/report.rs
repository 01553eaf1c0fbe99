//! Per-item results, the aggregate report and its user-facing diagnostic.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rebound_core::{ErrorDescriptor, OperationId};
use serde::Serialize;

/// Outcome of one item's remote call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemResult<T> {
    item_id: String,
    outcome: Result<T, ErrorDescriptor>,
}

impl<T> BulkItemResult<T> {
    #[must_use]
    pub fn new(item_id: impl Into<String>, outcome: Result<T, ErrorDescriptor>) -> Self {
        Self {
            item_id: item_id.into(),
            outcome,
        }
    }

    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorDescriptor> {
        self.outcome.as_ref().err()
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }
}

/// Aggregate verdict of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    CompleteSuccess,
    PartialSuccess,
    CompleteFailure,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompleteSuccess => f.write_str("complete success"),
            Self::PartialSuccess => f.write_str("partial success"),
            Self::CompleteFailure => f.write_str("complete failure"),
        }
    }
}

/// Why a batch stopped before every item reported back on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    TimedOut,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What a caller shows the user about a finished bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

/// Frozen aggregate over every item of one bulk operation.
///
/// Only handed out once every item has a result, so every accessor sees
/// the final state.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationReport<T> {
    operation_id: OperationId,
    total: usize,
    succeeded: usize,
    failed_items: Vec<String>,
    last_error: Option<ErrorDescriptor>,
    results: Vec<BulkItemResult<T>>,
    interruption: Option<Interruption>,
    started_at: DateTime<Utc>,
    elapsed: Duration,
}

impl<T> BulkOperationReport<T> {
    #[must_use]
    pub const fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Failed item IDs in input order.
    #[must_use]
    pub fn failed_items(&self) -> &[String] {
        &self.failed_items
    }

    /// The most recently completed failure.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ErrorDescriptor> {
        self.last_error.as_ref()
    }

    /// Every item's result in input order.
    #[must_use]
    pub fn results(&self) -> &[BulkItemResult<T>] {
        &self.results
    }

    #[must_use]
    pub const fn interruption(&self) -> Option<Interruption> {
        self.interruption
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.failed_items.is_empty() {
            Verdict::CompleteSuccess
        } else if self.succeeded == 0 {
            Verdict::CompleteFailure
        } else {
            Verdict::PartialSuccess
        }
    }

    /// Whether this report has to surface as a hard, caller-visible error.
    #[must_use]
    pub fn is_hard_failure(&self, ignore_partial_failures: bool) -> bool {
        self.verdict() == Verdict::CompleteFailure && !ignore_partial_failures
    }

    fn stopped_suffix(&self) -> String {
        self.interruption
            .map_or_else(String::new, |i| format!(" (batch {i})"))
    }

    /// Build the user-facing message for this report.
    #[must_use]
    pub fn diagnostic(&self, ignore_partial_failures: bool) -> Diagnostic {
        let (severity, summary) = match (self.verdict(), ignore_partial_failures) {
            (Verdict::CompleteSuccess, _) => (
                Severity::Info,
                format!("all {} items succeeded", self.total),
            ),
            (Verdict::PartialSuccess, true) => (
                Severity::Info,
                format!(
                    "{} of {} items succeeded; failures ignored",
                    self.succeeded, self.total
                ),
            ),
            (Verdict::PartialSuccess, false) => (
                Severity::Warning,
                format!("{} of {} items succeeded", self.succeeded, self.total),
            ),
            (Verdict::CompleteFailure, true) => (
                Severity::Warning,
                format!(
                    "all {} items failed{}; failures ignored",
                    self.total,
                    self.stopped_suffix()
                ),
            ),
            (Verdict::CompleteFailure, false) => (
                Severity::Error,
                format!("all {} items failed{}", self.total, self.stopped_suffix()),
            ),
        };

        let mut lines = Vec::new();
        if !self.failed_items.is_empty() {
            lines.push(format!("failed items: {}", self.failed_items.join(", ")));
        }
        if let Some(error) = &self.last_error {
            lines.push(format!(
                "last error: status {}, code {}, message {}",
                error.status_code(),
                if error.error_code().is_empty() {
                    "<none>"
                } else {
                    error.error_code()
                },
                error.message()
            ));
            lines.push(format!(
                "category: {} ({})",
                error.category(),
                error.category().remediation()
            ));
        }
        match self.interruption {
            Some(Interruption::Cancelled) => {
                lines.push("operation was cancelled before every item finished".to_string());
            }
            Some(Interruption::TimedOut) => {
                lines.push("batch timeout elapsed before every item finished".to_string());
            }
            None => {}
        }

        Diagnostic {
            severity,
            summary,
            detail: lines.join("\n"),
        }
    }
}

/// Mutable side of a report, owned by the orchestrator during fan-in.
///
/// Each item has one slot, written exactly once.
#[derive(Debug)]
pub(crate) struct ReportBuilder<T> {
    operation_id: OperationId,
    item_ids: Vec<String>,
    slots: Vec<Option<BulkItemResult<T>>>,
    completed: usize,
    succeeded: usize,
    last_error: Option<ErrorDescriptor>,
    started_at: DateTime<Utc>,
    started: std::time::Instant,
}

impl<T> ReportBuilder<T> {
    pub(crate) fn new(operation_id: OperationId, item_ids: Vec<String>) -> Self {
        let slots = item_ids.iter().map(|_| None).collect();
        Self {
            operation_id,
            item_ids,
            slots,
            completed: 0,
            succeeded: 0,
            last_error: None,
            started_at: Utc::now(),
            started: std::time::Instant::now(),
        }
    }

    pub(crate) const fn completed(&self) -> usize {
        self.completed
    }

    pub(crate) fn total(&self) -> usize {
        self.slots.len()
    }

    /// Store the result for `index`. Returns `false` if that slot was
    /// already filled, in which case nothing changes.
    pub(crate) fn record(&mut self, index: usize, result: BulkItemResult<T>) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }

        match result.error() {
            Some(error) => self.last_error = Some(error.clone()),
            None => self.succeeded += 1,
        }
        *slot = Some(result);
        self.completed += 1;
        true
    }

    /// Indices and IDs of items without a result yet.
    pub(crate) fn pending(&self) -> Vec<(usize, String)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| (index, self.item_ids[index].clone()))
            .collect()
    }

    pub(crate) fn finish(self, interruption: Option<Interruption>) -> BulkOperationReport<T> {
        let results: Vec<BulkItemResult<T>> = self.slots.into_iter().flatten().collect();
        let failed_items = results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.item_id().to_string())
            .collect();

        BulkOperationReport {
            operation_id: self.operation_id,
            total: self.item_ids.len(),
            succeeded: self.succeeded,
            failed_items,
            last_error: self.last_error,
            results,
            interruption,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
        }
    }
}
