//! Engine error types and the synthetic descriptors the engine records on
//! behalf of items that never produced their own error.

use std::time::Duration;

use rebound_core::{ErrorDescriptor, OperationKind};
use thiserror::Error;

use crate::bulk::Interruption;

/// Status recorded for work abandoned because the caller cancelled.
pub const CANCELLED_STATUS: u16 = 499;

/// Errors from [`confirm_read`](crate::confirm_read) and
/// [`confirm_delete`](crate::confirm_delete).
#[derive(Debug, Clone, Error)]
pub enum ConsistencyError {
    /// The timeout elapsed before the remote converged.
    #[error("timed out after {elapsed:?}{}", last_error_suffix(.last_error))]
    Timeout {
        elapsed: Duration,
        last_error: Option<ErrorDescriptor>,
    },

    /// The failure is not one the retry table for `kind` allows retrying.
    #[error("{kind} failed and will not be retried: {error}")]
    NotRetryable {
        kind: OperationKind,
        error: ErrorDescriptor,
    },

    /// The caller cancelled while the loop was waiting.
    #[error("cancelled while waiting for the remote to converge")]
    Cancelled,
}

fn last_error_suffix(last_error: &Option<ErrorDescriptor>) -> String {
    last_error.as_ref().map_or_else(String::new, |e| format!("; last error: {e}"))
}

impl ConsistencyError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The remote failure behind this error, if there was one.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Timeout { last_error, .. } => last_error.as_ref(),
            Self::NotRetryable { error, .. } => Some(error),
            Self::Cancelled => None,
        }
    }
}

impl From<ConsistencyError> for ErrorDescriptor {
    fn from(err: ConsistencyError) -> Self {
        match err {
            ConsistencyError::Timeout {
                elapsed,
                last_error,
            } => last_error.unwrap_or_else(|| {
                ErrorDescriptor::new(
                    504,
                    "RequestTimeout",
                    format!("remote did not converge within {elapsed:?}"),
                )
            }),
            ConsistencyError::NotRetryable { error, .. } => error,
            ConsistencyError::Cancelled => cancelled_descriptor(),
        }
    }
}

/// Errors that stop a bulk operation as a whole.
#[derive(Debug, Clone, Error)]
pub enum BulkError {
    #[error("bulk operation needs at least one item")]
    EmptyBatch,

    #[error("item {0} appears more than once in the batch")]
    DuplicateItem(String),

    #[error("max concurrency must be at least 1")]
    InvalidConcurrency,

    /// Every item failed and partial failures were not being ignored.
    ///
    /// `interruption` is set when the batch was cancelled or timed out, in
    /// which case some or all of the failures are synthetic.
    #[error("all {total} items failed{}; last error: {last_error}", interruption_suffix(.interruption))]
    CompleteFailure {
        total: usize,
        failed_items: Vec<String>,
        last_error: ErrorDescriptor,
        interruption: Option<Interruption>,
    },
}

fn interruption_suffix(interruption: &Option<Interruption>) -> String {
    interruption.map_or_else(String::new, |i| format!(" (batch {i})"))
}

impl BulkError {
    /// Why the batch stopped early, if it did.
    #[must_use]
    pub const fn interruption(&self) -> Option<Interruption> {
        match self {
            Self::CompleteFailure { interruption, .. } => *interruption,
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }
}

/// Recorded for items still in flight when the caller cancelled.
#[must_use]
pub fn cancelled_descriptor() -> ErrorDescriptor {
    ErrorDescriptor::new(
        CANCELLED_STATUS,
        "RequestCancelled",
        "operation cancelled before the item completed",
    )
}

/// Recorded for items still in flight when the batch deadline passed.
#[must_use]
pub fn batch_timeout_descriptor(timeout: Duration) -> ErrorDescriptor {
    ErrorDescriptor::new(
        504,
        "BatchTimeout",
        format!("batch deadline of {timeout:?} elapsed before the item completed"),
    )
}

/// Recorded for an item whose action panicked.
#[must_use]
pub fn panic_descriptor(message: &str) -> ErrorDescriptor {
    ErrorDescriptor::new(
        500,
        "ActionPanicked",
        format!("per-item action panicked: {message}"),
    )
}
