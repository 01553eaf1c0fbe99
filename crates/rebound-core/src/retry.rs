//! Retry policy tables, one per operation kind.
//!
//! The same status can mean opposite things depending on what the caller is
//! doing. A 404 while confirming a fresh write usually means the write has
//! not propagated yet, so the read is worth repeating. A 404 while deleting
//! means the resource is already gone and repeating the delete cannot change
//! that. Every predicate here therefore takes an [`OperationKind`], and the
//! two kinds never share a table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::descriptor::ErrorDescriptor;
use crate::error::Error;

/// Synthetic status some remote APIs use while a write is still
/// propagating. Outside the HTTP range on purpose.
///
/// The exact trigger upstream is inferred rather than documented, so treat
/// this as a heuristic.
pub const PROPAGATION_PENDING_STATUS: u16 = 1001;

/// Symbolic code paired with [`PROPAGATION_PENDING_STATUS`].
pub const PROPAGATION_PENDING_CODE: &str = "PropagationPending";

/// What the caller was trying to do when the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A read confirming a just-completed create or update.
    Read,
    /// A delete, or a read confirming one.
    Delete,
}

impl OperationKind {
    pub const ALL: [Self; 2] = [Self::Read, Self::Delete];

    fn table(self) -> &'static RetryTable {
        match self {
            Self::Read => &READ_TABLE,
            Self::Delete => &DELETE_TABLE,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "delete" => Ok(Self::Delete),
            _ => Err(Error::UnknownOperationKind(s.to_string())),
        }
    }
}

/// Status and code lists for one operation kind.
///
/// The retryable and non-retryable lists are disjoint, which is what keeps
/// [`is_retryable`] and [`is_non_retryable`] mutually exclusive.
#[derive(Debug)]
struct RetryTable {
    retryable_status: &'static [u16],
    non_retryable_status: &'static [u16],
    retryable_codes: &'static [&'static str],
    non_retryable_codes: &'static [&'static str],
}

const READ_TABLE: RetryTable = RetryTable {
    retryable_status: &[404, 409, 423, 429, 500, 502, 503, 504, PROPAGATION_PENDING_STATUS],
    non_retryable_status: &[400, 401, 403, 405, 406, 410, 422],
    retryable_codes: &[
        "RequestThrottled",
        "TooManyRequests",
        "RequestTimeout",
        "ConnectionRefused",
        "HostNotFound",
        "NetworkUnreachable",
        "ServiceUnavailable",
        "InternalServerError",
        "BadGateway",
        "GatewayTimeout",
        PROPAGATION_PENDING_CODE,
        "ResourceNotFound",
        "NotFound",
        "Conflict",
        "ResourceLocked",
    ],
    non_retryable_codes: &[
        "Unauthorized",
        "Forbidden",
        "AccessDenied",
        "ValidationError",
        "InvalidParameter",
        "BadRequest",
        "MethodNotAllowed",
        "NotAcceptable",
        "Gone",
        "URLError",
    ],
};

const DELETE_TABLE: RetryTable = RetryTable {
    retryable_status: &[429, 500, 502, 503, 504, PROPAGATION_PENDING_STATUS],
    non_retryable_status: &[400, 401, 403, 404, 409, 410, 422],
    retryable_codes: &[
        "RequestThrottled",
        "TooManyRequests",
        "RequestTimeout",
        "ConnectionRefused",
        "HostNotFound",
        "NetworkUnreachable",
        "ServiceUnavailable",
        "InternalServerError",
        "BadGateway",
        "GatewayTimeout",
        PROPAGATION_PENDING_CODE,
    ],
    non_retryable_codes: &[
        "Unauthorized",
        "Forbidden",
        "AccessDenied",
        "ValidationError",
        "InvalidParameter",
        "BadRequest",
        "Gone",
        "URLError",
        "ResourceNotFound",
        "NotFound",
        "Conflict",
    ],
};

impl RetryTable {
    /// `Some(true)` retryable, `Some(false)` non-retryable, `None` when the
    /// table has no opinion.
    fn lookup(&self, descriptor: &ErrorDescriptor) -> Option<bool> {
        let status = descriptor.status_code();
        if self.retryable_status.contains(&status) {
            return Some(true);
        }
        if self.non_retryable_status.contains(&status) {
            return Some(false);
        }

        let code = descriptor.error_code();
        if code.is_empty() {
            return None;
        }
        let listed = |codes: &[&str]| codes.iter().any(|c| c.eq_ignore_ascii_case(code));
        if listed(self.retryable_codes) {
            Some(true)
        } else if listed(self.non_retryable_codes) {
            Some(false)
        } else {
            None
        }
    }
}

/// Whether retrying `descriptor` under `kind` is safe and likely to help.
///
/// An absent descriptor is indeterminate and yields `false`.
#[must_use]
pub fn is_retryable(descriptor: Option<&ErrorDescriptor>, kind: OperationKind) -> bool {
    descriptor.and_then(|d| kind.table().lookup(d)) == Some(true)
}

/// Whether retrying `descriptor` under `kind` definitely cannot change the
/// outcome.
///
/// An absent descriptor is indeterminate and yields `false`.
#[must_use]
pub fn is_non_retryable(descriptor: Option<&ErrorDescriptor>, kind: OperationKind) -> bool {
    descriptor.and_then(|d| kind.table().lookup(d)) == Some(false)
}

/// The two predicates folded into one value for loop code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    Retry,
    Stop,
    Indeterminate,
}

impl RetryDecision {
    #[must_use]
    pub fn of(descriptor: Option<&ErrorDescriptor>, kind: OperationKind) -> Self {
        if is_retryable(descriptor, kind) {
            Self::Retry
        } else if is_non_retryable(descriptor, kind) {
            Self::Stop
        } else {
            Self::Indeterminate
        }
    }
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => f.write_str("retryable"),
            Self::Stop => f.write_str("non-retryable"),
            Self::Indeterminate => f.write_str("indeterminate"),
        }
    }
}
