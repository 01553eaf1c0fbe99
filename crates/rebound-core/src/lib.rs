//! Error classification half of rebound.
//!
//! Turns arbitrary remote-call failures into normalized
//! [`ErrorDescriptor`]s, buckets them into coarse [`Category`] values and
//! decides, per [`OperationKind`], whether a retry is safe.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod category;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod remote;
pub mod retry;

pub use category::{categorize, Category};
pub use descriptor::{extract, ErrorDescriptor};
pub use error::{Error, Result};
pub use ids::OperationId;
pub use remote::RemoteError;
pub use retry::{
    is_non_retryable, is_retryable, OperationKind, RetryDecision, PROPAGATION_PENDING_CODE,
    PROPAGATION_PENDING_STATUS,
};
