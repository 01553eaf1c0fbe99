//! Async half of rebound.
//!
//! Implements the read-after-write consistency loop and the bulk operation
//! orchestrator on top of the classification tables in `rebound-core`.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod bulk;
pub mod config;
pub mod consistency;
pub mod error;
pub mod limit;

pub use bulk::{
    run_bulk, BulkItemResult, BulkOperationReport, BulkOptions, BulkOrchestrator, ChannelProgress,
    Diagnostic, Interruption, LogProgress, NoProgress, Progress, ProgressSink, Severity, Verdict,
};
pub use config::Config;
pub use consistency::{confirm_delete, confirm_read, ConsistencySettings, DeleteOutcome};
pub use error::{BulkError, ConsistencyError};
pub use limit::ConcurrencyLimit;
pub use tokio_util::sync::CancellationToken;
