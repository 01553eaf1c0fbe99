//! Bulk operation orchestration: fan out one remote call per item, fan the
//! results back in, and summarize them.

pub mod orchestrator;
pub mod progress;
pub mod report;

pub use orchestrator::{run_bulk, BulkOptions, BulkOrchestrator};
pub use progress::{ChannelProgress, LogProgress, NoProgress, Progress, ProgressSink};
pub use report::{BulkItemResult, BulkOperationReport, Diagnostic, Interruption, Severity, Verdict};
