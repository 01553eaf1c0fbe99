//! Incremental progress notifications for bulk operations.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// "At least `completed` of `total` items are done."
///
/// Notifications are best-effort: consumers should not assume every count
/// between 1 and `total` is seen, only that each one was true when sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Whole-number percentage, 100 for an empty batch.
    #[must_use]
    pub fn percent(&self) -> usize {
        (self.completed * 100).checked_div(self.total).unwrap_or(100)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} processed ({}% complete)",
            self.completed,
            self.total,
            self.percent()
        )
    }
}

/// Receives a [`Progress`] after every completed item.
///
/// Called from the orchestrator's fan-in loop, so implementations should
/// return quickly.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress);
    }
}

/// Logs each notification at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: Progress) {
        log::info!("{}", progress);
    }
}

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

/// Forwards notifications onto a channel, e.g. for a UI task.
#[derive(Debug, Clone)]
pub struct ChannelProgress(UnboundedSender<Progress>);

impl ChannelProgress {
    #[must_use]
    pub const fn new(sender: UnboundedSender<Progress>) -> Self {
        Self(sender)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: Progress) {
        if self.0.send(progress).is_err() {
            log::trace!("Progress receiver dropped; discarding {}", progress);
        }
    }
}
