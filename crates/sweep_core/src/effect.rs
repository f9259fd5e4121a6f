use std::time::Duration;

use crate::{JobResult, JobStatus, TargetKey, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Forward a start directive to the extraction engine. Reports of that run
    /// come back tagged with `generation`.
    StartEngine { target: TargetKey, generation: u64 },
    /// Forward a cancellation directive; the engine is not awaited.
    CancelEngine { target: TargetKey },
    /// Write the terminal state to the durable store.
    PersistResult {
        target: TargetKey,
        entry: PersistedEntry,
    },
    /// Drop the durable entry for the target.
    ClearPersisted { target: TargetKey },
    /// Deliver `Msg::RetentionExpired` after `after` has elapsed.
    ScheduleExpiry {
        target: TargetKey,
        generation: u64,
        after: Duration,
    },
    /// User-visible completion signal.
    Notify {
        target: TargetKey,
        notification: Notification,
    },
    /// At-a-glance status indicator for the target.
    SetBadge { target: TargetKey, badge: Badge },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    pub status: JobStatus,
    pub saved_at: Timestamp,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub(crate) fn completed(result: &JobResult) -> Self {
        let message = if result.complete {
            format!("Export finished: {} records collected.", result.record_count)
        } else {
            format!(
                "Export finished after {} iterations without settling: {} records collected.",
                result.iterations, result.record_count
            )
        };
        Self {
            title: "Export complete".to_string(),
            message,
        }
    }

    pub(crate) fn failed(reason: &str) -> Self {
        Self {
            title: "Export failed".to_string(),
            message: reason.to_string(),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            title: "Export cancelled".to_string(),
            message: "Collection stopped; partial results were discarded.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Running,
    Done,
    Failed,
    Clear,
}

impl Badge {
    pub fn text(self) -> &'static str {
        match self {
            Badge::Running => "●",
            Badge::Done => "✓",
            Badge::Failed => "!",
            Badge::Clear => "",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Badge::Running => "#ff9800",
            Badge::Done => "#4caf50",
            Badge::Failed => "#f44336",
            Badge::Clear => "#00000000",
        }
    }
}
