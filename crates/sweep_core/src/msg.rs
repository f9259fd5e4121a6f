use crate::{JobResult, JobStatus, Phase, TargetKey, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A UI surface asked to start an extraction for the target.
    StartRequested { target: TargetKey, at: Timestamp },
    /// Engine progress for the run started as `generation`.
    ProgressReported {
        target: TargetKey,
        generation: u64,
        snapshot: ProgressSnapshot,
    },
    /// The run started as `generation` finished, successfully or not.
    CompletionReported {
        target: TargetKey,
        generation: u64,
        completion: Completion,
        at: Timestamp,
    },
    /// A message to or from the engine for run `generation` could not be delivered.
    DeliveryFailed {
        target: TargetKey,
        generation: u64,
        reason: String,
        at: Timestamp,
    },
    /// A UI surface asked to cancel the target's running job.
    CancelRequested { target: TargetKey, at: Timestamp },
    /// The retention timer scheduled for `generation` fired.
    RetentionExpired { target: TargetKey, generation: u64 },
    /// The target surface (tab) was closed.
    TargetClosed { target: TargetKey },
    /// User reset a finished job; the target becomes idle.
    RestartRequested { target: TargetKey },
    /// Rehydrate finished jobs from the durable store.
    RestoreJobs(Vec<RestoredJob>),
    /// Periodic pump tick.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}

/// Partial progress update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub items_seen: Option<u64>,
    pub iterations: Option<u64>,
    pub phase: Option<Phase>,
}

impl ProgressSnapshot {
    pub fn new(items_seen: u64, iterations: u64, phase: Phase) -> Self {
        Self {
            items_seen: Some(items_seen),
            iterations: Some(iterations),
            phase: Some(phase),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success(JobResult),
    Failure(String),
}

/// A finished job as read back from the durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredJob {
    pub target: TargetKey,
    pub status: JobStatus,
    pub saved_at: Timestamp,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}
