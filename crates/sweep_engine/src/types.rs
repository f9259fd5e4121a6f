use std::fmt;

use sweep_core::{Phase, Record, TargetKey};

use crate::surface::SurfaceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub target: TargetKey,
    pub items_seen: u64,
    pub iterations: u64,
    pub phase: Phase,
}

/// Everything the engine thread reports. `run` is the id the caller passed to
/// `EngineHandle::start`, so stale reports can be told apart from current ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress {
        run: u64,
        progress: JobProgress,
    },
    JobCompleted {
        target: TargetKey,
        run: u64,
        result: Result<SweepReport, SweepError>,
    },
    /// An earlier run still owns the target; this run never started.
    StartRejected { target: TargetKey, run: u64 },
}

/// Why the scroll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The stability counter reached the bottom threshold.
    Converged,
    /// The hard iteration cap was hit while items were still plateauing.
    IterationCap,
    /// Cancellation was observed at an iteration boundary.
    Cancelled,
    /// The container never appeared within the page-load ceiling.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub records: Vec<Record>,
    pub iterations: u64,
    pub termination: Termination,
}

impl SweepReport {
    pub fn new(records: Vec<Record>, iterations: u64, termination: Termination) -> Self {
        Self {
            records,
            iterations,
            termination,
        }
    }

    /// Whether the record set can be trusted as the whole list.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.termination,
            Termination::Converged | Termination::NoData
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SweepError {
    pub kind: FailureKind,
    pub message: String,
}

impl SweepError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<SurfaceError> for SweepError {
    fn from(err: SurfaceError) -> Self {
        let kind = match err {
            SurfaceError::Detached(_) => FailureKind::Detached,
            SurfaceError::Selector(_) | SurfaceError::Other(_) => FailureKind::Surface,
        };
        SweepError::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    ContainerNotFound,
    /// The target surface went away mid-run (tab closed, navigated away).
    Detached,
    /// Iteration cap reached without collecting a single record.
    Timeout,
    Surface,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ContainerNotFound => write!(f, "container not found"),
            FailureKind::Detached => write!(f, "target detached"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Surface => write!(f, "surface error"),
        }
    }
}
