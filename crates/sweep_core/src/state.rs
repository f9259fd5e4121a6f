use std::collections::BTreeMap;
use std::time::Duration;

use crate::msg::{ProgressSnapshot, RestoredJob};
use crate::view_model::{CoordinatorView, JobRowView};
use crate::Record;

/// Identifies the target surface (browser tab) a job runs against.
pub type TargetKey = u64;

/// Unix milliseconds. Supplied by the caller so `update` stays pure.
pub type Timestamp = i64;

/// How long a terminal job stays in memory before it is dropped.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Scrolling,
    Collecting,
    Finalizing,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Scrolling => "scrolling",
            Phase::Collecting => "collecting",
            Phase::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub items_seen: u64,
    pub iterations: u64,
    pub phase: Phase,
}

impl Progress {
    fn merge(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(items_seen) = snapshot.items_seen {
            self.items_seen = items_seen;
        }
        if let Some(iterations) = snapshot.iterations {
            self.iterations = iterations;
        }
        if let Some(phase) = snapshot.phase {
            self.phase = phase;
        }
    }
}

/// Final payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobResult {
    pub records: Vec<Record>,
    pub record_count: usize,
    pub iterations: u64,
    /// False when the sweep stopped on the iteration cap rather than converging.
    pub complete: bool,
}

impl JobResult {
    pub fn new(records: Vec<Record>, iterations: u64, complete: bool) -> Self {
        Self {
            record_count: records.len(),
            records,
            iterations,
            complete,
        }
    }
}

/// `Default` is the idle job an absent entry stands for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Job {
    pub status: JobStatus,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub progress: Progress,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub generation: u64,
}

impl Job {
    fn running(started_at: Timestamp, generation: u64) -> Self {
        Self {
            status: JobStatus::Running,
            started_at,
            ended_at: None,
            progress: Progress::default(),
            result: None,
            error: None,
            generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorState {
    jobs: BTreeMap<TargetKey, Job>,
    next_generation: u64,
    retention: Duration,
    dirty: bool,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_generation: 1,
            retention,
            dirty: false,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Pure read; `None` means the target is idle.
    pub fn job(&self, target: TargetKey) -> Option<&Job> {
        self.jobs.get(&target)
    }

    pub fn is_running(&self, target: TargetKey) -> bool {
        self.job(target)
            .is_some_and(|job| job.status == JobStatus::Running)
    }

    pub fn running_targets(&self) -> Vec<TargetKey> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.status == JobStatus::Running)
            .map(|(target, _)| *target)
            .collect()
    }

    pub fn view(&self) -> CoordinatorView {
        let jobs: Vec<JobRowView> = self
            .jobs
            .iter()
            .map(|(target, job)| JobRowView::from_job(*target, job))
            .collect();
        CoordinatorView {
            running: jobs
                .iter()
                .filter(|row| row.status == JobStatus::Running)
                .count(),
            jobs,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn running_job_mut(&mut self, target: TargetKey) -> Option<&mut Job> {
        self.jobs
            .get_mut(&target)
            .filter(|job| job.status == JobStatus::Running)
    }

    /// Inserts a fresh running job, replacing any idle or terminal one.
    pub(crate) fn begin_job(&mut self, target: TargetKey, at: Timestamp) -> u64 {
        let generation = self.take_generation();
        self.jobs.insert(target, Job::running(at, generation));
        self.mark_dirty();
        generation
    }

    /// The running job, but only while it is still the run started as `generation`.
    pub(crate) fn current_run_mut(
        &mut self,
        target: TargetKey,
        generation: u64,
    ) -> Option<&mut Job> {
        self.running_job_mut(target)
            .filter(|job| job.generation == generation)
    }

    pub(crate) fn apply_progress(
        &mut self,
        target: TargetKey,
        generation: u64,
        snapshot: &ProgressSnapshot,
    ) {
        if let Some(job) = self.current_run_mut(target, generation) {
            job.progress.merge(snapshot);
            self.mark_dirty();
        }
    }

    pub(crate) fn remove_job(&mut self, target: TargetKey) -> Option<Job> {
        let removed = self.jobs.remove(&target);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    pub(crate) fn restore(&mut self, restored: Vec<RestoredJob>) {
        for entry in restored {
            if !entry.status.is_terminal() || self.jobs.contains_key(&entry.target) {
                continue;
            }
            let generation = self.take_generation();
            let progress = Progress {
                items_seen: entry
                    .result
                    .as_ref()
                    .map_or(0, |result| result.record_count as u64),
                iterations: entry.result.as_ref().map_or(0, |result| result.iterations),
                phase: Phase::Finalizing,
            };
            self.jobs.insert(
                entry.target,
                Job {
                    status: entry.status,
                    started_at: entry.saved_at,
                    ended_at: Some(entry.saved_at),
                    progress,
                    result: entry.result,
                    error: entry.error,
                    generation,
                },
            );
            self.mark_dirty();
        }
    }

    fn take_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}
