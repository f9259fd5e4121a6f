use crate::{Job, JobStatus, Phase, TargetKey};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinatorView {
    pub jobs: Vec<JobRowView>,
    pub running: usize,
    pub dirty: bool,
}

impl CoordinatorView {
    pub fn row(&self, target: TargetKey) -> Option<&JobRowView> {
        self.jobs.iter().find(|row| row.target == target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub target: TargetKey,
    pub status: JobStatus,
    pub phase: Phase,
    pub items_seen: u64,
    pub iterations: u64,
    pub record_count: Option<usize>,
    pub error: Option<String>,
    pub status_line: String,
}

impl JobRowView {
    pub(crate) fn from_job(target: TargetKey, job: &Job) -> Self {
        Self {
            target,
            status: job.status,
            phase: job.progress.phase,
            items_seen: job.progress.items_seen,
            iterations: job.progress.iterations,
            record_count: job.result.as_ref().map(|result| result.record_count),
            error: job.error.clone(),
            status_line: status_line(job),
        }
    }
}

fn status_line(job: &Job) -> String {
    match job.status {
        JobStatus::Idle => "Ready".to_string(),
        JobStatus::Running => format!(
            "{}: {} items after {} iterations",
            capitalize(job.progress.phase.as_str()),
            job.progress.items_seen,
            job.progress.iterations
        ),
        JobStatus::Cancelled => "Cancelled".to_string(),
        JobStatus::Completed => match &job.result {
            Some(result) => format!("Done: {} records", result.record_count),
            None => "Done".to_string(),
        },
        JobStatus::Failed => format!(
            "Failed: {}",
            job.error.as_deref().unwrap_or("unknown failure")
        ),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
