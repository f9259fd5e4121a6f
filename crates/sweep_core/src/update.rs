use crate::effect::{Badge, Notification, PersistedEntry};
use crate::{Completion, CoordinatorState, Effect, JobStatus, Msg, TargetKey, Timestamp};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: CoordinatorState, msg: Msg) -> (CoordinatorState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested { target, at } => {
            // At most one running job per target: a second start is a no-op.
            if state.is_running(target) {
                return (state, Vec::new());
            }
            let generation = state.begin_job(target, at);
            vec![
                Effect::StartEngine { target, generation },
                Effect::SetBadge {
                    target,
                    badge: Badge::Running,
                },
            ]
        }
        // Reports from any run other than the current one are stale and dropped.
        Msg::ProgressReported {
            target,
            generation,
            snapshot,
        } => {
            state.apply_progress(target, generation, &snapshot);
            Vec::new()
        }
        Msg::CompletionReported {
            target,
            generation,
            completion,
            at,
        } => match completion {
            Completion::Success(result) => complete(&mut state, target, generation, result, at),
            Completion::Failure(reason) => fail(&mut state, target, generation, reason, at),
        },
        Msg::DeliveryFailed {
            target,
            generation,
            reason,
            at,
        } => fail(
            &mut state,
            target,
            generation,
            format!("channel delivery failed: {reason}"),
            at,
        ),
        Msg::CancelRequested { target, at } => cancel(&mut state, target, at),
        Msg::RetentionExpired { target, generation } => {
            let expired = state
                .job(target)
                .is_some_and(|job| job.generation == generation && job.status.is_terminal());
            if expired {
                state.remove_job(target);
            }
            Vec::new()
        }
        Msg::TargetClosed { target } => match state.remove_job(target) {
            Some(job) if job.status == JobStatus::Running => {
                vec![Effect::CancelEngine { target }]
            }
            _ => Vec::new(),
        },
        Msg::RestartRequested { target } => restart(&mut state, target),
        Msg::RestoreJobs(restored) => {
            state.restore(restored);
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn complete(
    state: &mut CoordinatorState,
    target: TargetKey,
    generation: u64,
    result: crate::JobResult,
    at: Timestamp,
) -> Vec<Effect> {
    let after = state.retention();
    let Some(job) = state.current_run_mut(target, generation) else {
        return Vec::new();
    };
    job.status = JobStatus::Completed;
    job.ended_at = Some(at);
    job.progress.items_seen = result.record_count as u64;
    job.progress.iterations = result.iterations;
    job.progress.phase = crate::Phase::Finalizing;
    job.error = None;
    let notification = Notification::completed(&result);
    let entry = PersistedEntry {
        status: JobStatus::Completed,
        saved_at: at,
        result: Some(result.clone()),
        error: None,
    };
    job.result = Some(result);
    state.mark_dirty();

    vec![
        Effect::PersistResult { target, entry },
        Effect::Notify {
            target,
            notification,
        },
        Effect::SetBadge {
            target,
            badge: Badge::Done,
        },
        Effect::ScheduleExpiry {
            target,
            generation,
            after,
        },
    ]
}

fn fail(
    state: &mut CoordinatorState,
    target: TargetKey,
    generation: u64,
    reason: String,
    at: Timestamp,
) -> Vec<Effect> {
    let after = state.retention();
    let Some(job) = state.current_run_mut(target, generation) else {
        return Vec::new();
    };
    let reason = if reason.trim().is_empty() {
        "unknown failure".to_string()
    } else {
        reason
    };
    job.status = JobStatus::Failed;
    job.ended_at = Some(at);
    job.result = None;
    job.error = Some(reason.clone());
    state.mark_dirty();

    vec![
        Effect::PersistResult {
            target,
            entry: PersistedEntry {
                status: JobStatus::Failed,
                saved_at: at,
                result: None,
                error: Some(reason.clone()),
            },
        },
        Effect::Notify {
            target,
            notification: Notification::failed(&reason),
        },
        Effect::SetBadge {
            target,
            badge: Badge::Failed,
        },
        Effect::ScheduleExpiry {
            target,
            generation,
            after,
        },
    ]
}

fn cancel(state: &mut CoordinatorState, target: TargetKey, at: Timestamp) -> Vec<Effect> {
    let after = state.retention();
    let Some(job) = state.running_job_mut(target) else {
        return Vec::new();
    };
    job.status = JobStatus::Cancelled;
    job.ended_at = Some(at);
    let generation = job.generation;
    state.mark_dirty();

    vec![
        Effect::CancelEngine { target },
        Effect::Notify {
            target,
            notification: Notification::cancelled(),
        },
        Effect::SetBadge {
            target,
            badge: Badge::Clear,
        },
        Effect::ScheduleExpiry {
            target,
            generation,
            after,
        },
    ]
}

/// Drops a finished job; an absent entry reads as idle.
fn restart(state: &mut CoordinatorState, target: TargetKey) -> Vec<Effect> {
    let terminal = state
        .job(target)
        .is_some_and(|job| job.status.is_terminal());
    if !terminal {
        return Vec::new();
    }
    state.remove_job(target);

    vec![
        Effect::ClearPersisted { target },
        Effect::SetBadge {
            target,
            badge: Badge::Clear,
        },
    ]
}
