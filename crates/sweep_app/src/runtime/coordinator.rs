use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use sweep_core::{
    update, Completion, CoordinatorState, CoordinatorView, Job, JobResult, JobStatus, Msg,
    PersistedEntry, Phase, Progress, ProgressSnapshot, RestoredJob, TargetKey, Timestamp,
};
use sweep_engine::{DeliveryError, EngineEvent, EngineHandle, SweepTarget, Termination};
use sweep_logging::{sweep_debug, sweep_error, sweep_info, sweep_warn};

use super::effects::EffectRunner;
use super::persistence::{ResultStore, StoreError};
use super::signals::SignalSink;

/// Wall clock in unix milliseconds.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResponse {
    Accepted(Job),
    /// The existing run, untouched.
    AlreadyRunning(Job),
}

impl StartResponse {
    pub fn job(&self) -> &Job {
        match self {
            StartResponse::Accepted(job) | StartResponse::AlreadyRunning(job) => job,
        }
    }
}

/// Owns every target's job state and routes messages between callers, the
/// engine, the durable store and timers.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    engine: EngineHandle,
    store: Arc<dyn ResultStore>,
    effects: EffectRunner,
    inbox: Mutex<mpsc::Receiver<Msg>>,
}

impl Coordinator {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn ResultStore>,
        signals: Arc<dyn SignalSink>,
        retention: Duration,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let effects = EffectRunner::new(
            engine.clone(),
            store.clone(),
            signals,
            inbox_tx,
            system_clock(),
        );
        Self {
            state: Mutex::new(CoordinatorState::with_retention(retention)),
            engine,
            store,
            effects,
            inbox: Mutex::new(inbox_rx),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.effects.clock = clock;
        self
    }

    fn now(&self) -> Timestamp {
        (self.effects.clock)()
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops stale stored entries, then brings the remaining finished jobs back into memory.
    pub fn restore_from_store(&self) -> Result<usize, StoreError> {
        let retention_ms = i64::try_from(self.lock_state().retention().as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.now().saturating_sub(retention_ms);
        let pruned = self.store.prune(cutoff)?;
        if pruned > 0 {
            sweep_info!("pruned {} expired stored results", pruned);
        }

        let restored: Vec<RestoredJob> = self
            .store
            .load_all()?
            .into_iter()
            .map(|(target, entry)| RestoredJob {
                target,
                status: entry.status,
                saved_at: entry.saved_at,
                result: entry.result,
                error: entry.error,
            })
            .collect();
        let count = restored.len();
        self.dispatch(Msg::RestoreJobs(restored));
        Ok(count)
    }

    pub fn attach_target(&self, target: TargetKey, runner: Arc<dyn SweepTarget>) {
        self.engine.attach(target, runner);
    }

    pub fn start(&self, target: TargetKey) -> StartResponse {
        if let Some(job) = self.job(target).filter(|job| job.status == JobStatus::Running) {
            sweep_debug!(tab = target; "start ignored; already running");
            return StartResponse::AlreadyRunning(job);
        }
        let at = self.now();
        self.dispatch(Msg::StartRequested { target, at });
        StartResponse::Accepted(self.job(target).unwrap_or_default())
    }

    /// Applies to the target's current run; ignored when nothing is running.
    pub fn report_progress(&self, target: TargetKey, snapshot: ProgressSnapshot) {
        let Some(generation) = self.running_generation(target) else {
            return;
        };
        self.dispatch(Msg::ProgressReported {
            target,
            generation,
            snapshot,
        });
    }

    /// Applies to the target's current run; ignored when nothing is running.
    pub fn report_completion(&self, target: TargetKey, completion: Completion) {
        let Some(generation) = self.running_generation(target) else {
            return;
        };
        let at = self.now();
        self.dispatch(Msg::CompletionReported {
            target,
            generation,
            completion,
            at,
        });
    }

    pub fn cancel(&self, target: TargetKey) {
        let at = self.now();
        self.dispatch(Msg::CancelRequested { target, at });
    }

    /// In-memory job, else the durable entry, else `None` (idle).
    pub fn get_state(&self, target: TargetKey) -> Option<Job> {
        if let Some(job) = self.job(target) {
            return Some(job);
        }
        match self.store.load(target) {
            Ok(entry) => entry.map(job_from_entry),
            Err(err) => {
                sweep_warn!(tab = target; "stored result unreadable: {}", err);
                None
            }
        }
    }

    pub fn on_target_closed(&self, target: TargetKey) {
        self.dispatch(Msg::TargetClosed { target });
        self.engine.detach(target);
    }

    /// Forgets a finished job so the target reads as idle. Returns false when
    /// the job was not in a terminal state.
    pub fn restart(&self, target: TargetKey) -> bool {
        let terminal = self
            .job(target)
            .is_some_and(|job| job.status.is_terminal());
        if terminal {
            self.dispatch(Msg::RestartRequested { target });
        }
        terminal
    }

    pub fn view(&self) -> CoordinatorView {
        self.lock_state().view()
    }

    pub fn consume_dirty(&self) -> bool {
        self.lock_state().consume_dirty()
    }

    fn job(&self, target: TargetKey) -> Option<Job> {
        self.lock_state().job(target).cloned()
    }

    fn running_generation(&self, target: TargetKey) -> Option<u64> {
        self.lock_state()
            .job(target)
            .filter(|job| job.status == JobStatus::Running)
            .map(|job| job.generation)
    }

    /// Applies timer messages and engine events that have arrived. Returns how many were handled.
    pub fn pump(&self) -> usize {
        let mut handled = 0;

        let timers: Vec<Msg> = {
            let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
            inbox.try_iter().collect()
        };
        for msg in timers {
            self.dispatch(msg);
            handled += 1;
        }

        loop {
            match self.engine.try_recv() {
                Ok(Some(event)) => {
                    handled += 1;
                    if let Some(msg) = msg_from_event(event, self.now()) {
                        self.dispatch(msg);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    self.fail_running(&err);
                    break;
                }
            }
        }
        handled
    }

    /// Pumps until the target's job satisfies `done` or the timeout passes.
    pub fn wait_until(
        &self,
        target: TargetKey,
        timeout: Duration,
        done: impl Fn(&Job) -> bool,
    ) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if let Some(job) = self.job(target).filter(|job| done(job)) {
                return Some(job);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn fail_running(&self, err: &DeliveryError) {
        let running = self.lock_state().running_targets();
        for target in running {
            let Some(generation) = self.running_generation(target) else {
                continue;
            };
            sweep_error!(tab = target; "engine channel lost: {}", err);
            let at = self.now();
            self.dispatch(Msg::DeliveryFailed {
                target,
                generation,
                reason: err.to_string(),
                at,
            });
        }
    }

    fn dispatch(&self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            let effects = {
                let mut guard = self.lock_state();
                let state = std::mem::take(&mut *guard);
                let (state, effects) = update(state, msg);
                *guard = state;
                effects
            };
            queue.extend(self.effects.run(effects));
        }
    }
}

fn msg_from_event(event: EngineEvent, at: Timestamp) -> Option<Msg> {
    match event {
        EngineEvent::Progress { run, progress } => Some(Msg::ProgressReported {
            target: progress.target,
            generation: run,
            snapshot: ProgressSnapshot::new(progress.items_seen, progress.iterations, progress.phase),
        }),
        EngineEvent::StartRejected { target, run } => {
            sweep_warn!(tab = target; "engine refused run {}; an earlier sweep is still active", run);
            Some(Msg::DeliveryFailed {
                target,
                generation: run,
                reason: "an earlier sweep still owns the target".to_string(),
                at,
            })
        }
        EngineEvent::JobCompleted { target, run, result } => {
            let completion = match result {
                // The job already left `running` when the cancel was requested.
                Ok(report) if report.termination == Termination::Cancelled => {
                    sweep_debug!(tab = target; "discarding {} records of cancelled run", report.records.len());
                    return None;
                }
                Ok(report) => {
                    let complete = report.is_complete();
                    Completion::Success(JobResult::new(report.records, report.iterations, complete))
                }
                Err(err) => Completion::Failure(err.to_string()),
            };
            Some(Msg::CompletionReported {
                target,
                generation: run,
                completion,
                at,
            })
        }
    }
}

fn job_from_entry(entry: PersistedEntry) -> Job {
    let (items_seen, iterations) = entry
        .result
        .as_ref()
        .map_or((0, 0), |result| (result.record_count as u64, result.iterations));
    Job {
        status: entry.status,
        started_at: entry.saved_at,
        ended_at: Some(entry.saved_at),
        progress: Progress {
            items_seen,
            iterations,
            phase: Phase::Finalizing,
        },
        result: entry.result,
        error: entry.error,
        generation: 0,
    }
}
