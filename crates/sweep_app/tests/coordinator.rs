use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sweep_app::{Coordinator, MemoryStore, RecordingSignals, ResultStore, StartResponse};
use sweep_core::{Badge, Completion, JobResult, JobStatus, Phase, Record, TargetKey};
use sweep_engine::{
    EngineHandle, JobProgress, ProgressSink, SweepError, SweepReport, SweepTarget, Termination,
};
use tokio_util::sync::CancellationToken;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(sweep_logging::initialize_for_tests);
}

const WAIT: Duration = Duration::from_secs(5);

/// Reports progress each round and yields `records` records once `rounds` have passed.
struct Scripted {
    records: usize,
    rounds: u64,
    tick: Duration,
    invocations: AtomicUsize,
}

impl Scripted {
    fn new(records: usize, rounds: u64, tick: Duration) -> Arc<Self> {
        Arc::new(Self {
            records,
            rounds,
            tick,
            invocations: AtomicUsize::new(0),
        })
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SweepTarget for Scripted {
    async fn sweep(
        &self,
        target: TargetKey,
        cancel: CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<SweepReport, SweepError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        for round in 0..self.rounds {
            if cancel.is_cancelled() {
                return Ok(SweepReport::new(
                    vec![Record::new("partial")],
                    round,
                    Termination::Cancelled,
                ));
            }
            sink.emit(JobProgress {
                target,
                items_seen: round,
                iterations: round,
                phase: Phase::Scrolling,
            });
            tokio::time::sleep(self.tick).await;
        }
        let records = (0..self.records)
            .map(|i| Record::new(format!("row-{i}")))
            .collect();
        Ok(SweepReport::new(records, self.rounds, Termination::Converged))
    }
}

/// First call ignores cancellation and converges on `first`; later calls converge on `second`.
struct TwoRuns {
    first: (&'static str, Duration),
    second: (&'static str, Duration),
    invocations: AtomicUsize,
}

impl TwoRuns {
    fn new(first: (&'static str, Duration), second: (&'static str, Duration)) -> Arc<Self> {
        Arc::new(Self {
            first,
            second,
            invocations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SweepTarget for TwoRuns {
    async fn sweep(
        &self,
        _target: TargetKey,
        _cancel: CancellationToken,
        _sink: &dyn ProgressSink,
    ) -> Result<SweepReport, SweepError> {
        let call = self.invocations.fetch_add(1, Ordering::SeqCst);
        let (identity, delay) = if call == 0 { self.first } else { self.second };
        tokio::time::sleep(delay).await;
        Ok(SweepReport::new(
            vec![Record::new(identity)],
            1,
            Termination::Converged,
        ))
    }
}

struct Harness {
    coordinator: Coordinator,
    store: Arc<MemoryStore>,
    signals: RecordingSignals,
}

fn harness(retention: Duration) -> Harness {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let signals = RecordingSignals::new();
    let coordinator = Coordinator::new(
        EngineHandle::new(),
        store.clone(),
        Arc::new(signals.clone()),
        retention,
    )
    .with_clock(Arc::new(|| 1_000));
    Harness {
        coordinator,
        store,
        signals,
    }
}

#[test]
fn second_start_while_running_returns_the_existing_job() {
    let h = harness(Duration::from_secs(300));
    h.coordinator
        .attach_target(3, Scripted::new(1, 200, Duration::from_millis(20)));

    let first = h.coordinator.start(3);
    let second = h.coordinator.start(3);

    let StartResponse::Accepted(job) = first else {
        panic!("first start should be accepted");
    };
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(second, StartResponse::AlreadyRunning(job));
    assert_eq!(h.coordinator.view().running, 1);

    h.coordinator.cancel(3);
}

#[test]
fn completed_result_is_persisted_and_survives_target_close() {
    let h = harness(Duration::from_secs(300));
    h.coordinator
        .attach_target(5, Scripted::new(12, 2, Duration::from_millis(5)));

    h.coordinator.start(5);
    let job = h
        .coordinator
        .wait_until(5, WAIT, |job| job.status.is_terminal())
        .expect("job finishes");

    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.expect("result kept");
    assert_eq!(result.record_count, 12);
    assert!(result.complete);

    let stored = h.store.load(5).unwrap().expect("entry saved");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.saved_at, 1_000);
    assert_eq!(stored.result.map(|r| r.record_count), Some(12));

    assert_eq!(h.signals.last_badge(5), Some(Badge::Done));
    assert_eq!(
        h.signals
            .notifications_for(5)
            .last()
            .map(|n| n.title.as_str()),
        Some("Export complete")
    );

    h.coordinator.on_target_closed(5);
    assert!(h.coordinator.view().row(5).is_none());
    let from_store = h.coordinator.get_state(5).expect("store fallback");
    assert_eq!(from_store.status, JobStatus::Completed);
    assert_eq!(from_store.result.map(|r| r.record_count), Some(12));
}

#[test]
fn progress_events_reach_the_view() {
    let h = harness(Duration::from_secs(300));
    h.coordinator
        .attach_target(8, Scripted::new(1, 100, Duration::from_millis(20)));

    h.coordinator.start(8);
    let job = h
        .coordinator
        .wait_until(8, WAIT, |job| job.progress.iterations >= 2)
        .expect("progress arrives");

    assert_eq!(job.status, JobStatus::Running);
    let row = h.coordinator.view().row(8).cloned().expect("row");
    assert!(row.status_line.starts_with("Scrolling:"), "{}", row.status_line);

    h.coordinator.cancel(8);
}

#[test]
fn starting_an_unattached_target_fails_with_a_reason() {
    let h = harness(Duration::from_secs(300));

    let response = h.coordinator.start(42);

    let job = response.job();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.clone().expect("reason recorded");
    assert!(error.contains("channel delivery failed"), "{error}");
    assert_eq!(h.signals.last_badge(42), Some(Badge::Failed));
    assert_eq!(
        h.store.load(42).unwrap().map(|entry| entry.status),
        Some(JobStatus::Failed)
    );
}

#[test]
fn cancel_clears_the_badge_and_discards_the_late_report() {
    let h = harness(Duration::from_secs(300));
    let runner = Scripted::new(4, 200, Duration::from_millis(10));
    h.coordinator.attach_target(2, runner.clone());

    h.coordinator.start(2);
    h.coordinator.cancel(2);

    let job = h.coordinator.get_state(2).expect("job kept");
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(h.signals.last_badge(2), Some(Badge::Clear));
    assert_eq!(
        h.signals
            .notifications_for(2)
            .last()
            .map(|n| n.title.as_str()),
        Some("Export cancelled")
    );

    // Give the engine time to notice and report the cancelled run.
    thread::sleep(Duration::from_millis(100));
    h.coordinator.pump();

    let job = h.coordinator.get_state(2).expect("job kept");
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
    assert_eq!(runner.invocations(), 1);
}

#[test]
fn restart_clears_a_finished_job_and_its_stored_entry() {
    let h = harness(Duration::from_secs(300));
    let runner = Scripted::new(3, 1, Duration::ZERO);
    h.coordinator.attach_target(9, runner.clone());

    assert!(!h.coordinator.restart(9), "nothing to restart yet");

    h.coordinator.start(9);
    h.coordinator
        .wait_until(9, WAIT, |job| job.status.is_terminal())
        .expect("job finishes");
    assert!(h.store.load(9).unwrap().is_some());

    assert!(h.coordinator.restart(9));
    assert!(h.store.load(9).unwrap().is_none());
    assert!(h.coordinator.get_state(9).is_none(), "reset target reads as idle");
    assert!(h.coordinator.view().row(9).is_none());

    let response = h.coordinator.start(9);
    assert!(matches!(response, StartResponse::Accepted(_)));
    h.coordinator
        .wait_until(9, WAIT, |job| job.status == JobStatus::Completed)
        .expect("second run finishes");
    assert_eq!(runner.invocations(), 2);
}

#[test]
fn late_report_from_a_cancelled_run_does_not_finish_the_next_run() {
    let h = harness(Duration::from_secs(300));
    let runner = TwoRuns::new(
        ("stale", Duration::from_millis(150)),
        ("fresh", Duration::from_millis(600)),
    );
    h.coordinator.attach_target(11, runner);

    h.coordinator.start(11);
    h.coordinator.cancel(11);
    assert!(h.coordinator.restart(11));
    assert!(matches!(
        h.coordinator.start(11),
        StartResponse::Accepted(_)
    ));

    let job = h
        .coordinator
        .wait_until(11, WAIT, |job| job.status.is_terminal())
        .expect("second run finishes");

    assert_eq!(job.status, JobStatus::Completed);
    let identities: Vec<String> = job
        .result
        .expect("result kept")
        .records
        .iter()
        .map(|record| record.identity().to_string())
        .collect();
    assert_eq!(identities, vec!["fresh".to_string()]);
}

#[test]
fn start_refused_by_a_busy_engine_fails_the_job() {
    let h = harness(Duration::from_secs(300));
    let runner = Scripted::new(1, 200, Duration::from_millis(10));
    h.coordinator.attach_target(12, runner.clone());

    h.coordinator.start(12);
    // An outside completion finishes the job while the engine is still sweeping.
    h.coordinator.report_completion(
        12,
        Completion::Success(JobResult::new(vec![Record::new("early")], 1, true)),
    );
    assert!(h.coordinator.restart(12));
    h.coordinator.start(12);

    let job = h
        .coordinator
        .wait_until(12, WAIT, |job| job.status.is_terminal())
        .expect("refused start is reported");

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("reason recorded");
    assert!(error.contains("earlier sweep"), "{error}");
    assert_eq!(h.signals.last_badge(12), Some(Badge::Failed));
    assert_eq!(runner.invocations(), 1);
}

#[test]
fn finished_jobs_leave_memory_after_retention() {
    let h = harness(Duration::from_millis(30));
    h.coordinator
        .attach_target(4, Scripted::new(2, 1, Duration::ZERO));

    h.coordinator.start(4);
    h.coordinator
        .wait_until(4, WAIT, |job| job.status.is_terminal())
        .expect("job finishes");
    assert!(h.coordinator.view().row(4).is_some());

    thread::sleep(Duration::from_millis(150));
    h.coordinator.pump();

    assert!(h.coordinator.view().row(4).is_none());
    assert!(h.store.load(4).unwrap().is_some(), "store keeps the result");
}

#[test]
fn restore_prunes_stale_entries_and_rehydrates_the_rest() {
    let h = harness(Duration::from_millis(500));
    let entry = |saved_at| sweep_core::PersistedEntry {
        status: JobStatus::Failed,
        saved_at,
        result: None,
        error: Some("container missing".to_string()),
    };
    h.store.save(1, &entry(100)).unwrap();
    h.store.save(2, &entry(900)).unwrap();

    let restored = h.coordinator.restore_from_store().unwrap();

    assert_eq!(restored, 1);
    assert!(h.store.load(1).unwrap().is_none());
    let row = h.coordinator.view().row(2).cloned().expect("restored row");
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.error.as_deref(), Some("container missing"));
}
