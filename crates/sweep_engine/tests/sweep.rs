use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sweep_core::{Phase, Record};
use sweep_engine::{
    AffordanceId, Extracted, FailureKind, JobProgress, Measurement, MissingContainer,
    ProgressSink, RecordExtractor, ResetMode, Surface, SurfaceError, SweepContext, SweepPlan,
    SweepSettings, Sweeper, Termination,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<JobProgress>>,
}

impl ProgressSink for CollectingSink {
    fn emit(&self, progress: JobProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

impl CollectingSink {
    fn phases(&self) -> Vec<Phase> {
        self.events.lock().unwrap().iter().map(|p| p.phase).collect()
    }
}

struct ById;

impl RecordExtractor<String> for ById {
    fn extract(&self, node: &String) -> Extracted {
        Extracted::Record(Record::new(node.clone()).with_field("id", node.clone()))
    }
}

/// Lazily growing list: every forward scroll renders `per_advance` more
/// items until `total` is reached.
struct GrowingList {
    per_advance: usize,
    total: usize,
    state: Mutex<ListState>,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[derive(Default)]
struct ListState {
    rendered: usize,
    forward_scrolls: usize,
    backward_scrolls: usize,
    jumps: usize,
}

impl GrowingList {
    fn new(per_advance: usize, total: usize) -> Self {
        Self {
            per_advance,
            total,
            state: Mutex::default(),
            cancel_after: None,
        }
    }

    fn forward_scrolls(&self) -> usize {
        self.state.lock().unwrap().forward_scrolls
    }
}

#[async_trait]
impl Surface for GrowingList {
    type Node = String;

    async fn container_present(&self) -> Result<bool, SurfaceError> {
        Ok(true)
    }

    async fn jump_to_start(&self) -> Result<(), SurfaceError> {
        self.state.lock().unwrap().jumps += 1;
        Ok(())
    }

    async fn scroll_by(&self, delta: i64) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if delta > 0 {
            state.forward_scrolls += 1;
            state.rendered = (state.rendered + self.per_advance).min(self.total);
            if let Some((after, token)) = &self.cancel_after {
                if state.forward_scrolls == *after {
                    token.cancel();
                }
            }
        } else {
            state.backward_scrolls += 1;
        }
        Ok(())
    }

    async fn measure(&self) -> Result<Measurement, SurfaceError> {
        Ok(Measurement::count(self.state.lock().unwrap().rendered))
    }

    async fn visible_nodes(&self) -> Result<Vec<String>, SurfaceError> {
        let rendered = self.state.lock().unwrap().rendered;
        Ok((0..rendered).map(|i| format!("item-{i}")).collect())
    }
}

fn fast_settings() -> SweepSettings {
    SweepSettings::default().without_delays()
}

#[tokio::test]
async fn plateau_terminates_exactly_threshold_iterations_later() {
    sweep_logging::initialize_for_tests();
    let settings = fast_settings();
    let threshold = settings.bottom_threshold as u64;
    let sweeper = Sweeper::new(GrowingList::new(10, 50), ById, settings, SweepPlan::default());
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();

    let report = sweeper
        .run(&SweepContext {
            target: 1,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    assert_eq!(report.records.len(), 50);
    assert_eq!(report.iterations, 5 + threshold);
    assert_eq!(report.termination, Termination::Converged);
    assert!(report.is_complete());
    assert_eq!(sweeper.surface().state.lock().unwrap().jumps, 1);

    let phases = sink.phases();
    assert_eq!(phases.first(), Some(&Phase::Scrolling));
    assert_eq!(&phases[phases.len() - 2..], &[Phase::Collecting, Phase::Finalizing]);
}

#[tokio::test]
async fn records_keep_first_seen_order_without_duplicates() {
    let sweeper = Sweeper::new(GrowingList::new(7, 30), ById, fast_settings(), SweepPlan::default());
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();

    let report = sweeper
        .run(&SweepContext {
            target: 2,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    let ids: Vec<&str> = report.records.iter().map(Record::identity).collect();
    let expected: Vec<String> = (0..30).map(|i| format!("item-{i}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn cancel_stops_advancing_within_one_iteration() {
    let cancel = CancellationToken::new();
    let mut list = GrowingList::new(1, 10_000);
    list.cancel_after = Some((3, cancel.clone()));
    let sweeper = Sweeper::new(list, ById, fast_settings(), SweepPlan::default());
    let sink = CollectingSink::default();

    let report = sweeper
        .run(&SweepContext {
            target: 3,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    assert_eq!(sweeper.surface().forward_scrolls(), 3);
    assert_eq!(report.termination, Termination::Cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.records.len(), 3);
}

#[tokio::test]
async fn iteration_cap_with_records_is_a_normal_stop() {
    let settings = SweepSettings {
        max_iterations: 4,
        ..fast_settings()
    };
    let sweeper = Sweeper::new(GrowingList::new(1, 100), ById, settings, SweepPlan::default());
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();

    let report = sweeper
        .run(&SweepContext {
            target: 4,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::IterationCap);
    assert_eq!(report.records.len(), 4);
    assert!(!report.is_complete());
}

/// Container that never renders a data node while its offset keeps moving.
struct EmptyScroller {
    present: bool,
    offset: Mutex<i64>,
}

#[async_trait]
impl Surface for EmptyScroller {
    type Node = String;

    async fn container_present(&self) -> Result<bool, SurfaceError> {
        Ok(self.present)
    }

    async fn jump_to_start(&self) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn scroll_by(&self, delta: i64) -> Result<(), SurfaceError> {
        *self.offset.lock().unwrap() += delta;
        Ok(())
    }

    async fn measure(&self) -> Result<Measurement, SurfaceError> {
        Ok(Measurement::count(0).with_offset(*self.offset.lock().unwrap()))
    }

    async fn visible_nodes(&self) -> Result<Vec<String>, SurfaceError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn iteration_cap_without_records_is_a_timeout() {
    let settings = SweepSettings {
        max_iterations: 10,
        ..fast_settings()
    };
    let surface = EmptyScroller {
        present: true,
        offset: Mutex::new(0),
    };
    let sweeper = Sweeper::new(surface, ById, settings, SweepPlan::default());
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();

    let err = sweeper
        .run(&SweepContext {
            target: 5,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn missing_container_follows_policy() {
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();
    let ctx = SweepContext {
        target: 6,
        cancel: &cancel,
        sink: &sink,
    };
    let absent = || EmptyScroller {
        present: false,
        offset: Mutex::new(0),
    };

    let report = Sweeper::new(absent(), ById, fast_settings(), SweepPlan::default())
        .run(&ctx)
        .await
        .unwrap();
    assert_eq!(report.termination, Termination::NoData);
    assert!(report.records.is_empty());
    assert!(report.is_complete());

    let strict = SweepSettings {
        missing_container: MissingContainer::Fail,
        ..fast_settings()
    };
    let err = Sweeper::new(absent(), ById, strict, SweepPlan::default())
        .run(&ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::ContainerNotFound);
}

#[tokio::test]
async fn cancel_during_container_wait_is_reported_as_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let sink = CollectingSink::default();
    let strict = SweepSettings {
        missing_container: MissingContainer::Fail,
        ..fast_settings()
    };
    let surface = EmptyScroller {
        present: false,
        offset: Mutex::new(0),
    };

    let report = Sweeper::new(surface, ById, strict, SweepPlan::default())
        .run(&SweepContext {
            target: 6,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Cancelled);
    assert!(report.records.is_empty());
    assert!(!report.is_complete());
}

#[tokio::test]
async fn converge_reset_rewinds_until_top_is_stable() {
    let settings = SweepSettings {
        top_threshold: 3,
        ..fast_settings()
    };
    let plan = SweepPlan {
        reset: ResetMode::Converge,
        expand_tree: false,
    };
    let sweeper = Sweeper::new(GrowingList::new(5, 5), ById, settings, plan);
    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();

    sweeper
        .run(&SweepContext {
            target: 7,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();

    let state = sweeper.surface().state.lock().unwrap();
    assert_eq!(state.backward_scrolls, 3);
    assert_eq!(state.jumps, 0);
}

/// Navigation tree where opening a node can reveal further collapsed nodes.
struct Tree {
    open: Mutex<BTreeSet<&'static str>>,
}

impl Tree {
    const NODES: &'static [(&'static str, Option<&'static str>)] = &[
        ("docs", None),
        ("docs/intro", Some("docs")),
        ("docs/api", Some("docs")),
        ("docs/api/v1", Some("docs/api")),
        ("docs/api/v2", Some("docs/api")),
        ("blog", None),
    ];

    fn is_visible(&self, node: &str, open: &BTreeSet<&'static str>) -> bool {
        match Self::NODES.iter().find(|(name, _)| *name == node) {
            Some((_, None)) => true,
            Some((_, Some(parent))) => open.contains(parent) && self.is_visible(parent, open),
            None => false,
        }
    }

    fn has_children(node: &str) -> bool {
        Self::NODES.iter().any(|(_, parent)| *parent == Some(node))
    }
}

#[async_trait]
impl Surface for Tree {
    type Node = String;

    async fn container_present(&self) -> Result<bool, SurfaceError> {
        Ok(true)
    }

    async fn jump_to_start(&self) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn scroll_by(&self, _delta: i64) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn measure(&self) -> Result<Measurement, SurfaceError> {
        Ok(Measurement::count(self.visible_nodes().await?.len()))
    }

    async fn visible_nodes(&self) -> Result<Vec<String>, SurfaceError> {
        let open = self.open.lock().unwrap();
        Ok(Self::NODES
            .iter()
            .filter(|(name, _)| self.is_visible(name, &open))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    async fn collapsed_affordances(&self) -> Result<Vec<AffordanceId>, SurfaceError> {
        let open = self.open.lock().unwrap();
        Ok(Self::NODES
            .iter()
            .filter(|(name, _)| Self::has_children(name) && !open.contains(name))
            .filter(|(name, _)| self.is_visible(name, &open))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    async fn trigger(&self, affordance: &AffordanceId) -> Result<bool, SurfaceError> {
        let Some((name, _)) = Self::NODES.iter().find(|(name, _)| *name == affordance.as_str()) else {
            return Ok(false);
        };
        Ok(self.open.lock().unwrap().insert(*name))
    }
}

#[tokio::test]
async fn tree_expansion_reaches_nested_nodes() {
    let tree = Tree {
        open: Mutex::default(),
    };
    let settings = SweepSettings {
        bottom_threshold: 2,
        ..fast_settings()
    };
    let plan = SweepPlan {
        reset: ResetMode::Jump,
        expand_tree: true,
    };
    let sweeper = Sweeper::new(tree, ById, settings, plan);

    assert_eq!(sweeper.expand_collapsed().await.unwrap(), 2);
    assert_eq!(sweeper.expand_collapsed().await.unwrap(), 0);

    let cancel = CancellationToken::new();
    let sink = CollectingSink::default();
    let report = sweeper
        .run(&SweepContext {
            target: 8,
            cancel: &cancel,
            sink: &sink,
        })
        .await
        .unwrap();
    assert_eq!(report.records.len(), Tree::NODES.len());
}
