use std::time::Duration;

use sweep_core::{Phase, TargetKey};
use sweep_logging::{sweep_debug, sweep_info, sweep_warn};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::convergence::ConvergenceState;
use crate::engine::ProgressSink;
use crate::extract::RecordExtractor;
use crate::index::{collect_visible, RecordIndex};
use crate::surface::{Measurement, Surface};
use crate::{FailureKind, JobProgress, SweepError, SweepReport, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingContainer {
    /// Treat a container that never appears as an empty list.
    NoData,
    /// Fail the job with `FailureKind::ContainerNotFound`.
    Fail,
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub settle_delay: Duration,
    pub step_delay: Duration,
    pub slow_step_delay: Duration,
    pub small_step: i64,
    pub medium_step: i64,
    pub large_step: i64,
    pub medium_step_after: u32,
    pub large_step_after: u32,
    pub slow_delay_after: u32,
    pub rewind_step: i64,
    pub top_threshold: u32,
    pub bottom_threshold: u32,
    pub max_iterations: u64,
    pub offset_tolerance: i64,
    pub page_load_timeout: Duration,
    pub page_load_poll: Duration,
    pub expand_click_delay: Duration,
    pub expand_round_delay: Duration,
    pub max_expand_rounds: u32,
    pub missing_container: MissingContainer,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            step_delay: Duration::from_millis(350),
            slow_step_delay: Duration::from_millis(500),
            small_step: 50,
            medium_step: 80,
            large_step: 150,
            medium_step_after: 4,
            large_step_after: 8,
            slow_delay_after: 5,
            rewind_step: 500,
            top_threshold: 15,
            bottom_threshold: 25,
            max_iterations: 500,
            offset_tolerance: 5,
            page_load_timeout: Duration::from_secs(10),
            page_load_poll: Duration::from_millis(250),
            expand_click_delay: Duration::from_millis(100),
            expand_round_delay: Duration::from_millis(500),
            max_expand_rounds: 50,
            missing_container: MissingContainer::NoData,
        }
    }
}

impl SweepSettings {
    /// Same thresholds with every wait set to zero.
    pub fn without_delays(self) -> Self {
        Self {
            settle_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            slow_step_delay: Duration::ZERO,
            page_load_timeout: Duration::ZERO,
            page_load_poll: Duration::ZERO,
            expand_click_delay: Duration::ZERO,
            expand_round_delay: Duration::ZERO,
            ..self
        }
    }
}

/// Outcome of the page-load wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerWait {
    Present,
    /// The page-load ceiling passed without a container.
    Missing,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Set the scroll position to the start and wait for the settle delay.
    Jump,
    /// Scroll toward the start until the top stays put for `top_threshold`
    /// iterations. Needed where the list loads history lazily upward.
    Converge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPlan {
    pub reset: ResetMode,
    /// Expand collapsed tree nodes before every collection pass.
    pub expand_tree: bool,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            reset: ResetMode::Jump,
            expand_tree: false,
        }
    }
}

/// Per-run wiring: which target, how to observe cancellation, where progress goes.
pub struct SweepContext<'a> {
    pub target: TargetKey,
    pub cancel: &'a CancellationToken,
    pub sink: &'a dyn ProgressSink,
}

impl SweepContext<'_> {
    fn progress(&self, items_seen: usize, iterations: u64, phase: Phase) {
        self.sink.emit(JobProgress {
            target: self.target,
            items_seen: items_seen as u64,
            iterations,
            phase,
        });
    }
}

/// Scroll-and-collect loop over one surface.
pub struct Sweeper<S, X> {
    surface: S,
    extractor: X,
    settings: SweepSettings,
    plan: SweepPlan,
}

impl<S, X> Sweeper<S, X>
where
    S: Surface,
    X: RecordExtractor<S::Node>,
{
    pub fn new(surface: S, extractor: X, settings: SweepSettings, plan: SweepPlan) -> Self {
        Self {
            surface,
            extractor,
            settings,
            plan,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// Polls for the container until the page-load ceiling or a cancel.
    pub async fn wait_for_container(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ContainerWait, SweepError> {
        let deadline = Instant::now() + self.settings.page_load_timeout;
        loop {
            if cancel.is_cancelled() {
                return Ok(ContainerWait::Cancelled);
            }
            if self.surface.container_present().await? {
                return Ok(ContainerWait::Present);
            }
            if Instant::now() >= deadline {
                return Ok(ContainerWait::Missing);
            }
            sleep(self.settings.page_load_poll).await;
        }
    }

    /// Moves to the logical beginning so collection starts from a known point.
    pub async fn reset_to_start(&self, ctx: &SweepContext<'_>) -> Result<(), SweepError> {
        match self.plan.reset {
            ResetMode::Jump => {
                self.surface.jump_to_start().await?;
            }
            ResetMode::Converge => {
                let mut convergence =
                    ConvergenceState::new(self.surface.measure().await?, self.settings.offset_tolerance);
                let mut attempts = 0u64;
                while convergence.stable() < self.settings.top_threshold {
                    if ctx.cancel.is_cancelled() {
                        return Ok(());
                    }
                    if attempts >= self.settings.max_iterations {
                        sweep_warn!(tab = ctx.target; "top not reached after {} attempts", attempts);
                        break;
                    }
                    attempts += 1;
                    self.surface.scroll_by(-self.settings.rewind_step).await?;
                    sleep(self.settings.step_delay).await;
                    convergence.observe(self.surface.measure().await?, 0);
                }
                sweep_debug!(tab = ctx.target; "reached top after {} attempts", attempts);
            }
        }
        sleep(self.settings.settle_delay).await;
        Ok(())
    }

    /// One adaptive increment; returns the measurement after the step delay.
    pub async fn advance(&self, step: i64, delay: Duration) -> Result<Measurement, SweepError> {
        self.surface.scroll_by(step).await?;
        sleep(delay).await;
        Ok(self.surface.measure().await?)
    }

    pub async fn collect_visible(&self, index: &mut RecordIndex) -> Result<usize, SweepError> {
        let nodes = self.surface.visible_nodes().await?;
        Ok(collect_visible(&nodes, &self.extractor, index))
    }

    /// Opens collapsed nodes round by round until a round opens nothing.
    /// Newly opened nodes can reveal further collapsed ones, hence the rounds.
    pub async fn expand_collapsed(&self) -> Result<usize, SweepError> {
        let mut total = 0;
        for _ in 0..self.settings.max_expand_rounds {
            let affordances = self.surface.collapsed_affordances().await?;
            if affordances.is_empty() {
                break;
            }
            let mut expanded = 0;
            for affordance in &affordances {
                if self.surface.trigger(affordance).await? {
                    expanded += 1;
                    sleep(self.settings.expand_click_delay).await;
                }
            }
            if expanded == 0 {
                break;
            }
            total += expanded;
            sleep(self.settings.expand_round_delay).await;
        }
        Ok(total)
    }

    pub async fn run(&self, ctx: &SweepContext<'_>) -> Result<SweepReport, SweepError> {
        let target = ctx.target;
        ctx.progress(0, 0, Phase::Scrolling);

        match self.wait_for_container(ctx.cancel).await? {
            ContainerWait::Present => {}
            ContainerWait::Cancelled => {
                sweep_info!(tab = target; "cancelled while waiting for the container");
                return Ok(SweepReport::new(Vec::new(), 0, Termination::Cancelled));
            }
            ContainerWait::Missing => {
                return match self.settings.missing_container {
                    MissingContainer::NoData => {
                        sweep_info!(tab = target; "container never appeared; treating as empty");
                        Ok(SweepReport::new(Vec::new(), 0, Termination::NoData))
                    }
                    MissingContainer::Fail => Err(SweepError::new(
                        FailureKind::ContainerNotFound,
                        format!(
                            "no scroll container after {:?}",
                            self.settings.page_load_timeout
                        ),
                    )),
                };
            }
        }

        self.reset_to_start(ctx).await?;

        let mut index = RecordIndex::new();
        if self.plan.expand_tree {
            self.expand_collapsed().await?;
        }
        self.collect_visible(&mut index).await?;
        let mut convergence =
            ConvergenceState::new(self.surface.measure().await?, self.settings.offset_tolerance);
        let mut iterations = 0u64;

        let termination = loop {
            if ctx.cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if iterations >= self.settings.max_iterations {
                break Termination::IterationCap;
            }
            iterations += 1;

            let step = convergence.next_step(&self.settings);
            let delay = convergence.next_delay(&self.settings);
            let measurement = self.advance(step, delay).await?;
            if self.plan.expand_tree {
                self.expand_collapsed().await?;
            }
            let added = self.collect_visible(&mut index).await?;
            let stable = convergence.observe(measurement, added);
            if added > 0 {
                sweep_debug!(tab = target; "iteration {}: +{} ({} total)", iterations, added, index.len());
            }
            ctx.progress(index.len(), iterations, Phase::Scrolling);

            if stable >= self.settings.bottom_threshold {
                break Termination::Converged;
            }
        };

        match termination {
            Termination::Cancelled => {
                sweep_info!(tab = target; "cancelled after {} iterations with {} records", iterations, index.len());
            }
            Termination::IterationCap if index.is_empty() => {
                return Err(SweepError::new(
                    FailureKind::Timeout,
                    format!("no records after {iterations} iterations"),
                ));
            }
            Termination::IterationCap => {
                sweep_warn!(tab = target; "iteration cap hit; {} records collected", index.len());
            }
            Termination::Converged | Termination::NoData => {
                sweep_info!(tab = target; "converged after {} iterations with {} records", iterations, index.len());
            }
        }

        ctx.progress(index.len(), iterations, Phase::Collecting);
        if index.malformed() > 0 {
            sweep_debug!(tab = target; "{} malformed node observations dropped", index.malformed());
        }
        ctx.progress(index.len(), iterations, Phase::Finalizing);
        Ok(SweepReport::new(index.into_records(), iterations, termination))
    }
}
