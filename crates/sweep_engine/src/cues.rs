use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use sweep_logging::{sweep_debug, sweep_warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

/// Lazy, unbounded source of "something may have changed" signals.
pub type ChangeTicks = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// One tick per `period`, the first immediately.
pub fn poll_ticks(period: Duration) -> ChangeTicks {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Box::pin(stream::unfold(timer, |mut timer| async move {
        timer.tick().await;
        Some(((), timer))
    }))
}

/// Ticks forwarded from a mutation observer; ends when every sender is gone.
pub fn mutation_ticks(rx: mpsc::Receiver<()>) -> ChangeTicks {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|()| ((), rx))
    }))
}

pub fn merge_ticks(a: ChangeTicks, b: ChangeTicks) -> ChangeTicks {
    Box::pin(stream::select(a, b))
}

/// Lets an event through only if `min_interval` has passed since the last one that got through.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    min_interval: Duration,
    last_fired: Option<Instant>,
}

impl DebounceGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_fired: None,
        }
    }

    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_fired = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    HandRaised,
    HandLowered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Raised { delta: usize },
    Lowered { delta: usize },
}

impl Transition {
    pub fn cue(self) -> Cue {
        match self {
            Transition::Raised { .. } => Cue::HandRaised,
            Transition::Lowered { .. } => Cue::HandLowered,
        }
    }
}

/// Turns sampled indicator counts into debounced up/down transitions.
///
/// The first sample only sets the baseline: indicators already showing when
/// watching starts are not announced.
#[derive(Debug, Clone)]
pub struct TransitionDetector {
    last: Option<usize>,
    up: DebounceGate,
    down: DebounceGate,
}

impl TransitionDetector {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

    pub fn new(window: Duration) -> Self {
        Self {
            last: None,
            up: DebounceGate::new(window),
            down: DebounceGate::new(window),
        }
    }

    pub fn observe(&mut self, count: usize, now: Instant) -> Option<Transition> {
        let previous = self.last.replace(count)?;
        if count > previous {
            self.up
                .try_fire(now)
                .then_some(Transition::Raised { delta: count - previous })
        } else if count < previous {
            self.down
                .try_fire(now)
                .then_some(Transition::Lowered { delta: previous - count })
        } else {
            None
        }
    }
}

impl Default for TransitionDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CueError {
    #[error("cue playback failed: {0}")]
    Playback(String),
    #[error("cue queue closed")]
    Closed,
}

#[async_trait]
pub trait CuePlayer: Send + Sync {
    /// Resolves once the cue has finished playing.
    async fn play(&self, cue: Cue) -> Result<(), CueError>;
}

/// Single-consumer queue: cues play one at a time, in push order, with a gap between them.
#[derive(Clone)]
pub struct CueQueue {
    tx: mpsc::UnboundedSender<Cue>,
    enabled: Arc<AtomicBool>,
}

impl CueQueue {
    /// Must be called inside a tokio runtime.
    pub fn spawn<P>(player: P, gap: Duration) -> (Self, JoinHandle<()>)
    where
        P: CuePlayer + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let enabled = Arc::new(AtomicBool::new(true));
        let drain_enabled = enabled.clone();

        let handle = tokio::spawn(async move {
            while let Some(cue) = rx.recv().await {
                if !drain_enabled.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(err) = player.play(cue).await {
                    sweep_warn!("{:?}: {}", cue, err);
                }
                if !rx.is_empty() {
                    sleep(gap).await;
                }
            }
            sweep_debug!("cue queue drained and closed");
        });

        (Self { tx, enabled }, handle)
    }

    pub fn push(&self, cue: Cue) -> Result<(), CueError> {
        if self.tx.is_closed() {
            return Err(CueError::Closed);
        }
        if !self.is_enabled() {
            return Ok(());
        }
        self.tx.send(cue).map_err(|_| CueError::Closed)
    }

    /// While disabled, queued and newly pushed cues are dropped unplayed.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Samples on every tick and queues a cue per accepted transition.
/// Returns when the tick source ends.
pub async fn watch<F>(
    mut ticks: ChangeTicks,
    mut sample: F,
    mut detector: TransitionDetector,
    queue: &CueQueue,
) -> Result<(), CueError>
where
    F: FnMut() -> usize + Send,
{
    while ticks.next().await.is_some() {
        if let Some(transition) = detector.observe(sample(), Instant::now()) {
            sweep_debug!("transition {:?}", transition);
            queue.push(transition.cue())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_holds_for_min_interval() {
        let start = Instant::now();
        let mut gate = DebounceGate::new(Duration::from_millis(100));

        assert!(gate.try_fire(start));
        assert!(!gate.try_fire(start + Duration::from_millis(99)));
        assert!(gate.try_fire(start + Duration::from_millis(100)));
        gate.reset();
        assert!(gate.try_fire(start + Duration::from_millis(101)));
    }

    #[test]
    fn first_sample_is_baseline() {
        let now = Instant::now();
        let mut detector = TransitionDetector::default();
        assert_eq!(detector.observe(3, now), None);
        assert_eq!(
            detector.observe(1, now),
            Some(Transition::Lowered { delta: 2 })
        );
        assert_eq!(detector.observe(1, now), None);
    }

    #[test]
    fn up_and_down_gates_are_independent() {
        let now = Instant::now();
        let mut detector = TransitionDetector::new(Duration::from_secs(10));
        detector.observe(0, now);
        assert!(detector.observe(1, now).is_some());
        assert!(detector.observe(0, now).is_some());
        assert!(detector.observe(1, now).is_none());
    }
}
