use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use sweep_core::TargetKey;
use sweep_logging::{sweep_debug, sweep_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::extract::RecordExtractor;
use crate::surface::Surface;
use crate::sweep::{SweepContext, Sweeper};
use crate::{EngineEvent, JobProgress, SweepError, SweepReport};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: JobProgress);
}

/// Forwards progress of one run to the engine event channel.
pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
    run: u64,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>, run: u64) -> Self {
        Self { tx, run }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, progress: JobProgress) {
        let _ = self.tx.send(EngineEvent::Progress {
            run: self.run,
            progress,
        });
    }
}

/// Something a sweep can run against: one attached tab or recording.
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn sweep(
        &self,
        target: TargetKey,
        cancel: CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<SweepReport, SweepError>;
}

#[async_trait]
impl<S, X> SweepTarget for Sweeper<S, X>
where
    S: Surface,
    X: RecordExtractor<S::Node>,
{
    async fn sweep(
        &self,
        target: TargetKey,
        cancel: CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<SweepReport, SweepError> {
        let ctx = SweepContext {
            target,
            cancel: &cancel,
            sink,
        };
        self.run(&ctx).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("no target attached for key {0}")]
    TargetGone(TargetKey),
    #[error("engine thread stopped")]
    EngineStopped,
}

enum EngineCommand {
    Start {
        target: TargetKey,
        run: u64,
        runner: Arc<dyn SweepTarget>,
    },
    Cancel {
        target: TargetKey,
    },
}

type Targets = Arc<Mutex<HashMap<TargetKey, Arc<dyn SweepTarget>>>>;
/// Live runs keyed by target, each tagged with the run id that owns the slot.
type Running = Arc<Mutex<HashMap<TargetKey, (u64, CancellationToken)>>>;

/// Front door to the engine thread. Cloning shares the same thread and event stream.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
    targets: Targets,
}

impl EngineHandle {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            let running: Running = Arc::default();
            while let Ok(command) = cmd_rx.recv() {
                handle_command(&runtime, &running, command, &event_tx);
            }
            if let Ok(map) = running.lock() {
                for (_, token) in map.values() {
                    token.cancel();
                }
            };
        });

        Self {
            cmd_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            targets: Arc::default(),
        }
    }

    pub fn attach(&self, target: TargetKey, runner: Arc<dyn SweepTarget>) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.insert(target, runner);
        }
    }

    /// Forgets the target and cancels any sweep still running against it.
    pub fn detach(&self, target: TargetKey) {
        let removed = self
            .targets
            .lock()
            .map(|mut targets| targets.remove(&target).is_some())
            .unwrap_or(false);
        if removed {
            let _ = self.cmd_tx.send(EngineCommand::Cancel { target });
        }
    }

    pub fn is_attached(&self, target: TargetKey) -> bool {
        self.targets
            .lock()
            .map(|targets| targets.contains_key(&target))
            .unwrap_or(false)
    }

    /// Starts a sweep tagged `run`; every event of that sweep carries the same id.
    /// If an earlier run still owns the target the engine answers with
    /// `EngineEvent::StartRejected`.
    pub fn start(&self, target: TargetKey, run: u64) -> Result<(), DeliveryError> {
        let runner = self
            .targets
            .lock()
            .ok()
            .and_then(|targets| targets.get(&target).cloned())
            .ok_or(DeliveryError::TargetGone(target))?;
        self.cmd_tx
            .send(EngineCommand::Start {
                target,
                run,
                runner,
            })
            .map_err(|_| DeliveryError::EngineStopped)
    }

    pub fn cancel(&self, target: TargetKey) -> Result<(), DeliveryError> {
        self.cmd_tx
            .send(EngineCommand::Cancel { target })
            .map_err(|_| DeliveryError::EngineStopped)
    }

    /// `Ok(None)` when nothing is pending.
    pub fn try_recv(&self) -> Result<Option<EngineEvent>, DeliveryError> {
        let rx = self.event_rx.lock().map_err(|_| DeliveryError::EngineStopped)?;
        match rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(DeliveryError::EngineStopped),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>, DeliveryError> {
        let rx = self.event_rx.lock().map_err(|_| DeliveryError::EngineStopped)?;
        match rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeliveryError::EngineStopped),
        }
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_command(
    runtime: &tokio::runtime::Runtime,
    running: &Running,
    command: EngineCommand,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    match command {
        EngineCommand::Start {
            target,
            run,
            runner,
        } => {
            let token = CancellationToken::new();
            let accepted = match running.lock() {
                Ok(mut map) => {
                    let busy = map
                        .get(&target)
                        .is_some_and(|(_, existing)| !existing.is_cancelled());
                    if !busy {
                        map.insert(target, (run, token.clone()));
                    }
                    !busy
                }
                Err(_) => false,
            };
            if !accepted {
                sweep_debug!(tab = target; "run {} rejected; target busy", run);
                let _ = event_tx.send(EngineEvent::StartRejected { target, run });
                return;
            }

            let running = running.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let sink = ChannelProgressSink::new(event_tx.clone(), run);
                let result = runner.sweep(target, token.clone(), &sink).await;
                if let Ok(mut map) = running.lock() {
                    // A newer run may already own the slot.
                    if map.get(&target).is_some_and(|(owner, _)| *owner == run) {
                        map.remove(&target);
                    }
                }
                if let Err(err) = &result {
                    sweep_warn!(tab = target; "sweep failed: {}", err);
                }
                let _ = event_tx.send(EngineEvent::JobCompleted {
                    target,
                    run,
                    result,
                });
            });
        }
        EngineCommand::Cancel { target } => {
            if let Ok(map) = running.lock() {
                if let Some((_, token)) = map.get(&target) {
                    token.cancel();
                }
            }
        }
    }
}
