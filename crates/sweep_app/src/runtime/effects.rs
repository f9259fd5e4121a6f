use std::sync::{mpsc, Arc};
use std::thread;

use sweep_core::{Effect, Msg, TargetKey};
use sweep_engine::EngineHandle;
use sweep_logging::{sweep_debug, sweep_error, sweep_info, sweep_warn};

use super::coordinator::Clock;
use super::persistence::ResultStore;
use super::signals::SignalSink;

/// Carries out what `update` asked for. Failures that the state machine must
/// hear about come back as follow-up messages.
pub struct EffectRunner {
    engine: EngineHandle,
    store: Arc<dyn ResultStore>,
    signals: Arc<dyn SignalSink>,
    inbox: mpsc::Sender<Msg>,
    pub(crate) clock: Clock,
}

impl EffectRunner {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn ResultStore>,
        signals: Arc<dyn SignalSink>,
        inbox: mpsc::Sender<Msg>,
        clock: Clock,
    ) -> Self {
        Self {
            engine,
            store,
            signals,
            inbox,
            clock,
        }
    }

    pub fn run(&self, effects: Vec<Effect>) -> Vec<Msg> {
        let mut follow_ups = Vec::new();
        for effect in effects {
            if let Some(msg) = self.run_one(effect) {
                follow_ups.push(msg);
            }
        }
        follow_ups
    }

    fn run_one(&self, effect: Effect) -> Option<Msg> {
        match effect {
            Effect::StartEngine { target, generation } => {
                sweep_info!(tab = target; "starting sweep run {}", generation);
                if let Err(err) = self.engine.start(target, generation) {
                    sweep_warn!(tab = target; "start not delivered: {}", err);
                    return Some(Msg::DeliveryFailed {
                        target,
                        generation,
                        reason: err.to_string(),
                        at: (self.clock)(),
                    });
                }
            }
            Effect::CancelEngine { target } => {
                if let Err(err) = self.engine.cancel(target) {
                    sweep_warn!(tab = target; "cancel not delivered: {}", err);
                }
            }
            Effect::PersistResult { target, entry } => {
                if let Err(err) = self.store.save(target, &entry) {
                    sweep_error!(tab = target; "failed to persist {} result: {}", entry.status.as_str(), err);
                }
            }
            Effect::ClearPersisted { target } => {
                if let Err(err) = self.store.remove(target) {
                    sweep_error!(tab = target; "failed to clear stored result: {}", err);
                }
            }
            Effect::ScheduleExpiry {
                target,
                generation,
                after,
            } => self.schedule_expiry(target, generation, after),
            Effect::Notify {
                target,
                notification,
            } => self.signals.notify(target, &notification),
            Effect::SetBadge { target, badge } => self.signals.badge(target, badge),
        }
        None
    }

    fn schedule_expiry(&self, target: TargetKey, generation: u64, after: std::time::Duration) {
        sweep_debug!(tab = target; "job expires in {:?}", after);
        let inbox = self.inbox.clone();
        thread::spawn(move || {
            thread::sleep(after);
            let _ = inbox.send(Msg::RetentionExpired { target, generation });
        });
    }
}
