use std::sync::{Arc, Mutex, PoisonError};

use sweep_core::{Badge, Notification, TargetKey};
use sweep_logging::sweep_info;

/// Where user-visible signals go: desktop notifications, tab badges, or a log.
pub trait SignalSink: Send + Sync {
    fn notify(&self, target: TargetKey, notification: &Notification);
    fn badge(&self, target: TargetKey, badge: Badge);
}

/// Writes every signal to the log.
pub struct LogSignals;

impl SignalSink for LogSignals {
    fn notify(&self, target: TargetKey, notification: &Notification) {
        sweep_info!(tab = target; "{}: {}", notification.title, notification.message);
    }

    fn badge(&self, target: TargetKey, badge: Badge) {
        if badge == Badge::Clear {
            sweep_info!(tab = target; "badge cleared");
        } else {
            sweep_info!(tab = target; "badge {} ({})", badge.text(), badge.color());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Notified {
        target: TargetKey,
        notification: Notification,
    },
    Badge {
        target: TargetKey,
        badge: Badge,
    },
}

/// Keeps signals in memory so callers can inspect what a run emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingSignals {
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl RecordingSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn notifications_for(&self, target: TargetKey) -> Vec<Notification> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Notified {
                    target: t,
                    notification,
                } if t == target => Some(notification),
                _ => None,
            })
            .collect()
    }

    pub fn last_badge(&self, target: TargetKey) -> Option<Badge> {
        self.signals().into_iter().rev().find_map(|signal| match signal {
            Signal::Badge { target: t, badge } if t == target => Some(badge),
            _ => None,
        })
    }

    fn push(&self, signal: Signal) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }
}

impl SignalSink for RecordingSignals {
    fn notify(&self, target: TargetKey, notification: &Notification) {
        self.push(Signal::Notified {
            target,
            notification: notification.clone(),
        });
    }

    fn badge(&self, target: TargetKey, badge: Badge) {
        self.push(Signal::Badge { target, badge });
    }
}
