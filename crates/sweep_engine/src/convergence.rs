use std::time::Duration;

use crate::surface::Measurement;
use crate::sweep::SweepSettings;

/// Termination bookkeeping for one scroll loop.
///
/// `stable` counts consecutive iterations where the measurement did not move
/// AND nothing new was collected; either signal changing resets it.
/// `tail_unchanged` only looks at the measurement and drives the adaptive
/// step size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceState {
    last: Measurement,
    stable: u32,
    tail_unchanged: u32,
    offset_tolerance: i64,
}

impl ConvergenceState {
    pub fn new(initial: Measurement, offset_tolerance: i64) -> Self {
        Self {
            last: initial,
            stable: 0,
            tail_unchanged: 0,
            offset_tolerance,
        }
    }

    /// Folds one post-advance observation in and returns the stability counter.
    pub fn observe(&mut self, measurement: Measurement, added: usize) -> u32 {
        let unchanged = measurement.is_stationary(&self.last, self.offset_tolerance);
        if unchanged {
            self.tail_unchanged += 1;
        } else {
            self.tail_unchanged = 0;
        }
        if unchanged && added == 0 {
            self.stable += 1;
        } else {
            self.stable = 0;
        }
        self.last = measurement;
        self.stable
    }

    pub fn stable(&self) -> u32 {
        self.stable
    }

    pub fn tail_unchanged(&self) -> u32 {
        self.tail_unchanged
    }

    pub fn last(&self) -> &Measurement {
        &self.last
    }

    /// Small steps while the tail moves, larger ones once it has stalled.
    pub fn next_step(&self, settings: &SweepSettings) -> i64 {
        if self.tail_unchanged > settings.large_step_after {
            settings.large_step
        } else if self.tail_unchanged > settings.medium_step_after {
            settings.medium_step
        } else {
            settings.small_step
        }
    }

    pub fn next_delay(&self, settings: &SweepSettings) -> Duration {
        if self.tail_unchanged > settings.slow_delay_after {
            settings.slow_step_delay
        } else {
            settings.step_delay
        }
    }
}
