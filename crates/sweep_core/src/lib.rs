//! Scrollsweep core: pure job coordinator state machine and view-model helpers.
mod effect;
mod msg;
mod record;
mod state;
mod update;
mod view_model;

pub use effect::{Badge, Effect, Notification, PersistedEntry};
pub use msg::{Completion, Msg, ProgressSnapshot, RestoredJob};
pub use record::Record;
pub use state::{
    CoordinatorState, Job, JobResult, JobStatus, Phase, Progress, TargetKey, Timestamp,
    DEFAULT_RETENTION,
};
pub use update::update;
pub use view_model::{CoordinatorView, JobRowView};
