//! Scrollsweep application layer: the job coordinator runtime, durable
//! results, configuration and the command-line front end.
pub mod cli;
mod runtime;

pub use runtime::config::{
    AppConfig, ConfigError, MissingContainerPolicy, SweepOverrides, DEFAULT_CONFIG_FILE,
};
pub use runtime::coordinator::{system_clock, Clock, Coordinator, StartResponse};
pub use runtime::effects::EffectRunner;
pub use runtime::logging::{initialize as initialize_logging, LogDestination};
pub use runtime::persistence::{MemoryStore, ResultStore, RonFileStore, StoreError};
pub use runtime::signals::{LogSignals, RecordingSignals, Signal, SignalSink};
