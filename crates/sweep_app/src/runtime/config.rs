use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweep_engine::{MissingContainer, SweepSettings};
use thiserror::Error;

use super::logging::LogDestination;

pub const DEFAULT_CONFIG_FILE: &str = "scrollsweep.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("unknown log level `{0}`")]
    LogLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingContainerPolicy {
    NoData,
    Fail,
}

impl From<MissingContainerPolicy> for MissingContainer {
    fn from(policy: MissingContainerPolicy) -> Self {
        match policy {
            MissingContainerPolicy::NoData => MissingContainer::NoData,
            MissingContainerPolicy::Fail => MissingContainer::Fail,
        }
    }
}

/// Optional overrides on top of `SweepSettings::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOverrides {
    pub settle_delay_ms: Option<u64>,
    pub step_delay_ms: Option<u64>,
    pub slow_step_delay_ms: Option<u64>,
    pub top_threshold: Option<u32>,
    pub bottom_threshold: Option<u32>,
    pub max_iterations: Option<u64>,
    pub page_load_timeout_ms: Option<u64>,
    pub offset_tolerance: Option<i64>,
    pub missing_container: Option<MissingContainerPolicy>,
}

impl SweepOverrides {
    pub fn apply(&self, mut settings: SweepSettings) -> SweepSettings {
        let ms = Duration::from_millis;
        if let Some(v) = self.settle_delay_ms {
            settings.settle_delay = ms(v);
        }
        if let Some(v) = self.step_delay_ms {
            settings.step_delay = ms(v);
        }
        if let Some(v) = self.slow_step_delay_ms {
            settings.slow_step_delay = ms(v);
        }
        if let Some(v) = self.top_threshold {
            settings.top_threshold = v;
        }
        if let Some(v) = self.bottom_threshold {
            settings.bottom_threshold = v;
        }
        if let Some(v) = self.max_iterations {
            settings.max_iterations = v;
        }
        if let Some(v) = self.page_load_timeout_ms {
            settings.page_load_timeout = ms(v);
        }
        if let Some(v) = self.offset_tolerance {
            settings.offset_tolerance = v;
        }
        if let Some(v) = self.missing_container {
            settings.missing_container = v.into();
        }
        settings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_destination: LogDestination,
    pub log_file: PathBuf,
    pub state_dir: PathBuf,
    pub output_dir: PathBuf,
    pub retention_secs: u64,
    /// Sender name for own chat messages when no reply reveals the real one.
    pub self_name: String,
    pub sweep: SweepOverrides,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_destination: LogDestination::Terminal,
            log_file: PathBuf::from("scrollsweep.log"),
            state_dir: PathBuf::from(".scrollsweep"),
            output_dir: PathBuf::from("exports"),
            retention_secs: sweep_core::DEFAULT_RETENTION.as_secs(),
            self_name: "Вы".to_string(),
            sweep: SweepOverrides::default(),
        }
    }
}

impl AppConfig {
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.level()?;
        Ok(config)
    }

    pub fn level(&self) -> Result<log::LevelFilter, ConfigError> {
        sweep_logging::parse_level(&self.log_level)
            .ok_or_else(|| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        self.sweep.apply(SweepSettings::default())
    }
}
