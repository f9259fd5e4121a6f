use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sweep_core::{JobResult, JobStatus, PersistedEntry, Record, TargetKey, Timestamp};
use sweep_engine::{AtomicFileWriter, PersistError};
use sweep_logging::{sweep_debug, sweep_warn};
use thiserror::Error;

const FILE_PREFIX: &str = "export_state_";
const FILE_SUFFIX: &str = ".ron";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode entry: {0}")]
    Encode(#[from] ron::Error),
    #[error("failed to parse {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("unknown job status `{0}`")]
    UnknownStatus(String),
}

/// Durable per-target record of the last finished job.
pub trait ResultStore: Send + Sync {
    fn save(&self, target: TargetKey, entry: &PersistedEntry) -> Result<(), StoreError>;
    fn load(&self, target: TargetKey) -> Result<Option<PersistedEntry>, StoreError>;
    fn remove(&self, target: TargetKey) -> Result<(), StoreError>;
    fn load_all(&self) -> Result<Vec<(TargetKey, PersistedEntry)>, StoreError>;
    /// Drops entries saved before `cutoff`; returns how many were dropped.
    fn prune(&self, cutoff: Timestamp) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    identity: String,
    fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResult {
    records: Vec<StoredRecord>,
    iterations: u64,
    complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    status: String,
    saved_at: Timestamp,
    #[serde(default)]
    result: Option<StoredResult>,
    #[serde(default)]
    error: Option<String>,
}

impl From<&PersistedEntry> for StoredEntry {
    fn from(entry: &PersistedEntry) -> Self {
        Self {
            status: entry.status.as_str().to_string(),
            saved_at: entry.saved_at,
            result: entry.result.as_ref().map(|result| StoredResult {
                records: result
                    .records
                    .iter()
                    .map(|record| StoredRecord {
                        identity: record.identity().to_string(),
                        fields: record.fields().to_vec(),
                    })
                    .collect(),
                iterations: result.iterations,
                complete: result.complete,
            }),
            error: entry.error.clone(),
        }
    }
}

impl TryFrom<StoredEntry> for PersistedEntry {
    type Error = StoreError;

    fn try_from(stored: StoredEntry) -> Result<Self, Self::Error> {
        let status = match stored.status.as_str() {
            "cancelled" => JobStatus::Cancelled,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => return Err(StoreError::UnknownStatus(other.to_string())),
        };
        let result = stored.result.map(|result| {
            let records = result
                .records
                .into_iter()
                .map(|stored| {
                    stored
                        .fields
                        .into_iter()
                        .fold(Record::new(stored.identity), |record, (name, value)| {
                            record.with_field(name, value)
                        })
                })
                .collect();
            JobResult::new(records, result.iterations, result.complete)
        });
        Ok(PersistedEntry {
            status,
            saved_at: stored.saved_at,
            result,
            error: stored.error,
        })
    }
}

/// One RON file per target under a state directory.
pub struct RonFileStore {
    writer: AtomicFileWriter,
}

impl RonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    fn filename(target: TargetKey) -> String {
        format!("{FILE_PREFIX}{target}{FILE_SUFFIX}")
    }

    fn target_of(filename: &str) -> Option<TargetKey> {
        filename
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }

    fn read(&self, path: &Path) -> Result<Option<PersistedEntry>, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let stored: StoredEntry = ron::from_str(&content).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        PersistedEntry::try_from(stored).map(Some)
    }
}

impl ResultStore for RonFileStore {
    fn save(&self, target: TargetKey, entry: &PersistedEntry) -> Result<(), StoreError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&StoredEntry::from(entry), pretty)?;
        let path = self.writer.write(&Self::filename(target), &content)?;
        sweep_debug!(tab = target; "saved {} entry to {:?}", entry.status.as_str(), path);
        Ok(())
    }

    fn load(&self, target: TargetKey) -> Result<Option<PersistedEntry>, StoreError> {
        self.read(&self.dir().join(Self::filename(target)))
    }

    fn remove(&self, target: TargetKey) -> Result<(), StoreError> {
        self.writer.remove(&Self::filename(target))?;
        Ok(())
    }

    /// Unreadable files are skipped with a warning so one bad entry cannot hide the rest.
    fn load_all(&self) -> Result<Vec<(TargetKey, PersistedEntry)>, StoreError> {
        let entries = match fs::read_dir(self.dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut loaded = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name();
            let Some(target) = name.to_str().and_then(Self::target_of) else {
                continue;
            };
            match self.read(&entry.path()) {
                Ok(Some(persisted)) => loaded.push((target, persisted)),
                Ok(None) => {}
                Err(err) => sweep_warn!(tab = target; "skipping stored entry: {}", err),
            }
        }
        loaded.sort_by_key(|(target, _)| *target);
        Ok(loaded)
    }

    fn prune(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let mut pruned = 0;
        for (target, entry) in self.load_all()? {
            if entry.saved_at < cutoff {
                self.remove(target)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<TargetKey, PersistedEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn save(&self, target: TargetKey, entry: &PersistedEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target, entry.clone());
        Ok(())
    }

    fn load(&self, target: TargetKey) -> Result<Option<PersistedEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .cloned())
    }

    fn remove(&self, target: TargetKey) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&target);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<(TargetKey, PersistedEntry)>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(target, entry)| (*target, entry.clone()))
            .collect())
    }

    fn prune(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.saved_at >= cutoff);
        Ok(before - entries.len())
    }
}
