//! Checkpoint records and stores.
//!
//! ## Identity
//!
//! Candidate ids embed the validation score, a UTC timestamp, the run id and
//! a per-run sequence number:
//!
//! ```text
//! candidate_score_+0.412345_20240101-120000_trial-7_3
//! ```
//!
//! so concurrent runs sharing a store never collide.
//!
//! ## Best pointer
//!
//! Records are immutable once written. Which record is "best" lives in a
//! separate pointer updated only by [`promote_best`] (or an explicit
//! [`CheckpointStore::set_best`]).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::CheckpointError;
use crate::nn::ParameterSnapshot;

/// Version of the persisted record layout.
pub const CHECKPOINT_SCHEMA: u32 = 1;

const RECORD_EXTENSION: &str = "ckpt";
const BEST_POINTER_FILE: &str = "BEST";

/// Unique checkpoint identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Id for a candidate checkpoint.
    #[must_use]
    pub fn candidate(score: f64, timestamp: DateTime<Utc>, run_id: &str, sequence: u32) -> Self {
        Self(format!(
            "candidate_score_{score:+.6}_{}_{run_id}_{sequence}",
            timestamp.format("%Y%m%d-%H%M%S")
        ))
    }

    /// Wrap an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reproducibility metadata stored with every record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Record layout version.
    pub schema: u32,
    /// Version of this crate that wrote the record.
    pub crate_version: String,
    /// Run that produced the record.
    pub run_id: String,
    /// Global step at capture.
    pub global_step: u64,
    /// Validation score that triggered the write.
    pub score: f64,
    /// Wall-clock capture time.
    pub timestamp: DateTime<Utc>,
    /// Entropy coefficient at capture.
    pub alpha: f64,
    /// Tunable hyperparameters of the run.
    pub hyperparameters: BTreeMap<String, f64>,
}

/// Parameters plus metadata, immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Unique id.
    pub id: CheckpointId,
    /// Provenance.
    pub metadata: CheckpointMetadata,
    /// Approximator parameters.
    pub parameters: ParameterSnapshot,
}

impl CheckpointRecord {
    /// Build a candidate record stamped with the current time.
    pub fn candidate(
        run_id: &str,
        sequence: u32,
        global_step: u64,
        score: f64,
        alpha: f64,
        hyperparameters: BTreeMap<String, f64>,
        parameters: ParameterSnapshot,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            id: CheckpointId::candidate(score, timestamp, run_id, sequence),
            metadata: CheckpointMetadata {
                schema: CHECKPOINT_SCHEMA,
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                run_id: run_id.to_string(),
                global_step,
                score,
                timestamp,
                alpha,
                hyperparameters,
            },
            parameters,
        }
    }
}

/// Key → record map with a separate best pointer.
pub trait CheckpointStore {
    /// Persist a record under its id.
    fn save(&mut self, record: &CheckpointRecord) -> Result<(), CheckpointError>;

    /// Load a record.
    fn load(&self, id: &CheckpointId) -> Result<CheckpointRecord, CheckpointError>;

    /// Every stored id, sorted.
    fn list(&self) -> Result<Vec<CheckpointId>, CheckpointError>;

    /// The current best pointer.
    fn best(&self) -> Result<Option<CheckpointId>, CheckpointError>;

    /// Point "best" at an existing record.
    fn set_best(&mut self, id: &CheckpointId) -> Result<(), CheckpointError>;
}

/// Point "best" at the highest-scoring stored record.
///
/// Returns the promoted id, or `None` for an empty store. Ties keep the
/// first id in sorted order.
pub fn promote_best(store: &mut dyn CheckpointStore) -> Result<Option<CheckpointId>, CheckpointError> {
    let mut best: Option<(CheckpointId, f64)> = None;
    for id in store.list()? {
        let score = store.load(&id)?.metadata.score;
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((id, score));
        }
    }
    match best {
        Some((id, score)) => {
            store.set_best(&id)?;
            info!(id = %id, score, "promoted best checkpoint");
            Ok(Some(id))
        }
        None => Ok(None),
    }
}

/// In-memory store.
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointStore {
    records: FxHashMap<CheckpointId, CheckpointRecord>,
    best: Option<CheckpointId>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&mut self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &CheckpointId) -> Result<CheckpointRecord, CheckpointError> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<CheckpointId>, CheckpointError> {
        let mut ids: Vec<CheckpointId> = self.records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn best(&self) -> Result<Option<CheckpointId>, CheckpointError> {
        Ok(self.best.clone())
    }

    fn set_best(&mut self, id: &CheckpointId) -> Result<(), CheckpointError> {
        if !self.records.contains_key(id) {
            return Err(CheckpointError::NotFound(id.to_string()));
        }
        self.best = Some(id.clone());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct BestPointer {
    schema: u32,
    id: CheckpointId,
}

/// Directory-backed store: one bincode file per record.
///
/// Files are written to a temporary name and renamed into place, so a
/// reader never sees a partially written record.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &CheckpointId) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXTENSION}", id.as_str()))
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        let tmp = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }

    fn read(&self, path: &Path, id: &str) -> Result<Vec<u8>, CheckpointError> {
        fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CheckpointError::NotFound(id.to_string()),
            _ => CheckpointError::Io(err),
        })
    }
}

/// Fail on a payload written by another layout version.
fn check_schema(bytes: &[u8]) -> Result<(), CheckpointError> {
    // Every persisted payload starts with its schema number.
    let found: u32 = bincode::deserialize(bytes)?;
    if found != CHECKPOINT_SCHEMA {
        return Err(CheckpointError::SchemaMismatch {
            expected: CHECKPOINT_SCHEMA,
            found,
        });
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    schema: u32,
    record: CheckpointRecord,
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        let bytes = bincode::serialize(&StoredRecord {
            schema: CHECKPOINT_SCHEMA,
            record: record.clone(),
        })?;
        self.write_atomic(&format!("{}.{RECORD_EXTENSION}", record.id.as_str()), &bytes)
    }

    fn load(&self, id: &CheckpointId) -> Result<CheckpointRecord, CheckpointError> {
        let bytes = self.read(&self.record_path(id), id.as_str())?;
        check_schema(&bytes)?;
        let stored: StoredRecord = bincode::deserialize(&bytes)?;
        Ok(stored.record)
    }

    fn list(&self) -> Result<Vec<CheckpointId>, CheckpointError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(CheckpointId::from_string(stem));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn best(&self) -> Result<Option<CheckpointId>, CheckpointError> {
        let path = self.dir.join(BEST_POINTER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        check_schema(&bytes)?;
        let pointer: BestPointer = bincode::deserialize(&bytes)?;
        Ok(Some(pointer.id))
    }

    fn set_best(&mut self, id: &CheckpointId) -> Result<(), CheckpointError> {
        if !self.record_path(id).exists() {
            return Err(CheckpointError::NotFound(id.to_string()));
        }
        let bytes = bincode::serialize(&BestPointer {
            schema: CHECKPOINT_SCHEMA,
            id: id.clone(),
        })?;
        self.write_atomic(BEST_POINTER_FILE, &bytes)
    }
}
