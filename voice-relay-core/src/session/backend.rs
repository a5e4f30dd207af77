//! Storage backends for session records
//!
//! A backend maps a sanitized key to a [`Transcript`] and knows when each
//! record was last modified. Expiry policy lives in the store; backends only
//! report modification times and the current time of their clock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::transcript::Transcript;
use crate::{Error, Result};

const RECORD_EXTENSION: &str = "json";

/// Key-value capability backing the session store
pub trait SessionBackend: Send + Sync {
    /// Read the record at `key`, if any
    fn get(&self, key: &str) -> Result<Option<Transcript>>;

    /// Replace the record at `key`
    fn put(&self, key: &str, transcript: &Transcript) -> Result<()>;

    /// Remove the record at `key`, returning whether one existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// All stored keys
    fn keys(&self) -> Result<Vec<String>>;

    /// Last modification time of the record at `key`
    fn modified(&self, key: &str) -> Result<Option<SystemTime>>;

    /// Current time as seen by this backend
    fn now(&self) -> SystemTime;

    /// Whether the record at `key` has been idle for longer than `idle`
    fn is_expired(&self, key: &str, idle: Duration) -> Result<bool> {
        let Some(modified) = self.modified(key)? else {
            return Ok(false);
        };
        // A modification time ahead of the clock counts as fresh.
        let age = self.now().duration_since(modified).unwrap_or_default();
        Ok(age > idle)
    }
}

/// One JSON file per record, expiry from file modification time
pub struct FileBackend {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileBackend {
    /// Create a backend rooted at `dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(dir: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = Self::create_dir(dir.as_ref())?;
        Ok(Self { dir, clock })
    }

    fn create_dir(dir: &Path) -> Result<PathBuf> {
        crate::utils::ensure_dir(dir).map_err(|e| {
            Error::Session(format!(
                "failed to create session directory {}: {}",
                dir.display(),
                e
            ))
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }
}

impl SessionBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Transcript>> {
        let path = self.record_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::CorruptSession {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn put(&self, key: &str, transcript: &Transcript) -> Result<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension("tmp");
        let content = serde_json::to_string(transcript)?;

        // The directory may have been removed since construction.
        Self::create_dir(&self.dir)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!(key, turns = transcript.len(), "Wrote session record");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn modified(&self, key: &str) -> Result<Option<SystemTime>> {
        match std::fs::metadata(self.record_path(key)) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn now(&self) -> SystemTime {
        self.clock.now()
    }
}

/// In-memory backend; modification times come from its clock
pub struct MemoryBackend {
    records: Mutex<HashMap<String, (Transcript, SystemTime)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Transcript>> {
        Ok(self.records.lock().get(key).map(|(t, _)| t.clone()))
    }

    fn put(&self, key: &str, transcript: &Transcript) -> Result<()> {
        let now = self.clock.now();
        self.records
            .lock()
            .insert(key.to_string(), (transcript.clone(), now));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.records.lock().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.records.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn modified(&self, key: &str) -> Result<Option<SystemTime>> {
        Ok(self.records.lock().get(key).map(|(_, at)| *at))
    }

    fn now(&self) -> SystemTime {
        self.clock.now()
    }
}
