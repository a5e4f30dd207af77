//! Session store: per-user transcripts with idle expiry

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::backend::{FileBackend, MemoryBackend, SessionBackend};
use super::key::storage_key;
use super::transcript::Transcript;
use crate::config::schema::{SessionsConfig, DEFAULT_IDLE_TIMEOUT_SECS};
use crate::Result;

/// Summary of a stored session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Sanitized storage key
    pub key: String,
    /// Number of turns, `None` when the record could not be parsed
    pub turns: Option<usize>,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Whether the record is past the idle threshold
    pub expired: bool,
}

/// Maps user identifiers to conversation transcripts
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    idle_timeout: Duration,
}

impl SessionStore {
    /// Create a store over any backend
    pub fn new(backend: Arc<dyn SessionBackend>, idle_timeout: Duration) -> Self {
        Self {
            backend,
            idle_timeout,
        }
    }

    /// File-backed store rooted at `dir` with the default idle threshold
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Ok(Self::new(
            Arc::new(FileBackend::new(dir)?),
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        ))
    }

    /// File-backed store built from configuration
    pub fn from_config(config: &SessionsConfig) -> Result<Self> {
        let dir = config.resolved_dir();
        info!("Session records stored in {}", dir.display());
        Ok(Self::new(
            Arc::new(FileBackend::new(dir)?),
            Duration::from_secs(config.idle_timeout_secs),
        ))
    }

    /// In-memory store, mostly for tests
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Load the transcript for `user_id`
    ///
    /// Missing and expired records both yield an empty transcript; an expired
    /// record is removed before returning. Unparseable records surface as
    /// [`crate::Error::CorruptSession`].
    pub fn load(&self, user_id: &str) -> Result<Transcript> {
        let key = storage_key(user_id);

        if self.backend.is_expired(&key, self.idle_timeout)? {
            info!(key = %key, "Session expired, starting fresh");
            self.backend.remove(&key)?;
            return Ok(Transcript::new());
        }

        let transcript = self.backend.get(&key)?.unwrap_or_default();
        debug!(key = %key, turns = transcript.len(), "Loaded session");
        Ok(transcript)
    }

    /// Overwrite the transcript for `user_id`
    pub fn save(&self, user_id: &str, transcript: &Transcript) -> Result<()> {
        let key = storage_key(user_id);
        self.backend.put(&key, transcript)
    }

    /// Remove the record for `user_id`, returning whether one existed
    pub fn discard(&self, user_id: &str) -> Result<bool> {
        let key = storage_key(user_id);
        self.backend.remove(&key)
    }

    /// Remove every expired record, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.backend.keys()? {
            match self.backend.is_expired(&key, self.idle_timeout) {
                Ok(true) => {
                    if self.backend.remove(&key)? {
                        removed += 1;
                    }
                }
                Ok(false) => {}
                // The record may have been removed concurrently.
                Err(e) => warn!(key = %key, error = %e, "Skipping session during purge"),
            }
        }
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    /// Describe all stored sessions
    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();
        for key in self.backend.keys()? {
            let turns = self.backend.get(&key).ok().flatten().map(|t| t.len());
            let modified = self.backend.modified(&key)?;
            let expired = self.backend.is_expired(&key, self.idle_timeout)?;
            sessions.push(SessionInfo {
                key,
                turns,
                modified,
                expired,
            });
        }
        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(sessions)
    }
}
