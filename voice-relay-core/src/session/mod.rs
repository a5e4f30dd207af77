//! Session management for conversation history
//!
//! Each user gets one transcript record, keyed by a sanitized form of their
//! identifier. Records idle for longer than the configured threshold are
//! discarded on the next read or by [`SessionStore::purge_expired`].

pub mod backend;
pub mod clock;
pub mod key;
pub mod merge;
pub mod store;
pub mod transcript;

pub use backend::{FileBackend, MemoryBackend, SessionBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{sanitize_key, storage_key, MAX_KEY_LEN};
pub use merge::merge_turn;
pub use store::{SessionInfo, SessionStore};
pub use transcript::{Part, Role, Transcript, Turn};
