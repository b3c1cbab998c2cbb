//! # Cache Module
//!
//! Persists the output of deterministic operations so identical work is
//! never repeated, within a run or across runs.
//!
//! ## Keys and values
//! Keys are [`Fingerprint`]s. Values are opaque byte payloads; the
//! [`record`] module frames pixel buffers and detections into them.
//!
//! ## Guarantees
//! - Insert-if-absent: the first write for a fingerprint wins, later
//!   writes are discarded because equal fingerprints mean equal values
//! - A record that cannot be read back is reported as a miss
//! - Nothing is evicted unless an [`EvictionPolicy`] is configured
//!
//! ## Backends
//! - `SqliteStore` - Persistent storage using SQLite
//! - `InMemoryStore` - For tests and cache-less runs within one process

mod memory;
pub mod record;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::CacheStore;

use crate::core::digest::Fingerprint;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A stored result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: Vec<u8>,
    /// When the entry was written
    pub created_at: SystemTime,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, payload: Vec<u8>) -> Self {
        Self {
            fingerprint,
            payload,
            created_at: SystemTime::now(),
        }
    }
}

/// Integrity checksum stored beside each payload
pub(crate) fn checksum(payload: &[u8]) -> [u8; 32] {
    *blake3::hash(payload).as_bytes()
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Total size of cached payloads in bytes
    pub total_size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

/// When entries may be dropped. Callers must never assume an entry is
/// permanent, even under [`EvictionPolicy::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Keep everything (default)
    #[default]
    Never,
    /// Keep only the newest `n` entries
    MaxEntries(usize),
    /// Drop entries older than the given age
    MaxAge(Duration),
}
