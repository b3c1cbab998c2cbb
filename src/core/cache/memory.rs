//! In-memory cache backend for testing.

use super::{CacheEntry, CacheStats, CacheStore, EvictionPolicy};
use crate::core::digest::Fingerprint;
use crate::error::StorageError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Number of independently locked shards
const SHARDS: usize = 16;

type Shard = RwLock<HashMap<Fingerprint, CacheEntry>>;

/// In-memory cache backend
///
/// Entries are spread over [`SHARDS`] locks by the first fingerprint byte,
/// so workers touching different fingerprints rarely contend.
pub struct InMemoryStore {
    shards: Vec<Shard>,
}

impl InMemoryStore {
    /// Create a new in-memory cache
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, fingerprint: &Fingerprint) -> &Shard {
        &self.shards[fingerprint.as_bytes()[0] as usize % SHARDS]
    }

    fn read(shard: &Shard) -> Result<RwLockReadGuard<'_, HashMap<Fingerprint, CacheEntry>>, StorageError> {
        shard.read().map_err(|_| StorageError::Poisoned {
            path: PathBuf::from("memory"),
        })
    }

    fn write(shard: &Shard) -> Result<RwLockWriteGuard<'_, HashMap<Fingerprint, CacheEntry>>, StorageError> {
        shard.write().map_err(|_| StorageError::Poisoned {
            path: PathBuf::from("memory"),
        })
    }

    /// Creation times of every entry, oldest first
    fn ages(&self) -> Result<Vec<(SystemTime, Fingerprint)>, StorageError> {
        let mut ages = Vec::new();
        for shard in &self.shards {
            let entries = Self::read(shard)?;
            ages.extend(entries.values().map(|e| (e.created_at, e.fingerprint)));
        }
        ages.sort();
        Ok(ages)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for InMemoryStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = Self::read(self.shard(fingerprint))?;
        Ok(entries.get(fingerprint).map(|e| e.payload.clone()))
    }

    fn put(&self, fingerprint: &Fingerprint, payload: &[u8]) -> Result<(), StorageError> {
        let mut entries = Self::write(self.shard(fingerprint))?;
        entries
            .entry(*fingerprint)
            .or_insert_with(|| CacheEntry::new(*fingerprint, payload.to_vec()));
        Ok(())
    }

    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, StorageError> {
        Ok(Self::read(self.shard(fingerprint))?.contains_key(fingerprint))
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StorageError> {
        Self::write(self.shard(fingerprint))?.remove(fingerprint);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        for shard in &self.shards {
            Self::write(shard)?.clear();
        }
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, StorageError> {
        let mut stats = CacheStats::default();
        for shard in &self.shards {
            let entries = Self::read(shard)?;
            stats.total_entries += entries.len();
            stats.total_size_bytes += entries.values().map(|e| e.payload.len() as u64).sum::<u64>();
            for entry in entries.values() {
                let t = Some(entry.created_at);
                stats.oldest_entry = stats.oldest_entry.min(t).or(t);
                stats.newest_entry = stats.newest_entry.max(t);
            }
        }
        Ok(stats)
    }

    fn prune(&self, policy: &EvictionPolicy) -> Result<usize, StorageError> {
        let doomed: Vec<Fingerprint> = match *policy {
            EvictionPolicy::Never => return Ok(0),
            EvictionPolicy::MaxEntries(keep) => {
                let ages = self.ages()?;
                let excess = ages.len().saturating_sub(keep);
                ages.into_iter().take(excess).map(|(_, fp)| fp).collect()
            }
            EvictionPolicy::MaxAge(max_age) => {
                let now = SystemTime::now();
                self.ages()?
                    .into_iter()
                    .filter(|(created, _)| {
                        now.duration_since(*created).map(|age| age > max_age).unwrap_or(false)
                    })
                    .map(|(_, fp)| fp)
                    .collect()
            }
        };

        for fingerprint in &doomed {
            self.remove(fingerprint)?;
        }
        Ok(doomed.len())
    }
}
