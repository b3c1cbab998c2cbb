//! Cache store trait definition.

use super::{CacheStats, EvictionPolicy};
use crate::core::digest::Fingerprint;
use crate::error::StorageError;

/// Trait for cache backends.
///
/// A store is shared by every worker at once, so implementations handle
/// their own synchronisation: callers never lock around these methods.
pub trait CacheStore: Send + Sync {
    /// Look up a payload.
    ///
    /// A record that exists but cannot be read or fails its integrity
    /// check is reported as `Ok(None)`. `Err` is reserved for the storage
    /// layer itself being unusable.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert a payload unless the fingerprint is already present.
    ///
    /// Concurrent writers of the same fingerprint never produce a torn
    /// record; one write wins and the others are discarded.
    fn put(&self, fingerprint: &Fingerprint, payload: &[u8]) -> Result<(), StorageError>;

    /// Check for a fingerprint without reading its payload
    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, StorageError>;

    /// Remove a specific entry
    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StorageError>;

    /// Clear all cached entries
    fn clear(&self) -> Result<(), StorageError>;

    /// Get cache statistics
    fn stats(&self) -> Result<CacheStats, StorageError>;

    /// Drop entries the policy no longer allows
    ///
    /// Returns the number of entries removed.
    fn prune(&self, policy: &EvictionPolicy) -> Result<usize, StorageError>;
}
