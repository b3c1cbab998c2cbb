//! SQLite cache backend for persistent storage.

use super::{checksum, CacheStats, CacheStore, EvictionPolicy};
use crate::core::digest::Fingerprint;
use crate::error::StorageError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed persistent cache
///
/// Uses WAL (Write-Ahead Logging) so readers proceed while a write is in
/// progress. Each worker checks out its own connection from a small idle
/// list, so lookups from different workers do not serialize behind one
/// handle. Inserts are single statements and therefore atomic.
pub struct SqliteStore {
    idle: Mutex<Vec<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create a cache database at the given path
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Self::connect(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                fingerprint BLOB PRIMARY KEY,
                payload BLOB NOT NULL,
                checksum BLOB NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_created_at ON entries(created_at)",
            [],
        )?;

        debug!(path = %path.display(), "opened cache store");

        Ok(Self {
            idle: Mutex::new(vec![conn]),
            db_path: path.to_path_buf(),
        })
    }

    /// Open the store and immediately apply an eviction policy
    pub fn open_with_policy(path: &Path, policy: EvictionPolicy) -> Result<Self, StorageError> {
        let store = Self::open(path)?;
        store.prune(&policy)?;
        Ok(store)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(path: &Path) -> Result<Connection, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `f` on an idle connection, opening another if all are in use
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StorageError> {
        let pooled = self
            .idle
            .lock()
            .map_err(|_| StorageError::Poisoned {
                path: self.db_path.clone(),
            })?
            .pop();

        let conn = match pooled {
            Some(conn) => conn,
            None => Self::connect(&self.db_path)?,
        };

        let result = f(&conn);

        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }

        result.map_err(StorageError::from)
    }

    /// Convert SystemTime to Unix timestamp
    fn to_timestamp(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64
    }

    /// Convert Unix timestamp to SystemTime
    fn from_timestamp(timestamp: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
    }
}

impl CacheStore for SqliteStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, StorageError> {
        let key = &fingerprint.as_bytes()[..];

        let record = self.with_connection(|conn| {
            conn.query_row(
                "SELECT payload, checksum FROM entries WHERE fingerprint = ?",
                [key],
                |row| Ok(read_record(row)),
            )
            .optional()
        })?;

        let unreadable = match record {
            None => return Ok(None),
            Some(Ok((payload, stored))) if stored == checksum(&payload) => return Ok(Some(payload)),
            Some(Ok(_)) => "checksum mismatch".to_string(),
            Some(Err(e)) => e.to_string(),
        };

        // Drop the bad record so the recomputed value can take its place.
        warn!(fingerprint = %fingerprint.short(), reason = %unreadable, "discarding unreadable cache record");
        self.remove(fingerprint)?;
        Ok(None)
    }

    fn put(&self, fingerprint: &Fingerprint, payload: &[u8]) -> Result<(), StorageError> {
        let key = &fingerprint.as_bytes()[..];
        let sum = checksum(payload);

        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO entries
                 (fingerprint, payload, checksum, size, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    key,
                    payload,
                    &sum[..],
                    payload.len() as i64,
                    Self::to_timestamp(SystemTime::now()),
                ],
            )
        })?;

        Ok(())
    }

    fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, StorageError> {
        let key = &fingerprint.as_bytes()[..];
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM entries WHERE fingerprint = ?)",
                [key],
                |row| row.get::<_, bool>(0),
            )
        })
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StorageError> {
        let key = &fingerprint.as_bytes()[..];
        self.with_connection(|conn| conn.execute("DELETE FROM entries WHERE fingerprint = ?", [key]))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| conn.execute("DELETE FROM entries", []))?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, StorageError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0), MIN(created_at), MAX(created_at)
                 FROM entries",
                [],
                |row| {
                    Ok(CacheStats {
                        total_entries: row.get::<_, i64>(0)? as usize,
                        total_size_bytes: row.get::<_, i64>(1)? as u64,
                        oldest_entry: row.get::<_, Option<i64>>(2)?.map(Self::from_timestamp),
                        newest_entry: row.get::<_, Option<i64>>(3)?.map(Self::from_timestamp),
                    })
                },
            )
        })
    }

    fn prune(&self, policy: &EvictionPolicy) -> Result<usize, StorageError> {
        let removed = match *policy {
            EvictionPolicy::Never => return Ok(0),
            EvictionPolicy::MaxEntries(keep) => self.with_connection(|conn| {
                conn.execute(
                    "DELETE FROM entries WHERE rowid IN (
                        SELECT rowid FROM entries
                        ORDER BY created_at DESC, rowid DESC
                        LIMIT -1 OFFSET ?
                    )",
                    [keep as i64],
                )
            })?,
            EvictionPolicy::MaxAge(max_age) => {
                let cutoff = SystemTime::now()
                    .checked_sub(max_age)
                    .map(Self::to_timestamp)
                    .unwrap_or(0);
                self.with_connection(|conn| {
                    conn.execute("DELETE FROM entries WHERE created_at < ?", [cutoff])
                })?
            }
        };

        if removed > 0 {
            info!(removed, policy = ?policy, "evicted cache entries");
        }
        Ok(removed)
    }
}

/// Read both columns, keeping a malformed column as a value rather than
/// failing the query
fn read_record(row: &Row<'_>) -> rusqlite::Result<(Vec<u8>, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::PixelBuffer;
    use crate::core::digest::{content_digest, FingerprintBuilder};
    use crate::core::transform::{Params, TransformSpec};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn fingerprint(seed: u8) -> Fingerprint {
        let spec = TransformSpec {
            name: "sobel".to_string(),
            params: Params::new(),
            deterministic: true,
        };
        let digest = content_digest(&PixelBuffer::new(1, 1, 1, vec![seed]).unwrap());
        FingerprintBuilder::fingerprint(&spec, &[digest]).unwrap()
    }

    #[test]
    fn sqlite_cache_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("cache.db");

        let cache = SqliteStore::open(&db_path).unwrap();

        assert!(db_path.exists());
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn sqlite_cache_stores_and_retrieves() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap();

        cache.put(&fingerprint(1), &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        assert_eq!(
            cache.get(&fingerprint(1)).unwrap(),
            Some(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
        assert!(cache.contains(&fingerprint(1)).unwrap());
        assert!(!cache.contains(&fingerprint(2)).unwrap());
    }

    #[test]
    fn second_write_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap();

        cache.put(&fingerprint(1), &[1, 1]).unwrap();
        cache.put(&fingerprint(1), &[2, 2]).unwrap();

        assert_eq!(cache.get(&fingerprint(1)).unwrap(), Some(vec![1, 1]));
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");

        {
            let cache = SqliteStore::open(&db_path).unwrap();
            cache.put(&fingerprint(3), &[3]).unwrap();
        }

        let reopened = SqliteStore::open(&db_path).unwrap();
        assert_eq!(reopened.get(&fingerprint(3)).unwrap(), Some(vec![3]));
    }

    #[test]
    fn tampered_payload_reads_as_miss() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        let cache = SqliteStore::open(&db_path).unwrap();
        cache.put(&fingerprint(1), &[1, 2, 3]).unwrap();

        let raw = Connection::open(&db_path).unwrap();
        raw.execute("UPDATE entries SET payload = x'000000'", []).unwrap();

        assert_eq!(cache.get(&fingerprint(1)).unwrap(), None);
        // The bad record is gone, so a fresh write lands.
        cache.put(&fingerprint(1), &[1, 2, 3]).unwrap();
        assert_eq!(cache.get(&fingerprint(1)).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn wrongly_typed_payload_reads_as_miss() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        let cache = SqliteStore::open(&db_path).unwrap();
        cache.put(&fingerprint(1), &[1, 2, 3]).unwrap();

        let raw = Connection::open(&db_path).unwrap();
        raw.execute("UPDATE entries SET payload = 'not a blob'", []).unwrap();

        assert_eq!(cache.get(&fingerprint(1)).unwrap(), None);
    }

    #[test]
    fn sqlite_cache_clears_all() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap();

        cache.put(&fingerprint(1), &[1]).unwrap();
        cache.put(&fingerprint(2), &[2]).unwrap();
        cache.clear().unwrap();

        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn prune_max_entries_keeps_latest_rows() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap();
        for seed in 0..5 {
            cache.put(&fingerprint(seed), &[seed]).unwrap();
        }

        assert_eq!(cache.prune(&EvictionPolicy::MaxEntries(2)).unwrap(), 3);
        assert_eq!(cache.stats().unwrap().total_entries, 2);
        assert!(cache.contains(&fingerprint(4)).unwrap());
    }

    #[test]
    fn prune_never_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap();
        cache.put(&fingerprint(0), &[0]).unwrap();

        assert_eq!(cache.prune(&EvictionPolicy::Never).unwrap(), 0);
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn concurrent_writers_leave_one_whole_record() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(SqliteStore::open(&temp_dir.path().join("cache.db")).unwrap());

        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..50 {
                        cache.put(&fingerprint(7), &[i; 4096]).unwrap();
                        let payload = cache.get(&fingerprint(7)).unwrap().unwrap();
                        assert_eq!(payload.len(), 4096);
                        assert!(payload.iter().all(|&b| b == payload[0]), "payload must not be torn");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }
}
