//! Sled-backed storage driver.
//!
//! This module is the only place that talks to sled. It exposes the primitives the
//! state engine builds its concurrency model on:
//!
//! - **Compare-and-swap**: atomic replace of a key's exact stored bytes
//! - **Transactions**: atomic multi-key read/write closures (retried by sled on conflict)
//! - **Flush barrier**: `flush` resolves once all prior writes are durable
//! - **Id generation**: persistent, monotonically increasing ids used as ETags
//!
//! All records live in a single `state` tree.

use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use sled::IVec;
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::EngineConfig;

/// Storage driver errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

const STATE_TREE: &str = "state";

/// Handle to an open sled database. Internally synchronized; share it behind an `Arc`.
pub struct Backend {
    db: sled::Db,
    state: sled::Tree,
}

impl Backend {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &EngineConfig) -> BackendResult<Self> {
        let mut sled_config = sled::Config::new()
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms);

        let location = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                sled_config = sled_config.path(dir);
                dir.display().to_string()
            }
            None => {
                sled_config = sled_config.temporary(true);
                "<memory>".to_string()
            }
        };

        let db = sled_config.open()?;
        let state = db.open_tree(STATE_TREE)?;

        info!(
            location = %location,
            cache_capacity_bytes = config.cache_capacity_bytes,
            recovered = db.was_recovered(),
            records = state.len(),
            "Storage backend opened"
        );

        Ok(Self { db, state })
    }

    /// Reads the raw record bytes stored under `key`.
    pub fn get(&self, key: &str) -> BackendResult<Option<IVec>> {
        Ok(self.state.get(key)?)
    }

    /// Unconditionally stores `value` under `key`.
    pub fn insert(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.state.insert(key, value)?;
        Ok(())
    }

    /// Unconditionally removes `key`. Removing a missing key is not an error.
    pub fn remove(&self, key: &str) -> BackendResult<()> {
        self.state.remove(key)?;
        Ok(())
    }

    /// Atomically replaces the bytes under `key` if they still equal `expected`
    /// (`None` meaning "key absent"). A `new` of `None` deletes the key.
    ///
    /// Returns `false` when the stored bytes no longer match.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> BackendResult<bool> {
        match self.state.compare_and_swap(key, expected, new)? {
            Ok(()) => Ok(true),
            Err(conflict) => {
                debug!(key, current_present = conflict.current.is_some(), "Compare-and-swap lost");
                Ok(false)
            }
        }
    }

    /// Runs `f` as one atomic transaction over the state tree.
    ///
    /// sled may run the closure more than once on conflict, so it must not have side
    /// effects outside the transactional tree. Aborts surface as `Err(E)`.
    pub fn transaction<A, E, F>(&self, f: F) -> Result<A, E>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<A, E>,
        E: From<BackendError>,
    {
        self.state.transaction(f).map_err(|err| match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => E::from(BackendError::Sled(e)),
        })
    }

    /// Returns a new ETag id. Ids are unique for the lifetime of the database,
    /// including across restarts.
    pub fn next_etag(&self) -> BackendResult<u64> {
        // generate_id starts at 0; keep ETags strictly positive.
        Ok(self.db.generate_id()? + 1)
    }

    /// Iterates over all stored records.
    pub fn iter(&self) -> impl Iterator<Item = BackendResult<(IVec, IVec)>> + '_ {
        self.state.iter().map(|item| item.map_err(BackendError::from))
    }

    /// Number of stored records, including expired records not yet purged.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Durability barrier: resolves once every write issued before the call is on disk.
    pub async fn flush(&self) -> BackendResult<usize> {
        Ok(self.db.flush_async().await?)
    }

    /// Returns the on-disk size of the database. Fails if sled cannot reach its files.
    pub fn size_on_disk(&self) -> BackendResult<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (Backend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        (Backend::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_insert_get_remove() {
        let (backend, _dir) = open_temp();

        backend.insert("key", b"value".to_vec()).unwrap();
        assert_eq!(backend.get("key").unwrap().as_deref(), Some(&b"value"[..]));

        backend.remove("key").unwrap();
        assert!(backend.get("key").unwrap().is_none());

        // Removing again is fine
        backend.remove("key").unwrap();
    }

    #[test]
    fn test_compare_and_swap() {
        let (backend, _dir) = open_temp();

        // Insert only if absent
        assert!(backend.compare_and_swap("key", None, Some(b"v1".to_vec())).unwrap());
        assert!(!backend.compare_and_swap("key", None, Some(b"v2".to_vec())).unwrap());

        // Replace only if unchanged
        assert!(!backend
            .compare_and_swap("key", Some(&b"stale"[..]), Some(b"v2".to_vec()))
            .unwrap());
        assert!(backend
            .compare_and_swap("key", Some(&b"v1"[..]), Some(b"v2".to_vec()))
            .unwrap());
        assert_eq!(backend.get("key").unwrap().as_deref(), Some(&b"v2"[..]));

        // Delete only if unchanged
        assert!(backend.compare_and_swap("key", Some(&b"v2"[..]), None).unwrap());
        assert!(backend.get("key").unwrap().is_none());
    }

    #[test]
    fn test_transaction_abort_applies_nothing() {
        let (backend, _dir) = open_temp();

        let result: Result<(), BackendError> = backend.transaction(|tx| {
            tx.insert("a", b"1".to_vec())?;
            tx.insert("b", b"2".to_vec())?;
            sled::transaction::abort(BackendError::Corrupt {
                key: "b".to_string(),
                reason: "test abort".to_string(),
            })
        });

        assert!(matches!(result, Err(BackendError::Corrupt { .. })));
        assert!(backend.get("a").unwrap().is_none());
        assert!(backend.get("b").unwrap().is_none());
    }

    #[test]
    fn test_etags_are_unique_and_positive() {
        let (backend, _dir) = open_temp();

        let first = backend.next_etag().unwrap();
        let second = backend.next_etag().unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[test]
    fn test_etags_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let last = {
            let backend = Backend::open(&config).unwrap();
            let mut last = 0;
            for _ in 0..10 {
                last = backend.next_etag().unwrap();
            }
            last
        };

        let backend = Backend::open(&config).unwrap();
        assert!(backend.next_etag().unwrap() > last);
    }

    #[tokio::test]
    async fn test_flush_and_size() {
        let (backend, _dir) = open_temp();

        backend.insert("key", vec![0u8; 1024]).unwrap();
        backend.flush().await.unwrap();
        assert!(backend.size_on_disk().is_ok());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_in_memory_backend() {
        let backend = Backend::open(&EngineConfig::in_memory()).unwrap();
        backend.insert("key", b"value".to_vec()).unwrap();
        assert!(!backend.is_empty());
    }
}
