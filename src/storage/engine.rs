//! The state engine.
//!
//! `StateEngine` is created uninitialized and becomes usable after `init`. Every
//! call is self-contained: it carries its key, options and metadata, and nothing is
//! held between calls except the sled handle.
//!
//! Write path:
//! - last-write-wins: unconditional insert/remove with a fresh ETag
//! - first-write-wins: read the stored bytes, check the caller's ETag against them,
//!   then compare-and-swap against those exact bytes. A concurrent writer makes the
//!   swap fail, which is reported as an ETag mismatch.
//!
//! Expired records are treated as absent everywhere; `purge_expired` removes them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sled::transaction::ConflictableTransactionError;
use sled::IVec;
use tracing::{debug, info, warn};

use crate::storage::options::{ttl_from_metadata, TTL_EXPIRE_TIME};
use crate::storage::record::now_ms;
use crate::storage::{
    Backend, Concurrency, Consistency, EngineConfig, Feature, Record, StateError, StateOptions,
    StateResult,
};

/// Point read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetRequest {
    pub key: String,
    pub metadata: HashMap<String, String>,
    pub consistency: Consistency,
}

/// A record as returned to callers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetResponse {
    pub data: Vec<u8>,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Point write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetRequest {
    pub key: String,
    pub value: Vec<u8>,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    pub options: StateOptions,
}

/// Point delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    pub key: String,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    pub options: StateOptions,
}

/// One slot of a BulkGet response. `Ok(None)` means the key is absent.
#[derive(Debug)]
pub struct BulkGetResult {
    pub key: String,
    pub outcome: StateResult<Option<GetResponse>>,
}

/// Stored bytes for a key plus the live record they decode to, if not expired.
struct Current {
    raw: Option<IVec>,
    live: Option<Record>,
}

/// A write whose record is already encoded, ready to run inside a transaction.
struct PreparedWrite {
    key: String,
    etag: Option<String>,
    concurrency: Concurrency,
    /// `None` deletes the key
    record: Option<Vec<u8>>,
}

struct Initialized {
    backend: Backend,
    config: EngineConfig,
}

/// Key/value state engine with ETag concurrency.
pub struct StateEngine {
    inner: RwLock<Option<Arc<Initialized>>>,
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEngine {
    /// Creates an uninitialized engine. Every operation except `init` fails with
    /// `NotInitialized` until `init` succeeds.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }

    fn initialized(&self) -> StateResult<Arc<Initialized>> {
        self.inner.read().clone().ok_or(StateError::NotInitialized)
    }

    /// Parses the `Init` properties and opens the database.
    pub fn init(&self, properties: &HashMap<String, String>) -> StateResult<()> {
        let config = EngineConfig::from_properties(properties)?;
        self.init_with_config(config)
    }

    /// Opens the database for an already parsed configuration.
    pub fn init_with_config(&self, config: EngineConfig) -> StateResult<()> {
        let mut slot = self.inner.write();
        if slot.is_some() {
            return Err(StateError::Configuration(
                "state store is already initialized".to_string(),
            ));
        }

        let backend = Backend::open(&config)?;
        info!(
            features = ?config.features(),
            bulk_get = config.bulk_get,
            transactional = config.transactional,
            "State store initialized"
        );

        *slot = Some(Arc::new(Initialized { backend, config }));
        Ok(())
    }

    /// Capabilities of this instance.
    pub fn features(&self) -> StateResult<Vec<Feature>> {
        Ok(self.initialized()?.config.features())
    }

    /// Liveness probe. No side effects.
    pub async fn ping(&self) -> StateResult<()> {
        let inner = self.initialized()?;
        inner.backend.size_on_disk()?;
        Ok(())
    }

    pub async fn get(&self, req: &GetRequest) -> StateResult<Option<GetResponse>> {
        let inner = self.initialized()?;
        validate_key(&req.key)?;

        if req.consistency.is_strong() {
            inner.backend.flush().await?;
        }

        let response = inner.read(&req.key)?;
        debug!(key = %req.key, found = response.is_some(), "Get");
        Ok(response)
    }

    pub async fn set(&self, req: SetRequest) -> StateResult<()> {
        let inner = self.initialized()?;
        validate_key(&req.key)?;
        let ttl = ttl_from_metadata(&req.metadata)?;

        inner.apply_set(&req, ttl)?;

        if req.options.consistency.is_strong() {
            inner.backend.flush().await?;
        }

        debug!(
            key = %req.key,
            concurrency = ?req.options.concurrency.effective(),
            consistency = ?req.options.consistency.effective(),
            "Set"
        );
        Ok(())
    }

    pub async fn delete(&self, req: DeleteRequest) -> StateResult<()> {
        let inner = self.initialized()?;
        validate_key(&req.key)?;

        inner.apply_delete(&req)?;

        if req.options.consistency.is_strong() {
            inner.backend.flush().await?;
        }

        debug!(
            key = %req.key,
            concurrency = ?req.options.concurrency.effective(),
            "Delete"
        );
        Ok(())
    }

    /// Reads every item independently. Per-item failures land in that item's slot;
    /// the output has exactly one entry per input, in input order.
    ///
    /// Fails with `UnsupportedOperation` when `BULK_GET` is not advertised; callers
    /// are expected to fall back to sequential `get`.
    pub async fn bulk_get(&self, reqs: Vec<GetRequest>) -> StateResult<Vec<BulkGetResult>> {
        let inner = self.initialized()?;

        if reqs.is_empty() {
            return Ok(Vec::new());
        }

        if !inner.config.bulk_get {
            return Err(StateError::UnsupportedOperation(
                "bulk get is not supported by this state store".to_string(),
            ));
        }

        if reqs.iter().any(|req| req.consistency.is_strong()) {
            inner.backend.flush().await?;
        }

        let results: Vec<BulkGetResult> = reqs
            .into_iter()
            .map(|req| {
                let outcome = validate_key(&req.key).and_then(|_| inner.read(&req.key));
                BulkGetResult {
                    key: req.key,
                    outcome,
                }
            })
            .collect();

        debug!(count = results.len(), "BulkGet");
        Ok(results)
    }

    /// Applies every item's Set semantics.
    ///
    /// All keys and TTL metadata are validated before anything is written. A
    /// transactional engine then applies the batch atomically; otherwise items are
    /// applied in order and the first failure stops the batch, leaving earlier
    /// items applied.
    pub async fn bulk_set(&self, reqs: Vec<SetRequest>) -> StateResult<()> {
        let inner = self.initialized()?;

        let ttls = reqs
            .iter()
            .map(|req| -> StateResult<Option<u64>> {
                validate_key(&req.key)?;
                ttl_from_metadata(&req.metadata)
            })
            .collect::<StateResult<Vec<_>>>()?;

        if reqs.is_empty() {
            return Ok(());
        }

        let mut strong = false;
        let applied = if inner.config.transactional {
            let now = now_ms();
            let writes = reqs
                .iter()
                .zip(&ttls)
                .map(|(req, ttl)| -> StateResult<PreparedWrite> {
                    Ok(PreparedWrite {
                        key: req.key.clone(),
                        etag: req.etag.clone(),
                        concurrency: req.options.concurrency.effective(),
                        record: Some(inner.new_record(req.value.clone(), *ttl, now)?.encode()),
                    })
                })
                .collect::<StateResult<Vec<_>>>()?;
            inner.apply_atomic(&writes, now)?;
            strong = reqs.iter().any(|req| req.options.consistency.is_strong());
            Ok(())
        } else {
            reqs.iter().zip(ttls).try_for_each(|(req, ttl)| -> StateResult<()> {
                inner.apply_set(req, ttl)?;
                strong |= req.options.consistency.is_strong();
                Ok(())
            })
        };

        // Strong items that were applied pass the barrier even when a later item failed.
        if strong {
            inner.backend.flush().await?;
        }
        applied?;

        debug!(count = reqs.len(), transactional = inner.config.transactional, "BulkSet");
        Ok(())
    }

    /// Applies every item's Delete semantics, with the same validation and
    /// atomicity rules as `bulk_set`.
    pub async fn bulk_delete(&self, reqs: Vec<DeleteRequest>) -> StateResult<()> {
        let inner = self.initialized()?;

        for req in &reqs {
            validate_key(&req.key)?;
        }

        if reqs.is_empty() {
            return Ok(());
        }

        let mut strong = false;
        let applied = if inner.config.transactional {
            let writes: Vec<PreparedWrite> = reqs
                .iter()
                .map(|req| PreparedWrite {
                    key: req.key.clone(),
                    etag: req.etag.clone(),
                    concurrency: req.options.concurrency.effective(),
                    record: None,
                })
                .collect();
            inner.apply_atomic(&writes, now_ms())?;
            strong = reqs.iter().any(|req| req.options.consistency.is_strong());
            Ok(())
        } else {
            reqs.iter().try_for_each(|req| -> StateResult<()> {
                inner.apply_delete(req)?;
                strong |= req.options.consistency.is_strong();
                Ok(())
            })
        };

        if strong {
            inner.backend.flush().await?;
        }
        applied?;

        debug!(count = reqs.len(), transactional = inner.config.transactional, "BulkDelete");
        Ok(())
    }

    /// Removes every expired record and returns how many were removed. Each removal
    /// is a compare-and-swap against the expired bytes, so a record rewritten in the
    /// meantime is left alone.
    pub fn purge_expired(&self) -> StateResult<usize> {
        let inner = self.initialized()?;
        let now = now_ms();
        let mut purged = 0;

        for item in inner.backend.iter() {
            let (raw_key, raw) = item?;
            let Ok(key) = std::str::from_utf8(&raw_key) else {
                warn!(key = ?raw_key, "Skipping non UTF-8 key during expiry sweep");
                continue;
            };

            match Record::decode(key, &raw) {
                Ok(record) if record.is_expired_at(now) => {
                    if inner.backend.compare_and_swap(key, Some(&raw[..]), None)? {
                        purged += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(key, error = %e, "Skipping undecodable record during expiry sweep"),
            }
        }

        if purged > 0 {
            debug!(purged, "Purged expired records");
        }
        Ok(purged)
    }

    /// Waits until every write issued so far is durable.
    pub async fn flush(&self) -> StateResult<()> {
        self.initialized()?.backend.flush().await?;
        Ok(())
    }
}

impl Initialized {
    fn current(&self, key: &str) -> StateResult<Current> {
        let raw = self.backend.get(key)?;
        let live = match &raw {
            Some(bytes) => {
                let record = Record::decode(key, bytes)?;
                (!record.is_expired_at(now_ms())).then_some(record)
            }
            None => None,
        };
        Ok(Current { raw, live })
    }

    fn read(&self, key: &str) -> StateResult<Option<GetResponse>> {
        Ok(self.current(key)?.live.map(to_response))
    }

    fn new_record(&self, value: Vec<u8>, ttl: Option<u64>, now: i64) -> StateResult<Record> {
        Ok(Record {
            etag: self.backend.next_etag()?,
            expires_at_ms: ttl.map(|secs| now.saturating_add((secs as i64).saturating_mul(1000))),
            value,
        })
    }

    fn apply_set(&self, req: &SetRequest, ttl: Option<u64>) -> StateResult<()> {
        let record = self.new_record(req.value.clone(), ttl, now_ms())?;

        match req.options.concurrency.effective() {
            Concurrency::FirstWrite => {
                let current = self.current(&req.key)?;
                check_etag(&req.key, req.etag.as_deref(), current.live.as_ref())?;
                if !self.backend.compare_and_swap(
                    &req.key,
                    current.raw.as_deref(),
                    Some(record.encode()),
                )? {
                    return Err(etag_mismatch(&req.key));
                }
            }
            _ => self.backend.insert(&req.key, record.encode())?,
        }
        Ok(())
    }

    fn apply_delete(&self, req: &DeleteRequest) -> StateResult<()> {
        match req.options.concurrency.effective() {
            Concurrency::FirstWrite => {
                let current = self.current(&req.key)?;
                check_etag(&req.key, req.etag.as_deref(), current.live.as_ref())?;
                if let Some(raw) = current.raw {
                    if !self.backend.compare_and_swap(&req.key, Some(&raw[..]), None)? {
                        return Err(etag_mismatch(&req.key));
                    }
                }
            }
            _ => self.backend.remove(&req.key)?,
        }
        Ok(())
    }

    /// Runs prepared writes in one transaction. Any ETag mismatch aborts the whole
    /// batch.
    fn apply_atomic(&self, writes: &[PreparedWrite], now: i64) -> StateResult<()> {
        self.backend.transaction::<(), StateError, _>(|tx| {
            for write in writes {
                if write.concurrency == Concurrency::FirstWrite {
                    let live = match tx.get(write.key.as_str())? {
                        Some(bytes) => {
                            let record = Record::decode(&write.key, &bytes)
                                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                            (!record.is_expired_at(now)).then_some(record)
                        }
                        None => None,
                    };
                    if let Err(e) = check_etag(&write.key, write.etag.as_deref(), live.as_ref()) {
                        return sled::transaction::abort(e);
                    }
                }

                match &write.record {
                    Some(bytes) => {
                        tx.insert(write.key.as_str(), bytes.clone())?;
                    }
                    None => {
                        tx.remove(write.key.as_str())?;
                    }
                }
            }
            Ok(())
        })
    }
}

fn validate_key(key: &str) -> StateResult<()> {
    if key.is_empty() {
        return Err(StateError::InvalidKey);
    }
    Ok(())
}

fn etag_mismatch(key: &str) -> StateError {
    StateError::ETagMismatch {
        key: key.to_string(),
    }
}

/// First-write-wins check: the supplied ETag must name the live record, and "no
/// ETag" only matches "no record".
fn check_etag(key: &str, supplied: Option<&str>, live: Option<&Record>) -> StateResult<()> {
    let matches = match (supplied, live) {
        (None, None) => true,
        (Some(etag), Some(record)) => record.matches_etag(etag),
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(etag_mismatch(key))
    }
}

fn to_response(record: Record) -> GetResponse {
    let mut metadata = HashMap::new();
    if let Some(expires) = record.expire_time() {
        metadata.insert(TTL_EXPIRE_TIME.to_string(), expires.to_rfc3339());
    }

    GetResponse {
        etag: Some(record.etag_string()),
        data: record.value,
        metadata,
    }
}
