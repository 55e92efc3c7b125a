//! Stored record layout.
//!
//! Each key maps to one encoded record:
//!
//! ```text
//! [etag: u64 LE][expires_at_ms: i64 LE, 0 = never][value_len: u64 LE][value]
//! ```

use chrono::{DateTime, Utc};

use crate::storage::{BackendError, BackendResult};

const HEADER_LEN: usize = 24;

/// The latest version of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Version token issued by the write that produced this record
    pub etag: u64,

    /// Unix time in milliseconds after which the record reads as absent
    pub expires_at_ms: Option<i64>,

    /// Opaque payload
    pub value: Vec<u8>,
}

impl Record {
    /// The ETag as it is handed to callers.
    pub fn etag_string(&self) -> String {
        self.etag.to_string()
    }

    /// Whether a caller-supplied ETag names this exact version.
    pub fn matches_etag(&self, etag: &str) -> bool {
        etag == self.etag_string()
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.expires_at_ms, Some(at) if at <= now_ms)
    }

    pub fn expire_time(&self) -> Option<DateTime<Utc>> {
        self.expires_at_ms.and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.value.len());

        buf.extend_from_slice(&self.etag.to_le_bytes());
        buf.extend_from_slice(&self.expires_at_ms.unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.value);

        buf
    }

    /// Decodes a stored record; `key` is only used to label corruption errors.
    pub fn decode(key: &str, data: &[u8]) -> BackendResult<Self> {
        let corrupt = |reason: &str| BackendError::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if data.len() < HEADER_LEN {
            return Err(corrupt("truncated header"));
        }

        let etag = u64::from_le_bytes(data[0..8].try_into().map_err(|_| corrupt("etag"))?);
        let expires_at_ms =
            i64::from_le_bytes(data[8..16].try_into().map_err(|_| corrupt("expiry"))?);
        let value_len =
            u64::from_le_bytes(data[16..24].try_into().map_err(|_| corrupt("length"))?);

        if value_len != (data.len() - HEADER_LEN) as u64 {
            return Err(corrupt("value length mismatch"));
        }

        Ok(Record {
            etag,
            expires_at_ms: (expires_at_ms != 0).then_some(expires_at_ms),
            value: data[HEADER_LEN..].to_vec(),
        })
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
