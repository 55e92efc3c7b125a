//! State engine and its storage driver.
//!
//! The engine keeps one record per key in a sled tree and layers the state store
//! contract on top of it:
//!
//! 1. **Optimistic concurrency**: every write issues a fresh ETag drawn from sled's
//!    persistent id generator; first-write-wins writes are a single compare-and-swap
//!    against the exact bytes whose ETag was validated
//! 2. **Consistency levels**: strong operations wait on sled's flush barrier,
//!    eventual operations rely on the background flusher
//! 3. **Bulk operations**: best-effort by default, or one sled transaction when the
//!    engine is configured as transactional
//! 4. **Expiry**: `ttlInSeconds` metadata with lazy expiry on access and a
//!    background sweeper

pub mod backend;
pub mod config;
pub mod engine;
pub mod expiry;
pub mod options;
pub mod record;

pub use backend::{Backend, BackendError, BackendResult};
pub use config::EngineConfig;
pub use engine::{
    BulkGetResult, DeleteRequest, GetRequest, GetResponse, SetRequest, StateEngine,
};
pub use expiry::ExpirySweeper;
pub use options::{Concurrency, Consistency, Feature, StateOptions};
pub use record::Record;

use thiserror::Error;

/// State engine errors.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("key must not be empty")]
    InvalidKey,

    #[error("possible etag mismatch for key {key}")]
    ETagMismatch { key: String },

    #[error("state store is not initialized")]
    NotInitialized,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl StateError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StateError::InvalidKey => "invalid-key",
            StateError::ETagMismatch { .. } => "etag-mismatch",
            StateError::NotInitialized => "not-initialized",
            StateError::BackendUnavailable(_) => "backend-unavailable",
            StateError::UnsupportedOperation(_) => "unsupported-operation",
            StateError::Configuration(_) => "configuration",
            StateError::InvalidMetadata(_) => "invalid-metadata",
        }
    }
}

impl From<sled::Error> for StateError {
    fn from(err: sled::Error) -> Self {
        StateError::BackendUnavailable(BackendError::Sled(err))
    }
}

pub type StateResult<T> = Result<T, StateError>;
