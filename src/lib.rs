//! # extstate: an external key/value state store over gRPC
//!
//! extstate runs out-of-process next to an application runtime (a sidecar) and
//! serves its state operations over gRPC. It provides:
//!
//! - **ETag concurrency**: every write issues a fresh ETag; first-write-wins writes
//!   are compare-and-swap, last-write-wins writes are unconditional
//! - **Consistency levels**: eventual by default, strong operations wait on a
//!   durability barrier
//! - **Bulk operations**: BulkGet with per-item errors, BulkSet / BulkDelete either
//!   best-effort or transactional
//! - **TTL**: `ttlInSeconds` metadata, lazy expiry plus a background sweeper
//! - **Two wire schemas**: `state.v1` and `state.v1alpha1`, served from one listener
//!
//! # Usage
//!
//! ```bash
//! extstate --host 0.0.0.0 --port 9191 --log-level info
//! ```
//!
//! The runtime then calls `Init` with either `dataDir=/var/lib/extstate` or
//! `inMemory=true`.

// Core modules
pub mod api;
pub mod server;
pub mod storage;

// Re-export main types at crate root for convenience
pub use api::{StoreAdapter, WireSchema};
pub use server::{ServerConfig, StateServer};
pub use storage::{EngineConfig, StateEngine, StateError, StateResult};
