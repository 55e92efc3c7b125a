//! gRPC surface.
//!
//! Two schema versions are served, each a `StoreAdapter` instantiated with its
//! `WireSchema`:
//!
//! - `state.v1`: typed options and an `Etag` message
//! - `state.v1alpha1`: string options and an `optional string` etag

pub mod schema;
pub mod status;
pub mod v1;
pub mod v1alpha1;

pub use schema::{StoreAdapter, WireSchema};
pub use status::ERROR_KIND_HEADER;
pub use v1::V1;
pub use v1alpha1::V1Alpha1;
