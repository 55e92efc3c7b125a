//! `state.v1alpha1`: flat schema.
//!
//! Concurrency and consistency travel as plain strings (`first-write`,
//! `last-write`, `eventual`, `strong`) and the ETag as an `optional string`.
//! Lifecycle messages are shared with `state.v1`.

use std::collections::HashMap;

use crate::api::schema::{impl_store, WireSchema};
use crate::storage::{self as state, BulkGetResult, Concurrency, Consistency};

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(map = "string, string", tag = "2")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub consistency: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(string, optional, tag = "2")]
    pub etag: Option<String>,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    #[prost(string, optional, tag = "3")]
    pub etag: Option<String>,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "5")]
    pub concurrency: String,
    #[prost(string, tag = "6")]
    pub consistency: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub etag: Option<String>,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "4")]
    pub concurrency: String,
    #[prost(string, tag = "5")]
    pub consistency: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkGetRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<GetRequest>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetResponseWithError {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, optional, tag = "3")]
    pub etag: Option<String>,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "5")]
    pub error: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkGetResponse {
    #[prost(message, repeated, tag = "1")]
    pub responses: Vec<GetResponseWithError>,
    #[prost(bool, tag = "2")]
    pub got: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkSetRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<SetRequest>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkDeleteRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<DeleteRequest>,
}

include!(concat!(env!("OUT_DIR"), "/state.v1alpha1.Store.rs"));

pub use store_client::StoreClient;
pub use store_server::{Store, StoreServer};

fn options_from_wire(concurrency: &str, consistency: &str) -> state::StateOptions {
    state::StateOptions {
        concurrency: Concurrency::from_name(concurrency),
        consistency: Consistency::from_name(consistency),
    }
}

/// Marker for the `state.v1alpha1` schema.
pub struct V1Alpha1;

impl WireSchema for V1Alpha1 {
    const PACKAGE: &'static str = "state.v1alpha1";

    type GetRequest = GetRequest;
    type GetResponse = GetResponse;
    type SetRequest = SetRequest;
    type DeleteRequest = DeleteRequest;
    type BulkGetRequest = BulkGetRequest;
    type BulkGetResponse = BulkGetResponse;
    type BulkSetRequest = BulkSetRequest;
    type BulkDeleteRequest = BulkDeleteRequest;

    fn get_request(req: GetRequest) -> state::GetRequest {
        state::GetRequest {
            consistency: Consistency::from_name(&req.consistency),
            key: req.key,
            metadata: req.metadata,
        }
    }

    fn get_response(resp: Option<state::GetResponse>) -> GetResponse {
        resp.map(|resp| GetResponse {
            data: resp.data,
            etag: resp.etag,
            metadata: resp.metadata,
        })
        .unwrap_or_default()
    }

    fn set_request(req: SetRequest) -> state::SetRequest {
        state::SetRequest {
            options: options_from_wire(&req.concurrency, &req.consistency),
            key: req.key,
            value: req.value,
            etag: req.etag,
            metadata: req.metadata,
        }
    }

    fn delete_request(req: DeleteRequest) -> state::DeleteRequest {
        state::DeleteRequest {
            options: options_from_wire(&req.concurrency, &req.consistency),
            key: req.key,
            etag: req.etag,
            metadata: req.metadata,
        }
    }

    fn bulk_get_request(req: BulkGetRequest) -> Vec<state::GetRequest> {
        req.items.into_iter().map(Self::get_request).collect()
    }

    fn bulk_get_response(results: Vec<BulkGetResult>) -> BulkGetResponse {
        let responses = results
            .into_iter()
            .map(|result| {
                let mut item = GetResponseWithError {
                    key: result.key,
                    ..Default::default()
                };
                match result.outcome {
                    Ok(Some(resp)) => {
                        item.data = resp.data;
                        item.etag = resp.etag;
                        item.metadata = resp.metadata;
                    }
                    Ok(None) => {}
                    Err(e) => item.error = e.to_string(),
                }
                item
            })
            .collect();

        BulkGetResponse {
            responses,
            got: true,
        }
    }

    fn bulk_set_request(req: BulkSetRequest) -> Vec<state::SetRequest> {
        req.items.into_iter().map(Self::set_request).collect()
    }

    fn bulk_delete_request(req: BulkDeleteRequest) -> Vec<state::DeleteRequest> {
        req.items.into_iter().map(Self::delete_request).collect()
    }
}

impl_store!(Store, V1Alpha1);
