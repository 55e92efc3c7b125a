//! `state.v1`: typed schema.
//!
//! Options are enums inside a `StateOptions` message and the ETag is an optional
//! `Etag` message, so "no ETag" and "empty ETag" stay distinct on the wire. Also
//! defines the lifecycle messages every schema version shares.

use std::collections::HashMap;

use crate::api::schema::{impl_store, WireSchema};
use crate::storage::{self as state, BulkGetResult, Concurrency, Consistency};

// ---------------------------------------------------------------------------
// Shared lifecycle messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct MetadataRequest {
    #[prost(map = "string, string", tag = "1")]
    pub properties: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeaturesResponse {
    #[prost(string, repeated, tag = "1")]
    pub feature: Vec<String>,
}

// ---------------------------------------------------------------------------
// Typed options
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StateConcurrency {
    ConcurrencyUnspecified = 0,
    ConcurrencyFirstWrite = 1,
    ConcurrencyLastWrite = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StateConsistency {
    ConsistencyUnspecified = 0,
    ConsistencyEventual = 1,
    ConsistencyStrong = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StateOptions {
    #[prost(enumeration = "StateConcurrency", tag = "1")]
    pub concurrency: i32,
    #[prost(enumeration = "StateConsistency", tag = "2")]
    pub consistency: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Etag {
    #[prost(string, tag = "1")]
    pub value: String,
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(map = "string, string", tag = "2")]
    pub metadata: HashMap<String, String>,
    #[prost(enumeration = "StateConsistency", tag = "3")]
    pub consistency: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub etag: Option<Etag>,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub etag: Option<Etag>,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
    #[prost(message, optional, tag = "5")]
    pub options: Option<StateOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub etag: Option<Etag>,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
    #[prost(message, optional, tag = "4")]
    pub options: Option<StateOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkGetRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<GetRequest>,
}

/// One BulkGet result. A non-empty `error` means the item failed; empty data with
/// no ETag and no error means the key is absent.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkStateItem {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub etag: Option<Etag>,
    #[prost(string, tag = "4")]
    pub error: String,
    #[prost(map = "string, string", tag = "5")]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BulkGetResponse {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<BulkStateItem>,
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

// ---------------------------------------------------------------------------
// Generated service trait + server/client
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/state.v1.Store.rs"));

pub use store_client::StoreClient;
pub use store_server::{Store, StoreServer};

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

pub fn concurrency_from_wire(value: i32) -> Concurrency {
    match StateConcurrency::try_from(value) {
        Ok(StateConcurrency::ConcurrencyFirstWrite) => Concurrency::FirstWrite,
        Ok(StateConcurrency::ConcurrencyLastWrite) => Concurrency::LastWrite,
        Ok(StateConcurrency::ConcurrencyUnspecified) | Err(_) => Concurrency::Unspecified,
    }
}

pub fn consistency_from_wire(value: i32) -> Consistency {
    match StateConsistency::try_from(value) {
        Ok(StateConsistency::ConsistencyEventual) => Consistency::Eventual,
        Ok(StateConsistency::ConsistencyStrong) => Consistency::Strong,
        Ok(StateConsistency::ConsistencyUnspecified) | Err(_) => Consistency::Unspecified,
    }
}

/// A missing options message means both policies are unspecified.
pub fn options_from_wire(options: Option<StateOptions>) -> state::StateOptions {
    options
        .map(|o| state::StateOptions {
            concurrency: concurrency_from_wire(o.concurrency),
            consistency: consistency_from_wire(o.consistency),
        })
        .unwrap_or_default()
}

fn etag_to_wire(etag: Option<String>) -> Option<Etag> {
    etag.map(|value| Etag { value })
}

/// Marker for the `state.v1` schema.
pub struct V1;

impl WireSchema for V1 {
    const PACKAGE: &'static str = "state.v1";

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
            key: req.key,
            metadata: req.metadata,
            consistency: consistency_from_wire(req.consistency),
        }
    }

    fn get_response(resp: Option<state::GetResponse>) -> GetResponse {
        match resp {
            Some(resp) => GetResponse {
                data: resp.data,
                etag: etag_to_wire(resp.etag),
                metadata: resp.metadata,
            },
            None => GetResponse::default(),
        }
    }

    fn set_request(req: SetRequest) -> state::SetRequest {
        state::SetRequest {
            key: req.key,
            value: req.value,
            etag: req.etag.map(|e| e.value),
            metadata: req.metadata,
            options: options_from_wire(req.options),
        }
    }

    fn delete_request(req: DeleteRequest) -> state::DeleteRequest {
        state::DeleteRequest {
            key: req.key,
            etag: req.etag.map(|e| e.value),
            metadata: req.metadata,
            options: options_from_wire(req.options),
        }
    }

    fn bulk_get_request(req: BulkGetRequest) -> Vec<state::GetRequest> {
        req.items.into_iter().map(Self::get_request).collect()
    }

    fn bulk_get_response(results: Vec<BulkGetResult>) -> BulkGetResponse {
        let items = results
            .into_iter()
            .map(|result| match result.outcome {
                Ok(Some(resp)) => BulkStateItem {
                    key: result.key,
                    data: resp.data,
                    etag: etag_to_wire(resp.etag),
                    metadata: resp.metadata,
                    error: String::new(),
                },
                Ok(None) => BulkStateItem {
                    key: result.key,
                    ..Default::default()
                },
                Err(e) => BulkStateItem {
                    key: result.key,
                    error: e.to_string(),
                    ..Default::default()
                },
            })
            .collect();

        BulkGetResponse { items, got: true }
    }

    fn bulk_set_request(req: BulkSetRequest) -> Vec<state::SetRequest> {
        req.items.into_iter().map(Self::set_request).collect()
    }

    fn bulk_delete_request(req: BulkDeleteRequest) -> Vec<state::DeleteRequest> {
        req.items.into_iter().map(Self::delete_request).collect()
    }
}

impl_store!(Store, V1);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StoreAdapter;
    use crate::api::status::ERROR_KIND_HEADER;
    use crate::storage::{StateEngine, StateError};
    use std::sync::Arc;
    use tonic::{Code, Request};

    fn adapter() -> StoreAdapter<V1> {
        StoreAdapter::new(Arc::new(StateEngine::new()))
    }

    async fn initialized_adapter() -> StoreAdapter<V1> {
        let adapter = adapter();
        adapter
            .init(Request::new(MetadataRequest {
                properties: HashMap::from([("inMemory".to_string(), "true".to_string())]),
            }))
            .await
            .unwrap();
        adapter
    }

    fn first_write() -> Option<StateOptions> {
        Some(StateOptions {
            concurrency: StateConcurrency::ConcurrencyFirstWrite as i32,
            consistency: StateConsistency::ConsistencyUnspecified as i32,
        })
    }

    #[test]
    fn test_concurrency_mapping() {
        assert_eq!(concurrency_from_wire(0), Concurrency::Unspecified);
        assert_eq!(concurrency_from_wire(1), Concurrency::FirstWrite);
        assert_eq!(concurrency_from_wire(2), Concurrency::LastWrite);
        assert_eq!(concurrency_from_wire(3), Concurrency::Unspecified);
        assert_eq!(concurrency_from_wire(-1), Concurrency::Unspecified);
    }

    #[test]
    fn test_consistency_mapping() {
        assert_eq!(consistency_from_wire(0), Consistency::Unspecified);
        assert_eq!(consistency_from_wire(1), Consistency::Eventual);
        assert_eq!(consistency_from_wire(2), Consistency::Strong);
        assert_eq!(consistency_from_wire(42), Consistency::Unspecified);
    }

    #[test]
    fn test_missing_options_are_unspecified() {
        assert_eq!(options_from_wire(None), state::StateOptions::default());
    }

    #[test]
    fn test_absent_and_empty_etag_stay_distinct() {
        let absent = V1::set_request(SetRequest {
            key: "k".to_string(),
            ..Default::default()
        });
        assert_eq!(absent.etag, None);

        let empty = V1::set_request(SetRequest {
            key: "k".to_string(),
            etag: Some(Etag::default()),
            ..Default::default()
        });
        assert_eq!(empty.etag, Some(String::new()));

        let absent = V1::delete_request(DeleteRequest::default());
        assert_eq!(absent.etag, None);
    }

    #[test]
    fn test_absent_get_response() {
        let resp = V1::get_response(None);
        assert!(resp.data.is_empty());
        assert!(resp.etag.is_none());
        assert!(resp.metadata.is_empty());
    }

    #[test]
    fn test_bulk_get_response_has_one_item_per_result() {
        let results = vec![
            BulkGetResult {
                key: "a".to_string(),
                outcome: Ok(Some(state::GetResponse {
                    data: b"1".to_vec(),
                    etag: Some("7".to_string()),
                    metadata: HashMap::new(),
                })),
            },
            BulkGetResult {
                key: "b".to_string(),
                outcome: Ok(None),
            },
            BulkGetResult {
                key: "".to_string(),
                outcome: Err(StateError::InvalidKey),
            },
        ];

        let resp = V1::bulk_get_response(results);
        assert!(resp.got);
        assert_eq!(resp.items.len(), 3);
        assert_eq!(resp.items[0].etag, Some(Etag { value: "7".to_string() }));
        assert!(resp.items[0].error.is_empty());
        assert_eq!(resp.items[1].key, "b");
        assert!(resp.items[1].etag.is_none());
        assert!(resp.items[1].error.is_empty());
        assert_eq!(resp.items[2].error, StateError::InvalidKey.to_string());

        assert!(V1::bulk_get_response(vec![]).items.is_empty());
    }

    #[tokio::test]
    async fn test_calls_before_init() {
        let adapter = adapter();

        let status = adapter
            .get(Request::new(GetRequest {
                key: "k".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(
            status.metadata().get(ERROR_KIND_HEADER).unwrap().to_str().unwrap(),
            "not-initialized"
        );

        let status = adapter.features(Request::new(Empty {})).await.unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let adapter = initialized_adapter().await;

        adapter
            .set(Request::new(SetRequest {
                key: "k".to_string(),
                value: b"v".to_vec(),
                ..Default::default()
            }))
            .await
            .unwrap();

        let got = adapter
            .get(Request::new(GetRequest {
                key: "k".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got.data, b"v");
        let etag = got.etag.unwrap();

        let status = adapter
            .delete(Request::new(DeleteRequest {
                key: "k".to_string(),
                etag: Some(Etag {
                    value: "stale".to_string(),
                }),
                options: first_write(),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Aborted);

        adapter
            .delete(Request::new(DeleteRequest {
                key: "k".to_string(),
                etag: Some(etag),
                options: first_write(),
                ..Default::default()
            }))
            .await
            .unwrap();

        let got = adapter
            .get(Request::new(GetRequest {
                key: "k".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got, GetResponse::default());
    }

    #[tokio::test]
    async fn test_features_and_ping() {
        let adapter = initialized_adapter().await;

        let features = adapter
            .features(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner()
            .feature;
        assert_eq!(features, vec!["ETAG", "TTL", "BULK_GET", "STRONG_CONSISTENCY"]);

        adapter.ping(Request::new(Empty {})).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_init_is_rejected() {
        let adapter = initialized_adapter().await;
        let status = adapter
            .init(Request::new(MetadataRequest {
                properties: HashMap::from([("inMemory".to_string(), "true".to_string())]),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
