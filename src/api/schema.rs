//! The generic adapter shared by every wire schema version.
//!
//! A schema version only supplies its message types and the pure conversions
//! between them and the engine's request types (`WireSchema`). `StoreAdapter<S>`
//! owns the call flow, so every version gets identical behavior.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::api::v1::{Empty, FeaturesResponse, MetadataRequest};
use crate::storage::{
    BulkGetResult, DeleteRequest, GetRequest, GetResponse, SetRequest, StateEngine, StateResult,
};

/// Message types of one wire schema version and their mapping to engine types.
pub trait WireSchema: Send + Sync + 'static {
    /// Schema package, used in logs
    const PACKAGE: &'static str;

    type GetRequest: Send;
    type GetResponse: Send;
    type SetRequest: Send;
    type DeleteRequest: Send;
    type BulkGetRequest: Send;
    type BulkGetResponse: Send;
    type BulkSetRequest: Send;
    type BulkDeleteRequest: Send;

    fn get_request(req: Self::GetRequest) -> GetRequest;

    /// `None` is an absent key: empty data and no ETag.
    fn get_response(resp: Option<GetResponse>) -> Self::GetResponse;

    fn set_request(req: Self::SetRequest) -> SetRequest;

    fn delete_request(req: Self::DeleteRequest) -> DeleteRequest;

    fn bulk_get_request(req: Self::BulkGetRequest) -> Vec<GetRequest>;

    /// One output item per result, in order.
    fn bulk_get_response(results: Vec<BulkGetResult>) -> Self::BulkGetResponse;

    fn bulk_set_request(req: Self::BulkSetRequest) -> Vec<SetRequest>;

    fn bulk_delete_request(req: Self::BulkDeleteRequest) -> Vec<DeleteRequest>;
}

/// Translates one schema version's calls onto a shared `StateEngine`.
pub struct StoreAdapter<S> {
    engine: Arc<StateEngine>,
    _schema: PhantomData<fn() -> S>,
}

impl<S> Clone for StoreAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S: WireSchema> StoreAdapter<S> {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self {
            engine,
            _schema: PhantomData,
        }
    }

    pub fn engine(&self) -> &Arc<StateEngine> {
        &self.engine
    }

    pub fn init_store(&self, req: MetadataRequest) -> StateResult<Empty> {
        self.engine.init(&req.properties)?;
        tracing::info!(schema = S::PACKAGE, "Init accepted");
        Ok(Empty {})
    }

    pub fn list_features(&self) -> StateResult<FeaturesResponse> {
        let feature = self
            .engine
            .features()?
            .iter()
            .map(|f| f.as_str().to_string())
            .collect();
        Ok(FeaturesResponse { feature })
    }

    pub async fn ping_store(&self) -> StateResult<Empty> {
        self.engine.ping().await?;
        Ok(Empty {})
    }

    pub async fn get_state(&self, req: S::GetRequest) -> StateResult<S::GetResponse> {
        let req = S::get_request(req);
        let resp = self.engine.get(&req).await?;
        Ok(S::get_response(resp))
    }

    pub async fn set_state(&self, req: S::SetRequest) -> StateResult<Empty> {
        self.engine.set(S::set_request(req)).await?;
        Ok(Empty {})
    }

    pub async fn delete_state(&self, req: S::DeleteRequest) -> StateResult<Empty> {
        self.engine.delete(S::delete_request(req)).await?;
        Ok(Empty {})
    }

    pub async fn bulk_get_state(&self, req: S::BulkGetRequest) -> StateResult<S::BulkGetResponse> {
        let results = self.engine.bulk_get(S::bulk_get_request(req)).await?;
        Ok(S::bulk_get_response(results))
    }

    pub async fn bulk_set_state(&self, req: S::BulkSetRequest) -> StateResult<Empty> {
        self.engine.bulk_set(S::bulk_set_request(req)).await?;
        Ok(Empty {})
    }

    pub async fn bulk_delete_state(&self, req: S::BulkDeleteRequest) -> StateResult<Empty> {
        self.engine.bulk_delete(S::bulk_delete_request(req)).await?;
        Ok(Empty {})
    }
}

/// Implements a schema's generated `Store` trait for `StoreAdapter<$schema>` by
/// delegating every RPC to the adapter.
macro_rules! impl_store {
    ($store:path, $schema:ty) => {
        #[tonic::async_trait]
        impl $store for $crate::api::schema::StoreAdapter<$schema> {
            async fn init(
                &self,
                request: tonic::Request<$crate::api::v1::MetadataRequest>,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond("Init", self.init_store(request.into_inner()))
            }

            async fn features(
                &self,
                _request: tonic::Request<$crate::api::v1::Empty>,
            ) -> Result<tonic::Response<$crate::api::v1::FeaturesResponse>, tonic::Status> {
                $crate::api::status::respond("Features", self.list_features())
            }

            async fn delete(
                &self,
                request: tonic::Request<<$schema as $crate::api::schema::WireSchema>::DeleteRequest>,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond("Delete", self.delete_state(request.into_inner()).await)
            }

            async fn get(
                &self,
                request: tonic::Request<<$schema as $crate::api::schema::WireSchema>::GetRequest>,
            ) -> Result<
                tonic::Response<<$schema as $crate::api::schema::WireSchema>::GetResponse>,
                tonic::Status,
            > {
                $crate::api::status::respond("Get", self.get_state(request.into_inner()).await)
            }

            async fn set(
                &self,
                request: tonic::Request<<$schema as $crate::api::schema::WireSchema>::SetRequest>,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond("Set", self.set_state(request.into_inner()).await)
            }

            async fn ping(
                &self,
                _request: tonic::Request<$crate::api::v1::Empty>,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond("Ping", self.ping_store().await)
            }

            async fn bulk_delete(
                &self,
                request: tonic::Request<
                    <$schema as $crate::api::schema::WireSchema>::BulkDeleteRequest,
                >,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond(
                    "BulkDelete",
                    self.bulk_delete_state(request.into_inner()).await,
                )
            }

            async fn bulk_get(
                &self,
                request: tonic::Request<<$schema as $crate::api::schema::WireSchema>::BulkGetRequest>,
            ) -> Result<
                tonic::Response<<$schema as $crate::api::schema::WireSchema>::BulkGetResponse>,
                tonic::Status,
            > {
                $crate::api::status::respond("BulkGet", self.bulk_get_state(request.into_inner()).await)
            }

            async fn bulk_set(
                &self,
                request: tonic::Request<<$schema as $crate::api::schema::WireSchema>::BulkSetRequest>,
            ) -> Result<tonic::Response<$crate::api::v1::Empty>, tonic::Status> {
                $crate::api::status::respond("BulkSet", self.bulk_set_state(request.into_inner()).await)
            }
        }
    };
}

pub(crate) use impl_store;
