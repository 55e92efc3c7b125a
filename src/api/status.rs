//! Mapping of engine errors onto gRPC statuses.

use tonic::metadata::MetadataValue;
use tonic::{Code, Response, Status};
use tracing::{debug, error};

use crate::storage::{StateError, StateResult};

/// Response metadata header carrying `StateError::kind`.
pub const ERROR_KIND_HEADER: &str = "x-state-error";

impl From<StateError> for Status {
    fn from(err: StateError) -> Self {
        let code = match &err {
            StateError::InvalidKey
            | StateError::InvalidMetadata(_)
            | StateError::Configuration(_) => Code::InvalidArgument,
            StateError::ETagMismatch { .. } => Code::Aborted,
            StateError::NotInitialized => Code::FailedPrecondition,
            StateError::BackendUnavailable(_) => Code::Unavailable,
            StateError::UnsupportedOperation(_) => Code::Unimplemented,
        };

        let mut status = Status::new(code, err.to_string());
        status
            .metadata_mut()
            .insert(ERROR_KIND_HEADER, MetadataValue::from_static(err.kind()));
        status
    }
}

/// Wraps an adapter result into a tonic response, logging failures.
pub(crate) fn respond<T>(call: &'static str, result: StateResult<T>) -> Result<Response<T>, Status> {
    match result {
        Ok(message) => Ok(Response::new(message)),
        Err(e) => {
            if let StateError::BackendUnavailable(_) = e {
                error!(call, error = %e, "State call failed");
            } else {
                debug!(call, kind = e.kind(), error = %e, "State call rejected");
            }
            Err(e.into())
        }
    }
}
