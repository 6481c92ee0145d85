use thiserror::Error;
use validator::ValidationErrors;

use crate::{api::ApiError, state::snapshot::SnapshotError};

/// Errors that can occur in store and service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The race API rejected the request or could not be reached.
    #[error("race API request failed")]
    Api(#[source] ApiError),
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local snapshot could not be read or written.
    #[error("snapshot persistence failed")]
    Persistence(#[source] SnapshotError),
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        ServiceError::Api(err)
    }
}

impl From<SnapshotError> for ServiceError {
    fn from(err: SnapshotError) -> Self {
        ServiceError::Persistence(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}
