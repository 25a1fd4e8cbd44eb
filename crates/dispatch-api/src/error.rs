//! Error types for the driver API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that
//! renders as the standard `{success: false, message}` envelope via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch_store::StoreError;
use dispatch_types::{AgentId, DefaultResponse};

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No live driver has the requested identity.
    #[error("driver {0} does not exist")]
    NotFound(AgentId),

    /// The request body could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A path or query parameter was missing or malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The store reported an internal inconsistency.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            err @ StoreError::InvalidLocation(_) => Self::InvalidPayload(err.to_string()),
            other => Self::Store(other),
        }
    }
}

impl ApiError {
    /// HTTP status code for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidPayload(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Store(err) = &self {
            tracing::error!(error = %err, "store consistency failure");
        }
        (status, Json(DefaultResponse::failure(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let not_found = ApiError::from(StoreError::NotFound(AgentId(4)));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "driver 4 does not exist");

        let broken = ApiError::from(StoreError::RemovalFailed(AgentId(4)));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let nan = ApiError::from(StoreError::InvalidLocation(AgentId(4)));
        assert_eq!(nan.status(), StatusCode::BAD_REQUEST);
        assert_eq!(nan.to_string(), "invalid payload: agent 4 reported a non-finite location");

        let bad = ApiError::InvalidQuery(String::from("limit must be positive"));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
