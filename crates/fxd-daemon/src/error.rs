//! Domain error → HTTP response mapping.
//!
//! Dispatch happens on the error's own kind tag — handlers never inspect
//! request paths to classify a failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use fxd_schemas::DeskError;

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Axum-compatible wrapper around [`DeskError`].
#[derive(Debug)]
pub struct ApiError(pub DeskError);

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self(fxd_db::translate_db_error(err.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeskError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::Forbidden(_) => StatusCode::FORBIDDEN,
            DeskError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DeskError::Conflict(_) => StatusCode::CONFLICT,
            DeskError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(err = %self.0, "request failed with storage error");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: DeskError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(
            status_of(DeskError::invalid_argument("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(DeskError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(DeskError::forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(DeskError::invalid_state("x")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(DeskError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DeskError::storage("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
