use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps any displayable error to a 500 with a JSON body, for the handlers'
/// fallback case. `StoreTransient` errors from the core get their own 503
/// mapping in `ApiError` below instead of going through this path.
pub fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: err.to_string() }),
    )
}

/// Errors a handler can return directly; `IntoResponse` picks the status
/// code per §7's error kinds (a `CoreError::Store` is `StoreTransient` from
/// the query path's perspective, since the ingester is the only writer and
/// a mid-read DB error here just means "try again").
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] alerts_core::CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Core(alerts_core::CoreError::Store(msg)) => {
                tracing::warn!(error = %msg, "store error on query path");
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Core(e) => internal_error(e).into_response(),
            ApiError::Database(e) => {
                tracing::warn!(error = %e, "database error on query path");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse { error: e.to_string() }),
                )
                    .into_response()
            }
            ApiError::Io(e) => internal_error(e).into_response(),
            ApiError::Config(e) => internal_error(e).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_message_round_trips() {
        let err = ApiError::BadRequest("missing id".to_string());
        assert_eq!(err.to_string(), "bad request: missing id");
    }

    #[test]
    fn store_error_wraps_core_error() {
        let err: ApiError = alerts_core::CoreError::Store("connection reset".to_string()).into();
        assert!(matches!(err, ApiError::Core(alerts_core::CoreError::Store(_))));
    }
}
