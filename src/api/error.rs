use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::EngineError;

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// No `x-user-id` header on the request
    Unauthorized,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing x-user-id header".to_string(),
            ),
            ApiError::Engine(err) => match err {
                EngineError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                EngineError::InsufficientBalance { .. } => (StatusCode::CONFLICT, err.to_string()),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                EngineError::Resolution(_) | EngineError::AmbiguousResult { .. } => {
                    tracing::warn!("Result lookup error: {}", err);
                    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
                }
                EngineError::Persistence(_) => {
                    tracing::error!("Database error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
