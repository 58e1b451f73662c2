//! Error to HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::LifecycleError;

pub fn status_for(error: &LifecycleError) -> StatusCode {
    match error {
        LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
        LifecycleError::Expired(_) => StatusCode::GONE,
        LifecycleError::AlreadyShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        LifecycleError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
        LifecycleError::DuplicatePriority { .. } => StatusCode::CONFLICT,
        LifecycleError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
