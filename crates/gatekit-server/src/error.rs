//! Error-to-HTTP mapping
//!
//! Every user-visible failure becomes a JSON body with a machine-stable
//! `code` and a human `message`. Principals never appear in error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use gatekit_core::GatewayError;

/// Wrapper giving [`GatewayError`] an HTTP shape
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<gatekit_store::StoreError> for ApiError {
    fn from(err: gatekit_store::StoreError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Crypto(_)
            | GatewayError::Platform(_)
            | GatewayError::Queue(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internals are logged, not leaked
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {err}");
            "internal error".to_string()
        } else {
            err.to_string()
        };

        let mut body = json!({
            "code": err.code(),
            "message": message,
        });
        if let GatewayError::Validation { field, .. } = &err {
            body["field"] = json!(field);
        }

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited { retry_after_ms } = &err {
            let seconds = (retry_after_ms / 1000).max(1);
            if let Ok(value) = seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}
