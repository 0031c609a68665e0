//! HTTP mapping for the common error taxonomy
//!
//! Clients receive a JSON `{error, message}` body. NotFound maps to 404,
//! validation failures to 400, everything else to a generic 500.

use abx_common::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Wrapper turning `abx_common::Error` into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": code,
            "message": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Shorthand for a 400 validation failure
pub fn invalid(message: impl Into<String>) -> ApiError {
    ApiError(Error::InvalidInput(message.into()))
}
