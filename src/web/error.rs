//! Map gateway errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::{FetchError, GatewayError};

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Fetch(e) => fetch_status(e),
            GatewayError::Config(_)
            | GatewayError::Crypto(_)
            | GatewayError::Database(_)
            | GatewayError::Migration(_)
            | GatewayError::Json(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn fetch_status(err: &FetchError) -> StatusCode {
    match err {
        FetchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FetchError::InvalidKey { .. } => StatusCode::UNAUTHORIZED,
        FetchError::Forbidden { .. } => StatusCode::FORBIDDEN,
        FetchError::NotFound { .. } => StatusCode::NOT_FOUND,
        FetchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        FetchError::Network { .. } => StatusCode::BAD_GATEWAY,
        FetchError::Api { .. } | FetchError::Decode { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the log.
        let message = if status.is_server_error() && !matches!(self, GatewayError::Fetch(_)) {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
