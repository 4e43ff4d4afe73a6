//! HTTP mapping for handler errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use herald_presign::PresignError;
use herald_relay::DispatchError;

/// An error rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let status = match &e {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NoAvailableResults(_) => StatusCode::NOT_FOUND,
            DispatchError::UnableToAccessDatabase(_) | DispatchError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(kind = e.error_kind(), error = %e, "dispatch failed");
        }
        Self {
            status,
            code: e.error_kind(),
            message: e.to_string(),
        }
    }
}

impl From<PresignError> for ApiError {
    fn from(e: PresignError) -> Self {
        let status = match &e {
            PresignError::InvalidInputUri(_) => StatusCode::BAD_REQUEST,
            PresignError::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
            PresignError::InvalidEndpoint(_) | PresignError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(kind = e.error_kind(), error = %e, "presign failed");
        } else if !e.is_client_error() {
            tracing::warn!(kind = e.error_kind(), error = %e, "presign unavailable");
        }
        Self {
            status,
            code: e.error_kind(),
            message: e.to_string(),
        }
    }
}
