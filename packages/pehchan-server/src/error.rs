//! HTTP error mapping.
//!
//! ```text
//!   ErrorKind::Input           → 400
//!   ErrorKind::Authentication  → 401   (login failures carry fieldErrors)
//!   ErrorKind::NotFound        → 404
//!   ErrorKind::Conflict        → 400
//!   ErrorKind::Internal        → 500   (logged, generic message to client)
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use pehchan_core::{Error, ErrorKind, FieldErrors};

/// Body of every failed request.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

#[derive(Debug)]
pub enum ApiError {
    /// Anything raised by the identity core
    Core(Error),
    /// Request could not be decoded
    BadRequest(String),
    /// Missing bearer token
    Unauthorized(String),
    /// Body exceeded the upload ceiling
    PayloadTooLarge,
    RateLimited,
    /// Pipeline exceeded its time budget
    Timeout,
    /// Worker thread failed
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            message: Some(message.to_string()),
            field_errors: None,
        }),
    )
        .into_response()
}

const INTERNAL_MESSAGE: &str = "Something went wrong. Please try again later.";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Core(Error::Credentials(fields)) => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    success: false,
                    message: None,
                    field_errors: Some(fields),
                }),
            )
                .into_response(),
            ApiError::Core(err) => {
                let status = match err.kind() {
                    ErrorKind::Input | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
                    ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Internal => {
                        tracing::error!(code = err.code(), error = %err, "Internal error");
                        return error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE);
                    }
                };
                tracing::debug!(code = err.code(), status = status.as_u16(), "Request rejected");
                error_response(status, &err.to_string())
            }
            ApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, &message),
            ApiError::Unauthorized(message) => error_response(StatusCode::UNAUTHORIZED, &message),
            ApiError::PayloadTooLarge => error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Upload too large",
            ),
            ApiError::RateLimited => error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many password reset attempts, please try again later",
            ),
            ApiError::Timeout => {
                tracing::warn!("Identity pipeline timed out");
                error_response(
                    StatusCode::REQUEST_TIMEOUT,
                    "Processing the document took too long",
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = detail.as_str(), "Worker failure");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
            }
        }
    }
}
