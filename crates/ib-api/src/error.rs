//! Response envelopes.
//!
//! Success bodies are `{"data": ...}`; failures are
//! `{"error": {"code": <status>, "message": "..."}}` with the same status on
//! the response line.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ib_core::AppError;
use serde::Serialize;
use tracing::warn;

/// Successful response payload.
#[derive(Debug)]
pub struct Data<T>(pub T);

#[derive(Serialize)]
struct DataEnvelope<T> {
    data: T,
}

impl<T: Serialize> IntoResponse for Data<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(DataEnvelope { data: self.0 })).into_response()
    }
}

/// Any failure a handler can return.
#[derive(Debug)]
pub struct ApiError(pub AppError);

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(AppError::invalid(message))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }

        let body = ErrorEnvelope {
            error: ErrorBody {
                code: status.as_u16(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
