//! HTTP error responses as RFC 7807 problem documents.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mylocal_shared::ProblemDetails;

use crate::store::StoreError;

/// Handler error carrying the problem document sent to the client.
#[derive(Debug)]
pub struct ApiError(pub ProblemDetails);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::bad_request(detail))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::unauthorized(detail))
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::forbidden(detail))
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::not_found(detail))
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::conflict(detail))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::internal_error(detail))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self.0),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            StoreError::Conflict(message) => ApiError::conflict(message),
            other => {
                tracing::error!("Database error: {other}");
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {err}");
        ApiError::internal("An unexpected error occurred")
    }
}
