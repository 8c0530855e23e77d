//! HTTP mapping of the shared error taxonomy.
//!
//! Clients get status codes plus short generic JSON bodies; anything with
//! internal detail is logged here and stripped from the response.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use taskwell_common::Error;
use tracing::error;

/// Response-side wrapper for [`taskwell_common::Error`].
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": format!("{entity} not found") })),
            )
                .into_response(),
            Error::Conflict(detail) => {
                (StatusCode::CONFLICT, Json(json!({ "detail": detail }))).into_response()
            }
            Error::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            Error::Unauthenticated => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Could not validate credentials" })),
                )
                    .into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
                response
            }
            Error::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "Access denied: User ID mismatch" })),
            )
                .into_response(),
            Error::Database(err) => {
                // The real cause stays in the operational log only.
                error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "A database error occurred",
                        "message": "We're experiencing issues with our database. Please try again later."
                    })),
                )
                    .into_response()
            }
            Error::Internal(detail) => {
                error!("Internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": detail })),
                )
                    .into_response()
            }
        }
    }
}
