//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use booking_core::error::BookingError;
use booking_core::ports::PortError;
use serde_json::json;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A booking operation was rejected or failed.
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations could not be applied at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself is malformed (bad query string, bad header).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No usable credentials were presented.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    fn internal(code: &'static str, detail: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
        tracing::error!(code, "Request failed: {}", detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            "An internal error occurred".to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    /// Renders `{"error": {"code", "message"}}`. Internal failures are logged
    /// and replaced by a generic message.
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Booking(ref err) => match err {
                BookingError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
                BookingError::InsufficientCredits { .. } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_credits",
                    err.to_string(),
                ),
                BookingError::SlotCollision => {
                    (StatusCode::CONFLICT, "slot_collision", err.to_string())
                }
                BookingError::AlreadyExists(msg) => {
                    (StatusCode::CONFLICT, "already_exists", msg.clone())
                }
                BookingError::OutsideAvailability => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "outside_availability",
                    err.to_string(),
                ),
                BookingError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_input", msg.clone())
                }
                BookingError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", err.to_string()),
                BookingError::Storage(inner) => Self::internal("storage_error", inner),
            },
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            ApiError::Port(ref e) => Self::internal("port_error", e),
            ApiError::Database(ref e) => Self::internal("database_error", e),
            ApiError::Migration(ref e) => Self::internal("migration_error", e),
            ApiError::Config(ref e) => Self::internal("config_error", e),
            ApiError::Io(ref e) => Self::internal("io_error", e),
            ApiError::Internal(ref msg) => Self::internal("internal_error", msg),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn booking_errors_map_to_distinct_statuses() {
        assert_eq!(
            status_of(BookingError::NotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BookingError::InsufficientCredits { credits: 1, active: 1 }.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_of(BookingError::SlotCollision.into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(BookingError::OutsideAvailability.into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(BookingError::InvalidInput("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(BookingError::Forbidden.into()), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(BookingError::Storage(PortError::Unexpected("db down".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
