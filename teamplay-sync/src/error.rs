//! Error types for teamplay-sync
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use teamplay_common::{ErrorPayload, TeamId};
use thiserror::Error;

/// Main error type for teamplay-sync
#[derive(Error, Debug)]
pub enum Error {
    /// Command could not be understood (bad JSON, unparsable team id, ...)
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Team is not known to the durable store
    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    /// Jump target outside the queue
    #[error("Index {index} out of range for queue of {len} songs")]
    IndexOutOfRange { index: i64, len: usize },

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Shared-library errors (database, serialization)
    #[error(transparent)]
    Common(#[from] teamplay_common::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using teamplay-sync Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Common(teamplay_common::Error::Database(e))
    }
}

impl Error {
    /// Stable code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedCommand(_) => "malformed_command",
            Error::TeamNotFound(_) => "team_not_found",
            Error::IndexOutOfRange { .. } => "index_out_of_range",
            Error::Store(_) | Error::Common(teamplay_common::Error::Database(_)) => "store_unavailable",
            Error::Common(teamplay_common::Error::InvalidInput(_)) => "malformed_command",
            Error::Common(teamplay_common::Error::NotFound(_)) => "not_found",
            Error::Common(_) | Error::Config(_) | Error::Http(_) | Error::Io(_) | Error::Internal(_) => {
                "internal"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "malformed_command" | "index_out_of_range" => StatusCode::BAD_REQUEST,
            "team_not_found" | "not_found" => StatusCode::NOT_FOUND,
            "store_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire payload for the issuing connection
    pub fn to_payload(&self, command: Option<&str>) -> ErrorPayload {
        let message = match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        ErrorPayload {
            code: self.code().to_string(),
            message,
            command: command.map(str::to_string),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        (self.status(), axum::Json(self.to_payload(None))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_is_bad_request() {
        let err = Error::IndexOutOfRange { index: 5, len: 3 };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "index_out_of_range");
    }

    #[test]
    fn test_unparsable_id_from_common_is_malformed() {
        let err: Error = teamplay_common::Error::InvalidInput("bad id".into()).into();
        assert_eq!(err.code(), "malformed_command");
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let payload = Error::Internal("mutex poisoned at foo.rs:12".into()).to_payload(Some("Play"));
        assert_eq!(payload.message, "Internal server error");
        assert_eq!(payload.command.as_deref(), Some("Play"));
    }
}
