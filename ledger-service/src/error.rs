//! Request-level error taxonomy and its HTTP mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};
use votechain_cli::SchemaError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request or ballot.
    #[error("{0}")]
    Validation(String),
    /// Unknown or inactive election, or unregistered credential.
    #[error("{0}")]
    Eligibility(String),
    #[error("Duplicate vote: this voter has already cast a ballot.")]
    DuplicateVote,
    #[error("{0}")]
    NotFound(String),
    /// The chain tail moved between read and commit.
    #[error("ledger tail for '{0}' moved during append")]
    ConcurrencyConflict(String),
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
    #[error("broadcast to session {session} failed: {reason}")]
    Broadcast { session: u64, reason: String },
    #[error("Missing or invalid credentials.")]
    Unauthorized,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Eligibility(_) => StatusCode::FORBIDDEN,
            Self::DuplicateVote => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ConcurrencyConflict(_) | Self::Persistence(_) | Self::Broadcast { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn election_not_found(election_id: &str) -> Self {
        Self::NotFound(format!("Election '{}' not found.", election_id))
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::Validation(format!("Invalid ballot: {}", err))
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "An internal error occurred.".to_string()
        } else {
            info!("Request rejected ({}): {}", status, self);
            self.to_string()
        };

        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Eligibility("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::DuplicateVote.status(), StatusCode::CONFLICT);
        assert_eq!(Error::election_not_found("e1").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::ConcurrencyConflict("e1".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Persistence(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_schema_errors_are_validation_failures() {
        let err: Error = SchemaError::EmptyBallot.into();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let response = Error::Persistence(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
