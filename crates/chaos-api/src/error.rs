//! Error types for the HTTP layer.
//!
//! [`ApiError`] converts every failure into a JSON response of the form
//! `{"error": <message>, "kind": <kind>, "status": <code>}`. Workflow
//! denials are 403; failed logins and missing or unusable bearer tokens
//! are 401.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chaos_core::{CoreError, ErrorKind};

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No `Authorization: Bearer` header was sent.
    #[error("missing bearer token")]
    MissingToken,

    /// The bearer token was rejected.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Login failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A workflow operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    /// The HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::Core(err) => match err.kind() {
                ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::MissingToken | Self::InvalidToken(_) | Self::InvalidCredentials => {
                "unauthenticated"
            }
            Self::Core(err) => err.kind().as_str(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Core(err) => err.message().to_owned(),
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "kind": self.kind(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (ApiError::MissingToken, StatusCode::UNAUTHORIZED),
            (ApiError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                ApiError::InvalidToken(String::from("expired")),
                StatusCode::UNAUTHORIZED,
            ),
            (
                CoreError::Unauthorized(String::from("no")).into(),
                StatusCode::FORBIDDEN,
            ),
            (
                CoreError::not_found("user", 9).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::Conflict(String::from("already captured")).into(),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::InvalidInput(String::from("bad enum")).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Storage(String::from("storage operation failed")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }
}
