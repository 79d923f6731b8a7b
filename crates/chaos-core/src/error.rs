//! The error taxonomy every workflow returns.
//!
//! Storage failures are logged where they are converted and surface only as
//! an opaque [`CoreError::Storage`]; driver messages never reach callers.

use chaos_db::DbError;
use chaos_types::ParseEnumError;

/// Closed classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The role or ownership gate failed.
    Unauthorized,
    /// The addressed entity does not exist.
    NotFound,
    /// Uniqueness violation or invalid state transition.
    Conflict,
    /// Malformed or missing input.
    InvalidInput,
    /// A collaborator failed.
    Storage,
}

impl ErrorKind {
    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidInput => "invalid_input",
            Self::Storage => "storage",
        }
    }
}

/// Failure of a workflow operation. Every variant carries a human message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The actor may not perform this action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The addressed entity does not exist or has been deleted.
    #[error("{0}")]
    NotFound(String),

    /// The action conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The input could not be accepted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage or identity collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// The closed kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The human message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::InvalidInput(m)
            | Self::Storage(m) => m,
        }
    }

    /// Shorthand for a [`CoreError::NotFound`] about one entity.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id} not found"))
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => Self::NotFound(err.to_string()),
            DbError::Conflict(message) => Self::Conflict(message),
            other => {
                tracing::error!(error = %other, "Storage operation failed");
                Self::Storage(String::from("storage operation failed"))
            }
        }
    }
}

impl From<ParseEnumError> for CoreError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
