//! Error types for the entity store.
//!
//! [`DbError`] separates the outcomes callers branch on (`NotFound`,
//! `Conflict`) from opaque backend failures. The workflow layer maps the
//! latter to a storage error without exposing driver details.

/// Errors that can occur in the entity store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The addressed record does not exist or has been soft-deleted.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"user"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A uniqueness constraint or a conditional state change failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Shorthand for a [`DbError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
