//! Error types for the server binary.
//!
//! [`ServerError`] wraps every failure that can stop startup or the
//! serve loop, so `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: chaos_core::ConfigError,
    },

    /// Connecting to or migrating the database failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: chaos_db::DbError,
    },

    /// The token issuer could not be built from the auth settings.
    #[error("identity error: {source}")]
    Identity {
        /// The underlying identity error.
        #[from]
        source: chaos_core::IdentityError,
    },

    /// Seeding demo data failed.
    #[error("seed error: {source}")]
    Seed {
        /// The underlying workflow error.
        #[from]
        source: chaos_core::CoreError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("api error: {source}")]
    Api {
        /// The underlying server error.
        #[from]
        source: chaos_api::ServerError,
    },

    /// The log filter from configuration is not a valid directive.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the filter problem.
        message: String,
    },
}
