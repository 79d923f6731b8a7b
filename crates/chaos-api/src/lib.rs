//! HTTP API for the Chaos game-state backend.
//!
//! A thin Axum layer over [`chaos_core::Backend`]: each route extracts the
//! bearer-authenticated caller, calls exactly one workflow operation, and
//! maps the typed result or error to JSON.
//!
//! # Modules
//!
//! - [`auth`] -- Bearer-token extractor ([`Authenticated`])
//! - [`error`] -- Error-to-status mapping ([`ApiError`])
//! - [`handlers`] -- One handler per workflow operation
//! - [`router`] -- Route table with CORS and tracing layers
//! - [`server`] -- Bind, serve, and graceful shutdown
//! - [`state`] -- Shared [`AppState`]

pub mod auth;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use auth::Authenticated;
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, bind, serve, start_server};
pub use state::AppState;
