//! Entity store for the Chaos game-state backend.
//!
//! Two interchangeable backends implement the same per-entity traits:
//! an in-memory store for development and tests, and a `PostgreSQL` store
//! for durable deployments. Workflows only ever see the traits.
//!
//! # Architecture
//!
//! ```text
//! Workflow services
//!     |
//!     +-- Stores { users, reports, punishments, statistics, captures }
//!         |
//!         +-- MemoryStore   (one RwLock over every table)
//!         +-- PgStore       (one transaction per aggregate operation)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- Store traits, their input types, and the [`Stores`] bundle
//! - [`memory`] -- In-memory backend
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`pg_store`] -- `PostgreSQL` backend
//! - [`error`] -- Shared error types

pub mod error;
pub mod memory;
pub mod pg_store;
pub mod postgres;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use store::{
    Award, CaptureStore, NewCapture, NewPunishment, NewReport, NewUser, PunishmentFilter,
    PunishmentPatch, PunishmentStore, ReportFilter, ReportStore, Standing, StatDelta,
    StatOverride, StatisticStore, Stores, UserFilter, UserPatch, UserStore,
};
