//! Authorization, workflows, ranking, and dashboards for the Chaos backend.
//!
//! Three roles share one game state. The administrator runs the game,
//! agents capture targets and file reports to earn points, and targets
//! file anonymous reports. Every operation takes the acting user, asks the
//! authorization engine, and then performs its state transition through a
//! single store operation so that statuses, capture records, and counters
//! never drift apart.
//!
//! # Modules
//!
//! - [`authz`] -- Pure role and ownership checks ([`authz::authorize`]) and
//!   list scoping.
//! - [`accounts`] -- Registration, login, profiles, and user administration.
//! - [`capture`] -- The capture workflow and capture history.
//! - [`punishment`] -- Sanctions and rewards for agents.
//! - [`report`] -- Filing and moderating reports.
//! - [`ranking`] -- Leaderboard, statistics, overrides, and recalculation.
//! - [`dashboard`] -- Read-only per-role dashboards.
//! - [`identity`] -- Bearer tokens and credential hashing.
//! - [`config`] -- Configuration loading from `chaos-config.yaml`.
//! - [`seed`] -- Demo accounts and game state.
//! - [`backend`] -- Every service wired to one store bundle ([`Backend`]).
//! - [`error`] -- The workflow error taxonomy ([`CoreError`]).

pub mod accounts;
pub mod authz;
pub mod backend;
pub mod capture;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod punishment;
pub mod ranking;
pub mod report;
pub mod seed;

// Re-export primary types for convenience.
pub use authz::{Action, Actor, Decision};
pub use backend::Backend;
pub use config::{ChaosConfig, ConfigError, StorageBackend};
pub use error::{CoreError, ErrorKind};
pub use identity::{CredentialHasher, IdentityError, JwtIssuer, SaltedSha256, TokenIssuer};
