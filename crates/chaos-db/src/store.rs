//! Per-entity store traits and their input types.
//!
//! Each workflow depends only on the traits it needs, injected as
//! `Arc<dyn ...Store>`. Every method that mutates more than one row is a
//! single aggregate operation: implementations must apply all of its
//! effects or none of them, and counter updates must be atomic
//! read-modify-writes at the storage layer.
//!
//! Soft-deleted rows are invisible to every finder and list method unless
//! the method says otherwise.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chaos_types::{
    Capture, Difficulty, Page, PageRequest, Punishment, PunishmentId, PunishmentStatus,
    PunishmentType, Report, ReportId, ReportStatus, ReportType, Role, Statistic, User, UserId,
    UserStatus,
};
use chrono::{DateTime, Utc};

use crate::error::DbError;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Fields for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Unique contact address.
    pub email: String,
    /// Opaque credential hash.
    pub credential_hash: String,
    /// Role of the new user.
    pub role: Role,
}

/// A partial update to a user row. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    /// New username.
    pub username: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// New role.
    pub role: Option<Role>,
    /// New status.
    pub status: Option<UserStatus>,
}

/// Filter for listing and counting users.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFilter {
    /// Only users with this role.
    pub role: Option<Role>,
    /// Only users with this status.
    pub status: Option<UserStatus>,
    /// Only this user.
    pub id: Option<UserId>,
}

/// Persistence for [`User`] rows and their credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a live user by ID.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, DbError>;

    /// Look up a live user by username.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DbError>;

    /// Look up a live user by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Usernames for the given IDs, soft-deleted users included.
    async fn usernames(&self, ids: &[UserId]) -> Result<BTreeMap<UserId, String>, DbError>;

    /// One page of live users, ordered by ID.
    async fn list_users(&self, filter: UserFilter, page: PageRequest)
    -> Result<Page<User>, DbError>;

    /// Number of live users matching `filter`.
    async fn count_users(&self, filter: UserFilter) -> Result<u64, DbError>;

    /// Insert a user with status `active`.
    ///
    /// Username and email must be unique across all rows, soft-deleted ones
    /// included, and at most one administrator may ever exist
    /// ([`DbError::Conflict`] otherwise). Agents get a zeroed statistic row
    /// in the same operation.
    async fn create_user(&self, new: NewUser) -> Result<User, DbError>;

    /// Apply a partial update to a live user.
    ///
    /// Uniqueness is checked as in [`UserStore::create_user`]. A role change
    /// to agent ensures the statistic row exists.
    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, DbError>;

    /// The stored credential hash of a live user.
    async fn credential_hash(&self, id: UserId) -> Result<String, DbError>;

    /// Replace the stored credential hash of a live user.
    async fn set_credential_hash(&self, id: UserId, hash: String) -> Result<(), DbError>;

    /// Tombstone a live user.
    async fn soft_delete_user(&self, id: UserId) -> Result<(), DbError>;

    /// Clear the tombstone of a soft-deleted user.
    async fn restore_user(&self, id: UserId) -> Result<User, DbError>;
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Fields for a new report row. Status always starts as `pending`.
#[derive(Debug, Clone)]
pub struct NewReport {
    /// Short headline.
    pub title: String,
    /// Full body.
    pub description: String,
    /// Report kind.
    pub report_type: ReportType,
    /// Author; `None` exactly when the type is anonymous.
    pub author_id: Option<UserId>,
}

/// Filter for listing and counting reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    /// Only reports of this type.
    pub report_type: Option<ReportType>,
    /// Only reports in this status.
    pub status: Option<ReportStatus>,
    /// Only reports written by this user.
    pub author_id: Option<UserId>,
}

/// Points credited to a report's author when a moderation transition lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    /// Who receives the points.
    pub user_id: UserId,
    /// How many points.
    pub points: i64,
}

/// Persistence for [`Report`] rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Look up a live report.
    async fn find_report(&self, id: ReportId) -> Result<Option<Report>, DbError>;

    /// One page of live reports, newest first.
    async fn list_reports(
        &self,
        filter: ReportFilter,
        page: PageRequest,
    ) -> Result<Page<Report>, DbError>;

    /// The `limit` newest live reports.
    async fn recent_reports(&self, limit: u64) -> Result<Vec<Report>, DbError>;

    /// Number of live reports matching `filter`.
    async fn count_reports(&self, filter: ReportFilter) -> Result<u64, DbError>;

    /// Insert a pending report. When `credit` is set, that user's
    /// `reports_count` is incremented in the same operation.
    async fn create_report(&self, new: NewReport, credit: Option<UserId>)
    -> Result<Report, DbError>;

    /// Move a report from `from` to `to`, failing with
    /// [`DbError::Conflict`] if its current status is not `from`. The
    /// optional award is applied in the same operation.
    async fn transition_report(
        &self,
        id: ReportId,
        from: ReportStatus,
        to: ReportStatus,
        award: Option<Award>,
    ) -> Result<Report, DbError>;

    /// Tombstone a live report.
    async fn soft_delete_report(&self, id: ReportId) -> Result<(), DbError>;
}

// ---------------------------------------------------------------------------
// Punishments
// ---------------------------------------------------------------------------

/// Fields for a new punishment row. Status always starts as `active`.
#[derive(Debug, Clone)]
pub struct NewPunishment {
    /// The punished (or rewarded) agent.
    pub target_id: UserId,
    /// The assigning administrator.
    pub assigned_by: UserId,
    /// Sanction kind or reward.
    pub punishment_type: PunishmentType,
    /// Free-form explanation.
    pub description: String,
    /// Optional end time.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A partial update to a punishment row. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct PunishmentPatch {
    /// New status.
    pub status: Option<PunishmentStatus>,
    /// New description.
    pub description: Option<String>,
    /// New expiry; `Some(None)` clears it.
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Filter for listing punishments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PunishmentFilter {
    /// Only punishments in this status.
    pub status: Option<PunishmentStatus>,
    /// Only punishments against this user.
    pub target_id: Option<UserId>,
}

/// Persistence for [`Punishment`] rows.
///
/// Every mutation re-derives the target's status from its remaining active
/// sanctions inside the same operation: `punished` while at least one
/// exists, back to `active` once none do.
#[async_trait]
pub trait PunishmentStore: Send + Sync {
    /// Look up a live punishment.
    async fn find_punishment(&self, id: PunishmentId) -> Result<Option<Punishment>, DbError>;

    /// One page of live punishments, newest first.
    async fn list_punishments(
        &self,
        filter: PunishmentFilter,
        page: PageRequest,
    ) -> Result<Page<Punishment>, DbError>;

    /// Live punishments in status `active` against `target`, newest first.
    async fn active_punishments(&self, target: UserId) -> Result<Vec<Punishment>, DbError>;

    /// Number of live punishments in status `active`.
    async fn count_active_punishments(&self) -> Result<u64, DbError>;

    /// Insert an active punishment and reconcile the target's status.
    /// `bonus_points` (for rewards) are added to the target's statistic in
    /// the same operation.
    async fn create_punishment(
        &self,
        new: NewPunishment,
        bonus_points: Option<i64>,
    ) -> Result<Punishment, DbError>;

    /// Apply `patch` if the punishment is still in `expected` status
    /// ([`DbError::Conflict`] otherwise), then reconcile the target.
    async fn update_punishment(
        &self,
        id: PunishmentId,
        expected: PunishmentStatus,
        patch: PunishmentPatch,
    ) -> Result<Punishment, DbError>;

    /// Tombstone a punishment and reconcile the target.
    async fn soft_delete_punishment(&self, id: PunishmentId) -> Result<Punishment, DbError>;
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Signed deltas for an atomic counter update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatDelta {
    /// Added to `captures_count`.
    pub captures: i64,
    /// Added to `reports_count`.
    pub reports: i64,
    /// Added to `points`.
    pub points: i64,
}

/// Absolute values written by an administrator override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatOverride {
    /// New `captures_count`.
    pub captures_count: Option<i64>,
    /// New `reports_count`.
    pub reports_count: Option<i64>,
    /// New `points`.
    pub points: Option<i64>,
}

/// A live agent and its counters, used for ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// The agent.
    pub user_id: UserId,
    /// The agent's username.
    pub username: String,
    /// Counters; zeroed when the agent has no row yet.
    pub statistic: Statistic,
}

/// Persistence for [`Statistic`] rows.
#[async_trait]
pub trait StatisticStore: Send + Sync {
    /// The statistic row of `user`, if one exists.
    async fn find_statistic(&self, user: UserId) -> Result<Option<Statistic>, DbError>;

    /// Atomically add `delta` to `user`'s counters, creating the row first
    /// if needed.
    async fn increment(&self, user: UserId, delta: StatDelta) -> Result<Statistic, DbError>;

    /// Overwrite the given counters, creating the row first if needed.
    async fn override_statistic(
        &self,
        user: UserId,
        values: StatOverride,
    ) -> Result<Statistic, DbError>;

    /// Every live agent with its counters, in no particular order.
    async fn agent_standings(&self) -> Result<Vec<Standing>, DbError>;

    /// Persist `ranking` for each listed user, all or nothing. No other
    /// column is touched.
    async fn write_rankings(&self, rankings: &[(UserId, i64)]) -> Result<(), DbError>;
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// Fields for a new capture record.
#[derive(Debug, Clone)]
pub struct NewCapture {
    /// The capturing agent.
    pub agent_id: UserId,
    /// The target being captured.
    pub target_id: UserId,
    /// Method label.
    pub method: String,
    /// Difficulty bucket.
    pub difficulty: Difficulty,
}

/// Persistence for [`Capture`] rows.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    /// Capture a target in one operation: flip its status to `captured`,
    /// append the capture record, and credit the agent one capture plus
    /// the difficulty's points.
    ///
    /// Fails with [`DbError::NotFound`] if the target is not a live user and
    /// with [`DbError::Conflict`] if it is not a target or already captured.
    async fn commit_capture(&self, new: NewCapture) -> Result<Capture, DbError>;

    /// Captures made by `agent`, newest first, at most `limit` if given.
    async fn captures_by_agent(
        &self,
        agent: UserId,
        limit: Option<u64>,
    ) -> Result<Vec<Capture>, DbError>;

    /// Every capture, newest first.
    async fn all_captures(&self) -> Result<Vec<Capture>, DbError>;

    /// Number of capture records.
    async fn count_captures(&self) -> Result<u64, DbError>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// One handle per store trait, shared by the workflow services.
#[derive(Clone)]
pub struct Stores {
    /// User persistence.
    pub users: Arc<dyn UserStore>,
    /// Report persistence.
    pub reports: Arc<dyn ReportStore>,
    /// Punishment persistence.
    pub punishments: Arc<dyn PunishmentStore>,
    /// Statistic persistence.
    pub statistics: Arc<dyn StatisticStore>,
    /// Capture persistence.
    pub captures: Arc<dyn CaptureStore>,
}

impl Stores {
    /// Use a single backend for every store trait.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + ReportStore + PunishmentStore + StatisticStore + CaptureStore + 'static,
    {
        Self {
            users: Arc::clone(&backend) as Arc<dyn UserStore>,
            reports: Arc::clone(&backend) as Arc<dyn ReportStore>,
            punishments: Arc::clone(&backend) as Arc<dyn PunishmentStore>,
            statistics: Arc::clone(&backend) as Arc<dyn StatisticStore>,
            captures: backend as Arc<dyn CaptureStore>,
        }
    }
}
