//! Core entity structs.
//!
//! These are the records the store persists and the API returns. Secret
//! credentials are deliberately absent from [`User`]; the store keeps the
//! hash in a separate column that only the identity layer reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    CaptureStatus, Difficulty, PunishmentStatus, PunishmentType, ReportStatus, ReportType, Role,
    UserStatus,
};
use crate::ids::{CaptureId, PunishmentId, ReportId, StatisticId, UserId};

/// A player or operator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct User {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Unique contact address.
    pub email: String,
    /// The role this user plays.
    pub role: Role,
    /// Current lifecycle status.
    pub status: UserStatus,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last modified.
    pub updated_at: DateTime<Utc>,
    /// Set when the account has been soft-deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the account has been soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A report submitted to the administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Report {
    /// Store-assigned identifier.
    pub id: ReportId,
    /// Short headline.
    pub title: String,
    /// Full body.
    pub description: String,
    /// What kind of report this is.
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// The submitting user. Always `None` for anonymous reports.
    pub author_id: Option<UserId>,
    /// Moderation status.
    pub status: ReportStatus,
    /// When the report was filed.
    pub created_at: DateTime<Utc>,
    /// When the report was last modified.
    pub updated_at: DateTime<Utc>,
}

/// A sanction or reward assigned to an agent by the administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Punishment {
    /// Store-assigned identifier.
    pub id: PunishmentId,
    /// The agent this applies to.
    pub target_id: UserId,
    /// The administrator who assigned it.
    pub assigned_by: UserId,
    /// Sanction kind, or `reward`.
    #[serde(rename = "type")]
    pub punishment_type: PunishmentType,
    /// Free-form explanation.
    pub description: String,
    /// Lifecycle status.
    pub status: PunishmentStatus,
    /// Optional end of the punishment.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the punishment was assigned.
    pub created_at: DateTime<Utc>,
    /// When the punishment was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Scoring counters for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Statistic {
    /// Store-assigned identifier.
    pub id: StatisticId,
    /// The agent these counters belong to.
    pub user_id: UserId,
    /// Number of successful captures.
    pub captures_count: i64,
    /// Number of reports filed.
    pub reports_count: i64,
    /// Accumulated points.
    pub points: i64,
    /// Persisted 1-based ranking snapshot; 0 means unranked.
    pub ranking: i64,
    /// When any counter last changed.
    pub updated_at: DateTime<Utc>,
}

impl Statistic {
    /// A zero-initialized row for an agent that has none yet.
    ///
    /// Carries [`StatisticId`] 0 because it has not been persisted.
    pub const fn zeroed(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: StatisticId::new(0),
            user_id,
            captures_count: 0,
            reports_count: 0,
            points: 0,
            ranking: 0,
            updated_at: now,
        }
    }
}

/// Immutable record of a single capture event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Capture {
    /// Store-assigned identifier.
    pub id: CaptureId,
    /// The capturing agent.
    pub agent_id: UserId,
    /// The captured target.
    pub target_id: UserId,
    /// When the capture happened.
    pub captured_at: DateTime<Utc>,
    /// Always [`CaptureStatus::Captured`] when written.
    pub status: CaptureStatus,
    /// How the capture was carried out.
    pub method: String,
    /// Difficulty bucket derived from the target ID.
    pub difficulty: Difficulty,
    /// Points awarded to the agent.
    pub points: i64,
}
