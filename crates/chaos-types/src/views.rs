//! Read-only projections composed from several entities.
//!
//! These are what the dashboards, the leaderboard, and the resistance page
//! return. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::UserId;
use crate::structs::{Capture, Punishment, Report, Statistic};

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LeaderboardEntry {
    /// 1-based position, computed at read time.
    pub position: u64,
    /// The agent.
    pub user_id: UserId,
    /// The agent's username.
    pub username: String,
    /// Accumulated points.
    pub points: i64,
    /// Number of captures.
    pub captures_count: i64,
    /// Number of reports filed.
    pub reports_count: i64,
}

/// An agent's counters together with their live leaderboard position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatisticView {
    /// The stored counters (all-zero if the agent has no row yet).
    pub statistic: Statistic,
    /// Position computed from the current standings; 0 if unranked.
    pub position: u64,
}

/// A capture joined with the usernames of both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CaptureView {
    /// The capture record.
    pub capture: Capture,
    /// Username of the capturing agent.
    pub agent_username: String,
    /// Username of the captured target.
    pub target_username: String,
}

/// User counts by role and status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PopulationStats {
    /// All live users.
    pub total_users: u64,
    /// Users with the administrator role.
    pub administrators: u64,
    /// Users with the agent role.
    pub agents: u64,
    /// Users with the target role.
    pub targets: u64,
    /// Users whose status is `active`.
    pub active: u64,
    /// Users whose status is `captured`.
    pub captured: u64,
    /// Users whose status is `punished`.
    pub punished: u64,
}

/// Headline numbers on the administrator dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DashboardCounts {
    /// User counts by role and status.
    pub population: PopulationStats,
    /// All live reports.
    pub total_reports: u64,
    /// Reports awaiting moderation.
    pub pending_reports: u64,
    /// Capture records ever written.
    pub total_captures: u64,
}

/// Everything the administrator sees at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AdminDashboard {
    /// Aggregate counts.
    pub counts: DashboardCounts,
    /// The five most recent reports.
    pub recent_reports: Vec<Report>,
    /// The five best agents.
    pub top_agents: Vec<LeaderboardEntry>,
    /// Every capture, newest first.
    pub captures: Vec<CaptureView>,
}

/// Everything an agent sees at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentDashboard {
    /// The agent's own counters and live position.
    pub statistics: StatisticView,
    /// Punishments currently in force against the agent.
    pub active_punishments: Vec<Punishment>,
    /// The top of the leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// The agent's most recent captures.
    pub recent_captures: Vec<CaptureView>,
}

/// Counters shown to targets on the resistance page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResistanceOverview {
    /// Live users with the target role.
    pub total_targets: u64,
    /// Targets currently captured.
    pub captured_targets: u64,
    /// Targets still free.
    pub free_targets: u64,
    /// Anonymous reports on file.
    pub anonymous_reports: u64,
}
