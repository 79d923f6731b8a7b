//! Read-only dashboard composition.
//!
//! Nothing here mutates state. Missing data degrades to zero values: an
//! agent without a statistic row sees zeroed counters, an empty game sees
//! empty lists.

use chaos_db::{ReportFilter, Stores, UserFilter};
use chaos_types::{
    AdminDashboard, AgentDashboard, DashboardCounts, ReportStatus, ReportType, ResistanceOverview,
    Role, UserStatus,
};

use crate::accounts;
use crate::authz::{self, Action, Actor};
use crate::capture::capture_views;
use crate::error::CoreError;
use crate::ranking;

/// Reports shown on the administrator dashboard.
const ADMIN_RECENT_REPORTS: u64 = 5;
/// Agents shown on the administrator dashboard.
const ADMIN_TOP_AGENTS: u64 = 5;
/// Leaderboard rows shown on the agent dashboard.
const AGENT_LEADERBOARD: u64 = 10;
/// Own captures shown on the agent dashboard.
const AGENT_RECENT_CAPTURES: u64 = 5;

/// Builds the per-role dashboards.
#[derive(Clone)]
pub struct DashboardService {
    stores: Stores,
}

impl DashboardService {
    /// Create the service over the full store bundle.
    pub const fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Aggregate counts, recent reports, top agents, and every capture.
    pub async fn admin(&self, actor: Actor) -> Result<AdminDashboard, CoreError> {
        authz::require(actor, Action::ViewAdminDashboard)?;
        let reports = self.stores.reports.as_ref();

        let counts = DashboardCounts {
            population: accounts::population(self.stores.users.as_ref()).await?,
            total_reports: reports.count_reports(ReportFilter::default()).await?,
            pending_reports: reports
                .count_reports(ReportFilter {
                    status: Some(ReportStatus::Pending),
                    ..ReportFilter::default()
                })
                .await?,
            total_captures: self.stores.captures.count_captures().await?,
        };
        let captures = self.stores.captures.all_captures().await?;

        Ok(AdminDashboard {
            counts,
            recent_reports: reports.recent_reports(ADMIN_RECENT_REPORTS).await?,
            top_agents: ranking::leaderboard(self.stores.statistics.as_ref(), ADMIN_TOP_AGENTS)
                .await?,
            captures: capture_views(self.stores.users.as_ref(), captures).await?,
        })
    }

    /// The acting agent's own standing, sanctions, and captures.
    pub async fn agent(&self, actor: Actor) -> Result<AgentDashboard, CoreError> {
        authz::require(actor, Action::ViewAgentDashboard)?;
        let statistics = self.stores.statistics.as_ref();
        let captures = self
            .stores
            .captures
            .captures_by_agent(actor.id, Some(AGENT_RECENT_CAPTURES))
            .await?;

        Ok(AgentDashboard {
            statistics: ranking::statistic_view(statistics, actor.id).await?,
            active_punishments: self.stores.punishments.active_punishments(actor.id).await?,
            leaderboard: ranking::leaderboard(statistics, AGENT_LEADERBOARD).await?,
            recent_captures: capture_views(self.stores.users.as_ref(), captures).await?,
        })
    }

    /// How many targets remain free, and how many anonymous reports exist.
    pub async fn resistance(&self, actor: Actor) -> Result<ResistanceOverview, CoreError> {
        authz::require(actor, Action::ViewResistance)?;
        let users = self.stores.users.as_ref();
        let targets = UserFilter {
            role: Some(Role::Target),
            ..UserFilter::default()
        };
        let total_targets = users.count_users(targets).await?;
        let captured_targets = users
            .count_users(UserFilter {
                status: Some(UserStatus::Captured),
                ..targets
            })
            .await?;
        let anonymous_reports = self
            .stores
            .reports
            .count_reports(ReportFilter {
                report_type: Some(ReportType::Anonymous),
                ..ReportFilter::default()
            })
            .await?;

        Ok(ResistanceOverview {
            total_targets,
            captured_targets,
            free_targets: total_targets.saturating_sub(captured_targets),
            anonymous_reports,
        })
    }
}
