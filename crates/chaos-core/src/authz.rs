//! Authorization engine.
//!
//! [`authorize`] is a pure function of the acting role, the actor's
//! identity, and a descriptor of the action. It performs no I/O: workflows
//! load whatever the descriptor needs (a report's author, a capture
//! target's role) and then ask.
//!
//! Hard denies surface as [`CoreError::Unauthorized`] through [`require`].
//! List operations never deny; they are narrowed with [`list_scope`]
//! instead, so an agent listing reports simply sees its own.

use chaos_types::{ReportType, Role, UserId};

use crate::error::CoreError;

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// The caller's user ID.
    pub id: UserId,
    /// The caller's role, as currently stored.
    pub role: Role,
}

impl Actor {
    /// Create an actor.
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Whether the actor is the administrator.
    pub const fn is_admin(self) -> bool {
        matches!(self.role, Role::Administrator)
    }
}

/// An action together with the facts about its resource that the rules
/// depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create a user account.
    RegisterUser,
    /// Read one user record.
    ViewUser {
        /// The user being read.
        user: UserId,
    },
    /// Update, delete, or restore users, or read population counters.
    ManageUsers,
    /// Submit a report of the given type.
    CreateReport {
        /// The requested report type.
        report_type: ReportType,
    },
    /// Read one report.
    ViewReport {
        /// The report's type.
        report_type: ReportType,
        /// The report's author, if any.
        author: Option<UserId>,
    },
    /// Change a report's moderation status.
    ModerateReport,
    /// Delete a report.
    DeleteReport {
        /// The report's author, if any.
        author: Option<UserId>,
    },
    /// Read the most recent reports across all authors.
    ViewRecentReports,
    /// Capture a user with the given role.
    Capture {
        /// The role of the user being captured.
        target_role: Role,
    },
    /// List users that can currently be captured.
    ViewCaptureTargets,
    /// Read the captures made by one agent.
    ViewCaptures {
        /// The capturing agent.
        agent: UserId,
    },
    /// Read every capture.
    ViewAllCaptures,
    /// Assign a punishment or reward.
    AssignPunishment,
    /// Update or delete a punishment.
    ManagePunishments,
    /// Read one punishment.
    ViewPunishment {
        /// The punished agent.
        target: UserId,
    },
    /// Read the active punishments of one agent.
    ViewActivePunishments {
        /// The punished agent.
        target: UserId,
    },
    /// Read one agent's statistics.
    ViewStatistics {
        /// The agent whose statistics are read.
        user: UserId,
    },
    /// Overwrite an agent's statistics.
    OverrideStatistics,
    /// Recompute the persisted ranking.
    RecalculateRanking,
    /// Read the leaderboard.
    ViewLeaderboard,
    /// Read the administrator dashboard.
    ViewAdminDashboard,
    /// Read the agent dashboard.
    ViewAgentDashboard,
    /// Read the resistance overview.
    ViewResistance,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is refused, with a reason for the caller.
    Deny(&'static str),
}

impl Decision {
    const fn allow_if(condition: bool, reason: &'static str) -> Self {
        if condition {
            Self::Allow
        } else {
            Self::Deny(reason)
        }
    }
}

/// Decide whether `actor` may perform `action`.
pub fn authorize(actor: Actor, action: Action) -> Decision {
    match actor.role {
        Role::Administrator => authorize_admin(action),
        Role::Agent => authorize_agent(actor.id, action),
        Role::Target => authorize_target(actor.id, action),
    }
}

const fn authorize_admin(action: Action) -> Decision {
    match action {
        Action::Capture { .. } => Decision::Deny("only agents can capture targets"),
        Action::ViewAgentDashboard => Decision::Deny("the agent dashboard is for agents"),
        _ => Decision::Allow,
    }
}

fn authorize_agent(me: UserId, action: Action) -> Decision {
    match action {
        Action::ViewUser { user } => Decision::allow_if(user == me, "agents can only view themselves"),
        Action::CreateReport { report_type } => Decision::allow_if(
            matches!(report_type, ReportType::Capture | ReportType::Resistance),
            "agents file capture or resistance reports only",
        ),
        Action::ViewReport { author, .. } | Action::DeleteReport { author } => {
            Decision::allow_if(author == Some(me), "agents can only access their own reports")
        }
        Action::Capture { target_role } => Decision::allow_if(
            target_role == Role::Target,
            "only users with the target role can be captured",
        ),
        Action::ViewCaptures { agent } => {
            Decision::allow_if(agent == me, "agents can only view their own captures")
        }
        Action::ViewPunishment { target } | Action::ViewActivePunishments { target } => {
            Decision::allow_if(target == me, "agents can only view their own punishments")
        }
        Action::ViewStatistics { user } => {
            Decision::allow_if(user == me, "agents can only view their own statistics")
        }
        Action::ViewCaptureTargets | Action::ViewLeaderboard | Action::ViewAgentDashboard => {
            Decision::Allow
        }
        _ => Decision::Deny("this action requires the administrator"),
    }
}

fn authorize_target(me: UserId, action: Action) -> Decision {
    match action {
        Action::ViewUser { user } => {
            Decision::allow_if(user == me, "targets can only view themselves")
        }
        Action::CreateReport { report_type } => Decision::allow_if(
            report_type == ReportType::Anonymous,
            "targets file anonymous reports only",
        ),
        Action::ViewReport { report_type, .. } => Decision::allow_if(
            report_type == ReportType::Anonymous,
            "targets can only view anonymous reports",
        ),
        Action::ViewResistance => Decision::Allow,
        _ => Decision::Deny("targets cannot access this resource"),
    }
}

/// Check `action` and convert a denial into [`CoreError::Unauthorized`].
pub fn require(actor: Actor, action: Action) -> Result<(), CoreError> {
    match authorize(actor, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(
                actor_id = %actor.id,
                role = %actor.role,
                ?action,
                reason,
                "Action denied"
            );
            Err(CoreError::Unauthorized(reason.to_owned()))
        }
    }
}

// ---------------------------------------------------------------------------
// List scoping
// ---------------------------------------------------------------------------

/// A collection that can be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// User accounts.
    Users,
    /// Reports.
    Reports,
    /// Punishments.
    Punishments,
}

/// The visibility filter a list operation must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Everything.
    All,
    /// Only records owned by this user (self, authored, or targeted).
    Owned(UserId),
    /// Only anonymous reports.
    AnonymousOnly,
    /// Nothing; the list is empty.
    Empty,
}

/// The scope within which `actor` may list `collection`.
pub const fn list_scope(actor: Actor, collection: Collection) -> ListScope {
    match (actor.role, collection) {
        (Role::Administrator, _) => ListScope::All,
        (Role::Agent, _) | (Role::Target, Collection::Users) => ListScope::Owned(actor.id),
        (Role::Target, Collection::Reports) => ListScope::AnonymousOnly,
        (Role::Target, Collection::Punishments) => ListScope::Empty,
    }
}
