//! REST endpoint handlers.
//!
//! Every handler is a thin adapter: extract the caller and the input,
//! call one workflow operation, and serialize its result. All decisions
//! live in `chaos-core`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `POST` | `/api/auth/login` | Exchange credentials for a token |
//! | `GET` | `/api/auth/me` | The caller's own account |
//! | `POST` | `/api/auth/change-password` | Replace the caller's password |
//! | `POST` | `/api/auth/register` | Create an account (administrator) |
//! | `GET` | `/api/users` | List users within the caller's scope |
//! | `GET` | `/api/users/stats` | Population counts (administrator) |
//! | `GET/PUT/DELETE` | `/api/users/:id` | Read, update, soft-delete a user |
//! | `POST` | `/api/users/:id/restore` | Undo a soft delete (administrator) |
//! | `POST` | `/api/users/:id/capture` | Capture a target (agent) |
//! | `GET` | `/api/users/:id/captures` | An agent's captures |
//! | `GET` | `/api/users/:id/punishments/active` | An agent's active punishments |
//! | `GET` | `/api/captures` | Every capture (administrator) |
//! | `GET` | `/api/capture-targets` | Capturable targets (agent) |
//! | `POST/GET` | `/api/reports` | File or list reports |
//! | `GET` | `/api/reports/recent` | Newest reports (administrator) |
//! | `GET/DELETE` | `/api/reports/:id` | Read or delete a report |
//! | `PUT` | `/api/reports/:id/status` | Moderate a report (administrator) |
//! | `POST/GET` | `/api/punishments` | Assign or list punishments |
//! | `GET/PUT/DELETE` | `/api/punishments/:id` | Read, update, delete a punishment |
//! | `GET` | `/api/statistics/leaderboard` | Top agents |
//! | `POST` | `/api/statistics/recalculate` | Persist the ranking (administrator) |
//! | `GET/PUT` | `/api/statistics/:user_id` | Read or override statistics |
//! | `GET` | `/api/dashboard/admin` | Administrator dashboard |
//! | `GET` | `/api/dashboard/agent` | Agent dashboard |
//! | `GET` | `/api/resistance` | Resistance overview (target) |
//! | `POST` | `/api/resistance/report` | File an anonymous report |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chaos_core::accounts::{
    ChangePasswordInput, LoginInput, LoginOutcome, RegisterInput, UpdateUserInput, UserQuery,
};
use chaos_core::punishment::{AssignPunishmentInput, PunishmentQuery, UpdatePunishmentInput};
use chaos_core::CoreError;
use chaos_core::ranking::StatOverrideInput;
use chaos_core::report::{CreateReportInput, ReportQuery, UpdateReportStatusInput};
use chaos_types::{
    AdminDashboard, AgentDashboard, Capture, CaptureView, LeaderboardEntry, Page, PageRequest,
    PopulationStats, Punishment, PunishmentId, Report, ReportId, ResistanceOverview,
    StatisticView, User, UserId,
};
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// `page` and `limit` for list endpoints. Both are optional; defaults and
/// the maximum page size come from configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    /// 1-based page number.
    pub page: Option<u64>,
    /// Page size.
    pub limit: Option<u64>,
}

impl PageParams {
    fn resolve(self, state: &AppState) -> Result<PageRequest, ApiError> {
        Ok(state.pagination.request(self.page, self.limit)?)
    }
}

/// Body of `POST /api/resistance/report`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnonymousReportBody {
    /// Short headline.
    pub title: String,
    /// Full body.
    pub description: String,
}

type Shared = State<Arc<AppState>>;

// ---------------------------------------------------------------------------
// Health and authentication
// ---------------------------------------------------------------------------

/// Liveness probe; needs no token.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Exchange a username and password for a bearer token.
pub async fn login(
    State(state): Shared,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginOutcome>, ApiError> {
    match state.backend.accounts.login(input).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(CoreError::Unauthorized(_)) => Err(ApiError::InvalidCredentials),
        Err(other) => Err(other.into()),
    }
}

/// The caller's own account.
pub async fn me(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.backend.accounts.profile(actor).await?))
}

/// Replace the caller's password.
pub async fn change_password(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Json(input): Json<ChangePasswordInput>,
) -> Result<impl IntoResponse, ApiError> {
    state.backend.accounts.change_password(actor, input).await?;
    Ok(Json(serde_json::json!({ "message": "password changed" })))
}

/// Create an account.
pub async fn register(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.backend.accounts.register(actor, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// List users within the caller's scope.
pub async fn list_users(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Query(page): Query<PageParams>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let page = page.resolve(&state)?;
    Ok(Json(state.backend.accounts.list_users(actor, query, page).await?))
}

/// Population counts by role and status.
pub async fn user_stats(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<PopulationStats>, ApiError> {
    Ok(Json(state.backend.accounts.population(actor).await?))
}

/// One user.
pub async fn get_user(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.backend.accounts.get_user(actor, id).await?))
}

/// Partial update of a user.
pub async fn update_user(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.backend.accounts.update_user(actor, id, input).await?))
}

/// Soft-delete a user.
pub async fn delete_user(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    state.backend.accounts.delete_user(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Undo a soft delete.
pub async fn restore_user(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.backend.accounts.restore_user(actor, id).await?))
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// Capture the target at `id`.
pub async fn capture(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<(StatusCode, Json<Capture>), ApiError> {
    let capture = state.backend.captures.capture(actor, id).await?;
    Ok((StatusCode::CREATED, Json(capture)))
}

/// Captures made by the agent at `id`.
pub async fn agent_captures(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<CaptureView>>, ApiError> {
    Ok(Json(state.backend.captures.agent_captures(actor, id).await?))
}

/// Every capture.
pub async fn all_captures(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<Vec<CaptureView>>, ApiError> {
    Ok(Json(state.backend.captures.all_captures(actor).await?))
}

/// Targets that can be captured right now.
pub async fn capture_targets(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.backend.captures.capture_targets(actor).await?))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// File a report.
pub async fn create_report(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Json(input): Json<CreateReportInput>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let report = state.backend.reports.create(actor, input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// List reports within the caller's scope.
pub async fn list_reports(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Query(page): Query<PageParams>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Page<Report>>, ApiError> {
    let page = page.resolve(&state)?;
    Ok(Json(state.backend.reports.list(actor, query, page).await?))
}

/// The newest reports.
pub async fn recent_reports(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let limit = page.resolve(&state)?.limit();
    Ok(Json(state.backend.reports.recent(actor, limit).await?))
}

/// One report.
pub async fn get_report(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<ReportId>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(state.backend.reports.get(actor, id).await?))
}

/// Soft-delete a report.
pub async fn delete_report(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<ReportId>,
) -> Result<StatusCode, ApiError> {
    state.backend.reports.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Approve or reject a report.
pub async fn update_report_status(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<ReportId>,
    Json(input): Json<UpdateReportStatusInput>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(state.backend.reports.update_status(actor, id, input).await?))
}

// ---------------------------------------------------------------------------
// Punishments
// ---------------------------------------------------------------------------

/// Assign a punishment or reward.
pub async fn assign_punishment(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Json(input): Json<AssignPunishmentInput>,
) -> Result<(StatusCode, Json<Punishment>), ApiError> {
    let punishment = state.backend.punishments.assign(actor, input).await?;
    Ok((StatusCode::CREATED, Json(punishment)))
}

/// List punishments within the caller's scope.
pub async fn list_punishments(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Query(page): Query<PageParams>,
    Query(query): Query<PunishmentQuery>,
) -> Result<Json<Page<Punishment>>, ApiError> {
    let page = page.resolve(&state)?;
    Ok(Json(state.backend.punishments.list(actor, query, page).await?))
}

/// One punishment.
pub async fn get_punishment(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<PunishmentId>,
) -> Result<Json<Punishment>, ApiError> {
    Ok(Json(state.backend.punishments.get(actor, id).await?))
}

/// Change a punishment's status, description, or expiry.
pub async fn update_punishment(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<PunishmentId>,
    Json(input): Json<UpdatePunishmentInput>,
) -> Result<Json<Punishment>, ApiError> {
    Ok(Json(state.backend.punishments.update(actor, id, input).await?))
}

/// Soft-delete a punishment.
pub async fn delete_punishment(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<PunishmentId>,
) -> Result<StatusCode, ApiError> {
    state.backend.punishments.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Active punishments of the agent at `id`.
pub async fn active_punishments(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<Punishment>>, ApiError> {
    Ok(Json(state.backend.punishments.active_for(actor, id).await?))
}

// ---------------------------------------------------------------------------
// Statistics and ranking
// ---------------------------------------------------------------------------

/// Top agents by live position.
pub async fn leaderboard(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = page.resolve(&state)?.limit();
    Ok(Json(state.backend.ranking.leaderboard(actor, limit).await?))
}

/// Recompute and persist the ranking.
pub async fn recalculate(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.backend.ranking.recalculate(actor).await?))
}

/// One agent's statistics.
pub async fn get_statistics(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(user_id): Path<UserId>,
) -> Result<Json<StatisticView>, ApiError> {
    Ok(Json(state.backend.ranking.statistics(actor, user_id).await?))
}

/// Overwrite an agent's statistics.
pub async fn override_statistics(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Path(user_id): Path<UserId>,
    Json(input): Json<StatOverrideInput>,
) -> Result<Json<StatisticView>, ApiError> {
    Ok(Json(
        state
            .backend
            .ranking
            .override_statistics(actor, user_id, input)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Dashboards
// ---------------------------------------------------------------------------

/// Administrator dashboard.
pub async fn admin_dashboard(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<AdminDashboard>, ApiError> {
    Ok(Json(state.backend.dashboards.admin(actor).await?))
}

/// Agent dashboard.
pub async fn agent_dashboard(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<AgentDashboard>, ApiError> {
    Ok(Json(state.backend.dashboards.agent(actor).await?))
}

/// Resistance overview.
pub async fn resistance(
    State(state): Shared,
    Authenticated(actor): Authenticated,
) -> Result<Json<ResistanceOverview>, ApiError> {
    Ok(Json(state.backend.dashboards.resistance(actor).await?))
}

/// File an anonymous report.
pub async fn resistance_report(
    State(state): Shared,
    Authenticated(actor): Authenticated,
    Json(body): Json<AnonymousReportBody>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let input = CreateReportInput {
        title: body.title,
        description: body.description,
        report_type: String::from("anonymous"),
    };
    let report = state.backend.reports.create(actor, input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}
