//! Axum router construction.
//!
//! Assembles every route into a single [`Router`] with permissive CORS
//! and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete router. See [`handlers`] for the endpoint table.
///
/// CORS allows any origin so browser clients on other ports can call the
/// API during development.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Authentication
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/change-password", post(handlers::change_password))
        .route("/api/auth/register", post(handlers::register))
        // Users
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/stats", get(handlers::user_stats))
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/api/users/{id}/restore", post(handlers::restore_user))
        .route("/api/users/{id}/capture", post(handlers::capture))
        .route("/api/users/{id}/captures", get(handlers::agent_captures))
        .route(
            "/api/users/{id}/punishments/active",
            get(handlers::active_punishments),
        )
        // Captures
        .route("/api/captures", get(handlers::all_captures))
        .route("/api/capture-targets", get(handlers::capture_targets))
        // Reports
        .route(
            "/api/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route("/api/reports/recent", get(handlers::recent_reports))
        .route(
            "/api/reports/{id}",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route("/api/reports/{id}/status", put(handlers::update_report_status))
        // Punishments
        .route(
            "/api/punishments",
            post(handlers::assign_punishment).get(handlers::list_punishments),
        )
        .route(
            "/api/punishments/{id}",
            get(handlers::get_punishment)
                .put(handlers::update_punishment)
                .delete(handlers::delete_punishment),
        )
        // Statistics
        .route("/api/statistics/leaderboard", get(handlers::leaderboard))
        .route("/api/statistics/recalculate", post(handlers::recalculate))
        .route(
            "/api/statistics/{user_id}",
            get(handlers::get_statistics).put(handlers::override_statistics),
        )
        // Dashboards
        .route("/api/dashboard/admin", get(handlers::admin_dashboard))
        .route("/api/dashboard/agent", get(handlers::agent_dashboard))
        .route("/api/resistance", get(handlers::resistance))
        .route("/api/resistance/report", post(handlers::resistance_report))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
