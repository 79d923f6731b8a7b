//! Integration tests for the HTTP API.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Each test gets a fresh in-memory game seeded
//! with the demo accounts.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chaos_api::{AppState, build_router};
use chaos_core::config::PaginationConfig;
use chaos_core::{Backend, JwtIssuer, SaltedSha256};
use chaos_db::{MemoryStore, Stores};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "api-tests-secret-that-is-long-enough-0000";

async fn make_router() -> Router {
    let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
    let tokens = JwtIssuer::new(SECRET, "chaos", 3600).unwrap();
    let backend = Backend::new(stores, Arc::new(tokens), Arc::new(SaltedSha256));
    chaos_core::seed::seed(&backend).await.unwrap();
    build_router(Arc::new(AppState::new(backend, PaginationConfig::default())))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn with_json(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn login(router: &Router, username: &str, password: &str) -> String {
    let body = serde_json::json!({ "username": username, "password": password });
    let (status, json) = send(router, with_json("POST", "/api/auth/login", None, &body)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["token"].as_str().unwrap().to_owned()
}

async fn user_id(router: &Router, admin: &str, username: &str) -> u64 {
    let (_, json) = send(router, get("/api/users?limit=100", admin)).await;
    json["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["username"] == username)
        .and_then(|u| u["id"].as_u64())
        .unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_health_needs_no_token() {
    let router = make_router().await;
    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_missing_and_bad_tokens_are_401() {
    let router = make_router().await;

    let request = Request::get("/api/auth/me").body(Body::empty()).unwrap();
    let (status, json) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthenticated");
    assert_eq!(json["status"], 401);

    let (status, _) = send(&router, get("/api/auth/me", "not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let body = serde_json::json!({ "username": "andrei", "password": "wrong-password" });
    let (status, _) = send(&router, with_json("POST", "/api/auth/login", None, &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_and_profile() {
    let router = make_router().await;
    let token = login(&router, "daemon_alpha", "DaemonAlpha123!").await;

    let (status, json) = send(&router, get("/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "daemon_alpha");
    assert_eq!(json["role"], "agent");
    assert!(json.get("credential_hash").is_none());
}

#[tokio::test]
async fn test_capture_then_conflict() {
    let router = make_router().await;
    let admin = login(&router, "andrei", "AndreI2024!").await;
    let agent = login(&router, "daemon_alpha", "DaemonAlpha123!").await;
    let alice = user_id(&router, &admin, "alice").await;

    let uri = format!("/api/users/{alice}/capture");
    let (status, json) = send(&router, with_json("POST", &uri, Some(&agent), &Value::Null)).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["method"], "network_infiltration");
    assert_eq!(json["target_id"], alice);

    let (status, json) = send(&router, with_json("POST", &uri, Some(&agent), &Value::Null)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "conflict");

    let (_, json) = send(&router, get(&format!("/api/users/{alice}"), &admin)).await;
    assert_eq!(json["status"], "captured");
}

#[tokio::test]
async fn test_role_gates_are_403() {
    let router = make_router().await;
    let target = login(&router, "bob", "Bob123!").await;
    let agent = login(&router, "daemon_beta", "DaemonBeta123!").await;

    let (status, json) = send(&router, get("/api/captures", &target)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "unauthorized");

    let (status, _) = send(&router, get("/api/dashboard/admin", &agent)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&router, get("/api/resistance", &agent)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_resistance_report_is_anonymous() {
    let router = make_router().await;
    let target = login(&router, "chalier", "Chalier123!").await;

    let body = serde_json::json!({
        "title": "Odd badge readers",
        "description": "Badge readers log entries nobody made.",
    });
    let (status, json) = send(
        &router,
        with_json("POST", "/api/resistance/report", Some(&target), &body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["type"], "anonymous");
    assert!(json["author_id"].is_null());

    let (status, json) = send(&router, get("/api/resistance", &target)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["anonymous_reports"], 4);
    assert_eq!(json["total_targets"], 4);
}

#[tokio::test]
async fn test_pagination_bounds() {
    let router = make_router().await;
    let admin = login(&router, "andrei", "AndreI2024!").await;

    let (status, json) = send(&router, get("/api/users?page=2&limit=3", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["items"].as_array().unwrap().len(), 3);
    assert_eq!(json["page"], 2);
    assert_eq!(json["total_items"], 10);
    assert_eq!(json["total_pages"], 4);

    let (status, json) = send(&router, get("/api/users?limit=0", &admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_input");
}

#[tokio::test]
async fn test_report_moderation_flow() {
    let router = make_router().await;
    let admin = login(&router, "andrei", "AndreI2024!").await;
    let agent = login(&router, "daemon_beta", "DaemonBeta123!").await;

    let body = serde_json::json!({
        "title": "Router firmware",
        "description": "Unpatched firmware on the core router.",
        "type": "capture",
    });
    let (status, report) =
        send(&router, with_json("POST", "/api/reports", Some(&agent), &body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/reports/{}/status", report["id"]);

    let bad = serde_json::json!({ "status": "maybe" });
    let (status, _) = send(&router, with_json("PUT", &uri, Some(&admin), &bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let approve = serde_json::json!({ "status": "approved" });
    let (status, json) = send(&router, with_json("PUT", &uri, Some(&admin), &approve)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "approved");

    let (status, _) = send(&router, with_json("PUT", &uri, Some(&admin), &approve)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&router, with_json("PUT", &uri, Some(&agent), &approve)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_leaderboard_and_dashboards() {
    let router = make_router().await;
    let admin = login(&router, "andrei", "AndreI2024!").await;
    let agent = login(&router, "daemon_gamma", "DaemonGamma123!").await;

    let (status, json) = send(&router, get("/api/statistics/leaderboard?limit=3", &agent)).await;
    assert_eq!(status, StatusCode::OK);
    let board = json.as_array().unwrap();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0]["username"], "daemon_omega");
    assert_eq!(board[0]["position"], 1);

    let (status, json) = send(&router, get("/api/dashboard/agent", &agent)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statistics"]["position"], 5);
    assert_eq!(json["active_punishments"].as_array().unwrap().len(), 2);

    let (status, json) = send(&router, get("/api/dashboard/admin", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["counts"]["population"]["punished"], 1);
    assert_eq!(json["recent_reports"].as_array().unwrap().len(), 5);
    assert_eq!(json["top_agents"].as_array().unwrap().len(), 5);
}
