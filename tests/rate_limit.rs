//! Integration tests for per-client rate limiting at the HTTP layer.
//!
//! Verifies that:
//! - Requests up to the quota are admitted with decreasing remaining counts
//! - The next request in the same window gets 429 with Retry-After
//! - Distinct clients never share a quota
//! - A new window (or an evicted idle client) starts from a fresh count

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::Request;
use tempfile::TempDir;
use tower::ServiceExt;

use credgate::config::{
    AdminConfig, AuthConfig, Config, CredentialsConfig, LoggingConfig, RateLimitConfig,
    ServerConfig, UpstreamConfig,
};
use credgate::pool::CredentialPool;
use credgate::proxy::{create_router, AppState};

fn test_config(store: &Path, rate_limit: RateLimitConfig) -> Config {
    Config {
        server: ServerConfig::default(),
        credentials: CredentialsConfig {
            path: store.to_path_buf(),
            fallback_path: store.to_path_buf(),
        },
        admin: AdminConfig::default(),
        auth: AuthConfig::default(),
        rate_limit,
        upstream: UpstreamConfig::new("http://127.0.0.1:9"),
        logging: LoggingConfig::default(),
    }
}

/// Build the app with the given quota and return it with its state.
fn setup_test_app(rate_limit: RateLimitConfig) -> (TempDir, axum::Router, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = dir.path().join("token.txt");
    std::fs::write(&store, "tok\n").expect("seed store");

    let pool = Arc::new(CredentialPool::load(&store, &store).expect("load pool"));
    let state = AppState::new(test_config(&store, rate_limit), pool).expect("state");
    (dir, create_router(state.clone()), state)
}

fn quota_of(requests: u32) -> RateLimitConfig {
    RateLimitConfig {
        requests,
        window_secs: 60,
        idle_expiration_secs: 20 * 60,
        sweep_interval_secs: 60,
    }
}

async fn health_from(app: &axum::Router, client: &str) -> axum::response::Response {
    let request = Request::get("/health")
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

fn header_str<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhaustion_returns_429() {
    let (_dir, app, _state) = setup_test_app(quota_of(3));

    for expected_remaining in ["2", "1", "0"] {
        let response = health_from(&app, "10.0.0.1").await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), "3");
        assert_eq!(
            header_str(&response, "x-ratelimit-remaining"),
            expected_remaining
        );
    }

    let response = health_from(&app, "10.0.0.1").await;
    assert_eq!(response.status(), http::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "retry-after"), "60");

    let body = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["type"], "rate_limit_exceeded");
    assert_eq!(json["error"]["code"], 429);
}

#[tokio::test(start_paused = true)]
async fn test_clients_do_not_share_quota() {
    let (_dir, app, _state) = setup_test_app(quota_of(2));

    for _ in 0..2 {
        assert_eq!(
            health_from(&app, "10.0.0.1").await.status(),
            http::StatusCode::OK
        );
    }
    assert_eq!(
        health_from(&app, "10.0.0.1").await.status(),
        http::StatusCode::TOO_MANY_REQUESTS
    );

    let other = health_from(&app, "10.0.0.2").await;
    assert_eq!(other.status(), http::StatusCode::OK);
    assert_eq!(header_str(&other, "x-ratelimit-remaining"), "1");
}

#[tokio::test(start_paused = true)]
async fn test_new_window_admits_again() {
    let (_dir, app, state) = setup_test_app(quota_of(3));

    for _ in 0..4 {
        health_from(&app, "10.0.0.1").await;
    }
    assert_eq!(
        health_from(&app, "10.0.0.1").await.status(),
        http::StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::advance(Duration::from_secs(60)).await;

    let response = health_from(&app, "10.0.0.1").await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), "2");
    assert_eq!(state.limiter.count("10.0.0.1"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_idle_client_is_evicted_and_starts_fresh() {
    let (_dir, app, state) = setup_test_app(RateLimitConfig {
        requests: 5,
        window_secs: 3600,
        idle_expiration_secs: 120,
        sweep_interval_secs: 30,
    });

    for _ in 0..3 {
        health_from(&app, "10.0.0.9").await;
    }
    assert_eq!(state.limiter.count("10.0.0.9"), Some(3));

    tokio::time::advance(Duration::from_secs(121)).await;
    assert_eq!(state.limiter.sweep(), 1);
    assert_eq!(state.limiter.tracked(), 0);

    let response = health_from(&app, "10.0.0.9").await;
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), "4");
    assert_eq!(state.limiter.count("10.0.0.9"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_applies_to_admin_routes() {
    let (_dir, app, _state) = setup_test_app(quota_of(1));

    let first = Request::get("/admin/token/list")
        .header("x-forwarded-for", "10.0.0.5")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(first).await.unwrap().status(),
        http::StatusCode::OK
    );

    let second = Request::get("/admin/token/list")
        .header("x-forwarded-for", "10.0.0.5")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(second).await.unwrap().status(),
        http::StatusCode::TOO_MANY_REQUESTS
    );
}
