//! HTTP request handlers.

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;

use super::middleware::RequestId;
use super::server::AppState;
use crate::error::{Error, Result};

/// Handle POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    forward(&state, request_id, Method::POST, "/v1/chat/completions", &headers, body).await
}

/// Handle POST /v1/images/generations
pub async fn image_generations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    forward(&state, request_id, Method::POST, "/v1/images/generations", &headers, body).await
}

/// Handle GET /v1/models
pub async fn list_models(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Result<Response> {
    forward(&state, request_id, Method::GET, "/v1/models", &headers, Bytes::new()).await
}

/// Authenticate with the next pooled credential and pass the call upstream.
async fn forward(
    state: &AppState,
    request_id: RequestId,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let credential = state.pool.select().ok_or_else(|| {
        tracing::error!(request_id = %request_id.0, "Credential pool is empty");
        Error::NoCredentials
    })?;

    tracing::info!(
        request_id = %request_id.0,
        method = %method,
        path = %path,
        credential = %credential.preview(),
        "Forwarding request upstream"
    );

    state
        .upstream
        .forward(method, path, headers, body, &credential)
        .await
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let credentials = state.pool.len();
    let status = if credentials == 0 { "degraded" } else { "ok" };

    Json(serde_json::json!({
        "status": status,
        "credentials": credentials,
        "tracked_clients": state.limiter.tracked(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
