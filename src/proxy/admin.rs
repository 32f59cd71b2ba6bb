//! Password-gated credential administration routes.
//!
//! `GET /:password/token/list`, `POST /:password/token/append`,
//! `POST /:password/token/clear`. Replies use the `{code, message, data}`
//! envelope the admin tooling expects. Pool I/O runs on the blocking pool
//! so a dropped request cannot interrupt a store write halfway.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::pool::{CredentialPool, PoolError};

/// Admin reply envelope.
#[derive(Debug, Serialize)]
pub struct AdminReply {
    pub code: u16,
    pub message: String,
    pub data: Option<String>,
}

fn reply(status: StatusCode, message: impl Into<String>, data: Option<String>) -> Response {
    let body = AdminReply {
        code: status.as_u16(),
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Body of `POST /:password/token/append`.
#[derive(Debug, Deserialize)]
pub struct AppendTokenRequest {
    pub token: String,
}

fn authorize(state: &AppState, password: &str) -> Result<(), Response> {
    if password == state.config.admin.password() {
        return Ok(());
    }
    tracing::warn!("Admin request with invalid password");
    Err(reply(
        StatusCode::UNAUTHORIZED,
        "Invalid access password",
        None,
    ))
}

/// Run a pool operation on the blocking thread pool.
async fn run_pool_op<T, F>(pool: Arc<CredentialPool>, op: F) -> Result<T, PoolError>
where
    T: Send + 'static,
    F: FnOnce(&CredentialPool) -> Result<T, PoolError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&pool)).await {
        Ok(result) => result,
        Err(join_error) => Err(PoolError::Io {
            path: "<pool task>".to_string(),
            source: std::io::Error::other(join_error.to_string()),
        }),
    }
}

fn pool_failure(action: &str, error: PoolError) -> Response {
    match error {
        PoolError::InvalidArgument(message) => {
            reply(StatusCode::BAD_REQUEST, message, None)
        }
        other => {
            tracing::error!(error = %other, action = action, "Credential store operation failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {} credential store", action),
                None,
            )
        }
    }
}

/// Handle GET /:password/token/list
pub async fn list_tokens(State(state): State<AppState>, Path(password): Path<String>) -> Response {
    if let Err(denied) = authorize(&state, &password) {
        return denied;
    }

    match run_pool_op(state.pool.clone(), |pool| pool.list()).await {
        Ok(content) => reply(StatusCode::OK, "ok", Some(content)),
        Err(e) => pool_failure("read", e),
    }
}

/// Handle POST /:password/token/append
pub async fn append_token(
    State(state): State<AppState>,
    Path(password): Path<String>,
    payload: Result<Json<AppendTokenRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authorize(&state, &password) {
        return denied;
    }

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return reply(
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", rejection.body_text()),
                None,
            )
        }
    };

    match run_pool_op(state.pool.clone(), move |pool| pool.append(&request.token)).await {
        Ok(()) => {
            tracing::info!(credentials = state.pool.len(), "Credential appended");
            reply(StatusCode::OK, "Token appended", None)
        }
        Err(e) => pool_failure("append to", e),
    }
}

/// Handle POST /:password/token/clear
pub async fn clear_tokens(State(state): State<AppState>, Path(password): Path<String>) -> Response {
    if let Err(denied) = authorize(&state, &password) {
        return denied;
    }

    match run_pool_op(state.pool.clone(), |pool| pool.clear()).await {
        Ok(()) => {
            tracing::warn!("Credential store cleared");
            reply(StatusCode::OK, "Token store cleared", None)
        }
        Err(e) => pool_failure("clear", e),
    }
}
