//! HTTP gateway module.
//!
//! This module provides the OpenAI-compatible HTTP API. Every request first
//! passes the per-client rate limiter; admitted `/v1` calls are authenticated
//! upstream with a credential drawn from the pool.

mod admin;
mod handlers;
pub mod middleware;
mod server;
pub mod upstream;

pub use admin::{AdminReply, AppendTokenRequest};
pub use middleware::{client_identity, RequestId, REQUEST_ID_HEADER};
pub use server::{create_router, run_server, AppState};
pub use upstream::UpstreamClient;
