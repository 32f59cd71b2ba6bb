//! credgate - OpenAI-compatible gateway backed by a rotating credential pool
//!
//! This library provides the core functionality for the credgate proxy:
//! the file-backed credential pool, the per-client rate limiter,
//! configuration, and the HTTP layer that ties them together.

pub mod config;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
