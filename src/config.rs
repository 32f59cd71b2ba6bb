//! Configuration parsing and validation for credgate.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::limiter::LimitPolicy;

/// Password used for the admin routes when none is configured.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
    pub admin: AdminConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Credential store locations.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Primary store path
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
    /// Store consulted when the primary cannot be read; relative paths
    /// resolve against the working directory
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("/app/credgate/data/token.txt")
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("token.txt")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
            fallback_path: default_fallback_path(),
        }
    }
}

impl CredentialsConfig {
    /// Fallback path anchored to the current working directory.
    pub fn resolved_fallback(&self) -> PathBuf {
        if self.fallback_path.is_absolute() {
            return self.fallback_path.clone();
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(&self.fallback_path))
            .unwrap_or_else(|_| self.fallback_path.clone())
    }
}

/// Admin route configuration.
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Operator password embedded in admin route paths
    pub password: Option<ApiKey>,
}

impl AdminConfig {
    /// Configured password, or [`DEFAULT_ADMIN_PASSWORD`].
    pub fn password(&self) -> &str {
        self.password
            .as_ref()
            .map(ApiKey::expose_secret)
            .unwrap_or(DEFAULT_ADMIN_PASSWORD)
    }
}

/// Client authentication for the `/v1` routes.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Accepted bearer secrets; empty leaves `/v1` open
    pub api_secrets: Vec<ApiKey>,
}

impl AuthConfig {
    pub fn accepts(&self, presented: &str) -> bool {
        self.api_secrets
            .iter()
            .any(|secret| secret.expose_secret() == presented)
    }
}

/// Per-client rate limiting.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Max requests per window
    #[serde(default = "default_requests")]
    pub requests: u32,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Idle time before a client's state is evicted, in seconds
    #[serde(default = "default_idle_expiration_secs")]
    pub idle_expiration_secs: u64,
    /// How often idle state is swept, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_idle_expiration_secs() -> u64 {
    20 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_secs: default_window_secs(),
            idle_expiration_secs: default_idle_expiration_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self) -> LimitPolicy {
        LimitPolicy {
            requests: self.requests,
            window: Duration::from_secs(self.window_secs),
            idle_expiration: Duration::from_secs(self.idle_expiration_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Upstream backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL; the inbound `/v1/...` path is appended verbatim
    pub url: String,
    /// Header carrying the selected credential
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Prepended to the credential in `auth_header`
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_auth_header() -> String {
    "authorization".to_string()
}

fn default_auth_prefix() -> String {
    "Bearer ".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl UpstreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_header: default_auth_header(),
            auth_prefix: default_auth_prefix(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Secret wrapper that redacts itself in Debug, Display and Serialize.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Raw admin section; the password may contain `${VAR}` references.
#[derive(Deserialize, Default)]
struct RawAdminConfig {
    password: Option<String>,
}

/// Raw auth section; secrets may contain `${VAR}` references.
#[derive(Deserialize, Default)]
struct RawAuthConfig {
    #[serde(default)]
    api_secrets: Vec<String>,
}

/// Configuration deserialized directly from TOML, before env expansion.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    credentials: CredentialsConfig,
    #[serde(default)]
    admin: RawAdminConfig,
    #[serde(default)]
    auth: RawAuthConfig,
    #[serde(default)]
    rate_limit: RateLimitConfig,
    upstream: UpstreamConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` references
    /// from the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string using the process environment.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string with a custom variable lookup.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

        // Unset variables leave optional secrets empty, which selects their defaults.
        let optional = |name: &str| Some(lookup(name).unwrap_or_default());

        let password = raw
            .admin
            .password
            .map(|p| expand_env_vars_with(&p, "admin.password", &optional))
            .transpose()?
            .filter(|p| !p.is_empty())
            .map(ApiKey::from);

        let api_secrets = raw
            .auth
            .api_secrets
            .iter()
            .map(|s| expand_env_vars_with(s, "auth.api_secrets", &optional))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flat_map(|s| {
                // A single variable may carry a comma-separated list.
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ApiKey::from)
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut upstream = raw.upstream;
        upstream.url = expand_env_vars_with(&upstream.url, "upstream.url", &lookup)?;

        let config = Config {
            server: raw.server,
            credentials: raw.credentials,
            admin: AdminConfig { password },
            auth: AuthConfig { api_secrets },
            rate_limit: raw.rate_limit,
            upstream,
            logging: raw.logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.url must not be empty".to_string(),
            ));
        }
        if self.credentials.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "credentials.path must not be empty".to_string(),
            ));
        }
        if self.rate_limit.requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.requests must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [
            ("rate_limit.window_secs", self.rate_limit.window_secs),
            ("rate_limit.sweep_interval_secs", self.rate_limit.sweep_interval_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Settings that fall back to an open or well-known default.
    ///
    /// Returned rather than logged so callers can report them once tracing
    /// is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.admin.password.is_none() {
            warnings.push(format!(
                "admin.password not set, admin routes use the default password '{}'",
                DEFAULT_ADMIN_PASSWORD
            ));
        }
        if self.auth.api_secrets.is_empty() {
            warnings.push("No auth.api_secrets configured, /v1 routes accept any client".to_string());
        }
        warnings
    }
}
