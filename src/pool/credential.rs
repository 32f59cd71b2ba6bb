//! Upstream credential token.

use secrecy::{ExposeSecret, SecretString};

/// An opaque upstream token (e.g. a session cookie value).
///
/// Redacted in `Debug` and `Display`; the raw value is only reachable via
/// [`Credential::expose_secret`].
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Access the raw token. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short, log-safe prefix of the token.
    pub fn preview(&self) -> String {
        let raw = self.expose_secret();
        let head: String = raw.chars().take(6).collect();
        format!("{}… ({} chars)", head, raw.chars().count())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Credential(SecretString::from(s))
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Credential(SecretString::from(s))
    }
}
