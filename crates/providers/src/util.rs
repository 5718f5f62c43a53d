//! Shared utility functions for provider adapters.

use sv_domain::config::AuthConfig;
use sv_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: `key` (plaintext, warned), then `env`. Called once at
/// startup; request paths never read the environment.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!(
            "API key loaded from plaintext config field 'key'; prefer 'env' instead"
        );
        return Ok(key.clone());
    }

    if let Some(ref env_var) = auth.env {
        return match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(Error::Auth(format!(
                "environment variable '{env_var}' not set or empty"
            ))),
        };
    }

    Err(Error::Auth(
        "no API key configured: set 'key' or 'env' in the provider auth block".into(),
    ))
}
