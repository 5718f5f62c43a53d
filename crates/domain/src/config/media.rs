use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Media capability providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Upper bound on a single lookup, including connect time.
    #[serde(default = "d_5000")]
    pub timeout_ms: u64,
    #[serde(default = "d_unsplash")]
    pub unsplash: MediaSourceConfig,
    #[serde(default = "d_pexels")]
    pub pexels: MediaSourceConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            timeout_ms: d_5000(),
            unsplash: d_unsplash(),
            pexels: d_pexels(),
        }
    }
}

/// One search backend. Missing credentials disable it; lookups then
/// resolve to nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSourceConfig {
    pub base_url: String,
    /// Env var containing the API key.
    #[serde(default)]
    pub key_env: Option<String>,
    /// Direct key (prefer `key_env`).
    #[serde(default)]
    pub key: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_5000() -> u64 {
    5_000
}
fn d_unsplash() -> MediaSourceConfig {
    MediaSourceConfig {
        base_url: "https://api.unsplash.com".into(),
        key_env: Some("UNSPLASH_ACCESS_KEY".into()),
        key: None,
    }
}
fn d_pexels() -> MediaSourceConfig {
    MediaSourceConfig {
        base_url: "https://api.pexels.com".into(),
        key_env: Some("PEXELS_API_KEY".into()),
        key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_public_apis() {
        let cfg: MediaConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.timeout_ms, 5_000);
        assert_eq!(cfg.unsplash.base_url, "https://api.unsplash.com");
        assert_eq!(cfg.pexels.key_env.as_deref(), Some("PEXELS_API_KEY"));
    }
}
