//! The `MediaProvider` trait: one search backend for one kind of media.

use async_trait::async_trait;
use sv_domain::capability::Media;
use sv_domain::config::MediaSourceConfig;
use sv_domain::error::Result;

/// Given a text query, return the best match or nothing.
///
/// Implementations may error; the lookup set turns every error into
/// "no media" so callers never see one.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<Media>>;

    /// Short backend name for logs and trace events.
    fn name(&self) -> &str;
}

/// Stand-in for a backend with no credentials. Always finds nothing.
pub struct Unconfigured {
    name: String,
}

impl Unconfigured {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl MediaProvider for Unconfigured {
    async fn search(&self, _query: &str) -> Result<Option<Media>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve a backend's API key once at startup: `key` first, then the
/// env var named by `key_env`. Empty values count as missing.
pub fn resolve_key(cfg: &MediaSourceConfig) -> Option<String> {
    if let Some(key) = cfg.key.as_ref().filter(|k| !k.trim().is_empty()) {
        return Some(key.clone());
    }
    cfg.key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_finds_nothing() {
        let p = Unconfigured::new("unsplash");
        assert!(p.search("mountains").await.unwrap().is_none());
        assert_eq!(p.name(), "unsplash");
    }

    #[test]
    fn resolve_key_prefers_direct_key() {
        let cfg = MediaSourceConfig {
            base_url: "https://x".into(),
            key_env: Some("SV_TEST_MEDIA_KEY_NEVER_SET_1".into()),
            key: Some("direct".into()),
        };
        assert_eq!(resolve_key(&cfg).as_deref(), Some("direct"));
    }

    #[test]
    fn resolve_key_missing_env_is_none() {
        let cfg = MediaSourceConfig {
            base_url: "https://x".into(),
            key_env: Some("SV_TEST_MEDIA_KEY_NEVER_SET_2".into()),
            key: None,
        };
        assert!(resolve_key(&cfg).is_none());
    }

    #[test]
    fn resolve_key_blank_is_none() {
        let cfg = MediaSourceConfig {
            base_url: "https://x".into(),
            key_env: None,
            key: Some("   ".into()),
        };
        assert!(resolve_key(&cfg).is_none());
    }
}
