//! The timeout-bounded lookup set the tool processor calls into.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sv_domain::capability::{Media, MediaKind};
use sv_domain::config::MediaConfig;
use sv_domain::trace::TraceEvent;

use crate::pexels::PexelsProvider;
use crate::provider::{resolve_key, MediaProvider, Unconfigured};
use crate::unsplash::UnsplashProvider;

/// One provider per media kind plus the per-lookup time bound.
#[derive(Clone)]
pub struct MediaLookup {
    image: Arc<dyn MediaProvider>,
    video: Arc<dyn MediaProvider>,
    timeout: Duration,
}

impl MediaLookup {
    pub fn new(
        image: Arc<dyn MediaProvider>,
        video: Arc<dyn MediaProvider>,
        timeout: Duration,
    ) -> Self {
        Self { image, video, timeout }
    }

    /// Build the real providers. A backend without credentials becomes
    /// [`Unconfigured`]; so does one whose HTTP client fails to build.
    pub fn from_config(cfg: &MediaConfig) -> Self {
        let timeout = Duration::from_millis(cfg.timeout_ms);

        let image: Arc<dyn MediaProvider> = match resolve_key(&cfg.unsplash) {
            Some(key) => match UnsplashProvider::new(&cfg.unsplash.base_url, key, timeout) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    tracing::warn!(error = %e, "unsplash client init failed, images disabled");
                    Arc::new(Unconfigured::new("unsplash"))
                }
            },
            None => {
                tracing::info!("no Unsplash key configured, show_image will resolve to nothing");
                Arc::new(Unconfigured::new("unsplash"))
            }
        };

        let video: Arc<dyn MediaProvider> = match resolve_key(&cfg.pexels) {
            Some(key) => match PexelsProvider::new(&cfg.pexels.base_url, key, timeout) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    tracing::warn!(error = %e, "pexels client init failed, videos disabled");
                    Arc::new(Unconfigured::new("pexels"))
                }
            },
            None => {
                tracing::info!("no Pexels key configured, show_video will resolve to nothing");
                Arc::new(Unconfigured::new("pexels"))
            }
        };

        Self { image, video, timeout }
    }

    /// Both kinds disabled.
    pub fn disabled(timeout: Duration) -> Self {
        Self::new(
            Arc::new(Unconfigured::new("unsplash")),
            Arc::new(Unconfigured::new("pexels")),
            timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Look up media for `query`. Never fails: timeouts, provider errors,
    /// and missing credentials all resolve to `None`.
    pub async fn fetch(&self, kind: MediaKind, query: &str) -> Option<Media> {
        let provider = match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, provider.search(query)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (media, timed_out) = match outcome {
            Ok(Ok(media)) => (media, false),
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = provider.name(),
                    kind = %kind,
                    error = %e,
                    "media lookup failed"
                );
                (None, false)
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    kind = %kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "media lookup timed out"
                );
                (None, true)
            }
        };

        TraceEvent::MediaLookup {
            kind: kind.as_str().to_string(),
            provider: provider.name().to_string(),
            found: media.is_some(),
            timed_out,
            duration_ms,
        }
        .emit();

        media
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
