//! Pexels video search (`GET /videos/search`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use sv_domain::capability::Media;
use sv_domain::error::{Error, Result};

use crate::provider::MediaProvider;
use crate::from_reqwest;

pub struct PexelsProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PexelsProvider {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(from_reqwest)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

// ── wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    video_files: Vec<VideoFile>,
    #[serde(default)]
    user: Option<Videographer>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Videographer {
    name: String,
}

/// First video; prefer its HD mp4 rendition, else its first file.
fn first_video(resp: SearchResponse) -> Option<Media> {
    let video = resp.videos.into_iter().next()?;
    let is_hd_mp4 = |f: &VideoFile| {
        f.quality.as_deref() == Some("hd")
            && f.file_type.as_deref().is_some_and(|t| t.contains("mp4"))
    };
    let file = match video.video_files.iter().position(is_hd_mp4) {
        Some(i) => video.video_files.into_iter().nth(i),
        None => video.video_files.into_iter().next(),
    }?;
    Some(Media {
        url: file.link,
        attribution: video.user.map(|u| format!("Video by {} on Pexels", u.name)),
        description: None,
    })
}

#[async_trait]
impl MediaProvider for PexelsProvider {
    async fn search(&self, query: &str) -> Result<Option<Media>> {
        let resp = self
            .http
            .get(format!("{}/videos/search", self.base_url))
            .query(&[("query", query), ("per_page", "1")])
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "pexels".into(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let body: SearchResponse = resp.json().await.map_err(from_reqwest)?;
        Ok(first_video(body))
    }

    fn name(&self) -> &str {
        "pexels"
    }
}
