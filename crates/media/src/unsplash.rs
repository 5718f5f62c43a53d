//! Unsplash photo search (`GET /search/photos`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use sv_domain::capability::Media;
use sv_domain::error::{Error, Result};

use crate::provider::MediaProvider;
use crate::from_reqwest;

pub struct UnsplashProvider {
    http: Client,
    base_url: String,
    access_key: String,
}

impl UnsplashProvider {
    pub fn new(base_url: &str, access_key: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(from_reqwest)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_key,
        })
    }
}

// ── wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    user: Option<Photographer>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct Photographer {
    name: String,
}

fn first_photo(resp: SearchResponse) -> Option<Media> {
    let photo = resp.results.into_iter().next()?;
    Some(Media {
        url: photo.urls.regular,
        attribution: photo.user.map(|u| format!("Photo by {} on Unsplash", u.name)),
        description: photo.alt_description.filter(|d| !d.is_empty()),
    })
}

#[async_trait]
impl MediaProvider for UnsplashProvider {
    async fn search(&self, query: &str) -> Result<Option<Media>> {
        let resp = self
            .http
            .get(format!("{}/search/photos", self.base_url))
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "unsplash".into(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let body: SearchResponse = resp.json().await.map_err(from_reqwest)?;
        Ok(first_photo(body))
    }

    fn name(&self) -> &str {
        "unsplash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_result() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({
            "total": 2,
            "results": [
                {
                    "urls": {"regular": "https://images.example/1.jpg", "small": "s"},
                    "alt_description": "a misty forest",
                    "user": {"name": "Ana"}
                },
                {"urls": {"regular": "https://images.example/2.jpg"}}
            ]
        }))
        .unwrap();
        let media = first_photo(body).unwrap();
        assert_eq!(media.url, "https://images.example/1.jpg");
        assert_eq!(media.description.as_deref(), Some("a misty forest"));
        assert_eq!(media.attribution.as_deref(), Some("Photo by Ana on Unsplash"));
    }

    #[test]
    fn empty_results_is_none() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({"results": []})).unwrap();
        assert!(first_photo(body).is_none());
    }
}
