use anyhow::{Context, Result};
use engine::timeline::MediaKind;
use serde::Deserialize;
use std::time::Duration;

use super::{SearchPage, StockItem, StockMediaProvider, DEFAULT_IMAGE_SECONDS};

const PEXELS_API_BASE: &str = "https://api.pexels.com";

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    per_page: u32,
    #[serde(default)]
    videos: Vec<PexelsVideo>,
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    file_type: Option<String>,
    height: Option<u32>,
    link: String,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoPicture {
    picture: String,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    width: u32,
    height: u32,
    url: String,
    image: String,
    duration: f64,
    user: PexelsUser,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
    #[serde(default)]
    video_pictures: Vec<PexelsVideoPicture>,
}

impl PexelsVideo {
    /// The tallest mp4 rendition, else the Pexels page URL.
    fn best_file(&self) -> &str {
        self.video_files
            .iter()
            .filter(|file| file.file_type.as_deref() == Some("video/mp4"))
            .max_by_key(|file| file.height.unwrap_or(0))
            .map(|file| file.link.as_str())
            .unwrap_or(&self.url)
    }

    fn thumbnail(&self) -> &str {
        self.video_pictures
            .first()
            .map(|picture| picture.picture.as_str())
            .unwrap_or(&self.image)
    }

    fn into_item(self) -> StockItem {
        StockItem {
            id: self.id.to_string(),
            title: format!("Video by {}", self.user.name),
            description: format!("HD video ({}x{})", self.width, self.height),
            url: self.best_file().to_string(),
            thumbnail: Some(self.thumbnail().to_string()),
            kind: MediaKind::Video,
            duration: Some(self.duration),
            source: "pexels".to_string(),
            author: Some(self.user.name),
            width: Some(self.width),
            height: Some(self.height),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PexelsPhotoSources {
    large2x: String,
    medium: String,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    id: u64,
    width: u32,
    height: u32,
    photographer: String,
    #[serde(default)]
    alt: Option<String>,
    src: PexelsPhotoSources,
}

impl PexelsPhoto {
    fn into_item(self) -> StockItem {
        let title = match self.alt.as_deref().map(str::trim) {
            Some(alt) if !alt.is_empty() => alt.to_string(),
            _ => format!("Photo by {}", self.photographer),
        };
        StockItem {
            id: self.id.to_string(),
            title,
            description: format!("High quality image ({}x{})", self.width, self.height),
            url: self.src.large2x,
            thumbnail: Some(self.src.medium),
            kind: MediaKind::Image,
            duration: Some(DEFAULT_IMAGE_SECONDS),
            source: "pexels".to_string(),
            author: Some(self.photographer),
            width: Some(self.width),
            height: Some(self.height),
        }
    }
}

impl PexelsSearchResponse {
    fn into_page(self) -> SearchPage {
        let items = self
            .videos
            .into_iter()
            .map(PexelsVideo::into_item)
            .chain(self.photos.into_iter().map(PexelsPhoto::into_item))
            .collect();
        SearchPage {
            items,
            total: self.total_results,
            page: self.page,
            per_page: self.per_page,
            has_more: self.next_page.is_some(),
        }
    }
}

/// Pexels video and photo search.
pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PexelsProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Pexels HTTP client")?;
        Ok(PexelsProvider {
            client,
            api_key,
            base_url: PEXELS_API_BASE.to_string(),
        })
    }

    async fn search(&self, path: &str, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("orientation", "landscape".to_string()),
            ])
            .send()
            .await
            .context("Pexels request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Pexels API error: {} - {}", status, error_text);
        }

        let body: PexelsSearchResponse = response
            .json()
            .await
            .context("Failed to parse Pexels response")?;
        Ok(body.into_page())
    }
}

#[async_trait::async_trait]
impl StockMediaProvider for PexelsProvider {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search_videos(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        self.search("/videos/search", query, page, per_page).await
    }

    async fn search_images(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        self.search("/v1/search", query, page, per_page).await
    }
}
