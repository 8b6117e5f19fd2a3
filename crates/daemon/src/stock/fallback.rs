use anyhow::Result;
use engine::timeline::MediaKind;

use super::{SearchPage, StockItem, StockMediaProvider, DEFAULT_IMAGE_SECONDS};

const SAMPLE_VIDEO_URL: &str = "https://sample-videos.com/zip/10/mp4/SampleVideo_1280x720_1mb.mp4";

struct CatalogVideo {
    triggers: &'static [&'static str],
    id: &'static str,
    title: &'static str,
    thumbnail: &'static str,
    duration: f64,
}

// Checked in order against the lowercased query; the last entry matches anything.
const VIDEOS: &[CatalogVideo] = &[
    CatalogVideo {
        triggers: &["sunset", "ocean"],
        id: "fallback-1",
        title: "Beautiful Sunset Scene",
        thumbnail: "https://via.placeholder.com/320x180/ff6b35/ffffff?text=Sunset+Video",
        duration: 10.0,
    },
    CatalogVideo {
        triggers: &["mountain", "landscape"],
        id: "fallback-2",
        title: "Mountain Landscape",
        thumbnail: "https://via.placeholder.com/320x180/10b981/ffffff?text=Mountain+Video",
        duration: 8.0,
    },
    CatalogVideo {
        triggers: &["city", "urban"],
        id: "fallback-4",
        title: "City Skyline",
        thumbnail: "https://via.placeholder.com/320x180/1f2937/ffffff?text=City+Video",
        duration: 12.0,
    },
    CatalogVideo {
        triggers: &[],
        id: "fallback-3",
        title: "Sample Video Content",
        thumbnail: "https://via.placeholder.com/320x180/6b7280/ffffff?text=Sample+Video",
        duration: 10.0,
    },
];

/// Static sample media keyed by query substrings. Pure and deterministic, so
/// generation keeps working without a reachable stock provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackCatalog;

impl FallbackCatalog {
    pub const NAME: &'static str = "fallback";

    pub fn video_for(&self, query: &str) -> StockItem {
        let lower = query.to_lowercase();
        let entry = VIDEOS
            .iter()
            .find(|entry| {
                entry.triggers.is_empty() || entry.triggers.iter().any(|t| lower.contains(t))
            })
            .unwrap_or(&VIDEOS[VIDEOS.len() - 1]);

        StockItem {
            id: entry.id.to_string(),
            title: entry.title.to_string(),
            description: "HD video (1280x720)".to_string(),
            url: SAMPLE_VIDEO_URL.to_string(),
            thumbnail: Some(entry.thumbnail.to_string()),
            kind: MediaKind::Video,
            duration: Some(entry.duration),
            source: Self::NAME.to_string(),
            author: Some("Sample Content".to_string()),
            width: Some(1280),
            height: Some(720),
        }
    }

    pub fn image_for(&self, _query: &str) -> StockItem {
        StockItem {
            id: "fallback-image".to_string(),
            title: "Sample Image".to_string(),
            description: "High quality image (1920x1080)".to_string(),
            url: "https://via.placeholder.com/1920x1080/3b82f6/ffffff?text=Sample+Image".to_string(),
            thumbnail: Some(
                "https://via.placeholder.com/320x180/3b82f6/ffffff?text=Sample+Image".to_string(),
            ),
            kind: MediaKind::Image,
            duration: Some(DEFAULT_IMAGE_SECONDS),
            source: Self::NAME.to_string(),
            author: Some("Sample Content".to_string()),
            width: Some(1920),
            height: Some(1080),
        }
    }
}

#[async_trait::async_trait]
impl StockMediaProvider for FallbackCatalog {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn search_videos(&self, query: &str, _page: u32, _per_page: u32) -> Result<SearchPage> {
        Ok(SearchPage::single(self.video_for(query)))
    }

    async fn search_images(&self, query: &str, _page: u32, _per_page: u32) -> Result<SearchPage> {
        Ok(SearchPage::single(self.image_for(query)))
    }
}
