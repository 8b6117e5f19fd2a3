use anyhow::Result;
use engine::script::ScriptSegment;
use engine::timeline::{MediaClip, MediaKind};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Config, StockMediaBackend};

pub mod fallback;
pub mod pexels;

pub use fallback::FallbackCatalog;
pub use pexels::PexelsProvider;

/// Stand-in running time for still images, which carry none of their own.
pub const DEFAULT_IMAGE_SECONDS: f64 = 5.0;

/// Page requested when picking media for a narration segment.
pub const RESOLVE_PAGE: u32 = 1;
pub const RESOLVE_PAGE_SIZE: u32 = 5;

/// One search hit from a stock media source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Seconds; still images report `DEFAULT_IMAGE_SECONDS`.
    pub duration: Option<f64>,
    pub source: String,
    pub author: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One page of search results, ranked by the provider (first is best).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<StockItem>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub has_more: bool,
}

impl SearchPage {
    pub fn single(item: StockItem) -> Self {
        SearchPage {
            items: vec![item],
            total: 1,
            page: 1,
            per_page: 1,
            has_more: false,
        }
    }
}

/// Read-only stock media search capability.
#[async_trait::async_trait]
pub trait StockMediaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_videos(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;

    async fn search_images(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;
}

/// Picks stock media for narration segments.
///
/// Asks the configured provider for videos, then images, and falls back to the
/// built-in catalog when the provider is missing, failing, or finds nothing.
/// Never fails.
pub struct StockMediaResolver {
    provider: Option<Arc<dyn StockMediaProvider>>,
    fallback: FallbackCatalog,
}

impl StockMediaResolver {
    pub fn new(provider: Option<Arc<dyn StockMediaProvider>>) -> Self {
        StockMediaResolver {
            provider,
            fallback: FallbackCatalog,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let provider: Option<Arc<dyn StockMediaProvider>> = match config.stock_media_backend {
            StockMediaBackend::Fallback => Some(Arc::new(FallbackCatalog)),
            StockMediaBackend::Pexels => match &config.pexels_api_key {
                Some(key) => Some(Arc::new(PexelsProvider::new(
                    key.clone(),
                    config.stock_media_timeout,
                )?)),
                None => {
                    warn!("PEXELS_API_KEY not configured, using fallback media catalog");
                    None
                }
            },
        };
        Ok(Self::new(provider))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider
            .as_ref()
            .map(|provider| provider.name())
            .unwrap_or(FallbackCatalog::NAME)
    }

    /// Best single item for a query: first video, else first image, else the
    /// catalog entry for the query.
    pub async fn find_best(&self, query: &str) -> StockItem {
        let Some(provider) = &self.provider else {
            return self.fallback.video_for(query);
        };

        match provider
            .search_videos(query, RESOLVE_PAGE, RESOLVE_PAGE_SIZE)
            .await
        {
            Ok(page) => {
                if let Some(item) = page.items.into_iter().next() {
                    return item;
                }
            }
            Err(e) => {
                warn!(provider = provider.name(), query, error = %e, "video search failed, using fallback catalog");
                return self.fallback.video_for(query);
            }
        }

        match provider
            .search_images(query, RESOLVE_PAGE, RESOLVE_PAGE_SIZE)
            .await
        {
            Ok(page) => {
                if let Some(item) = page.items.into_iter().next() {
                    return item;
                }
                debug!(provider = provider.name(), query, "no stock results, using fallback catalog");
            }
            Err(e) => {
                warn!(provider = provider.name(), query, error = %e, "image search failed, using fallback catalog");
            }
        }
        self.fallback.video_for(query)
    }

    /// Chooses one clip for a narration segment. The clip runs for the
    /// segment's estimated duration. `None` when nothing playable was found.
    pub async fn resolve(&self, segment: &ScriptSegment) -> Option<MediaClip> {
        let item = self.find_best(&segment.search_query()).await;
        if item.url.is_empty() {
            return None;
        }

        Some(MediaClip {
            id: format!("clip-{}", segment.id),
            url: item.url,
            kind: item.kind,
            duration: segment.duration,
            keywords: segment.keywords.clone(),
            thumbnail: item.thumbnail,
            segment_id: segment.id.clone(),
        })
    }

    /// Resolves every segment concurrently. The result keeps narration order;
    /// segments without a clip are dropped.
    pub async fn resolve_all(&self, segments: &[ScriptSegment]) -> Vec<MediaClip> {
        join_all(segments.iter().map(|segment| self.resolve(segment)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Manual browsing: one provider page of the requested kind, or the
    /// catalog entry when the provider is unavailable.
    pub async fn search(&self, query: &str, kind: MediaKind, page: u32, per_page: u32) -> SearchPage {
        if let Some(provider) = &self.provider {
            let result = match kind {
                MediaKind::Image => provider.search_images(query, page, per_page).await,
                _ => provider.search_videos(query, page, per_page).await,
            };
            match result {
                Ok(page) => return page,
                Err(e) => {
                    warn!(provider = provider.name(), query, error = %e, "stock search failed, using fallback catalog");
                }
            }
        }

        match kind {
            MediaKind::Image => SearchPage::single(self.fallback.image_for(query)),
            _ => SearchPage::single(self.fallback.video_for(query)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use engine::script::segment_script;
    use std::sync::Mutex;

    fn item(id: &str, kind: MediaKind) -> StockItem {
        StockItem {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            url: format!("https://stock.example/{}", id),
            thumbnail: Some(format!("https://stock.example/{}.jpg", id)),
            kind,
            duration: Some(if kind == MediaKind::Video { 20.0 } else { DEFAULT_IMAGE_SECONDS }),
            source: "test".to_string(),
            author: None,
            width: None,
            height: None,
        }
    }

    fn page(items: Vec<StockItem>) -> SearchPage {
        SearchPage {
            total: items.len() as u64,
            items,
            page: 1,
            per_page: RESOLVE_PAGE_SIZE,
            has_more: false,
        }
    }

    /// Provider double with canned answers that records the queries it saw.
    struct ScriptedProvider {
        videos: Result<Vec<StockItem>, String>,
        images: Result<Vec<StockItem>, String>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(videos: Result<Vec<StockItem>, String>, images: Result<Vec<StockItem>, String>) -> Self {
            ScriptedProvider {
                videos,
                images,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StockMediaProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search_videos(&self, query: &str, page_no: u32, per_page: u32) -> Result<SearchPage> {
            assert_eq!((page_no, per_page), (RESOLVE_PAGE, RESOLVE_PAGE_SIZE));
            self.queries.lock().unwrap().push(format!("video:{}", query));
            self.videos.clone().map(page).map_err(|e| anyhow!(e))
        }

        async fn search_images(&self, query: &str, _page: u32, _per_page: u32) -> Result<SearchPage> {
            self.queries.lock().unwrap().push(format!("image:{}", query));
            self.images.clone().map(page).map_err(|e| anyhow!(e))
        }
    }

    fn resolver(provider: ScriptedProvider) -> (StockMediaResolver, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let dyn_provider: Arc<dyn StockMediaProvider> = provider.clone();
        (StockMediaResolver::new(Some(dyn_provider)), provider)
    }

    #[tokio::test]
    async fn first_video_result_wins() {
        let (resolver, provider) = resolver(ScriptedProvider::new(
            Ok(vec![item("v1", MediaKind::Video), item("v2", MediaKind::Video)]),
            Ok(vec![item("i1", MediaKind::Image)]),
        ));
        let segments = segment_script("A beautiful sunset over the ocean.");

        let clip = resolver.resolve(&segments[0]).await.unwrap();

        assert_eq!(clip.url, "https://stock.example/v1");
        assert_eq!(clip.kind, MediaKind::Video);
        assert_eq!(clip.duration, segments[0].duration);
        assert_eq!(clip.segment_id, "segment-0");
        assert_eq!(clip.keywords, segments[0].keywords);
        assert_eq!(
            *provider.queries.lock().unwrap(),
            vec!["video:sunset landscape beautiful sunset ocean".to_string()]
        );
    }

    #[tokio::test]
    async fn falls_back_to_images_when_no_videos() {
        let (resolver, provider) = resolver(ScriptedProvider::new(
            Ok(vec![]),
            Ok(vec![item("i1", MediaKind::Image)]),
        ));
        let segments = segment_script("Quiet streets.");

        let clip = resolver.resolve(&segments[0]).await.unwrap();

        assert_eq!(clip.kind, MediaKind::Image);
        assert_eq!(clip.duration, segments[0].duration);
        assert_eq!(provider.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_uses_catalog() {
        let (resolver, provider) = resolver(ScriptedProvider::new(
            Err("429 Too Many Requests".to_string()),
            Ok(vec![item("i1", MediaKind::Image)]),
        ));

        let found = resolver.find_best("city urban skyline").await;

        assert_eq!(found, FallbackCatalog.video_for("city urban skyline"));
        assert_eq!(found.duration, Some(12.0));
        // Video search failing means the provider is unusable; images are not tried.
        assert_eq!(provider.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_results_everywhere_use_catalog() {
        let (resolver, _) = resolver(ScriptedProvider::new(Ok(vec![]), Err("timeout".to_string())));
        let found = resolver.find_best("mountain landscape").await;
        assert_eq!(found.duration, Some(8.0));
        assert_eq!(found.source, FallbackCatalog::NAME);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_deterministic() {
        let resolver = StockMediaResolver::new(None);
        let segments = segment_script("The city never sleeps.");

        let first = resolver.resolve(&segments[0]).await;
        let second = resolver.resolve(&segments[0]).await;

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(resolver.provider_name(), FallbackCatalog::NAME);
        assert_eq!(resolver.find_best("city urban skyline").await.duration, Some(12.0));
    }

    #[tokio::test]
    async fn resolve_all_keeps_narration_order() {
        let resolver = StockMediaResolver::new(None);
        let segments = segment_script("Sunset glow. Mountain peaks. Urban lights. Plain words.");

        let clips = resolver.resolve_all(&segments).await;

        let ids: Vec<&str> = clips.iter().map(|c| c.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["segment-0", "segment-1", "segment-2", "segment-3"]);
    }

    #[tokio::test]
    async fn browsing_falls_back_per_kind() {
        let resolver = StockMediaResolver::new(None);

        let videos = resolver.search("ocean", MediaKind::Video, 1, 15).await;
        let images = resolver.search("ocean", MediaKind::Image, 1, 15).await;

        assert_eq!(videos.items.len(), 1);
        assert_eq!(videos.items[0].kind, MediaKind::Video);
        assert_eq!(images.items[0].kind, MediaKind::Image);
        assert_eq!(images.items[0].duration, Some(DEFAULT_IMAGE_SECONDS));
        assert!(!images.has_more);
    }
}
