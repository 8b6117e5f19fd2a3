use anyhow::anyhow;
use engine::script::segment_script;
use engine::timeline::assemble;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::Database;
use crate::jobs::PipelineError;
use crate::stock::StockMediaResolver;

/// Script-to-timeline run for a video already in `PROCESSING`.
///
/// Stages run strictly in order: segment, resolve every segment, assemble the
/// surviving clips, persist the timeline, then flip the video to `READY`. The
/// stored duration is the assembled timeline's total, so dropped segments
/// never count toward it. A script that yields nothing still completes with
/// an empty timeline and a zero duration.
pub async fn run_generation(
    db: Arc<Database>,
    resolver: Arc<StockMediaResolver>,
    video_id: String,
    run_id: String,
    script: String,
) -> Result<(), PipelineError> {
    let segments = segment_script(&script);
    info!(video_id = %video_id, run_id = %run_id, segments = segments.len(), "segmented script");

    let clips = resolver.resolve_all(&segments).await;
    info!(
        video_id = %video_id,
        run_id = %run_id,
        clips = clips.len(),
        dropped = segments.len() - clips.len(),
        provider = resolver.provider_name(),
        "resolved stock media"
    );

    let timeline = assemble(&clips, &segments);
    debug!(video_id = %video_id, total_duration = timeline.total_duration, "assembled timeline");

    let written = db.replace_video_segments(&video_id, &timeline.entries)?;

    let artifact_url = timeline.representative_url().unwrap_or("");
    if !db.complete_generation(&video_id, artifact_url, timeline.total_duration)? {
        return Err(PipelineError::Fatal(anyhow!(
            "video {} left PROCESSING before generation finished",
            video_id
        )));
    }

    info!(
        video_id = %video_id,
        run_id = %run_id,
        segments = written,
        duration = timeline.total_duration,
        "generation complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::videos::advance_status;
    use crate::db::{NewProject, NewVideo, VideoStatus};
    use crate::jobs::{RunManager, RunStatus};
    use crate::stock::{SearchPage, StockMediaProvider};
    use anyhow::Result;

    const SCRIPT: &str = "A beautiful sunset over the ocean. The city wakes up. Mountains rise.";

    fn setup() -> (Arc<Database>, Arc<RunManager>, String) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let project = db
            .create_project(
                "alice",
                &NewProject {
                    name: "Reel".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        let runs = Arc::new(RunManager::new(db.clone()));
        (db, runs, project.id)
    }

    #[tokio::test]
    async fn unconfigured_provider_still_produces_a_ready_video() {
        let (db, runs, project_id) = setup();
        let run = runs
            .start_generation("alice", &NewVideo::generated(&project_id, SCRIPT))
            .unwrap();
        let resolver = Arc::new(StockMediaResolver::new(None));

        run_generation(db.clone(), resolver, run.video_id.clone(), run.id.clone(), SCRIPT.to_string())
            .await
            .unwrap();

        let video = db.get_video_by_id(&run.video_id).unwrap().unwrap();
        let timeline = db.list_video_segments(&run.video_id).unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].start_time, 0.0);
        for pair in timeline.windows(2) {
            assert_eq!(pair[1].start_time, pair[0].end_time);
        }
        let total: f64 = timeline.iter().map(|entry| entry.duration).sum();
        assert_eq!(video.duration, Some(total));
        assert_eq!(video.original_url, timeline[0].url);
        assert_eq!(video.processed_url, timeline[0].url);
    }

    #[tokio::test]
    async fn empty_script_completes_with_an_empty_timeline() {
        let (db, runs, project_id) = setup();
        let run = runs
            .start_generation("alice", &NewVideo::generated(&project_id, "..."))
            .unwrap();

        run_generation(
            db.clone(),
            Arc::new(StockMediaResolver::new(None)),
            run.video_id.clone(),
            run.id.clone(),
            "...".to_string(),
        )
        .await
        .unwrap();

        let video = db.get_video_by_id(&run.video_id).unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.duration, Some(0.0));
        assert_eq!(video.original_url, "");
        assert!(db.list_video_segments(&run.video_id).unwrap().is_empty());
    }

    /// Provider that answers every query with a clip without a playable URL.
    struct UnplayableProvider;

    #[async_trait::async_trait]
    impl StockMediaProvider for UnplayableProvider {
        fn name(&self) -> &'static str {
            "unplayable"
        }

        async fn search_videos(&self, query: &str, _page: u32, _per_page: u32) -> Result<SearchPage> {
            let mut item = crate::stock::FallbackCatalog.video_for(query);
            item.url = String::new();
            Ok(SearchPage::single(item))
        }

        async fn search_images(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
            self.search_videos(query, page, per_page).await
        }
    }

    #[tokio::test]
    async fn segments_without_media_are_dropped() {
        let (db, runs, project_id) = setup();
        let run = runs
            .start_generation("alice", &NewVideo::generated(&project_id, SCRIPT))
            .unwrap();
        let provider: Arc<dyn StockMediaProvider> = Arc::new(UnplayableProvider);

        run_generation(
            db.clone(),
            Arc::new(StockMediaResolver::new(Some(provider))),
            run.video_id.clone(),
            run.id.clone(),
            SCRIPT.to_string(),
        )
        .await
        .unwrap();

        let video = db.get_video_by_id(&run.video_id).unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.duration, Some(0.0));
        assert!(db.list_video_segments(&run.video_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn video_leaving_processing_fails_the_run() {
        let (db, runs, project_id) = setup();
        let run = runs
            .start_generation("alice", &NewVideo::generated(&project_id, SCRIPT))
            .unwrap();
        let run_id = run.id.clone();
        advance_status(&db.conn().unwrap(), &run.video_id, VideoStatus::Error).unwrap();

        let handle = runs.spawn(
            run.clone(),
            run_generation(
                db.clone(),
                Arc::new(StockMediaResolver::new(None)),
                run.video_id.clone(),
                run.id.clone(),
                SCRIPT.to_string(),
            ),
        );
        handle.await.unwrap();

        let failed = runs.get_run(&run_id).unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert!(failed.error.unwrap().contains("left PROCESSING"));
    }
}
