use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use super::{AppState, CallerId};
use crate::db::VideoSegmentRecord;
use crate::error::{ApiError, ApiResult};

const PLACEHOLDER_THUMBNAIL: &str = "https://via.placeholder.com/320x180/6b7280/ffffff?text=No+Preview";

pub fn router() -> Router<AppState> {
    Router::new().route("/:id/segments", get(get_segments))
}

/// The video's timeline, ordered by start time.
async fn get_segments(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<VideoSegmentRecord>>> {
    if state.db.get_video(&owner, &id)?.is_none() {
        return Err(ApiError::NotFound("Video"));
    }

    let segments = state
        .db
        .list_video_segments(&id)?
        .into_iter()
        .map(|mut segment| {
            if segment.thumbnail.as_deref().map_or(true, str::is_empty) {
                segment.thumbnail = Some(PLACEHOLDER_THUMBNAIL.to_string());
            }
            segment
        })
        .collect();
    Ok(Json(segments))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::db::NewVideo;
    use axum::http::{Method, StatusCode};
    use engine::timeline::{MediaClip, MediaKind, Timeline};
    use serde_json::json;

    #[tokio::test]
    async fn segments_come_back_in_order_with_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());
        let (_, project) = app
            .request(Method::POST, "/projects", Some("alice"), Some(json!({ "name": "Reel" })))
            .await;
        let video_id = app
            .state
            .db
            .create_video(
                "alice",
                &NewVideo::generated(project["id"].as_str().unwrap(), "One. Two."),
            )
            .unwrap()
            .id;

        let clips: Vec<MediaClip> = ["segment-0", "segment-1"]
            .iter()
            .map(|segment_id| MediaClip {
                id: format!("clip-{}", segment_id),
                url: format!("https://media.example/{}.mp4", segment_id),
                kind: MediaKind::Video,
                duration: 4.0,
                keywords: Vec::new(),
                thumbnail: None,
                segment_id: segment_id.to_string(),
            })
            .collect();
        let timeline: Timeline = engine::timeline::assemble(&clips, &[]);
        app.state
            .db
            .replace_video_segments(&video_id, &timeline.entries)
            .unwrap();

        let (status, body) = app
            .request(Method::GET, &format!("/videos/{}/segments", video_id), Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let segments = body.as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0]["startTime"], 0.0);
        assert_eq!(segments[1]["startTime"], 4.0);
        assert_eq!(segments[1]["type"], "video");
        assert_eq!(segments[0]["thumbnail"], super::PLACEHOLDER_THUMBNAIL);

        let (status, _) = app
            .request(Method::GET, &format!("/videos/{}/segments", video_id), Some("bob"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
