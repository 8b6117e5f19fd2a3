use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppState, CallerId};
use crate::db::{Caption, VideoStatus};
use crate::error::{ApiError, ApiResult};
use crate::jobs::transcribe::run_transcription;
use crate::transcription::{is_supported_language, Language, DEFAULT_LANGUAGE, SUPPORTED_LANGUAGES};

#[derive(Deserialize, Default)]
pub struct TranscribeRequest {
    language: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    message: &'static str,
    video_id: String,
    run_id: String,
    status: VideoStatus,
}

#[derive(Serialize)]
pub struct TranscriptResponse {
    id: String,
    title: String,
    status: VideoStatus,
    duration: Option<f64>,
    captions: Vec<Caption>,
    language: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id/transcribe", get(get_transcript).post(start_transcription))
}

pub fn languages_router() -> Router<AppState> {
    Router::new().route("/languages", get(list_languages))
}

async fn list_languages() -> Json<&'static [Language]> {
    Json(SUPPORTED_LANGUAGES)
}

/// Starts a transcription run for an `UPLOADING` or `PROCESSING` video.
async fn start_transcription(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
    body: Option<Json<TranscribeRequest>>,
) -> ApiResult<(StatusCode, Json<TranscribeResponse>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let language = req
        .language
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());
    if let Some(code) = &language {
        if !is_supported_language(code) {
            return Err(ApiError::validation(format!("Unsupported language '{}'", code)));
        }
    }

    // Ownership and lifecycle checks happen before any state changes
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    if !video.status.accepts_transcription() {
        return Err(ApiError::precondition("Video is not ready for transcription"));
    }

    let run = state
        .runs
        .start_transcription(&id)?
        .ok_or_else(|| ApiError::precondition("Video is not ready for transcription"))?;
    info!(video_id = %id, run_id = %run.id, "transcription started");

    // Hand off to the supervisor; the caller polls for the outcome
    let pipeline = run_transcription(
        state.db.clone(),
        state.transcriber.clone(),
        id.clone(),
        run.id.clone(),
        video.original_url,
        language,
    );
    let run_id = run.id.clone();
    state.runs.spawn(run, pipeline);

    Ok((
        StatusCode::ACCEPTED,
        Json(TranscribeResponse {
            message: "Transcription started",
            video_id: id,
            run_id,
            status: VideoStatus::Transcribing,
        }),
    ))
}

async fn get_transcript(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<TranscriptResponse>> {
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    let captions = state.db.list_captions(&id)?;
    let language = captions
        .first()
        .map(|caption| caption.language.clone())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    Ok(Json(TranscriptResponse {
        id: video.id,
        title: video.title,
        status: video.status,
        duration: video.duration,
        captions,
        language,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::db::{NewProject, NewVideo, VideoStatus};
    use crate::jobs::RunStatus;
    use crate::transcription::{Transcriber, TranscriptionResult};
    use anyhow::{anyhow, Result};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn uploaded_video(app: &TestApp) -> String {
        let project = app
            .state
            .db
            .create_project(
                "alice",
                &NewProject {
                    name: "Talks".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        app.state
            .db
            .create_video(
                "alice",
                &NewVideo {
                    project_id: project.id,
                    title: "keynote.mp4".to_string(),
                    description: None,
                    filename: "video_1.mp4".to_string(),
                    original_url: "/uploads/video_1.mp4".to_string(),
                    size: Some(1),
                    format: Some("mp4".to_string()),
                    status: VideoStatus::Uploading,
                },
            )
            .unwrap()
            .id
    }

    async fn settle(app: &TestApp, video_id: &str) {
        for _ in 0..200 {
            let runs = app.state.runs.list_runs(video_id).unwrap();
            if runs.iter().all(|run| run.status != RunStatus::Running) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transcription of {} never finished", video_id);
    }

    #[tokio::test]
    async fn transcription_replaces_captions_and_sets_duration() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());
        let video_id = uploaded_video(&app);
        let uri = format!("/videos/{}/transcribe", video_id);

        let (status, ack) = app
            .request(Method::POST, &uri, Some("alice"), Some(json!({ "language": "en" })))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["status"], "TRANSCRIBING");
        assert_eq!(ack["videoId"], video_id.as_str());
        settle(&app, &video_id).await;

        let (status, transcript) = app.request(Method::GET, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transcript["status"], "READY");
        assert_eq!(transcript["duration"], 12.0);
        assert_eq!(transcript["language"], "en");
        assert_eq!(transcript["captions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ready_videos_cannot_be_transcribed_again() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());
        let video_id = uploaded_video(&app);
        let uri = format!("/videos/{}/transcribe", video_id);
        app.request(Method::POST, &uri, Some("alice"), None).await;
        settle(&app, &video_id).await;
        let before = app.state.db.list_captions(&video_id).unwrap();

        let (status, body) = app.request(Method::POST, &uri, Some("alice"), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Video is not ready for transcription");
        let after = app.state.db.list_captions(&video_id).unwrap();
        let before: Vec<&str> = before.iter().map(|c| c.id.as_str()).collect();
        let after: Vec<&str> = after.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(before.len(), 3);
        assert_eq!(before, after);
        assert_eq!(app.state.runs.list_runs(&video_id).unwrap().len(), 1);
    }

    struct TimingOut;

    #[async_trait::async_trait]
    impl Transcriber for TimingOut {
        fn name(&self) -> &'static str {
            "timing-out"
        }

        async fn transcribe(&self, _media_url: &str, _language: Option<&str>) -> Result<TranscriptionResult> {
            Err(anyhow!("operation timed out"))
        }
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::with_transcriber(dir.path(), Arc::new(TimingOut));
        let video_id = uploaded_video(&app);
        let uri = format!("/videos/{}/transcribe", video_id);

        let (status, _) = app.request(Method::POST, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        settle(&app, &video_id).await;

        let (_, transcript) = app.request(Method::GET, &uri, Some("alice"), None).await;
        assert_eq!(transcript["status"], "ERROR");
        assert_eq!(transcript["captions"], json!([]));
    }

    #[tokio::test]
    async fn unknown_languages_and_foreign_videos_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());
        let video_id = uploaded_video(&app);
        let uri = format!("/videos/{}/transcribe", video_id);

        let (status, _) = app
            .request(Method::POST, &uri, Some("alice"), Some(json!({ "language": "xx" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.request(Method::POST, &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.request(Method::GET, &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn languages_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());

        let (status, body) = app
            .request(Method::GET, "/transcription/languages", None, None)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body
            .as_array()
            .unwrap()
            .iter()
            .any(|language| language["code"] == "auto"));
    }
}
