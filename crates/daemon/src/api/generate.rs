use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppState, CallerId};
use crate::db::{NewVideo, VideoStatus};
use crate::error::{ApiError, ApiResult};
use crate::jobs::generate::run_generation;
use crate::jobs::PipelineRun;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    project_id: String,
    script: Option<String>,
}

#[derive(Deserialize)]
pub struct RegenerateRequest {
    script: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    video_id: String,
    run_id: String,
    status: VideoStatus,
    message: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(generate))
}

pub fn regenerate_router() -> Router<AppState> {
    Router::new().route("/:id/regenerate", post(regenerate))
}

fn launch(state: &AppState, run: &PipelineRun, script: String) {
    let pipeline = run_generation(
        state.db.clone(),
        state.resolver.clone(),
        run.video_id.clone(),
        run.id.clone(),
        script,
    );
    state.runs.spawn(run.clone(), pipeline);
}

/// Starts a generation run. Answers as soon as the `PROCESSING` record exists;
/// the caller polls the video for the outcome.
async fn generate(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    if req.project_id.trim().is_empty() {
        return Err(ApiError::validation("Project ID is required"));
    }
    let project = state
        .db
        .get_project(&owner, &req.project_id)?
        .ok_or(ApiError::NotFound("Project"))?;

    // Fall back to the script stored on the project
    let script = req
        .script
        .filter(|script| !script.trim().is_empty())
        .or(project.script)
        .ok_or_else(|| ApiError::validation("Script content is required"))?;

    let run = state
        .runs
        .start_generation(&owner, &NewVideo::generated(&project.id, &script))?;
    info!(video_id = %run.video_id, run_id = %run.id, project_id = %project.id, "generation started");
    launch(&state, &run, script);

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            video_id: run.video_id,
            run_id: run.id,
            status: VideoStatus::Processing,
            message: "Video generation started",
        }),
    ))
}

/// Restarts generation on a `READY` or `ERROR` video. Timeline and artifacts
/// of the previous run are replaced when the new run completes.
async fn regenerate(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
    Json(req): Json<RegenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    let script = req
        .script
        .filter(|script| !script.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Script content is required"))?;

    if !video.status.is_terminal() {
        return Err(ApiError::precondition(format!(
            "Video is {} and cannot be regenerated",
            video.status.as_str()
        )));
    }
    // Uploads own a stored file and captions that a new timeline would orphan.
    if !state.runs.is_generated(&id)? {
        return Err(ApiError::precondition("Only generated videos can be regenerated"));
    }

    let description = NewVideo::generated(&video.project_id, &script).description.unwrap_or_default();
    let run = state
        .runs
        .restart_generation(&owner, &id, &description)?
        .ok_or_else(|| ApiError::precondition("A pipeline run is already active for this video"))?;
    info!(video_id = %run.video_id, run_id = %run.id, "generation restarted");
    launch(&state, &run, script);

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            video_id: run.video_id,
            run_id: run.id,
            status: VideoStatus::Processing,
            message: "Video regeneration started",
        }),
    ))
}
