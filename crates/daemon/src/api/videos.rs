use anyhow::{bail, Context};
use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path as FsPath;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{AppState, CallerId};
use crate::db::{Caption, NewVideo, Video, VideoStatus};
use crate::error::{ApiError, ApiResult};
use crate::transcription::whisper::upload_path;

const UPLOAD_URL_PREFIX: &str = "/uploads/";
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideosQuery {
    project_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateVideoRequest {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
pub struct VideoWithCaptions {
    #[serde(flatten)]
    video: Video,
    captions: Vec<Caption>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos))
        .route("/upload", post(upload_video))
        .route(
            "/:id",
            get(get_video).put(update_video).delete(delete_video),
        )
}

async fn list_videos(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Query(query): Query<ListVideosQuery>,
) -> ApiResult<Json<Vec<Video>>> {
    let project_id = query.project_id.as_deref().filter(|id| !id.trim().is_empty());
    Ok(Json(state.db.list_videos(&owner, project_id)?))
}

async fn get_video(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoWithCaptions>> {
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    let captions = state.db.list_captions(&id)?;
    Ok(Json(VideoWithCaptions { video, captions }))
}

async fn update_video(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
    Json(req): Json<UpdateVideoRequest>,
) -> ApiResult<Json<Video>> {
    if !state
        .db
        .update_video_details(&owner, &id, req.title.as_deref(), req.description.as_deref())?
    {
        return Err(ApiError::NotFound("Video"));
    }
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    Ok(Json(video))
}

async fn delete_video(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let video = state
        .db
        .get_video(&owner, &id)?
        .ok_or(ApiError::NotFound("Video"))?;
    if !state.db.delete_video(&owner, &id)? {
        return Err(ApiError::NotFound("Video"));
    }

    remove_stored_upload(&state.config.upload_dir, &video).await;
    info!(video_id = %id, "video deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes the file behind an uploaded video. Generated videos point at stock
/// media and have nothing on disk.
pub(crate) async fn remove_stored_upload(upload_dir: &FsPath, video: &Video) {
    let Some(name) = video.original_url.strip_prefix(UPLOAD_URL_PREFIX) else {
        return;
    };
    match upload_path(upload_dir, name) {
        Ok(path) => discard_file(&path).await,
        Err(e) => warn!(video_id = %video.id, error = %e, "refusing to remove upload"),
    }
}

async fn discard_file(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "failed to remove uploaded file");
        }
    }
}

/// Extension of the client-supplied file name, restricted to alphanumerics.
fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}

/// Opens a fresh `video_<ms>.<ext>` file. Never truncates an existing upload:
/// a name taken in the same millisecond gets a numeric suffix.
async fn create_upload_file(dir: &FsPath, stamp: i64, format: &str) -> anyhow::Result<(String, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let filename = match attempt {
            0 => format!("video_{}.{}", stamp, format),
            n => format!("video_{}_{}.{}", stamp, n, format),
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&filename))
            .await
        {
            Ok(file) => return Ok((filename, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to create {}", filename)),
        }
    }
    bail!("No free upload name for timestamp {}", stamp)
}

async fn write_upload(field: &mut Field<'_>, file: &mut File, limit: usize) -> ApiResult<usize> {
    let mut size = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?
    {
        size += chunk.len();
        if size > limit {
            return Err(ApiError::validation("File size must be less than the upload limit"));
        }
        file.write_all(&chunk).await.context("Failed to write upload")?;
    }
    file.flush().await.context("Failed to flush upload")?;
    Ok(size)
}

struct StoredUpload {
    title: String,
    filename: String,
    format: String,
    size: usize,
}

async fn upload_video(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Video>)> {
    let mut stored_name: Option<String> = None;
    match receive_upload(&state, &owner, multipart, &mut stored_name).await {
        Ok(video) => {
            info!(video_id = %video.id, size = ?video.size, "video uploaded");
            Ok((StatusCode::CREATED, Json(video)))
        }
        Err(e) => {
            // Whatever reached the disk belongs to no video.
            if let Some(name) = stored_name {
                discard_file(&state.config.upload_dir.join(name)).await;
            }
            Err(e)
        }
    }
}

/// Streams the `video` field to disk and records it. `stored_name` is set as
/// soon as a file exists so the caller can remove it on any error.
async fn receive_upload(
    state: &AppState,
    owner: &str,
    mut multipart: Multipart,
    stored_name: &mut Option<String>,
) -> ApiResult<Video> {
    let mut project_id: Option<String> = None;
    let mut stored: Option<StoredUpload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("projectId") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?;
                project_id = Some(value.trim().to_string());
            }
            Some("video") => {
                if stored_name.is_some() {
                    return Err(ApiError::validation("Only one video file can be uploaded at a time"));
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("video/") {
                    return Err(ApiError::validation("File must be a video"));
                }
                let original_name = field.file_name().map(str::to_string);
                let format = upload_extension(original_name.as_deref());

                tokio::fs::create_dir_all(&state.config.upload_dir)
                    .await
                    .context("Failed to create upload directory")?;
                let (filename, mut file) = create_upload_file(
                    &state.config.upload_dir,
                    Utc::now().timestamp_millis(),
                    &format,
                )
                .await?;
                *stored_name = Some(filename.clone());

                let size = write_upload(&mut field, &mut file, state.config.max_upload_bytes).await?;
                stored = Some(StoredUpload {
                    title: original_name.unwrap_or_else(|| filename.clone()),
                    filename,
                    format,
                    size,
                });
            }
            _ => {}
        }
    }

    // The file is on disk; it only becomes a video once the project checks out
    let upload = stored.ok_or_else(|| ApiError::validation("No file provided"))?;
    let project_id = project_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("Project ID is required"))?;
    if state.db.get_project(owner, &project_id)?.is_none() {
        return Err(ApiError::NotFound("Project"));
    }

    let video = state.db.create_video(
        owner,
        &NewVideo {
            project_id,
            title: upload.title,
            description: None,
            original_url: format!("{}{}", UPLOAD_URL_PREFIX, upload.filename),
            filename: upload.filename,
            size: Some(upload.size as i64),
            format: Some(upload.format),
            status: VideoStatus::Uploading,
        },
    )?;
    Ok(video)
}
