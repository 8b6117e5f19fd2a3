use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::videos::remove_stored_upload;
use super::{AppState, CallerId};
use crate::db::{NewProject, Project, ProjectUpdate, Video};
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    name: String,
    description: Option<String>,
    script: Option<String>,
    medium: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    name: Option<String>,
    description: Option<String>,
    script: Option<String>,
    medium: Option<String>,
}

#[derive(Serialize)]
pub struct ProjectWithVideos {
    #[serde(flatten)]
    project: Project,
    videos: Vec<Video>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}

async fn list_projects(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.db.list_projects(&owner)?))
}

async fn create_project(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("Project name is required"));
    }

    let project = state.db.create_project(
        &owner,
        &NewProject {
            name: req.name,
            description: req.description,
            script: req.script,
            medium: req.medium,
        },
    )?;
    info!(project_id = %project.id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectWithVideos>> {
    let project = state
        .db
        .get_project(&owner, &id)?
        .ok_or(ApiError::NotFound("Project"))?;
    let videos = state.db.list_videos(&owner, Some(id.as_str()))?;
    Ok(Json(ProjectWithVideos { project, videos }))
}

async fn update_project(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let update = ProjectUpdate {
        name: req.name,
        description: req.description,
        script: req.script,
        medium: req.medium,
    };
    if !state.db.update_project(&owner, &id, &update)? {
        return Err(ApiError::NotFound("Project"));
    }
    let project = state
        .db
        .get_project(&owner, &id)?
        .ok_or(ApiError::NotFound("Project"))?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    // Cascades drop the rows; uploaded files have to go separately.
    let videos = state.db.list_videos(&owner, Some(id.as_str()))?;
    if !state.db.delete_project(&owner, &id)? {
        return Err(ApiError::NotFound("Project"));
    }
    for video in &videos {
        remove_stored_upload(&state.config.upload_dir, video).await;
    }
    info!(project_id = %id, videos = videos.len(), "project deleted");
    Ok(StatusCode::NO_CONTENT)
}
