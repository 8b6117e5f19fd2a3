use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use super::{AppState, CallerId};
use crate::error::{ApiError, ApiResult};
use crate::jobs::PipelineRun;

pub fn router() -> Router<AppState> {
    Router::new().route("/:id/runs", get(list_runs))
}

/// Pipeline runs of a video, newest first.
async fn list_runs(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    if state.db.get_video(&owner, &id)?.is_none() {
        return Err(ApiError::NotFound("Video"));
    }
    Ok(Json(state.runs.list_runs(&id)?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::db::{NewProject, NewVideo};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn runs_are_listed_for_the_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());
        let project = app
            .state
            .db
            .create_project(
                "alice",
                &NewProject {
                    name: "Runs".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        let run = app
            .state
            .runs
            .start_generation("alice", &NewVideo::generated(&project.id, "Hello."))
            .unwrap();
        let uri = format!("/videos/{}/runs", run.video_id);

        let (status, body) = app.request(Method::GET, &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let runs = body.as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["id"], run.id.as_str());
        assert_eq!(runs[0]["kind"], "generate");
        assert_eq!(runs[0]["status"], "running");

        let (status, _) = app.request(Method::GET, &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
