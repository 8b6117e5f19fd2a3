use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
    Router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::ApiError;
use crate::jobs::RunManager;
use crate::stock::StockMediaResolver;
use crate::transcription::Transcriber;

pub mod captions;
pub mod generate;
pub mod media;
pub mod projects;
pub mod runs;
pub mod timeline;
pub mod transcribe;
pub mod videos;

/// Header carrying the authenticated caller's user id.
pub const CALLER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub runs: Arc<RunManager>,
    pub resolver: Arc<StockMediaResolver>,
    pub transcriber: Arc<dyn Transcriber>,
    pub config: Arc<Config>,
}

/// The caller's stable user id. Rejects with 401 when absent or blank.
#[derive(Debug, Clone)]
pub struct CallerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerId(value.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Room for multipart framing on top of the raw file size.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .nest("/projects", projects::router())
        .nest("/videos", {
            Router::new()
                .merge(videos::router())
                .merge(timeline::router())
                .merge(transcribe::router())
                .merge(generate::regenerate_router())
                .merge(runs::router())
        })
        .nest("/captions", captions::router())
        .nest("/generate", generate::router())
        .nest("/transcription", transcribe::languages_router())
        .nest("/media", media::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn missing_caller_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let app = TestApp::new(dir.path());

        let (status, body) = app.request(Method::GET, "/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _) = app.request(Method::GET, "/projects", Some("  "), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
