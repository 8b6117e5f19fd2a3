use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use engine::timeline::MediaKind;
use serde::Deserialize;

use super::{AppState, CallerId};
use crate::error::{ApiError, ApiResult};
use crate::stock::SearchPage;

const DEFAULT_PER_PAGE: u32 = 15;
const MAX_PER_PAGE: u32 = 80;

#[derive(Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/search", get(search_media))
}

fn parse_kind(kind: Option<&str>) -> ApiResult<MediaKind> {
    match kind.map(str::trim) {
        None | Some("") | Some("video") => Ok(MediaKind::Video),
        Some("image") => Ok(MediaKind::Image),
        Some(other) => Err(ApiError::validation(format!(
            "Unsupported media type '{}'",
            other
        ))),
    }
}

/// Manual stock media browsing for the editor.
async fn search_media(
    State(state): State<AppState>,
    CallerId(_owner): CallerId,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<SearchPage>> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| ApiError::validation("Search query is required"))?;
    let kind = parse_kind(params.kind.as_deref())?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    Ok(Json(state.resolver.search(query, kind, page, per_page).await))
}
