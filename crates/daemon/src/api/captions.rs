use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::put,
    Router,
};
use serde::Deserialize;

use super::{AppState, CallerId};
use crate::db::Caption;
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCaptionRequest {
    text: Option<String>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", put(update_caption).delete(delete_caption))
}

/// Partial edit; the resulting span must still satisfy `endTime > startTime`.
async fn update_caption(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
    Json(req): Json<UpdateCaptionRequest>,
) -> ApiResult<Json<Caption>> {
    let caption = state
        .db
        .get_caption(&owner, &id)?
        .ok_or(ApiError::NotFound("Caption"))?;

    let text = req.text.map(|text| text.trim().to_string()).unwrap_or(caption.text);
    let start_time = req.start_time.unwrap_or(caption.start_time);
    let end_time = req.end_time.unwrap_or(caption.end_time);

    if text.is_empty() {
        return Err(ApiError::validation("Caption text cannot be empty"));
    }
    if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 {
        return Err(ApiError::validation("Caption times must be non-negative numbers"));
    }
    if end_time <= start_time {
        return Err(ApiError::validation("End time must be after start time"));
    }

    state.db.update_caption(&id, &text, start_time, end_time)?;
    let updated = state
        .db
        .get_caption(&owner, &id)?
        .ok_or(ApiError::NotFound("Caption"))?;
    Ok(Json(updated))
}

async fn delete_caption(
    State(state): State<AppState>,
    CallerId(owner): CallerId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.delete_caption(&owner, &id)? {
        return Err(ApiError::NotFound("Caption"));
    }
    Ok(StatusCode::NO_CONTENT)
}
