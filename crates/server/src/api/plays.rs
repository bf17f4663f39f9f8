use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use common::http::{json_error, JsonResult};
use serde_json::Value;
use tracing::error;

use crate::state::{AppState, PlayCountResponse, PlaysResponse, SetCountRequest};

pub async fn list_plays(State(state): State<AppState>) -> JsonResult<PlaysResponse> {
    let plays = state.store.list_plays().map_err(|err| {
        error!("Failed to list plays: {}", err);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_failed")
    })?;
    Ok(Json(plays))
}

pub async fn increment_play(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<PlayCountResponse> {
    let count = state.store.increment_play(&id).map_err(|err| {
        error!("Failed to increment plays for {}: {}", id, err);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_failed")
    })?;
    Ok(Json(PlayCountResponse { id, count }))
}

pub async fn set_play_count(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    payload: Option<Json<SetCountRequest>>,
) -> JsonResult<PlayCountResponse> {
    let count = payload
        .and_then(|Json(body)| body.count)
        .as_ref()
        .and_then(parse_count)
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "count must be >= 0"))?;
    let count = state.store.set_play_count(&id, count).map_err(|err| {
        error!("Failed to set plays for {}: {}", id, err);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_failed")
    })?;
    Ok(Json(PlayCountResponse { id, count }))
}

// Counts are whole numbers; 3.0 is accepted, 2.5 and negatives are not.
fn parse_count(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let float = value.as_f64()?;
    if float >= 0.0 && float.fract() == 0.0 && float <= u64::MAX as f64 {
        Some(float as u64)
    } else {
        None
    }
}
