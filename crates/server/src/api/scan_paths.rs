use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use common::http::{json_error, JsonResult};
use serde_json::Value;
use tracing::error;

use crate::scan::{self, ScanError};
use crate::state::{AppState, ScanPathsResponse};

const INVALID_PATHS: &str = "paths must be a non-empty array of strings";

pub async fn scan_paths(
    State(state): State<AppState>,
    payload: Option<Json<Value>>,
) -> JsonResult<ScanPathsResponse> {
    let paths = payload
        .and_then(|Json(body)| parse_paths(&body))
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, INVALID_PATHS))?;

    let store = state.store.clone();
    let extractor = Arc::clone(&state.extractor);
    let covers = state.covers.clone();
    let result = tokio::task::spawn_blocking(move || {
        scan::scan_paths(&store, extractor.as_ref(), &covers, &paths)
    })
    .await;

    match result {
        Ok(Ok(items)) => Ok(Json(ScanPathsResponse { items })),
        Ok(Err(ScanError::NoPaths)) => Err(json_error(StatusCode::BAD_REQUEST, INVALID_PATHS)),
        Ok(Err(err)) => {
            error!("Path scan failed: {}", err);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "scan_failed"))
        }
        Err(err) => {
            error!("Path scan task failed: {}", err);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "scan_failed"))
        }
    }
}

fn parse_paths(body: &Value) -> Option<Vec<String>> {
    let items = body.get("paths")?.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().map(|s| s.to_string()))
        .collect()
}
