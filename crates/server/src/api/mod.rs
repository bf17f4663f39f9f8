pub mod plays;
pub mod scan_paths;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use common::http::json_error_response;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::covers::UPLOADS_URL_PREFIX;
use crate::state::{AppState, HealthResponse};

pub fn api_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/metadata",
            post(upload::upload_metadata).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/scan-paths", post(scan_paths::scan_paths))
        .route("/plays", get(plays::list_plays))
        .route(
            "/plays/:id",
            post(plays::increment_play).put(plays::set_play_count),
        )
}

/// Full HTTP surface: health, the JSON API, uploaded covers and the shared layers.
pub fn app_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let uploads = ServeDir::new(state.covers.dir());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router(config.max_upload_bytes))
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .fallback(not_found)
        .with_state(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let mut allowed = Vec::with_capacity(origins.len());
    for origin in origins {
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => allowed.push(value),
            Err(_) => warn!("Ignoring invalid allowed origin {:?}", origin),
        }
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

async fn not_found() -> impl IntoResponse {
    json_error_response(StatusCode::NOT_FOUND, "not_found")
}
