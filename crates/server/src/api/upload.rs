use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use common::http::{json_error, ApiError, JsonResult};
use tracing::{error, info, warn};

use crate::state::{AppState, UploadMetadata};

const FILE_FIELD: &str = "file";

struct Upload {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

/// Parses tags from a single uploaded file. Nothing is cached; every call
/// parses the buffer again.
pub async fn upload_metadata(
    State(state): State<AppState>,
    multipart: Option<Multipart>,
) -> JsonResult<UploadMetadata> {
    let Some(multipart) = multipart else {
        return Err(json_error(StatusCode::BAD_REQUEST, "file is required"));
    };
    let upload = read_file_field(multipart)
        .await?
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "file is required"))?;

    info!(
        "Parsing upload {:?} ({} bytes, {})",
        upload.file_name,
        upload.data.len(),
        upload.content_type.as_deref().unwrap_or("unknown type")
    );

    let extractor = Arc::clone(&state.extractor);
    let covers = state.covers.clone();
    let result = tokio::task::spawn_blocking(move || {
        let tags = extractor
            .extract_bytes(&upload.data, upload.content_type.as_deref())
            .map_err(|err| err.to_string())?;
        let meta = covers
            .lite_metadata(&upload.file_name, tags)
            .map_err(|err| format!("cover write failed: {}", err))?;
        Ok::<UploadMetadata, String>(UploadMetadata {
            source_name: upload.file_name,
            meta,
        })
    })
    .await;

    match result {
        Ok(Ok(response)) => Ok(Json(response)),
        Ok(Err(err)) => {
            error!("Metadata parse failed: {}", err);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "metadata_parse_failed"))
        }
        Err(err) => {
            error!("Metadata task failed: {}", err);
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "metadata_parse_failed"))
        }
    }
}

async fn read_file_field(
    mut multipart: Multipart,
) -> Result<Option<Upload>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(err) => return Err(multipart_error(err)),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(|value| value.to_string());
        let data = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        return Ok(Some(Upload {
            file_name,
            content_type,
            data,
        }));
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    warn!("Rejected upload: {}", err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        json_error(StatusCode::PAYLOAD_TOO_LARGE, "file_too_large")
    } else {
        json_error(StatusCode::BAD_REQUEST, "invalid_multipart")
    }
}
