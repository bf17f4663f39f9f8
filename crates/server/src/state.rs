use std::collections::BTreeMap;
use std::sync::Arc;

use common::MetadataLite;
use metadata::TagExtractor;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::config::ServerConfig;
use crate::covers::CoverWriter;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub extractor: Arc<dyn TagExtractor>,
    pub covers: CoverWriter,
    pub config: Arc<ServerConfig>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub source_name: String,
    #[serde(flatten)]
    pub meta: MetadataLite,
}

/// One entry of a scan response: the path plus either its metadata or an error.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanItem {
    pub path: String,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanOutcome {
    Found(MetadataLite),
    Failed { error: String },
}

impl ScanItem {
    pub fn found(path: &str, meta: MetadataLite) -> Self {
        Self {
            path: path.to_string(),
            outcome: ScanOutcome::Found(meta),
        }
    }

    pub fn failed(path: &str, error: &str) -> Self {
        Self {
            path: path.to_string(),
            outcome: ScanOutcome::Failed {
                error: error.to_string(),
            },
        }
    }
}

#[derive(Serialize)]
pub struct ScanPathsResponse {
    pub items: Vec<ScanItem>,
}

#[derive(Serialize)]
pub struct PlayCountResponse {
    pub id: String,
    pub count: u64,
}

pub type PlaysResponse = BTreeMap<String, u64>;

#[derive(Debug, Deserialize)]
pub struct SetCountRequest {
    pub count: Option<serde_json::Value>,
}
