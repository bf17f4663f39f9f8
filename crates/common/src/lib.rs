use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "http")]
pub mod http;

pub const UNKNOWN: &str = "Unknown";

/// Client-facing subset of a file's tags, with defaults already applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataLite {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: Option<f64>,
    pub cover_url: Option<String>,
}

impl MetadataLite {
    /// Fills missing fields: title from the file name stem, artist and album
    /// with "Unknown". Blank strings count as missing.
    pub fn with_defaults(
        source_name: &str,
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
        duration: Option<f64>,
        cover_url: Option<String>,
    ) -> Self {
        Self {
            title: non_blank(title).unwrap_or_else(|| file_stem(source_name)),
            artist: non_blank(artist).unwrap_or_else(|| UNKNOWN.to_string()),
            album: non_blank(album).unwrap_or_else(|| UNKNOWN.to_string()),
            duration: duration.filter(|value| value.is_finite() && *value > 0.0),
            cover_url,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime_ms: u64,
    pub size: u64,
}

impl FileStamp {
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|value| value.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0);
        Self {
            mtime_ms,
            size: meta.len(),
        }
    }
}

/// Stats `path`, rejecting anything that is not a regular file.
pub fn stat_file(path: &Path) -> io::Result<FileStamp> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok(FileStamp::from_metadata(&meta))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCacheEntry {
    pub mtime_ms: u64,
    pub size: u64,
    pub meta: MetadataLite,
}

impl MetadataCacheEntry {
    pub fn new(stamp: FileStamp, meta: MetadataLite) -> Self {
        Self {
            mtime_ms: stamp.mtime_ms,
            size: stamp.size,
            meta,
        }
    }

    // Exact match on both fields; any difference means the file changed.
    pub fn is_fresh(&self, stamp: &FileStamp) -> bool {
        self.mtime_ms == stamp.mtime_ms && self.size == stamp.size
    }
}

/// Whole-store view, shaped like the JSON document older deployments kept on disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub plays: BTreeMap<String, u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataCacheEntry>,
}

pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
