use std::collections::HashMap;
use std::path::Path;

use common::{stat_file, MetadataCacheEntry};
use metadata::TagExtractor;
use store::{Store, StoreError};
use tracing::{debug, info, warn};

use crate::covers::CoverWriter;
use crate::state::ScanItem;

pub const UNREADABLE: &str = "unreadable";

#[derive(Debug)]
pub enum ScanError {
    NoPaths,
    Store(StoreError),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::NoPaths => write!(f, "no paths given"),
            ScanError::Store(err) => write!(f, "store error: {}", err),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<StoreError> for ScanError {
    fn from(err: StoreError) -> Self {
        ScanError::Store(err)
    }
}

/// Resolves lite metadata for every path, in order. Entries whose mtime and
/// size still match the file are served from the store; everything else is
/// re-extracted. Per-path failures become `unreadable` items. Fresh entries
/// are written in a single transaction once all paths are done.
pub fn scan_paths(
    store: &Store,
    extractor: &dyn TagExtractor,
    covers: &CoverWriter,
    paths: &[String],
) -> Result<Vec<ScanItem>, ScanError> {
    if paths.is_empty() {
        return Err(ScanError::NoPaths);
    }

    let mut items = Vec::with_capacity(paths.len());
    let mut pending: HashMap<&str, MetadataCacheEntry> = HashMap::new();
    let mut hits = 0usize;

    for path in paths {
        let stamp = match stat_file(Path::new(path)) {
            Ok(stamp) => stamp,
            Err(err) => {
                debug!("Cannot stat {}: {}", path, err);
                items.push(ScanItem::failed(path, UNREADABLE));
                continue;
            }
        };

        let cached = match pending.get(path.as_str()) {
            Some(entry) => Some(entry.clone()),
            None => store.cache_entry(path)?,
        };
        if let Some(entry) = cached.filter(|entry| entry.is_fresh(&stamp)) {
            hits += 1;
            items.push(ScanItem::found(path, entry.meta));
            continue;
        }

        let extracted = extractor
            .extract_path(Path::new(path))
            .map_err(|err| err.to_string())
            .and_then(|tags| {
                covers
                    .lite_metadata(path, tags)
                    .map_err(|err| format!("cover write failed: {}", err))
            });
        match extracted {
            Ok(meta) => {
                pending.insert(path.as_str(), MetadataCacheEntry::new(stamp, meta.clone()));
                items.push(ScanItem::found(path, meta));
            }
            Err(err) => {
                warn!("Failed to read tags from {}: {}", path, err);
                items.push(ScanItem::failed(path, UNREADABLE));
            }
        }
    }

    let fresh: Vec<(String, MetadataCacheEntry)> = pending
        .into_iter()
        .map(|(path, entry)| (path.to_string(), entry))
        .collect();
    store.put_cache_entries(&fresh)?;
    info!(
        "Scanned {} paths ({} cached, {} extracted)",
        paths.len(),
        hits,
        fresh.len()
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    use common::MetadataLite;
    use metadata::{CoverArt, MetadataError, TagData};

    use crate::state::ScanOutcome;

    /// Reports the file length as the duration so content changes show up in results.
    #[derive(Default)]
    struct CountingExtractor {
        calls: AtomicUsize,
        with_cover: bool,
    }

    impl CountingExtractor {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TagExtractor for CountingExtractor {
        fn extract_path(&self, path: &Path) -> Result<TagData, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = fs::read(path)?;
            if bytes.starts_with(b"broken") {
                return Err(MetadataError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "bad header",
                )));
            }
            Ok(TagData {
                artist: Some("Artist".to_string()),
                duration_secs: Some(bytes.len() as f64),
                cover: self.with_cover.then(|| CoverArt {
                    data: vec![0x89, 0x50, 0x4E, 0x47],
                    mime: Some("image/png".to_string()),
                }),
                ..TagData::default()
            })
        }

        fn extract_bytes(&self, _bytes: &[u8], _mime: Option<&str>) -> Result<TagData, MetadataError> {
            unreachable!("scans read from paths")
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        store: Store,
        covers: CoverWriter,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Store::open(&dir.path().join("data.redb")).unwrap();
            let covers = CoverWriter::new(dir.path().join("uploads"));
            Self { dir, store, covers }
        }

        fn audio(&self, name: &str, contents: &[u8]) -> String {
            let path = self.dir.path().join(name);
            fs::write(&path, contents).unwrap();
            path.to_string_lossy().to_string()
        }

        fn scan(&self, extractor: &CountingExtractor, paths: &[String]) -> Vec<ScanItem> {
            scan_paths(&self.store, extractor, &self.covers, paths).unwrap()
        }
    }

    fn meta_of(item: &ScanItem) -> &MetadataLite {
        match &item.outcome {
            ScanOutcome::Found(meta) => meta,
            ScanOutcome::Failed { error } => panic!("{} failed: {}", item.path, error),
        }
    }

    fn set_mtime(path: &str, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn empty_input_is_rejected() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let result = scan_paths(&fixture.store, &extractor, &fixture.covers, &[]);
        assert!(matches!(result, Err(ScanError::NoPaths)));
        assert_eq!(extractor.calls(), 0);
    }

    #[test]
    fn keeps_input_order_and_applies_defaults() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let b = fixture.audio("b-side.mp3", b"bbbb");
        let a = fixture.audio("a-side.flac", b"aa");
        let items = fixture.scan(&extractor, &[b.clone(), a.clone()]);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, b);
        assert_eq!(items[1].path, a);
        let first = meta_of(&items[0]);
        assert_eq!(first.title, "b-side");
        assert_eq!(first.artist, "Artist");
        assert_eq!(first.album, "Unknown");
        assert_eq!(first.duration, Some(4.0));
        assert_eq!(first.cover_url, None);
    }

    #[test]
    fn unchanged_file_is_extracted_once() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let path = fixture.audio("song.mp3", b"data");

        let first = fixture.scan(&extractor, &[path.clone()]);
        let second = fixture.scan(&extractor, &[path.clone()]);
        assert_eq!(extractor.calls(), 1);
        assert_eq!(first, second);
        assert!(fixture.store.cache_entry(&path).unwrap().is_some());
    }

    #[test]
    fn size_change_invalidates_entry() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let path = fixture.audio("song.mp3", b"data");
        fixture.scan(&extractor, &[path.clone()]);

        fs::write(&path, b"longer data").unwrap();
        let items = fixture.scan(&extractor, &[path.clone()]);
        assert_eq!(extractor.calls(), 2);
        assert_eq!(meta_of(&items[0]).duration, Some(11.0));
        assert_eq!(fixture.store.cache_entry(&path).unwrap().unwrap().size, 11);
    }

    #[test]
    fn mtime_change_invalidates_entry() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let path = fixture.audio("song.mp3", b"data");
        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));
        fixture.scan(&extractor, &[path.clone()]);

        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000_000));
        fixture.scan(&extractor, &[path.clone()]);
        assert_eq!(extractor.calls(), 2);
        let entry = fixture.store.cache_entry(&path).unwrap().unwrap();
        assert_eq!(entry.mtime_ms, 2_000_000_000);
    }

    #[test]
    fn missing_path_does_not_abort_batch() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let missing = fixture
            .dir
            .path()
            .join("missing.mp3")
            .to_string_lossy()
            .to_string();
        let present = fixture.audio("present.mp3", b"x");
        let items = fixture.scan(&extractor, &[missing.clone(), present.clone()]);

        assert_eq!(items[0], ScanItem::failed(&missing, UNREADABLE));
        assert_eq!(meta_of(&items[1]).title, "present");
    }

    #[test]
    fn directories_are_unreadable() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let dir_path = fixture.dir.path().to_string_lossy().to_string();
        let items = fixture.scan(&extractor, &[dir_path.clone()]);
        assert_eq!(items, vec![ScanItem::failed(&dir_path, UNREADABLE)]);
        assert_eq!(extractor.calls(), 0);
    }

    #[test]
    fn extraction_failure_is_reported_inline_and_not_cached() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let broken = fixture.audio("broken.mp3", b"broken file");
        let fine = fixture.audio("fine.mp3", b"fine");
        let items = fixture.scan(&extractor, &[broken.clone(), fine.clone()]);

        assert_eq!(items[0], ScanItem::failed(&broken, UNREADABLE));
        assert_eq!(meta_of(&items[1]).title, "fine");
        assert!(fixture.store.cache_entry(&broken).unwrap().is_none());

        fixture.scan(&extractor, &[broken]);
        assert_eq!(extractor.calls(), 3);
    }

    #[test]
    fn duplicate_paths_reuse_the_first_extraction() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor::default();
        let path = fixture.audio("twice.mp3", b"data");
        let items = fixture.scan(&extractor, &[path.clone(), path.clone()]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], items[1]);
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn embedded_cover_is_materialized_once() {
        let fixture = Fixture::new();
        let extractor = CountingExtractor {
            with_cover: true,
            ..CountingExtractor::default()
        };
        let path = fixture.audio("art.mp3", b"data");
        let first = fixture.scan(&extractor, &[path.clone()]);
        let url = meta_of(&first[0]).cover_url.clone().unwrap();
        assert!(url.starts_with("/uploads/cover-") && url.ends_with(".png"));

        let file: PathBuf = fixture
            .covers
            .dir()
            .join(url.trim_start_matches("/uploads/"));
        assert!(file.exists());

        let second = fixture.scan(&extractor, &[path]);
        assert_eq!(meta_of(&second[0]).cover_url.as_deref(), Some(url.as_str()));
        assert_eq!(fs::read_dir(fixture.covers.dir()).unwrap().count(), 1);
    }

    #[test]
    fn undecodable_cache_entry_is_rescanned_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data.redb");
        let path = dir.path().join("a.mp3");
        fs::write(&path, b"audio").unwrap();
        let path = path.to_string_lossy().to_string();
        let missing = dir.path().join("gone.mp3").to_string_lossy().to_string();
        {
            let table: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("metadata");
            let db = redb::Database::create(&db_path).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let mut metadata = write_txn.open_table(table).unwrap();
                metadata.insert(path.as_str(), &b"\x01"[..]).unwrap();
            }
            write_txn.commit().unwrap();
        }
        let store = Store::open(&db_path).unwrap();
        let covers = CoverWriter::new(dir.path().join("uploads"));
        let extractor = CountingExtractor::default();
        let paths = [missing.clone(), path.clone()];

        let first = scan_paths(&store, &extractor, &covers, &paths).unwrap();
        assert_eq!(first[0], ScanItem::failed(&missing, UNREADABLE));
        assert_eq!(meta_of(&first[1]).title, "a");
        assert_eq!(extractor.calls(), 1);
        assert!(store.cache_entry(&path).unwrap().is_some());

        let second = scan_paths(&store, &extractor, &covers, &paths).unwrap();
        assert_eq!(second, first);
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn scan_items_serialize_flat() {
        let meta = MetadataLite::with_defaults("/m/a.mp3", None, None, None, Some(2.0), None);
        let found = serde_json::to_value(ScanItem::found("/m/a.mp3", meta)).unwrap();
        assert_eq!(
            found,
            serde_json::json!({
                "path": "/m/a.mp3",
                "title": "a",
                "artist": "Unknown",
                "album": "Unknown",
                "duration": 2.0,
                "coverUrl": null
            })
        );
        let failed = serde_json::to_value(ScanItem::failed("/m/b.mp3", UNREADABLE)).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({ "path": "/m/b.mp3", "error": "unreadable" })
        );
    }
}
