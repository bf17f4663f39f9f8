use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{MetadataCacheEntry, MetadataLite, StoreSnapshot};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PLAYS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("plays");
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Play counts and the per-path metadata cache. Cloning shares the database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = open_or_create_db(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    pub fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(PLAYS_TABLE)?;
            let _ = write_txn.open_table(METADATA_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn cache_entry(&self, path: &str) -> Result<Option<MetadataCacheEntry>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(METADATA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let Some(value) = table.get(path)? else {
            return Ok(None);
        };
        match decode_value(value.value()) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!("Ignoring undecodable cache entry for {}: {}", path, err);
                Ok(None)
            }
        }
    }

    /// Upserts every entry in one transaction; existing entries are replaced whole.
    pub fn put_cache_entries(
        &self,
        entries: &[(String, MetadataCacheEntry)],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            for (path, entry) in entries {
                let bytes = encode_value(entry)?;
                table.insert(path.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_plays(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(PLAYS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        let mut plays = BTreeMap::new();
        for entry in table.iter()? {
            let entry = entry?;
            plays.insert(entry.0.value().to_string(), entry.1.value());
        }
        Ok(plays)
    }

    pub fn play_count(&self, id: &str) -> Result<Option<u64>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(PLAYS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let count = table.get(id)?.map(|value| value.value());
        Ok(count)
    }

    /// Read and write happen inside one write transaction, so concurrent
    /// increments never lose updates.
    pub fn increment_play(&self, id: &str) -> Result<u64, StoreError> {
        let write_txn = self.db.begin_write()?;
        let count = {
            let mut table = write_txn.open_table(PLAYS_TABLE)?;
            let current = table.get(id)?.map(|value| value.value()).unwrap_or(0);
            let next = current.saturating_add(1);
            table.insert(id, next)?;
            next
        };
        write_txn.commit()?;
        Ok(count)
    }

    pub fn set_play_count(&self, id: &str, count: u64) -> Result<u64, StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLAYS_TABLE)?;
            table.insert(id, count)?;
        }
        write_txn.commit()?;
        Ok(count)
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let mut snapshot = StoreSnapshot {
            plays: self.list_plays()?,
            metadata: BTreeMap::new(),
        };
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(METADATA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(snapshot),
            Err(err) => return Err(err.into()),
        };
        for entry in table.iter()? {
            let entry = entry?;
            let path = entry.0.value();
            match decode_value::<MetadataCacheEntry>(entry.1.value()) {
                Ok(cached) => {
                    snapshot.metadata.insert(path.to_string(), cached);
                }
                Err(err) => warn!("Skipping undecodable cache entry for {}: {}", path, err),
            }
        }
        Ok(snapshot)
    }

    /// Writes every key of `snapshot`, overwriting keys that already exist.
    /// Keys absent from the snapshot are left alone.
    pub fn import_snapshot(&self, snapshot: &StoreSnapshot) -> Result<ImportStats, StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut plays = write_txn.open_table(PLAYS_TABLE)?;
            for (id, count) in &snapshot.plays {
                plays.insert(id.as_str(), *count)?;
            }
            let mut metadata = write_txn.open_table(METADATA_TABLE)?;
            for (path, entry) in &snapshot.metadata {
                let bytes = encode_value(entry)?;
                metadata.insert(path.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        let stats = ImportStats {
            plays: snapshot.plays.len(),
            metadata: snapshot.metadata.len(),
        };
        info!(
            "Imported {} play counts and {} metadata entries",
            stats.plays, stats.metadata
        );
        Ok(stats)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportStats {
    pub plays: usize,
    pub metadata: usize,
}

#[derive(Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    plays: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCacheEntry {
    mtime_ms: f64,
    size: f64,
    meta: MetadataLite,
}

/// Parses a `db.json` document (`{plays, metadata}`) written by older
/// deployments. A missing or unparsable file yields an empty snapshot;
/// individual malformed entries are skipped.
pub fn read_legacy_json(path: &Path) -> StoreSnapshot {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("Could not read {:?}: {}", path, err);
            return StoreSnapshot::default();
        }
    };
    let doc: LegacyDocument = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(err) => {
            warn!("Could not parse {:?}: {}", path, err);
            return StoreSnapshot::default();
        }
    };

    let mut snapshot = StoreSnapshot::default();
    for (id, value) in doc.plays {
        match value.as_f64() {
            Some(count) if count >= 0.0 => {
                snapshot.plays.insert(id, count as u64);
            }
            _ => warn!("Skipping play count for {:?}: {}", id, value),
        }
    }
    for (key, value) in doc.metadata {
        match serde_json::from_value::<LegacyCacheEntry>(value) {
            Ok(entry) => {
                snapshot.metadata.insert(
                    key,
                    MetadataCacheEntry {
                        mtime_ms: entry.mtime_ms.max(0.0) as u64,
                        size: entry.size.max(0.0) as u64,
                        meta: entry.meta,
                    },
                );
            }
            Err(err) => warn!("Skipping metadata entry {:?}: {}", key, err),
        }
    }
    snapshot
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::Redb(err) => write!(f, "db error: {}", err),
            StoreError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Redb(err)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(err)
    }
}

pub fn open_or_create_db(path: &Path) -> Result<Database, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}
