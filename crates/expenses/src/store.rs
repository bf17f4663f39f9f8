use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::now_millis;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const EXPENSES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("expenses");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub title: String,
    pub amount: f64,
    pub created_at: u64,
}

#[derive(Clone)]
pub struct ExpenseStore {
    db: Arc<Database>,
}

impl ExpenseStore {
    pub fn open(path: &Path) -> Result<Self, ExpenseError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    pub fn init_tables(&self) -> Result<(), ExpenseError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(EXPENSES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn create(&self, title: String, amount: f64) -> Result<Expense, ExpenseError> {
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            title,
            amount,
            created_at: now_millis(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(EXPENSES_TABLE)?;
            let bytes = bincode::serialize(&expense)?;
            table.insert(expense.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(expense)
    }

    /// Oldest first.
    pub fn list(&self) -> Result<Vec<Expense>, ExpenseError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(EXPENSES_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let expense: Expense = bincode::deserialize(entry.1.value())?;
            items.push(expense);
        }
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    pub fn delete(&self, id: &str) -> Result<bool, ExpenseError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(EXPENSES_TABLE)?;
            let removed = table.remove(id)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}

#[derive(Debug)]
pub enum ExpenseError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for ExpenseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpenseError::Io(err) => write!(f, "io error: {}", err),
            ExpenseError::Redb(err) => write!(f, "db error: {}", err),
            ExpenseError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for ExpenseError {}

impl From<std::io::Error> for ExpenseError {
    fn from(err: std::io::Error) -> Self {
        ExpenseError::Io(err)
    }
}

impl From<DatabaseError> for ExpenseError {
    fn from(err: DatabaseError) -> Self {
        ExpenseError::Redb(err.into())
    }
}

impl From<TableError> for ExpenseError {
    fn from(err: TableError) -> Self {
        ExpenseError::Redb(err.into())
    }
}

impl From<TransactionError> for ExpenseError {
    fn from(err: TransactionError) -> Self {
        ExpenseError::Redb(err.into())
    }
}

impl From<StorageError> for ExpenseError {
    fn from(err: StorageError) -> Self {
        ExpenseError::Redb(err.into())
    }
}

impl From<CommitError> for ExpenseError {
    fn from(err: CommitError) -> Self {
        ExpenseError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for ExpenseError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ExpenseError::Bincode(err)
    }
}
