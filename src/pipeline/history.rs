//! Historical listing table
//!
//! The history is the concatenation of every normalized batch ever ingested.
//! Prior rows are never re-cleaned or reconciled by key; duplicates are only
//! removed inside a batch, so ingesting the same batch twice doubles its rows.

use crate::error::Result;
use crate::storage::write_atomic;
use crate::table::Table;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Persistent home of the historical table
pub trait HistoryStore: Send + Sync {
    /// Current table, or `None` when nothing has been stored yet
    fn load(&self) -> Result<Option<Table>>;

    /// Replace the stored table
    fn commit(&self, table: &Table) -> Result<()>;

    /// Prior history followed by `batch`, without persisting anything
    fn merge(&self, batch: &Table) -> Result<Table> {
        match self.load()? {
            Some(prior) if prior.width() > 0 && !prior.is_empty() => Ok(prior.concat(batch)),
            _ => Ok(batch.clone()),
        }
    }

    /// Merge `batch` into the history and persist the result
    fn append(&self, batch: &Table) -> Result<Table> {
        let merged = self.merge(batch)?;
        self.commit(&merged)?;
        Ok(merged)
    }
}

/// History kept in a single CSV file, rewritten whole on every commit
pub struct CsvHistoryStore {
    path: PathBuf,
}

impl CsvHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for CsvHistoryStore {
    fn load(&self) -> Result<Option<Table>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No history file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let table = Table::from_csv_reader(BufReader::new(file))?;
        Ok(Some(table))
    }

    fn commit(&self, table: &Table) -> Result<()> {
        write_atomic(&self.path, |w| table.write_csv(w))?;
        info!(path = %self.path.display(), rows = table.height(), "History written");
        Ok(())
    }
}

/// History held in memory, for tests and dry runs
#[derive(Default)]
pub struct InMemoryHistoryStore {
    table: Mutex<Option<Table>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: Table) -> Self {
        Self {
            table: Mutex::new(Some(table)),
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn load(&self) -> Result<Option<Table>> {
        Ok(self.table.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn commit(&self, table: &Table) -> Result<()> {
        *self.table.lock().unwrap_or_else(|p| p.into_inner()) = Some(table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn batch() -> Table {
        let csv = "area,neighborhood,price\n50,Moema,100\n70,Centro,200\n";
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_first_append_equals_batch() {
        let dir = tempdir().unwrap();
        let store = CsvHistoryStore::new(dir.path().join("history.csv"));

        let merged = store.append(&batch()).unwrap();
        assert_eq!(merged, batch());
        assert_eq!(store.load().unwrap().unwrap(), batch());
    }

    #[test]
    fn test_zero_byte_file_counts_as_no_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(&path, "").unwrap();
        let store = CsvHistoryStore::new(&path);

        assert_eq!(store.merge(&batch()).unwrap(), batch());
    }

    #[test]
    fn test_appending_same_batch_twice_doubles_rows() {
        let dir = tempdir().unwrap();
        let store = CsvHistoryStore::new(dir.path().join("data/history.csv"));

        store.append(&batch()).unwrap();
        let merged = store.append(&batch()).unwrap();
        assert_eq!(merged.height(), 4);
        assert_eq!(&merged.rows()[..2], batch().rows());
    }

    #[test]
    fn test_merge_does_not_persist() {
        let store = InMemoryHistoryStore::with_table(batch());
        let merged = store.merge(&batch()).unwrap();
        assert_eq!(merged.height(), 4);
        assert_eq!(store.load().unwrap().unwrap().height(), 2);
    }

    #[test]
    fn test_prior_rows_keep_their_values_when_columns_differ() {
        let prior = Table::from_csv_reader("area,price\n50,100\n".as_bytes()).unwrap();
        let store = InMemoryHistoryStore::with_table(prior.clone());
        let merged = store.append(&batch()).unwrap();
        assert_eq!(merged.height(), 3);
        assert_eq!(merged.columns(), &["area", "price", "neighborhood"]);
        assert!(merged.rows()[0][2].is_missing());
    }
}
