// FILE: crates/library/src/json_store.rs

//! Metadata store persisted as one JSON snapshot file

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use folio_core::{FolioError, LibraryRow, ResourcePath, Result, RowFilter, RowId};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::store::{MemoryStore, MetadataStore};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    rows: Vec<LibraryRow>,
}

/// [`MemoryStore`] written through to a JSON file on every change.
///
/// Each mutation is applied to a copy first and only becomes visible once
/// the new snapshot has been persisted, so a failed write leaves both the
/// file and the in-memory rows untouched.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    rows: MemoryStore,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!("No library store at {}, starting empty", path.display());
            return Ok(Self {
                path,
                rows: MemoryStore::new(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            FolioError::store(format!("Cannot read {}", path.display()), e)
        })?;
        let snapshot: Snapshot = serde_json::from_str(&contents).map_err(|e| {
            FolioError::store(format!("Cannot parse {}", path.display()), e)
        })?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(FolioError::Store {
                message: format!(
                    "{} was written by a newer version ({})",
                    path.display(),
                    snapshot.version
                ),
                source: None,
            });
        }

        let rows = MemoryStore::from_rows(snapshot.rows);
        info!(
            "Loaded {} library rows from {}",
            rows.rows().count(),
            path.display()
        );
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit<T>(&mut self, change: impl FnOnce(&mut MemoryStore) -> T) -> Result<T> {
        let mut next = self.rows.clone();
        let value = change(&mut next);
        if next != self.rows {
            self.write_snapshot(&next)?;
            self.rows = next;
        }
        Ok(value)
    }

    fn write_snapshot(&self, rows: &MemoryStore) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            rows: rows.rows().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| FolioError::store("Cannot serialize library rows", e))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| FolioError::store(format!("Cannot create {}", dir.display()), e))?;

        let mut temp = NamedTempFile::new_in(&dir)
            .map_err(|e| FolioError::store("Cannot create temporary store file", e))?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.flush())
            .map_err(|e| FolioError::store("Cannot write temporary store file", e))?;
        temp.persist(&self.path).map_err(|e| {
            FolioError::store(format!("Cannot replace {}", self.path.display()), e.error)
        })?;

        debug!(
            "Saved {} library rows to {}",
            snapshot.rows.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl MetadataStore for JsonFileStore {
    fn get_row(&self, resource: &ResourcePath) -> Result<Option<LibraryRow>> {
        self.rows.get_row(resource)
    }

    fn get_row_by_id(&self, id: RowId) -> Result<Option<LibraryRow>> {
        self.rows.get_row_by_id(id)
    }

    fn upsert_row(&mut self, row: LibraryRow) -> Result<LibraryRow> {
        self.commit(|rows| rows.insert(row))
    }

    fn upsert_batch(&mut self, batch: Vec<LibraryRow>) -> Result<Vec<LibraryRow>> {
        self.commit(|rows| batch.into_iter().map(|row| rows.insert(row)).collect())
    }

    fn delete_row(&mut self, resource: &ResourcePath) -> Result<bool> {
        self.commit(|rows| rows.remove(resource).is_some())
    }

    fn delete_batch(&mut self, resources: &[ResourcePath]) -> Result<Vec<LibraryRow>> {
        self.commit(|rows| {
            resources
                .iter()
                .filter_map(|resource| rows.remove(resource))
                .collect()
        })
    }

    fn list_rows(&self, filter: &RowFilter) -> Result<Vec<LibraryRow>> {
        self.rows.list_rows(filter)
    }

    fn len(&self) -> Result<usize> {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(path: &str) -> LibraryRow {
        LibraryRow::new(ResourcePath::new(path))
    }

    #[test]
    fn test_missing_file_is_empty_store() -> Result<()> {
        let dir = TempDir::new().map_err(|e| FolioError::store("tempdir", e))?;
        let store = JsonFileStore::open(dir.path().join("library.json"))?;
        assert!(store.is_empty()?);
        assert!(!store.path().exists());
        Ok(())
    }

    #[test]
    fn test_rows_survive_reopen() -> Result<()> {
        let dir = TempDir::new().map_err(|e| FolioError::store("tempdir", e))?;
        let path = dir.path().join("nested").join("library.json");

        let mut store = JsonFileStore::open(&path)?;
        let stored = store.upsert_row(row("/lib/Dune.epub"))?;
        store.upsert_batch(vec![row("/lib/a.pdf"), row("/lib/b.cbz")])?;
        store.delete_row(&ResourcePath::new("/lib/a.pdf"))?;

        let reopened = JsonFileStore::open(&path)?;
        assert_eq!(reopened.len()?, 2);
        assert_eq!(reopened.get_row_by_id(stored.id)?, Some(stored));
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_is_store_error() -> Result<()> {
        let dir = TempDir::new().map_err(|e| FolioError::store("tempdir", e))?;
        let path = dir.path().join("library.json");
        fs::write(&path, "{ not json").map_err(|e| FolioError::store("write", e))?;

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, FolioError::Store { .. }));
        assert!(err.is_critical());
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_rows_untouched() -> Result<()> {
        let dir = TempDir::new().map_err(|e| FolioError::store("tempdir", e))?;
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file").map_err(|e| FolioError::store("write", e))?;

        // The store's directory is a regular file, so every write fails.
        let mut store = JsonFileStore::open(blocker.join("library.json"))?;
        assert!(store.upsert_row(row("/lib/a.epub")).is_err());
        assert!(store.is_empty()?);
        Ok(())
    }

    #[test]
    fn test_unchanged_delete_does_not_write() -> Result<()> {
        let dir = TempDir::new().map_err(|e| FolioError::store("tempdir", e))?;
        let path = dir.path().join("library.json");

        let mut store = JsonFileStore::open(&path)?;
        assert!(!store.delete_row(&ResourcePath::new("/lib/none.epub"))?);
        assert!(!path.exists());
        Ok(())
    }
}
