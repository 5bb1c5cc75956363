// FILE: crates/library/src/store.rs

//! Persisted ebook metadata, keyed by resource identity

use std::collections::{BTreeMap, HashMap};

use folio_core::{LibraryRow, ResourcePath, Result, RowFilter, RowId};

/// Table of library rows.
///
/// A row is found by its resource identity or by its [`RowId`]. Both keys are
/// unique: at most one row per resource, and a row keeps its id across
/// relocations.
pub trait MetadataStore: Send {
    fn get_row(&self, resource: &ResourcePath) -> Result<Option<LibraryRow>>;

    fn get_row_by_id(&self, id: RowId) -> Result<Option<LibraryRow>>;

    /// Inserts or replaces a row and returns what was stored.
    ///
    /// A row whose id is known replaces that row, even if its resource
    /// changed. A new id for an already-indexed resource takes over the
    /// existing row's id and `added` time.
    fn upsert_row(&mut self, row: LibraryRow) -> Result<LibraryRow>;

    /// Upserts several rows as one change
    fn upsert_batch(&mut self, rows: Vec<LibraryRow>) -> Result<Vec<LibraryRow>> {
        rows.into_iter().map(|row| self.upsert_row(row)).collect()
    }

    /// Returns whether a row was removed
    fn delete_row(&mut self, resource: &ResourcePath) -> Result<bool>;

    /// Removes the rows of exactly these resources, all or nothing.
    ///
    /// Resources without a row are ignored. Returns the removed rows.
    fn delete_batch(&mut self, resources: &[ResourcePath]) -> Result<Vec<LibraryRow>>;

    /// Rows matching `filter`, ordered by resource
    fn list_rows(&self, filter: &RowFilter) -> Result<Vec<LibraryRow>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Store kept entirely in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    rows: BTreeMap<ResourcePath, LibraryRow>,
    ids: HashMap<RowId, ResourcePath>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from previously persisted rows.
    ///
    /// Later rows win when two share a resource or an id.
    pub fn from_rows(rows: impl IntoIterator<Item = LibraryRow>) -> Self {
        let mut store = Self::new();
        for row in rows {
            store.insert(row);
        }
        store
    }

    /// All rows, ordered by resource
    pub fn rows(&self) -> impl Iterator<Item = &LibraryRow> {
        self.rows.values()
    }

    pub(crate) fn insert(&mut self, mut row: LibraryRow) -> LibraryRow {
        if let Some(old_path) = self.ids.get(&row.id).cloned() {
            if old_path != row.resource {
                self.rows.remove(&old_path);
            }
        } else if let Some(existing) = self.rows.get(&row.resource) {
            row.id = existing.id;
            row.added = existing.added;
        }

        if let Some(displaced) = self.rows.get(&row.resource) {
            if displaced.id != row.id {
                self.ids.remove(&displaced.id);
            }
        }

        self.ids.insert(row.id, row.resource.clone());
        self.rows.insert(row.resource.clone(), row.clone());
        row
    }

    pub(crate) fn remove(&mut self, resource: &ResourcePath) -> Option<LibraryRow> {
        let row = self.rows.remove(resource)?;
        self.ids.remove(&row.id);
        Some(row)
    }
}

impl MetadataStore for MemoryStore {
    fn get_row(&self, resource: &ResourcePath) -> Result<Option<LibraryRow>> {
        Ok(self.rows.get(resource).cloned())
    }

    fn get_row_by_id(&self, id: RowId) -> Result<Option<LibraryRow>> {
        Ok(self
            .ids
            .get(&id)
            .and_then(|path| self.rows.get(path))
            .cloned())
    }

    fn upsert_row(&mut self, row: LibraryRow) -> Result<LibraryRow> {
        Ok(self.insert(row))
    }

    fn delete_row(&mut self, resource: &ResourcePath) -> Result<bool> {
        Ok(self.remove(resource).is_some())
    }

    fn delete_batch(&mut self, resources: &[ResourcePath]) -> Result<Vec<LibraryRow>> {
        Ok(resources
            .iter()
            .filter_map(|resource| self.remove(resource))
            .collect())
    }

    fn list_rows(&self, filter: &RowFilter) -> Result<Vec<LibraryRow>> {
        let rows: Box<dyn Iterator<Item = &LibraryRow> + '_> = match filter.within {
            Some(ref within) => Box::new(
                self.rows
                    .range(within.clone()..)
                    .map(|(_, row)| row)
                    .take_while(move |row| row.resource.as_str().starts_with(within.as_str())),
            ),
            None => Box::new(self.rows.values()),
        };
        Ok(rows.filter(|row| filter.matches(row)).cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(path: &str) -> LibraryRow {
        LibraryRow::new(ResourcePath::new(path))
    }

    #[test]
    fn test_upsert_and_lookup() -> Result<()> {
        let mut store = MemoryStore::new();
        let stored = store.upsert_row(row("/lib/a.epub"))?;

        assert_eq!(store.get_row(&ResourcePath::new("/lib/a.epub"))?, Some(stored.clone()));
        assert_eq!(store.get_row_by_id(stored.id)?, Some(stored));
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[test]
    fn test_upsert_same_resource_keeps_id() -> Result<()> {
        let mut store = MemoryStore::new();
        let first = store.upsert_row(row("/lib/a.epub"))?;

        let mut second = row("/lib/a.epub");
        second.title = "Renamed".to_string();
        let stored = store.upsert_row(second)?;

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.added, first.added);
        assert_eq!(stored.title, "Renamed");
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[test]
    fn test_upsert_known_id_relocates() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut stored = store.upsert_row(row("/lib/a.epub"))?;

        stored.relocate(ResourcePath::new("/lib/b.epub"));
        store.upsert_row(stored.clone())?;

        assert_eq!(store.get_row(&ResourcePath::new("/lib/a.epub"))?, None);
        assert_eq!(
            store.get_row_by_id(stored.id)?.map(|r| r.resource),
            Some(ResourcePath::new("/lib/b.epub"))
        );
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[test]
    fn test_relocation_displaces_target_row() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut moved = store.upsert_row(row("/lib/a.epub"))?;
        let target = store.upsert_row(row("/lib/b.epub"))?;

        moved.relocate(ResourcePath::new("/lib/b.epub"));
        store.upsert_row(moved.clone())?;

        assert_eq!(store.len()?, 1);
        assert_eq!(store.get_row_by_id(target.id)?, None);
        assert_eq!(store.get_row_by_id(moved.id)?.map(|r| r.id), Some(moved.id));
        Ok(())
    }

    #[test]
    fn test_delete_batch_ignores_unknown() -> Result<()> {
        let mut store = MemoryStore::from_rows(vec![row("/lib/a.epub"), row("/lib/b.epub")]);

        let removed = store.delete_batch(&[
            ResourcePath::new("/lib/a.epub"),
            ResourcePath::new("/lib/missing.epub"),
        ])?;

        assert_eq!(removed.len(), 1);
        assert_eq!(store.len()?, 1);
        assert!(!store.delete_row(&ResourcePath::new("/lib/a.epub"))?);
        Ok(())
    }

    #[test]
    fn test_list_within_uses_components() -> Result<()> {
        let store = MemoryStore::from_rows(vec![
            row("/lib/a.epub"),
            row("/lib/sub/b.pdf"),
            row("/lib2/c.epub"),
            row("/other/d.epub"),
        ]);

        let within: Vec<_> = store
            .list_rows(&RowFilter::within(ResourcePath::new("/lib")))?
            .into_iter()
            .map(|r| r.resource.to_string())
            .collect();
        assert_eq!(within, vec!["/lib/a.epub", "/lib/sub/b.pdf"]);

        let text = store.list_rows(&RowFilter::all().with_text("B"))?;
        assert_eq!(text.len(), 1);
        Ok(())
    }
}
