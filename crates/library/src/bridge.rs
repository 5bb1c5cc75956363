// FILE: crates/library/src/bridge.rs

//! Keeps the library index in step with the tree
//!
//! The bridge owns the [`MetadataStore`] and translates tree changes into
//! row changes: removed roots drop their rows, deleted files drop theirs,
//! and renames re-key rows without changing their [`RowId`].

use std::collections::HashSet;

use folio_core::{LibraryRow, ResourcePath, Result, RowFilter};
use folio_resource::ResourceHandle;
use folio_tree::{RemovalCause, TreeDelta, TreeEvent};
use log::{debug, info, warn};

use crate::metadata::MetadataReaders;
use crate::store::MetadataStore;

/// Row changes, one per logical batch
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    RowsAdded(Vec<LibraryRow>),
    RowsUpdated(Vec<LibraryRow>),
    RowsRemoved(Vec<LibraryRow>),
}

impl LibraryEvent {
    pub fn rows(&self) -> &[LibraryRow] {
        match self {
            LibraryEvent::RowsAdded(rows)
            | LibraryEvent::RowsUpdated(rows)
            | LibraryEvent::RowsRemoved(rows) => rows,
        }
    }
}

pub trait LibraryListener: Send {
    fn on_library_event(&self, event: &LibraryEvent);
}

/// Outcome of [`LibraryBridge::import`]
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub added: Vec<LibraryRow>,
    /// Resources that already had a row
    pub already_indexed: usize,
    pub failures: Vec<(ResourcePath, String)>,
}

impl ImportReport {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Row changes caused by one [`TreeDelta`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaReport {
    pub rows_removed: usize,
    pub rows_relocated: usize,
}

pub struct LibraryBridge<S: MetadataStore> {
    store: S,
    listeners: Vec<Box<dyn LibraryListener>>,
}

impl<S: MetadataStore> LibraryBridge<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            listeners: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn add_listener(&mut self, listener: Box<dyn LibraryListener>) {
        self.listeners.push(listener);
    }

    fn publish(&self, event: LibraryEvent) {
        if event.rows().is_empty() {
            return;
        }
        for listener in &self.listeners {
            listener.on_library_event(&event);
        }
    }

    /// Removes every row equal to or below one of `roots`, in one batch.
    ///
    /// Returns the number of rows removed.
    pub fn on_root_removed(&mut self, roots: &[ResourcePath]) -> Result<usize> {
        let removed = self.remove_within(roots)?;
        if !removed.is_empty() {
            info!("Removed {} rows below {} roots", removed.len(), roots.len());
        }
        Ok(removed.len())
    }

    /// Re-keys the row of `old` (and rows below it, for directories) to
    /// `new`. Row ids are kept. Returns whether any row moved.
    pub fn on_file_renamed(&mut self, old: &ResourcePath, new: &ResourceHandle) -> Result<bool> {
        Ok(self.relocate(old, new.path())? > 0)
    }

    /// Drops the row of a resource deleted outside the program
    pub fn on_file_deleted_externally(&mut self, path: &ResourcePath) -> Result<bool> {
        let removed = self.store.delete_batch(std::slice::from_ref(path))?;
        let found = !removed.is_empty();
        self.publish(LibraryEvent::RowsRemoved(removed));
        Ok(found)
    }

    /// Drops the rows of deleted resources and of everything below them
    pub fn on_resources_deleted(&mut self, resources: &[ResourcePath]) -> Result<usize> {
        Ok(self.remove_within(resources)?.len())
    }

    /// Applies the row side of a tree change.
    ///
    /// Removed roots and deleted entries drop their rows (subtrees included),
    /// renames re-key rows. Nodes that only moved between indices leave the
    /// index alone.
    pub fn on_tree_delta(&mut self, delta: &TreeDelta) -> Result<DeltaReport> {
        let mut report = DeltaReport::default();

        let roots = delta.removed_resources(RemovalCause::RootRemoved);
        if !roots.is_empty() {
            report.rows_removed += self.on_root_removed(&roots)?;
        }

        let deleted = delta.removed_resources(RemovalCause::Deleted);
        if !deleted.is_empty() {
            let removed = self.remove_within(&deleted)?;
            if !removed.is_empty() {
                debug!("Dropped {} rows of deleted entries", removed.len());
            }
            report.rows_removed += removed.len();
        }

        for event in delta {
            if let TreeEvent::Changed {
                previous, current, ..
            } = event
            {
                report.rows_relocated += self.relocate(previous, current)?;
            }
        }

        Ok(report)
    }

    /// Creates rows for resources not yet indexed.
    ///
    /// Reader and size failures are collected per resource; only a store
    /// failure aborts the import.
    pub fn import(
        &mut self,
        resources: &[ResourceHandle],
        readers: &MetadataReaders,
    ) -> Result<ImportReport> {
        let known = self.indexed(resources)?;
        self.import_batch(RowBatch::read(resources, readers, &known))
    }

    /// Stores the rows of `batch` that are still not indexed
    pub fn import_batch(&mut self, batch: RowBatch) -> Result<ImportReport> {
        let mut report = ImportReport {
            already_indexed: batch.skipped,
            failures: batch.failures,
            ..Default::default()
        };
        let mut pending = Vec::new();
        for row in batch.rows {
            if self.store.get_row(&row.resource)?.is_some() {
                report.already_indexed += 1;
            } else {
                pending.push(row);
            }
        }

        if !pending.is_empty() {
            report.added = self.store.upsert_batch(pending)?;
            info!("Imported {} new rows", report.added.len());
            self.publish(LibraryEvent::RowsAdded(report.added.clone()));
        }
        Ok(report)
    }

    /// Identities among `resources` that already have a row
    pub fn indexed(&self, resources: &[ResourceHandle]) -> Result<HashSet<ResourcePath>> {
        let mut known = HashSet::new();
        for handle in resources {
            if self.store.get_row(handle.path())?.is_some() {
                known.insert(handle.path().clone());
            }
        }
        Ok(known)
    }

    /// Re-reads metadata for indexed resources, keeping their row ids.
    ///
    /// Resources without a row are skipped, as are resources whose metadata
    /// cannot be read (logged).
    pub fn refresh_rows(
        &mut self,
        resources: &[ResourceHandle],
        readers: &MetadataReaders,
    ) -> Result<Vec<LibraryRow>> {
        let indexed = self.indexed(resources)?;
        let handles: Vec<ResourceHandle> = resources
            .iter()
            .filter(|h| indexed.contains(h.path()))
            .cloned()
            .collect();
        self.refresh_batch(RowBatch::read(&handles, readers, &HashSet::new()))
    }

    /// Replaces indexed rows with the freshly read ones of `batch`
    pub fn refresh_batch(&mut self, batch: RowBatch) -> Result<Vec<LibraryRow>> {
        let mut updated = Vec::new();
        for mut row in batch.rows {
            let Some(existing) = self.store.get_row(&row.resource)? else {
                continue;
            };
            row.id = existing.id;
            row.added = existing.added;
            updated.push(row);
        }

        if updated.is_empty() {
            return Ok(updated);
        }
        let updated = self.store.upsert_batch(updated)?;
        self.publish(LibraryEvent::RowsUpdated(updated.clone()));
        Ok(updated)
    }

    /// Removes rows whose resource no longer exists, in one batch
    pub fn prune_missing(&mut self, exists: impl Fn(&ResourcePath) -> bool) -> Result<Vec<LibraryRow>> {
        let missing: Vec<ResourcePath> = self
            .resources()?
            .into_iter()
            .filter(|resource| !exists(resource))
            .collect();
        self.remove_missing(&missing)
    }

    /// Identities of every row
    pub fn resources(&self) -> Result<Vec<ResourcePath>> {
        Ok(self
            .store
            .list_rows(&RowFilter::all())?
            .into_iter()
            .map(|row| row.resource)
            .collect())
    }

    /// Drops the rows of `missing`, found gone on disk
    pub fn remove_missing(&mut self, missing: &[ResourcePath]) -> Result<Vec<LibraryRow>> {
        if missing.is_empty() {
            return Ok(Vec::new());
        }
        let removed = self.store.delete_batch(missing)?;
        if !removed.is_empty() {
            info!("Pruned {} rows of missing files", removed.len());
            self.publish(LibraryEvent::RowsRemoved(removed.clone()));
        }
        Ok(removed)
    }

    fn remove_within(&mut self, roots: &[ResourcePath]) -> Result<Vec<LibraryRow>> {
        let mut doomed = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            for row in self.store.list_rows(&RowFilter::within(root.clone()))? {
                if seen.insert(row.resource.clone()) {
                    doomed.push(row.resource);
                }
            }
        }
        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        let removed = self.store.delete_batch(&doomed)?;
        self.publish(LibraryEvent::RowsRemoved(removed.clone()));
        Ok(removed)
    }

    fn relocate(&mut self, old: &ResourcePath, new: &ResourcePath) -> Result<usize> {
        if old == new {
            return Ok(0);
        }
        let moved: Vec<LibraryRow> = self
            .store
            .list_rows(&RowFilter::within(old.clone()))?
            .into_iter()
            .filter_map(|mut row| {
                let target = row.resource.rebase(old, new)?;
                row.relocate(target);
                Some(row)
            })
            .collect();
        if moved.is_empty() {
            return Ok(0);
        }

        let moved = self.store.upsert_batch(moved)?;
        debug!("Re-keyed {} rows from {} to {}", moved.len(), old, new);
        let count = moved.len();
        self.publish(LibraryEvent::RowsUpdated(moved));
        Ok(count)
    }
}

impl<S: MetadataStore + std::fmt::Debug> std::fmt::Debug for LibraryBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryBridge")
            .field("store", &self.store)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Rows read from disk, ready to be stored by the owning task
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub rows: Vec<LibraryRow>,
    /// Resources left out because they were already indexed
    pub skipped: usize,
    pub failures: Vec<(ResourcePath, String)>,
}

impl RowBatch {
    /// Reads a row for every resource not in `known`. Blocking.
    pub fn read(
        resources: &[ResourceHandle],
        readers: &MetadataReaders,
        known: &HashSet<ResourcePath>,
    ) -> Self {
        let mut batch = RowBatch::default();
        let mut seen = HashSet::new();
        for handle in resources {
            if !seen.insert(handle.path().clone()) {
                continue;
            }
            if known.contains(handle.path()) {
                batch.skipped += 1;
                continue;
            }
            match build_row(handle, readers) {
                Ok(row) => batch.rows.push(row),
                Err(e) => {
                    warn!("Cannot read {}: {}", handle, e);
                    batch.failures.push((handle.path().clone(), e.to_string()));
                }
            }
        }
        batch
    }
}

fn build_row(handle: &ResourceHandle, readers: &MetadataReaders) -> Result<LibraryRow> {
    let file_size = handle
        .size()
        .map_err(|e| folio_core::FolioError::io(handle.path(), e))?;
    let metadata = readers.read(handle)?;

    let mut row = LibraryRow::new(handle.path().clone());
    row.file_size = file_size;
    row.apply_metadata(metadata);
    Ok(row)
}
