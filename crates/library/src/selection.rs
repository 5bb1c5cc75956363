// FILE: crates/library/src/selection.rs

//! Selections made in the tree or in the library table, as identities

use std::collections::HashSet;

use folio_core::{LibraryRow, ResourcePath, Result, RowId};
use folio_tree::{NodeId, TreeModel};

use crate::store::MetadataStore;

/// What the user picked, in the view it was picked in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Tree(Vec<NodeId>),
    Table(Vec<RowId>),
}

/// Resolved selection: ordered, de-duplicated resource identities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    resources: Vec<ResourcePath>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resources(&self) -> &[ResourcePath] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, resource: &ResourcePath) -> bool {
        self.resources.contains(resource)
    }

    /// Rows of the selected resources that are indexed, in selection order
    pub fn rows<S: MetadataStore + ?Sized>(&self, store: &S) -> Result<Vec<LibraryRow>> {
        let mut rows = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            if let Some(row) = store.get_row(resource)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl FromIterator<ResourcePath> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = ResourcePath>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        Self {
            resources: iter.into_iter().filter(|r| seen.insert(r.clone())).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = &'a ResourcePath;
    type IntoIter = std::slice::Iter<'a, ResourcePath>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

/// Maps a selection to identities. Removed nodes and unknown rows are skipped.
pub fn resolve_selection<S: MetadataStore + ?Sized>(
    selection: &Selection,
    tree: &TreeModel,
    store: &S,
) -> Result<SelectionSet> {
    match selection {
        Selection::Tree(nodes) => Ok(nodes
            .iter()
            .filter_map(|id| tree.node(*id).map(|node| node.path().clone()))
            .collect()),
        Selection::Table(ids) => {
            let mut resources = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) = store.get_row_by_id(*id)? {
                    resources.push(row.resource);
                }
            }
            Ok(resources.into_iter().collect())
        }
    }
}
