//! Lazily-populated tree over filesystem roots
//!
//! Nodes live in an arena keyed by [`NodeId`]. A directory's children are
//! listed the first time they are asked for; afterwards they only change
//! through listings (`finish_listing`), renames and explicit
//! insert/remove calls. Every structural change is published to the
//! registered [`TreeListener`]s and returned to the caller as a
//! [`TreeDelta`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use folio_core::{FolioError, ResourcePath, Result};
use folio_resource::{ChildResource, ResourceHandle};
use log::{debug, warn};

use crate::event::{RemovalCause, TreeDelta, TreeEvent, TreeListener, TreePath};
use crate::job::{ListingJob, ListingOutcome, RenameJob, RenameOutcome};
use crate::node::{sibling_order, NodeId, NodeState, TreeNode};

pub struct TreeModel {
    nodes: HashMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    show_hidden: bool,
    listeners: Vec<Box<dyn TreeListener>>,
}

impl TreeModel {
    /// Creates an empty model that hides dot-files
    pub fn new() -> Self {
        Self::with_hidden(false)
    }

    pub fn with_hidden(show_hidden: bool) -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            show_hidden,
            listeners: Vec::new(),
        }
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn add_listener(&mut self, listener: Box<dyn TreeListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn publish(&self, delta: &TreeDelta) {
        for event in delta {
            for listener in &self.listeners {
                listener.on_tree_event(event);
            }
        }
    }

    // ===== Lookup =====

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of materialized nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Current state; ids that left the tree report [`NodeState::Removed`]
    pub fn state(&self, id: NodeId) -> NodeState {
        self.nodes
            .get(&id)
            .map(|node| node.state)
            .unwrap_or(NodeState::Removed)
    }

    fn get(&self, id: NodeId) -> Result<&TreeNode> {
        self.nodes.get(&id).ok_or_else(|| FolioError::not_found(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut TreeNode> {
        self.nodes.get_mut(&id).ok_or_else(|| FolioError::not_found(id))
    }

    pub fn find_root(&self, path: &ResourcePath) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).map(|n| n.path() == path).unwrap_or(false))
    }

    /// Finds a materialized node by identity without loading anything
    pub fn find(&self, path: &ResourcePath) -> Option<NodeId> {
        for &root in &self.roots {
            let mut current = root;
            loop {
                let Some(node) = self.nodes.get(&current) else {
                    break;
                };
                if node.path() == path {
                    return Some(current);
                }
                if !path.is_descendant_of(node.path()) {
                    break;
                }
                match node.children.iter().copied().find(|child| {
                    self.nodes
                        .get(child)
                        .map(|c| path.is_within(c.path()))
                        .unwrap_or(false)
                }) {
                    Some(child) => current = child,
                    None => break,
                }
            }
        }
        None
    }

    /// Deepest materialized node whose identity is `path` or an ancestor of
    /// it. Never loads anything.
    pub fn nearest(&self, path: &ResourcePath) -> Option<NodeId> {
        let mut best: Option<(usize, NodeId)> = None;
        for &root in &self.roots {
            match self.nodes.get(&root) {
                Some(node) if path.is_within(node.path()) => {}
                _ => continue,
            }
            let mut current = root;
            while let Some(node) = self.nodes.get(&current) {
                if node.path() == path {
                    return Some(current);
                }
                match node.children.iter().copied().find(|child| {
                    self.nodes
                        .get(child)
                        .map(|c| path.is_within(c.path()))
                        .unwrap_or(false)
                }) {
                    Some(child) => current = child,
                    None => break,
                }
            }
            let depth = self
                .nodes
                .get(&current)
                .map(|n| n.path().as_str().len())
                .unwrap_or(0);
            if best.map(|(longest, _)| depth > longest).unwrap_or(true) {
                best = Some((depth, current));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Node ids from the root down to `id`
    pub fn path_of(&self, id: NodeId) -> Option<TreePath> {
        let mut nodes = Vec::new();
        let mut current = Some(id);
        while let Some(next) = current {
            let node = self.nodes.get(&next)?;
            nodes.push(next);
            current = node.parent;
        }
        nodes.reverse();
        Some(TreePath::from_nodes(nodes))
    }

    /// Position of `id` among its siblings (or among the roots)
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let node = self.nodes.get(&id)?;
        self.siblings(node.parent)?.iter().position(|c| *c == id)
    }

    fn siblings(&self, parent: Option<NodeId>) -> Option<&Vec<NodeId>> {
        match parent {
            Some(parent) => self.nodes.get(&parent).map(|n| &n.children),
            None => Some(&self.roots),
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            Some(parent) => self.nodes.get_mut(&parent).map(|n| &mut n.children),
            None => Some(&mut self.roots),
        }
    }

    fn tree_path(&self, parent: Option<NodeId>) -> TreePath {
        parent
            .and_then(|p| self.path_of(p))
            .unwrap_or_else(TreePath::root)
    }

    /// `id` and every materialized node below it, in pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    fn subtree_resources(&self, id: NodeId) -> Vec<ResourcePath> {
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.nodes.get(&d).map(|n| n.path().clone()))
            .collect()
    }

    pub(crate) fn has_ancestor_in(&self, id: NodeId, set: &HashSet<NodeId>) -> bool {
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if set.contains(&parent) {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        false
    }

    // ===== Children =====

    /// Children of `id`, listing the directory on first use.
    ///
    /// A failed listing leaves the node `LoadFailed`; the next call retries.
    pub fn children(&mut self, id: NodeId) -> Result<&[NodeId]> {
        let node = self.get(id)?;
        if node.is_dir && matches!(node.state, NodeState::Unloaded | NodeState::LoadFailed) {
            let job = self.begin_listing(id)?;
            self.finish_listing(job.run())?;
        }
        Ok(self.get(id)?.children.as_slice())
    }

    /// Children already in the model; never lists
    pub fn loaded_children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return true;
        };
        if !node.is_dir {
            return true;
        }
        match node.state {
            NodeState::LoadFailed | NodeState::Removed => true,
            NodeState::Loaded | NodeState::Stale => node.children.is_empty(),
            NodeState::Unloaded | NodeState::Loading => false,
        }
    }

    /// `Loaded -> Stale`; returns false for any other state
    pub fn mark_stale(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.state == NodeState::Loaded && node.is_dir => {
                node.state = NodeState::Stale;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.is_dir => {
                node.expanded = expanded;
                true
            }
            _ => false,
        }
    }

    // ===== Listings =====

    /// Starts a listing of `id`. Any listing already in flight is superseded.
    pub fn begin_listing(&mut self, id: NodeId) -> Result<ListingJob> {
        let show_hidden = self.show_hidden;
        let node = self.get_mut(id)?;
        if !node.is_dir {
            return Err(FolioError::InvalidArgument {
                argument: "node".to_string(),
                reason: format!("{} is not a directory", node.path()),
            });
        }
        node.epoch += 1;
        node.state = NodeState::Loading;
        Ok(ListingJob {
            node: id,
            epoch: node.epoch,
            handle: node.handle.clone(),
            show_hidden,
        })
    }

    /// Applies a finished listing.
    ///
    /// Results for removed nodes or superseded epochs are rejected with
    /// `StaleState` and change nothing.
    pub fn finish_listing(&mut self, outcome: ListingOutcome) -> Result<TreeDelta> {
        let node = self
            .nodes
            .get_mut(&outcome.node)
            .ok_or_else(|| FolioError::StaleState {
                node: outcome.node.as_u64(),
                reason: "node was removed".to_string(),
            })?;
        if node.epoch != outcome.epoch {
            return Err(FolioError::StaleState {
                node: outcome.node.as_u64(),
                reason: format!(
                    "listing epoch {} superseded by {}",
                    outcome.epoch, node.epoch
                ),
            });
        }

        match outcome.result {
            Ok(entries) => {
                let delta = self.apply_listing(outcome.node, entries);
                self.publish(&delta);
                Ok(delta)
            }
            Err(e) => {
                node.state = NodeState::LoadFailed;
                warn!("Listing {} failed: {}", outcome.handle, e);
                Err(FolioError::io(outcome.handle.path(), e))
            }
        }
    }

    /// Diffs a fresh listing against the current children.
    ///
    /// Kept entries keep their node (and subtree); vanished entries are
    /// removed in one event; new entries are inserted at their sorted
    /// positions. Kept nodes out of order are moved, choosing the fewest
    /// moves via a longest increasing subsequence.
    fn apply_listing(&mut self, parent: NodeId, mut entries: Vec<ChildResource>) -> TreeDelta {
        entries.sort_by(|a, b| a.handle.path().cmp(b.handle.path()));
        entries.dedup_by(|a, b| a.handle == b.handle);

        let mut existing: Vec<(ResourcePath, NodeId, bool)> = self
            .loaded_children(parent)
            .iter()
            .filter_map(|id| {
                self.nodes
                    .get(id)
                    .map(|n| (n.path().clone(), *id, n.is_dir))
            })
            .collect();
        existing.sort_by(|a, b| a.0.cmp(&b.0));

        // Merge both sorted sequences by identity
        let mut vanished = Vec::new();
        let mut placed: Vec<(ChildResource, Option<NodeId>)> = Vec::with_capacity(entries.len());
        let mut old = existing.into_iter().peekable();
        let mut new = entries.into_iter().peekable();
        loop {
            let order = match (old.peek(), new.peek()) {
                (Some((path, _, _)), Some(entry)) => path.cmp(entry.handle.path()),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            match order {
                Ordering::Less => {
                    if let Some((_, id, _)) = old.next() {
                        vanished.push(id);
                    }
                }
                Ordering::Greater => {
                    if let Some(entry) = new.next() {
                        placed.push((entry, None));
                    }
                }
                Ordering::Equal => {
                    if let (Some((_, id, was_dir)), Some(entry)) = (old.next(), new.next()) {
                        if was_dir == entry.is_dir {
                            placed.push((entry, Some(id)));
                        } else {
                            vanished.push(id);
                            placed.push((entry, None));
                        }
                    }
                }
            }
        }

        let mut delta = TreeDelta::new();
        if !vanished.is_empty() {
            delta.push(self.detach(Some(parent), &vanished, RemovalCause::Deleted, true));
        }

        placed.sort_by(|(a, _), (b, _)| {
            sibling_order(
                a.is_dir,
                a.handle.display_name(),
                b.is_dir,
                b.handle.display_name(),
            )
        });

        let rank: HashMap<NodeId, usize> = placed
            .iter()
            .enumerate()
            .filter_map(|(r, (_, id))| id.map(|id| (id, r)))
            .collect();
        let remaining = self.loaded_children(parent).to_vec();
        let ranks: Vec<usize> = remaining
            .iter()
            .map(|id| rank.get(id).copied().unwrap_or(usize::MAX))
            .collect();
        let stay: HashSet<NodeId> = longest_increasing_subsequence(&ranks)
            .into_iter()
            .map(|i| remaining[i])
            .collect();
        let moved: Vec<NodeId> = remaining
            .iter()
            .copied()
            .filter(|id| !stay.contains(id))
            .collect();
        if !moved.is_empty() {
            delta.push(self.detach(Some(parent), &moved, RemovalCause::Moved, false));
        }

        // Stayers keep their relative order; everything else is reported at
        // its final index, ascending.
        let parent_path = self.tree_path(Some(parent));
        let (mut inserted, moved_count, vanished_count) = (0usize, moved.len(), vanished.len());
        let mut children = Vec::with_capacity(placed.len());
        for (index, (entry, existing)) in placed.into_iter().enumerate() {
            let id = match existing {
                Some(id) => {
                    children.push(id);
                    if stay.contains(&id) {
                        continue;
                    }
                    id
                }
                None => {
                    let node = TreeNode::new(entry.handle, entry.is_dir, Some(parent));
                    let id = node.id;
                    self.nodes.insert(id, node);
                    children.push(id);
                    inserted += 1;
                    id
                }
            };
            delta.push(TreeEvent::Inserted {
                parent: parent_path.clone(),
                index,
                node: id,
            });
        }
        if let Some(siblings) = self.siblings_mut(Some(parent)) {
            *siblings = children;
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.state = NodeState::Loaded;
            debug!(
                "Listed {}: {} new, {} gone, {} moved",
                node.handle, inserted, vanished_count, moved_count
            );
        }
        delta
    }

    // ===== Structural edits =====

    /// Renames the resource behind `id` within its directory.
    ///
    /// The node keeps its id, position and expansion; only its handle (and
    /// the paths of materialized descendants) change. The new position is
    /// settled by the next listing of the parent.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<TreeDelta> {
        let job = self.begin_rename(id, new_name)?;
        self.finish_rename(job.run())
    }

    /// Validates `new_name` and snapshots the rename of `id`
    pub fn begin_rename(&mut self, id: NodeId, new_name: &str) -> Result<RenameJob> {
        validate_name(new_name)?;
        let node = self.get(id)?;
        let previous = node.path().clone();
        let directory = previous
            .parent()
            .ok_or_else(|| FolioError::InvalidArgument {
                argument: "node".to_string(),
                reason: format!("{} has no parent directory", previous),
            })?;
        Ok(RenameJob {
            node: id,
            source: node.handle.clone(),
            target: node.handle.with_path(directory.join(new_name)),
        })
    }

    /// Applies a finished rename.
    ///
    /// Rejected with `StaleState` when the node was removed or its identity
    /// changed since the job was taken; the filesystem error otherwise.
    pub fn finish_rename(&mut self, outcome: RenameOutcome) -> Result<TreeDelta> {
        let RenameOutcome {
            node: id,
            previous,
            current,
            result,
        } = outcome;
        let node = self.nodes.get(&id).ok_or_else(|| FolioError::StaleState {
            node: id.as_u64(),
            reason: "node was removed".to_string(),
        })?;
        if node.path() != &previous {
            return Err(FolioError::StaleState {
                node: id.as_u64(),
                reason: format!("{} is now {}", previous, node.path()),
            });
        }
        let parent = node.parent;
        if let Err(e) = result {
            warn!("Rename of {} to {} failed: {}", previous, current, e);
            return Err(FolioError::rename(&previous, &current, e));
        }
        if current == previous {
            return Ok(TreeDelta::new());
        }

        // A listing of the parent taken before the rename still shows the old name
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            if parent.state == NodeState::Loading {
                parent.epoch += 1;
                parent.state = NodeState::Stale;
            }
        }
        for descendant in self.descendants(id) {
            let Some(node) = self.nodes.get_mut(&descendant) else {
                continue;
            };
            if let Some(rebased) = node.path().rebase(&previous, &current) {
                node.handle = node.handle.with_path(rebased);
            }
            // In-flight listings still carry the old paths
            if node.state == NodeState::Loading {
                node.epoch += 1;
                node.state = if node.children.is_empty() {
                    NodeState::Unloaded
                } else {
                    NodeState::Stale
                };
            }
        }
        debug!("Renamed {} to {}", previous, current);

        let mut delta = TreeDelta::new();
        delta.push(TreeEvent::Changed {
            path: self.path_of(id).unwrap_or_default(),
            previous,
            current,
        });
        self.publish(&delta);
        Ok(delta)
    }

    /// Inserts `handle` below `parent` at its sorted position.
    ///
    /// Returns the existing node with an empty delta when the identity is
    /// already present.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        handle: ResourceHandle,
    ) -> Result<(NodeId, TreeDelta)> {
        let parent_node = self.get(parent)?;
        if !parent_node.is_dir || handle.path().parent().as_ref() != Some(parent_node.path()) {
            return Err(FolioError::InvalidArgument {
                argument: "handle".to_string(),
                reason: format!("{} is not a child of {}", handle, parent_node.path()),
            });
        }
        if let Some(existing) = parent_node.children.iter().copied().find(|c| {
            self.nodes
                .get(c)
                .map(|n| n.path() == handle.path())
                .unwrap_or(false)
        }) {
            return Ok((existing, TreeDelta::new()));
        }

        let is_dir = handle.is_directory();
        let index = parent_node.children.partition_point(|c| {
            self.nodes
                .get(c)
                .map(|n| {
                    sibling_order(n.is_dir, n.display_name(), is_dir, handle.display_name())
                        == Ordering::Less
                })
                .unwrap_or(true)
        });

        let node = TreeNode::new(handle, is_dir, Some(parent));
        let id = node.id;
        self.nodes.insert(id, node);
        if let Some(children) = self.siblings_mut(Some(parent)) {
            children.insert(index, id);
        }

        let mut delta = TreeDelta::new();
        delta.push(TreeEvent::Inserted {
            parent: self.tree_path(Some(parent)),
            index,
            node: id,
        });
        self.publish(&delta);
        Ok((id, delta))
    }

    /// Removes `node` and its subtree from `parent`
    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<TreeDelta> {
        if self.get(node)?.parent != Some(parent) {
            return Err(FolioError::InvalidArgument {
                argument: "node".to_string(),
                reason: format!("{} is not a child of {}", node, parent),
            });
        }
        let mut delta = TreeDelta::new();
        delta.push(self.detach(Some(parent), &[node], RemovalCause::Deleted, true));
        self.publish(&delta);
        Ok(delta)
    }

    pub(crate) fn attach_root(&mut self, handle: ResourceHandle) -> (NodeId, TreeEvent) {
        // Roots are always treated as directories; a missing one fails to list
        let node = TreeNode::new(handle, true, None);
        let id = node.id;
        self.nodes.insert(id, node);
        self.roots.push(id);
        let event = TreeEvent::Inserted {
            parent: TreePath::root(),
            index: self.roots.len() - 1,
            node: id,
        };
        (id, event)
    }

    /// Unlinks `nodes` from `parent` and reports them in one event.
    ///
    /// With `drop_nodes`, the subtrees leave the arena; otherwise the nodes
    /// are expected to be re-inserted by the caller.
    pub(crate) fn detach(
        &mut self,
        parent: Option<NodeId>,
        nodes: &[NodeId],
        cause: RemovalCause,
        drop_nodes: bool,
    ) -> TreeEvent {
        let parent_path = self.tree_path(parent);
        let positions: HashMap<NodeId, usize> = self
            .siblings(parent)
            .map(|siblings| siblings.iter().enumerate().map(|(i, id)| (*id, i)).collect())
            .unwrap_or_default();
        let mut indexed: Vec<(usize, NodeId)> = nodes
            .iter()
            .filter_map(|id| positions.get(id).map(|i| (*i, *id)))
            .collect();
        indexed.sort_unstable();

        let resources: Vec<ResourcePath> = indexed
            .iter()
            .flat_map(|(_, id)| self.subtree_resources(*id))
            .collect();

        let removed: HashSet<NodeId> = indexed.iter().map(|(_, id)| *id).collect();
        if let Some(children) = self.siblings_mut(parent) {
            children.retain(|c| !removed.contains(c));
        }
        if drop_nodes {
            for (_, id) in &indexed {
                for descendant in self.descendants(*id) {
                    self.nodes.remove(&descendant);
                }
            }
        }

        TreeEvent::Removed {
            parent: parent_path,
            indices: indexed.iter().map(|(i, _)| *i).collect(),
            nodes: indexed.iter().map(|(_, id)| *id).collect(),
            resources,
            cause,
        }
    }
}

impl Default for TreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("roots", &self.roots)
            .field("nodes", &self.nodes.len())
            .field("show_hidden", &self.show_hidden)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else if name == "." || name == ".." {
        Some("name is a relative path segment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(FolioError::InvalidArgument {
            argument: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Indices of one longest strictly increasing subsequence of `values`
fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // tails[k] = index of the smallest tail of an increasing run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];
    for (i, &value) in values.iter().enumerate() {
        let k = tails.partition_point(|&t| values[t] < value);
        if k > 0 {
            previous[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(i) = current {
        out.push(i);
        current = previous[i];
    }
    out.reverse();
    out
}
