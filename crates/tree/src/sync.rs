//! Keeps the tree in step with the filesystem

use std::collections::{HashMap, HashSet};

use folio_core::{FolioError, ResourcePath, Result};
use folio_resource::ResourceHandle;
use log::{debug, info, warn};

use crate::event::{RemovalCause, TreeDelta, TreeListener};
use crate::expansion::ExpansionState;
use crate::job::{ListingJob, ListingOutcome, RenameJob, RenameOutcome, SweepJob, SweepOutcome};
use crate::model::TreeModel;
use crate::node::{NodeId, NodeState};

/// Owns the [`TreeModel`] and applies filesystem changes to it.
///
/// Structural operations come in two flavours: inline ones (`reconcile`,
/// `sweep_deleted`) and split ones (`begin_*` / `finish_*`) whose middle
/// part can run on a blocking thread.
#[derive(Debug, Default)]
pub struct Synchronizer {
    model: TreeModel,
}

impl Synchronizer {
    pub fn new(model: TreeModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &TreeModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut TreeModel {
        &mut self.model
    }

    pub fn add_listener(&mut self, listener: Box<dyn TreeListener>) {
        self.model.add_listener(listener);
    }

    pub fn roots(&self) -> &[NodeId] {
        self.model.roots()
    }

    // ===== Roots =====

    /// Appends a root. Adding an identity that is already a root does nothing.
    pub fn add_root(&mut self, handle: ResourceHandle) -> TreeDelta {
        let mut delta = TreeDelta::new();
        if self.model.find_root(handle.path()).is_some() {
            debug!("{} is already a root", handle);
            return delta;
        }
        info!("Adding root {}", handle);
        let (_, event) = self.model.attach_root(handle);
        delta.push(event);
        self.model.publish(&delta);
        delta
    }

    /// Removes a root and its subtree. Unknown identities are ignored.
    pub fn remove_root(&mut self, path: &ResourcePath) -> TreeDelta {
        let mut delta = TreeDelta::new();
        let Some(root) = self.model.find_root(path) else {
            debug!("{} is not a root", path);
            return delta;
        };
        info!("Removing root {}", path);
        delta.push(
            self.model
                .detach(None, &[root], RemovalCause::RootRemoved, true),
        );
        self.model.publish(&delta);
        delta
    }

    // ===== Listings =====

    pub fn begin_listing(&mut self, node: NodeId) -> Result<ListingJob> {
        self.model.begin_listing(node)
    }

    pub fn finish_listing(&mut self, outcome: ListingOutcome) -> Result<TreeDelta> {
        self.model.finish_listing(outcome)
    }

    /// Re-lists `node` and applies the differences. Loads an unloaded node.
    pub fn reconcile(&mut self, node: NodeId) -> Result<TreeDelta> {
        let job = self.begin_listing(node)?;
        self.finish_listing(job.run())
    }

    pub fn mark_stale(&mut self, node: NodeId) -> bool {
        self.model.mark_stale(node)
    }

    /// Re-lists the materialized entry for `path`, or its directory when
    /// `path` is a file. Entries never loaded are left for lazy loading.
    pub fn refresh(&mut self, path: &ResourcePath) -> Result<TreeDelta> {
        match self.begin_refresh(path)? {
            Some(job) => self.finish_listing(job.run()),
            None => Ok(TreeDelta::new()),
        }
    }

    /// Marks the directory behind `path` stale and starts its listing.
    /// `None` when that directory was never loaded.
    pub fn begin_refresh(&mut self, path: &ResourcePath) -> Result<Option<ListingJob>> {
        let node = self
            .model
            .find(path)
            .ok_or_else(|| FolioError::not_found(path))?;
        let target = match self.model.node(node) {
            Some(n) if n.is_dir() => node,
            Some(n) => n.parent().ok_or_else(|| FolioError::not_found(path))?,
            None => return Err(FolioError::not_found(path)),
        };
        if self.model.state(target) == NodeState::Unloaded {
            return Ok(None);
        }
        self.mark_stale(target);
        self.begin_listing(target).map(Some)
    }

    /// Finds the node for `path`, listing directories on the way down
    pub fn reveal(&mut self, path: &ResourcePath) -> Result<NodeId> {
        let mut current = self
            .model
            .roots()
            .iter()
            .copied()
            .filter(|id| {
                self.model
                    .node(*id)
                    .map(|n| path.is_within(n.path()))
                    .unwrap_or(false)
            })
            .max_by_key(|id| {
                self.model
                    .node(*id)
                    .map(|n| n.path().as_str().len())
                    .unwrap_or(0)
            })
            .ok_or_else(|| FolioError::not_found(path))?;

        loop {
            let node = self
                .model
                .node(current)
                .ok_or_else(|| FolioError::not_found(path))?;
            if node.path() == path {
                return Ok(current);
            }
            let children = self.model.children(current)?.to_vec();
            current = children
                .into_iter()
                .find(|child| {
                    self.model
                        .node(*child)
                        .map(|n| path.is_within(n.path()))
                        .unwrap_or(false)
                })
                .ok_or_else(|| FolioError::not_found(path))?;
        }
    }

    pub fn rename(&mut self, node: NodeId, new_name: &str) -> Result<TreeDelta> {
        self.model.rename(node, new_name)
    }

    pub fn begin_rename(&mut self, node: NodeId, new_name: &str) -> Result<RenameJob> {
        self.model.begin_rename(node, new_name)
    }

    pub fn finish_rename(&mut self, outcome: RenameOutcome) -> Result<TreeDelta> {
        self.model.finish_rename(outcome)
    }

    // ===== Deleted-node sweep =====

    /// Collects the displayed non-root nodes: children of expanded nodes,
    /// recursively from the roots.
    pub fn begin_sweep(&self) -> SweepJob {
        let mut candidates = Vec::new();
        let mut stack: Vec<NodeId> = self.model.roots().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.model.node(id) else {
                continue;
            };
            if node.parent().is_some() {
                candidates.push((id, node.handle().clone()));
            }
            if node.is_expanded() {
                stack.extend(node.children().iter().rev());
            }
        }
        SweepJob { candidates }
    }

    /// Removes the missing nodes, one event per parent. Roots are never
    /// swept, and nodes below another missing node go with it. A node whose
    /// identity changed since it was checked (renamed meanwhile) is kept.
    pub fn finish_sweep(&mut self, outcome: SweepOutcome) -> TreeDelta {
        let current: Vec<NodeId> = outcome
            .missing
            .into_iter()
            .filter(|(id, checked)| match self.model.node(*id) {
                Some(node) if node.path() == checked => true,
                Some(node) => {
                    debug!("Not sweeping {}: now {}", checked, node.path());
                    false
                }
                None => false,
            })
            .map(|(id, _)| id)
            .collect();
        let missing: HashSet<NodeId> = current.iter().copied().collect();

        let mut groups: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        let mut group_of: HashMap<NodeId, usize> = HashMap::new();
        for id in current {
            if self.model.has_ancestor_in(id, &missing) {
                continue;
            }
            let Some(parent) = self.model.node(id).and_then(|n| n.parent()) else {
                continue;
            };
            match group_of.get(&parent) {
                Some(&slot) => groups[slot].1.push(id),
                None => {
                    group_of.insert(parent, groups.len());
                    groups.push((parent, vec![id]));
                }
            }
        }

        let mut delta = TreeDelta::new();
        for (parent, nodes) in groups {
            delta.push(
                self.model
                    .detach(Some(parent), &nodes, RemovalCause::Deleted, true),
            );
        }
        if !delta.is_empty() {
            info!(
                "Swept {} deleted entries",
                delta.removed_resources(RemovalCause::Deleted).len()
            );
        }
        self.model.publish(&delta);
        delta
    }

    /// Inline sweep. The removed identities are
    /// `delta.removed_resources(RemovalCause::Deleted)`.
    pub fn sweep_deleted(&mut self) -> TreeDelta {
        let job = self.begin_sweep();
        self.finish_sweep(job.run())
    }

    // ===== Expansion =====

    /// Expands a directory, loading its children first when needed
    pub fn expand(&mut self, node: NodeId) -> Result<TreeDelta> {
        let (is_dir, state) = match self.model.node(node) {
            Some(n) => (n.is_dir(), n.state()),
            None => return Err(FolioError::not_found(node)),
        };
        if !is_dir {
            return Ok(TreeDelta::new());
        }
        let delta = match state {
            NodeState::Unloaded | NodeState::LoadFailed => self.reconcile(node)?,
            _ => TreeDelta::new(),
        };
        self.model.set_expanded(node, true);
        Ok(delta)
    }

    /// Marks a node expanded without listing it (the listing runs elsewhere)
    pub fn mark_expanded(&mut self, node: NodeId) -> bool {
        self.model.set_expanded(node, true)
    }

    pub fn collapse(&mut self, node: NodeId) -> bool {
        self.model.set_expanded(node, false)
    }

    pub fn is_expanded(&self, node: NodeId) -> bool {
        self.model
            .node(node)
            .map(|n| n.is_expanded())
            .unwrap_or(false)
    }

    /// Records every displayed expanded node, in display order
    pub fn capture_expansion(&self) -> ExpansionState {
        let mut state = ExpansionState::new();
        for &root in self.model.roots() {
            if let Some(node) = self.model.node(root) {
                let segments = vec![node.path().to_string()];
                self.collect_expanded(root, segments, &mut state);
            }
        }
        state
    }

    fn collect_expanded(&self, id: NodeId, segments: Vec<String>, state: &mut ExpansionState) {
        let Some(node) = self.model.node(id) else {
            return;
        };
        if !node.is_expanded() {
            return;
        }
        state.push(segments.clone());
        for &child in node.children() {
            if let Some(child_node) = self.model.node(child) {
                let mut next = segments.clone();
                next.push(child_node.display_name().to_string());
                self.collect_expanded(child, next, state);
            }
        }
    }

    /// Re-expands recorded paths, matching by identity. Paths whose entries
    /// no longer exist stop at the last match. Returns the last node
    /// reattached.
    pub fn restore_expansion(&mut self, state: &ExpansionState) -> Option<NodeId> {
        let mut last = None;
        for segments in state.paths() {
            let Some((first, rest)) = segments.split_first() else {
                continue;
            };
            let Some(mut current) = self.model.find_root(&ResourcePath::new(first)) else {
                debug!("Expanded root {} is gone", first);
                continue;
            };

            if let Err(e) = self.expand(current) {
                warn!("Cannot restore expansion of {}: {}", first, e);
                continue;
            }
            last = Some(current);

            for name in rest {
                let Some(target) = self.model.node(current).map(|n| n.path().join(name)) else {
                    break;
                };
                let next = self.model.loaded_children(current).iter().copied().find(|c| {
                    self.model
                        .node(*c)
                        .map(|n| n.path() == &target)
                        .unwrap_or(false)
                });
                let Some(next) = next else {
                    debug!("Expanded entry {} is gone", target);
                    break;
                };
                if let Err(e) = self.expand(next) {
                    warn!("Cannot restore expansion of {}: {}", target, e);
                    break;
                }
                current = next;
                last = Some(current);
            }
        }
        last
    }
}
