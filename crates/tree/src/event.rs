//! Structural change notifications
//!
//! Every mutation of the tree is reported as a [`TreeDelta`], an ordered list
//! of [`TreeEvent`]s. Views replay the events to stay in step; the library
//! bridge uses the removal causes to decide which rows to drop.

use std::fmt;
use std::sync::{Arc, Mutex};

use folio_core::ResourcePath;

use crate::node::NodeId;

/// Node ids from a root down to a node. Empty for the (virtual) parent of
/// the roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<NodeId>);

impl TreePath {
    /// Parent path of root nodes
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_nodes(nodes: Vec<NodeId>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }

    /// The node this path leads to
    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, node: NodeId) -> Self {
        let mut nodes = self.0.clone();
        nodes.push(node);
        Self(nodes)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for node in &self.0 {
            write!(f, "/{}", node)?;
        }
        Ok(())
    }
}

/// Why nodes left their parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// A root was removed by the user
    RootRemoved,
    /// The resources no longer exist on disk
    Deleted,
    /// The nodes are re-inserted at a new index right after
    Moved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Inserted {
        parent: TreePath,
        index: usize,
        node: NodeId,
    },
    Removed {
        parent: TreePath,
        /// Former indices of `nodes`, ascending
        indices: Vec<usize>,
        nodes: Vec<NodeId>,
        /// Every materialized identity that left, subtrees included
        resources: Vec<ResourcePath>,
        cause: RemovalCause,
    },
    Changed {
        path: TreePath,
        previous: ResourcePath,
        current: ResourcePath,
    },
}

/// Ordered events produced by one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDelta {
    events: Vec<TreeEvent>,
}

impl TreeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, other: TreeDelta) {
        self.events.extend(other.events);
    }

    pub fn events(&self) -> &[TreeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TreeEvent> {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn inserted_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TreeEvent::Inserted { .. }))
            .count()
    }

    /// Identities removed for `cause`, in event order
    pub fn removed_resources(&self, cause: RemovalCause) -> Vec<ResourcePath> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TreeEvent::Removed {
                    resources,
                    cause: c,
                    ..
                } if *c == cause => Some(resources.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl IntoIterator for TreeDelta {
    type Item = TreeEvent;
    type IntoIter = std::vec::IntoIter<TreeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a TreeDelta {
    type Item = &'a TreeEvent;
    type IntoIter = std::slice::Iter<'a, TreeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Receives every event as the model publishes it
pub trait TreeListener: Send {
    fn on_tree_event(&self, event: &TreeEvent);
}

/// Listener that keeps every event it sees
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<TreeEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TreeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns and clears the recorded events
    pub fn take(&self) -> Vec<TreeEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl TreeListener for RecordingListener {
    fn on_tree_event(&self, event: &TreeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
