//! Tree nodes and their load states

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use folio_core::ResourcePath;
use folio_resource::ResourceHandle;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier. Ids are never reused, so an id that is
/// no longer in the model always means the node was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Load state of a node's children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Children never listed
    Unloaded,
    /// A listing is in flight
    Loading,
    /// Children match the last listing
    Loaded,
    /// The last listing failed; loading again retries
    LoadFailed,
    /// Loaded, but the directory is known to have changed
    Stale,
    /// The node left the tree
    Removed,
}

impl NodeState {
    /// True once a listing has populated the children
    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Loaded | Self::Stale)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::LoadFailed => "load failed",
            Self::Stale => "stale",
            Self::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// One entry of the tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub(crate) id: NodeId,
    pub(crate) handle: ResourceHandle,
    pub(crate) is_dir: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) state: NodeState,
    pub(crate) epoch: u64,
    pub(crate) expanded: bool,
}

impl TreeNode {
    pub(crate) fn new(handle: ResourceHandle, is_dir: bool, parent: Option<NodeId>) -> Self {
        Self {
            id: NodeId::next(),
            handle,
            is_dir,
            parent,
            children: Vec::new(),
            // Files have nothing to load
            state: if is_dir {
                NodeState::Unloaded
            } else {
                NodeState::Loaded
            },
            epoch: 0,
            expanded: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn path(&self) -> &ResourcePath {
        self.handle.path()
    }

    pub fn display_name(&self) -> &str {
        self.handle.display_name()
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Materialized children in display order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Incremented by every listing started for this node
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

/// Display order among siblings: directories first, then by name ignoring
/// case, with the exact name breaking ties.
pub(crate) fn sibling_order(
    a_dir: bool,
    a_name: &str,
    b_dir: bool,
    b_name: &str,
) -> std::cmp::Ordering {
    b_dir
        .cmp(&a_dir)
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering as Cmp;

    #[test]
    fn test_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_directories_sort_first() {
        assert_eq!(sibling_order(true, "z", false, "a"), Cmp::Less);
        assert_eq!(sibling_order(false, "a", true, "z"), Cmp::Greater);
    }

    #[test]
    fn test_names_sort_case_insensitively() {
        assert_eq!(sibling_order(false, "apple", false, "Banana"), Cmp::Less);
        assert_eq!(sibling_order(false, "B", false, "b"), Cmp::Less);
        assert_eq!(sibling_order(false, "b", false, "b"), Cmp::Equal);
    }

    #[test]
    fn test_state_materialized() {
        assert!(NodeState::Stale.is_materialized());
        assert!(!NodeState::LoadFailed.is_materialized());
        assert_eq!(NodeState::LoadFailed.to_string(), "load failed");
    }
}
