//! Blocking halves of split-phase tree operations
//!
//! A job is a snapshot taken from the model by a `begin_*` call. Running it
//! touches only the provider, so it can move to a blocking thread; the
//! outcome is applied back to the model with the matching `finish_*` call.

use std::io;

use folio_core::ResourcePath;
use folio_resource::{ChildResource, ResourceHandle};

use crate::node::NodeId;

/// Pending directory listing for one node
#[derive(Debug, Clone)]
pub struct ListingJob {
    pub(crate) node: NodeId,
    pub(crate) epoch: u64,
    pub(crate) handle: ResourceHandle,
    pub(crate) show_hidden: bool,
}

impl ListingJob {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Lists the directory. Blocking.
    pub fn run(self) -> ListingOutcome {
        let show_hidden = self.show_hidden;
        let result = self.handle.list().map(|children| {
            children
                .into_iter()
                .filter(|child| show_hidden || !is_hidden(child))
                .collect()
        });
        ListingOutcome {
            node: self.node,
            epoch: self.epoch,
            handle: self.handle,
            result,
        }
    }

    /// Outcome for a job that never ran, e.g. because its thread panicked
    pub fn failed(self, error: io::Error) -> ListingOutcome {
        ListingOutcome {
            node: self.node,
            epoch: self.epoch,
            handle: self.handle,
            result: Err(error),
        }
    }
}

fn is_hidden(child: &ChildResource) -> bool {
    child.handle.display_name().starts_with('.')
}

/// Result of a [`ListingJob`]
#[derive(Debug)]
pub struct ListingOutcome {
    pub(crate) node: NodeId,
    pub(crate) epoch: u64,
    pub(crate) handle: ResourceHandle,
    pub(crate) result: io::Result<Vec<ChildResource>>,
}

impl ListingOutcome {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Existence check over the displayed nodes
#[derive(Debug, Clone, Default)]
pub struct SweepJob {
    pub(crate) candidates: Vec<(NodeId, ResourceHandle)>,
}

impl SweepJob {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Checks every candidate for existence. Blocking.
    pub fn run(self) -> SweepOutcome {
        let missing = self
            .candidates
            .into_iter()
            .filter(|(_, handle)| !handle.exists())
            .map(|(node, handle)| (node, handle.path().clone()))
            .collect();
        SweepOutcome { missing }
    }
}

/// Nodes found missing by a [`SweepJob`], in display order, each with the
/// identity that was checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub(crate) missing: Vec<(NodeId, ResourcePath)>,
}

impl SweepOutcome {
    pub fn missing(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.missing.iter().map(|(node, _)| *node)
    }

    pub fn len(&self) -> usize {
        self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Pending rename of one node
#[derive(Debug, Clone)]
pub struct RenameJob {
    pub(crate) node: NodeId,
    pub(crate) source: ResourceHandle,
    pub(crate) target: ResourceHandle,
}

impl RenameJob {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn target(&self) -> &ResourcePath {
        self.target.path()
    }

    /// Renames on disk. Blocking.
    pub fn run(self) -> RenameOutcome {
        let result = if self.source == self.target {
            Ok(())
        } else {
            self.source.rename(&self.target)
        };
        self.into_outcome(result)
    }

    pub fn failed(self, error: io::Error) -> RenameOutcome {
        self.into_outcome(Err(error))
    }

    fn into_outcome(self, result: io::Result<()>) -> RenameOutcome {
        RenameOutcome {
            node: self.node,
            previous: self.source.path().clone(),
            current: self.target.path().clone(),
            result,
        }
    }
}

/// Result of a [`RenameJob`]
#[derive(Debug)]
pub struct RenameOutcome {
    pub(crate) node: NodeId,
    pub(crate) previous: ResourcePath,
    pub(crate) current: ResourcePath,
    pub(crate) result: io::Result<()>,
}

impl RenameOutcome {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn current(&self) -> &ResourcePath {
        &self.current
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
