//! Live filesystem tree for Folio
//!
//! [`TreeModel`] holds the lazily-listed nodes, [`Synchronizer`] brings them
//! back in step with the disk (reconcile, sweep, root management,
//! expansion), and [`TreeDelta`]s describe every structural change.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use folio_resource::{LocalProvider, ResourceHandle, SharedProvider};
//! use folio_tree::Synchronizer;
//!
//! # fn main() -> folio_core::Result<()> {
//! let provider: SharedProvider = Arc::new(LocalProvider::new());
//! let mut sync = Synchronizer::default();
//! sync.add_root(ResourceHandle::resolve(&provider, "/home/reader/Books"));
//!
//! let root = sync.roots()[0];
//! sync.expand(root)?;
//! for child in sync.model().loaded_children(root) {
//!     println!("{:?}", sync.model().node(*child).map(|n| n.display_name()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod event;
pub mod expansion;
pub mod job;
pub mod model;
pub mod node;
pub mod sync;
pub mod worker;

pub use event::{RecordingListener, RemovalCause, TreeDelta, TreeEvent, TreeListener, TreePath};
pub use expansion::ExpansionState;
pub use job::{ListingJob, ListingOutcome, RenameJob, RenameOutcome, SweepJob, SweepOutcome};
pub use model::TreeModel;
pub use node::{NodeId, NodeState, TreeNode};
pub use sync::Synchronizer;
pub use worker::{run_listing, run_rename, run_sweep, CancellationFlag};
