//! Uniform handles over filesystem entries
//!
//! A [`ResourceHandle`] pairs a [`ResourcePath`] identity with the
//! [`ResourceProvider`] that can answer questions about it. The tree and the
//! library only ever talk to providers through this crate, so a virtual
//! provider can stand in for the local disk.

mod handle;
mod local;
mod memory;
mod traits;

pub use folio_core::ResourcePath;
pub use handle::{ChildResource, ResourceHandle};
pub use local::{filesystem_roots, special_folders, LocalProvider};
pub use memory::MemoryProvider;
pub use traits::{ResourceEntry, ResourceProvider, WalkOptions};

use std::sync::Arc;

/// Shared provider reference held by every handle
pub type SharedProvider = Arc<dyn ResourceProvider>;
