//! Folio library index
//!
//! Keeps the ebook index in step with the filesystem tree: base-path scans
//! feed new rows in, tree changes (removed roots, deletions, renames) are
//! mirrored onto the rows by the [`LibraryBridge`], and [`LibraryManager`]
//! owns it all together with the background work.

pub mod bridge;
pub mod error;
pub mod json_store;
pub mod manager;
pub mod metadata;
pub mod scanner;
pub mod selection;
pub mod store;

pub use bridge::{
    DeltaReport, ImportReport, LibraryBridge, LibraryEvent, LibraryListener, RowBatch,
};
pub use error::{LibraryError, LibraryResult};
pub use json_store::JsonFileStore;
pub use manager::{LibraryManager, WorkResult, WorkSummary};
pub use metadata::{FileNameReader, MetadataReader, MetadataReaders};
pub use scanner::{LibraryScanner, ScanOptions, ScanReport};
pub use selection::{resolve_selection, Selection, SelectionSet};
pub use store::{MemoryStore, MetadataStore};
