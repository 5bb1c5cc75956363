//! Folio core types
//!
//! Shared vocabulary for the tree synchronizer and the library index:
//! resource identities, library rows, ebook formats and the error taxonomy.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorSeverity, FolioError, RecoveryAction, Result};
pub use types::{
    EbookFormat, EbookMetadata, LibraryRow, ResourcePath, RowFilter, RowId, Timestamp, Validator,
};
