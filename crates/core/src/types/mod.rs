//! Domain types for Folio
//!
//! - `path`: resource identity (`ResourcePath`)
//! - `row`: library rows and the filters used to query them
//! - `format`: ebook format detection
//! - `common`: shared traits and utilities

mod common;
mod format;
mod path;
mod row;

// Re-export all public types
pub use common::{Timestamp, Validator};
pub use format::EbookFormat;
pub use path::ResourcePath;
pub use row::{EbookMetadata, LibraryRow, RowFilter, RowId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_are_exported() {
        let _row_id: RowId = RowId::new();
        let _path: ResourcePath = ResourcePath::new("/lib");
        let _format: Option<EbookFormat> = EbookFormat::from_extension("epub");
        let _filter: RowFilter = RowFilter::default();
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = Timestamp::now();
        assert!(t2 > t1);
    }
}
