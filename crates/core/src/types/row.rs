//! Library rows: one persisted metadata record per ebook resource

use crate::types::{EbookFormat, ResourcePath, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Database key of a library row.
///
/// Survives renames and moves of the underlying file; only the row's
/// `resource` changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(Uuid);

impl RowId {
    /// Creates a new random RowId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a RowId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata produced by a format reader for one ebook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EbookMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub cover: Option<Vec<u8>>,
    pub format: Option<EbookFormat>,
}

/// One entry of the library table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRow {
    pub id: RowId,
    pub resource: ResourcePath,
    pub display_name: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<Vec<u8>>,
    pub tags: Vec<String>,
    pub format: Option<EbookFormat>,
    pub file_size: u64,
    pub added: Timestamp,
    pub updated: Timestamp,
}

impl LibraryRow {
    /// Creates a row for `resource` with a title derived from the file name
    pub fn new(resource: ResourcePath) -> Self {
        let display_name = resource.display_name().to_string();
        let title = title_from_file_name(&display_name);
        let now = Timestamp::now();
        Self {
            id: RowId::new(),
            format: EbookFormat::from_path(&resource),
            resource,
            display_name,
            title,
            authors: Vec::new(),
            cover: None,
            tags: Vec::new(),
            file_size: 0,
            added: now,
            updated: now,
        }
    }

    /// Fills the row from reader output, keeping fields the reader left empty
    pub fn apply_metadata(&mut self, metadata: EbookMetadata) {
        if let Some(title) = metadata.title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        if !metadata.authors.is_empty() {
            self.authors = metadata.authors;
        }
        if !metadata.tags.is_empty() {
            self.tags = metadata.tags;
        }
        if metadata.cover.is_some() {
            self.cover = metadata.cover;
        }
        if metadata.format.is_some() {
            self.format = metadata.format;
        }
        self.touch();
    }

    /// Points the row at a new resource; the row id is kept
    pub fn relocate(&mut self, resource: ResourcePath) {
        self.display_name = resource.display_name().to_string();
        self.resource = resource;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated = Timestamp::now();
    }

    pub fn has_cover(&self) -> bool {
        self.cover.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Case-insensitive match against title, authors, tags and file name
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.display_name.to_lowercase().contains(&needle)
            || self.authors.iter().any(|a| a.to_lowercase().contains(&needle))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

fn title_from_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

impl Validator for LibraryRow {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Title cannot be empty".to_string());
        }

        if self.display_name != self.resource.display_name() {
            errors.push("Display name must match the resource name".to_string());
        }

        if self.updated < self.added {
            errors.push("Update time precedes creation time".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Query over the library table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    /// Only rows at or below this resource
    pub within: Option<ResourcePath>,
    /// Case-insensitive text match
    pub text: Option<String>,
    pub format: Option<EbookFormat>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within(path: ResourcePath) -> Self {
        Self {
            within: Some(path),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_format(mut self, format: EbookFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn matches(&self, row: &LibraryRow) -> bool {
        if let Some(ref within) = self.within {
            if !row.resource.is_within(within) {
                return false;
            }
        }
        if let Some(ref text) = self.text {
            if !row.matches_text(text) {
                return false;
            }
        }
        if let Some(format) = self.format {
            if row.format != Some(format) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_derives_names() {
        let row = LibraryRow::new(ResourcePath::new("/lib/Dune.epub"));
        assert_eq!(row.display_name, "Dune.epub");
        assert_eq!(row.title, "Dune");
        assert_eq!(row.format, Some(EbookFormat::Epub));
        assert!(row.is_valid());
    }

    #[test]
    fn test_title_of_dotfile_keeps_name() {
        let row = LibraryRow::new(ResourcePath::new("/lib/.hidden"));
        assert_eq!(row.title, ".hidden");
    }

    #[test]
    fn test_relocate_keeps_id() {
        let mut row = LibraryRow::new(ResourcePath::new("/lib/x.epub"));
        let id = row.id;
        row.relocate(ResourcePath::new("/lib/y.epub"));
        assert_eq!(row.id, id);
        assert_eq!(row.display_name, "y.epub");
        assert!(row.is_valid());
    }

    #[test]
    fn test_apply_metadata_keeps_missing_fields() {
        let mut row = LibraryRow::new(ResourcePath::new("/lib/x.epub"));
        row.apply_metadata(EbookMetadata {
            authors: vec!["Frank Herbert".to_string()],
            title: Some("   ".to_string()),
            ..Default::default()
        });
        assert_eq!(row.title, "x");
        assert_eq!(row.authors, vec!["Frank Herbert".to_string()]);
        assert_eq!(row.format, Some(EbookFormat::Epub));
    }

    #[test]
    fn test_row_validation() {
        let mut row = LibraryRow::new(ResourcePath::new("/lib/x.epub"));
        row.title = String::new();
        row.display_name = "other".to_string();
        let errors = row.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_filter_within_and_text() {
        let mut row = LibraryRow::new(ResourcePath::new("/lib/sf/Dune.epub"));
        row.authors.push("Frank Herbert".to_string());

        assert!(RowFilter::all().matches(&row));
        assert!(RowFilter::within(ResourcePath::new("/lib")).matches(&row));
        assert!(!RowFilter::within(ResourcePath::new("/lib/fantasy")).matches(&row));
        assert!(RowFilter::all().with_text("herbert").matches(&row));
        assert!(!RowFilter::all().with_text("tolkien").matches(&row));
        assert!(!RowFilter::all().with_format(EbookFormat::Pdf).matches(&row));
    }

    #[test]
    fn test_row_id_from_string() {
        let id = RowId::new();
        assert_eq!(RowId::from_string(&id.to_string()).unwrap(), id);
        assert!(RowId::from_string("not-a-uuid").is_err());
    }
}
