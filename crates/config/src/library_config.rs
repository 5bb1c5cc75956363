//! Library and scan configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Base paths and scanning rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directories whose ebooks make up the library
    pub base_paths: Vec<PathBuf>,

    /// Ebook file extensions picked up by scans, without the dot
    pub supported_extensions: Vec<String>,

    /// Maximum recursion depth below a base path (0 = unlimited)
    pub max_scan_depth: u32,

    /// Follow symbolic links when scanning
    pub follow_symlinks: bool,

    /// Skip files smaller than this size in bytes
    pub min_file_size_bytes: u64,

    /// Entries between two scan progress reports
    pub progress_interval: usize,

    /// Last folder added as a base path
    pub last_folder: Option<PathBuf>,
}

impl LibraryConfig {
    /// Scan depth for the walker, `None` meaning unlimited
    pub fn scan_depth(&self) -> Option<usize> {
        match self.max_scan_depth {
            0 => None,
            depth => Some(depth as usize),
        }
    }

    /// Whether `extension` (without the dot) is scanned, ignoring case
    pub fn is_supported(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Adds a base path unless already present.
    ///
    /// Returns whether the path was new. `last_folder` is updated either way.
    pub fn add_base_path(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.last_folder = Some(path.clone());
        if self.base_paths.contains(&path) {
            false
        } else {
            self.base_paths.push(path);
            true
        }
    }

    /// Removes a base path, returning whether it was present
    pub fn remove_base_path(&mut self, path: &Path) -> bool {
        let before = self.base_paths.len();
        self.base_paths.retain(|p| p != path);
        self.base_paths.len() != before
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            base_paths: Vec::new(),
            supported_extensions: ["epub", "pdf", "mobi", "azw3", "fb2", "djvu", "cbz", "cbr", "rtf", "txt"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_scan_depth: 0,
            follow_symlinks: false,
            min_file_size_bytes: 0,
            progress_interval: 100,
            last_folder: None,
        }
    }
}

impl ConfigSection for LibraryConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(
                self.min_file_size_bytes,
                0,
                100 * 1024 * 1024,
                "library.min_file_size_bytes",
            ),
            Validator::in_range(
                self.progress_interval,
                1,
                1_000_000,
                "library.progress_interval",
            ),
            Validator::no_duplicates(&self.base_paths, "library.base_paths"),
        ];

        for (i, path) in self.base_paths.iter().enumerate() {
            results.push(Validator::absolute_path(
                path,
                &format!("library.base_paths[{}]", i),
            ));
        }

        for (i, ext) in self.supported_extensions.iter().enumerate() {
            results.push(Validator::not_empty(
                ext,
                &format!("library.supported_extensions[{}]", i),
            ));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.base_paths = other.base_paths;
        self.supported_extensions = other.supported_extensions;
        self.max_scan_depth = other.max_scan_depth;
        self.follow_symlinks = other.follow_symlinks;
        self.min_file_size_bytes = other.min_file_size_bytes;
        self.progress_interval = other.progress_interval;
        self.last_folder = other.last_folder;
    }

    fn section_name(&self) -> &'static str {
        "library"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absolute(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_default_is_valid() {
        let config = LibraryConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_supported("EPUB"));
        assert!(!config.is_supported("mp3"));
    }

    #[test]
    fn test_scan_depth() {
        let mut config = LibraryConfig::default();
        assert_eq!(config.scan_depth(), None);
        config.max_scan_depth = 3;
        assert_eq!(config.scan_depth(), Some(3));
    }

    #[test]
    fn test_invalid_min_file_size() {
        let mut config = LibraryConfig::default();
        config.min_file_size_bytes = 200 * 1024 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_extension() {
        let mut config = LibraryConfig::default();
        config.supported_extensions.push("".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_base_path_rejected() {
        let mut config = LibraryConfig::default();
        config.base_paths.push(PathBuf::from("books"));
        let errors = config.validate().unwrap_err();
        assert_eq!(errors[0].field, "library.base_paths[0]");
    }

    #[test]
    fn test_duplicate_base_path_rejected() {
        let mut config = LibraryConfig::default();
        config.base_paths = vec![absolute("books"), absolute("books")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_add_and_remove_base_path() {
        let mut config = LibraryConfig::default();
        assert!(config.add_base_path(absolute("books")));
        assert!(!config.add_base_path(absolute("books")));
        assert_eq!(config.base_paths.len(), 1);
        assert_eq!(config.last_folder, Some(absolute("books")));

        assert!(config.remove_base_path(&absolute("books")));
        assert!(!config.remove_base_path(&absolute("books")));
        assert!(config.base_paths.is_empty());
    }

    #[test]
    fn test_merge() {
        let mut base = LibraryConfig::default();
        let mut other = LibraryConfig::default();
        other.follow_symlinks = true;
        other.base_paths = vec![PathBuf::from("/books")];

        base.merge(other);
        assert!(base.follow_symlinks);
        assert_eq!(base.base_paths, vec![PathBuf::from("/books")]);
    }
}
