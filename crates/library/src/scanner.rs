// FILE: crates/library/src/scanner.rs

use std::collections::HashSet;

use folio_config::LibraryConfig;
use folio_core::ResourcePath;
use folio_resource::{ResourceHandle, WalkOptions};
use folio_tree::CancellationFlag;
use log::{debug, info, warn};

/// Which entries below a base path count as ebooks
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Lower-cased extensions, without the dot
    pub supported_extensions: HashSet<String>,
    /// Maximum depth below the base path; `None` = unlimited
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    /// Files smaller than this are ignored
    pub min_file_size: u64,
    /// Entries between two progress callbacks
    pub progress_interval: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&LibraryConfig::default())
    }
}

impl From<&LibraryConfig> for ScanOptions {
    fn from(config: &LibraryConfig) -> Self {
        Self {
            supported_extensions: config
                .supported_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            max_depth: config.scan_depth(),
            follow_symlinks: config.follow_symlinks,
            min_file_size: config.min_file_size_bytes,
            progress_interval: config.progress_interval.max(1),
        }
    }
}

impl ScanOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_file_size(mut self, size: u64) -> Self {
        self.min_file_size = size;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.supported_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    fn has_supported_extension(&self, path: &ResourcePath) -> bool {
        path.extension()
            .map(|ext| self.supported_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

/// Outcome of scanning one base path
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub root: ResourcePath,
    /// Ebook files found, in walk order
    pub found: Vec<ResourceHandle>,
    /// Entries visited
    pub scanned: usize,
    /// Entries that could not be read; the walk went on without them
    pub failures: Vec<String>,
    pub cancelled: bool,
}

impl ScanReport {
    fn new(root: ResourcePath) -> Self {
        Self {
            root,
            found: Vec::new(),
            scanned: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Report for a scan that died before walking anything
    pub fn aborted(root: ResourcePath, reason: impl Into<String>) -> Self {
        let mut report = Self::new(root);
        report.failures.push(reason.into());
        report
    }
}

/// Finds ebook files below base paths
#[derive(Debug, Clone, Default)]
pub struct LibraryScanner {
    options: ScanOptions,
}

impl LibraryScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Walks `root` and collects ebook files. Blocking.
    ///
    /// `progress` is called with the number of entries visited every
    /// `progress_interval` entries. The walk stops early once `cancel` is
    /// set; the report then has `cancelled` set and holds what was found so
    /// far.
    pub fn scan_root(
        &self,
        root: &ResourceHandle,
        cancel: &CancellationFlag,
        mut progress: impl FnMut(usize),
    ) -> ScanReport {
        let mut report = ScanReport::new(root.path().clone());
        info!("Scanning {}", root);

        let options = WalkOptions {
            max_depth: self.options.max_depth,
            follow_symlinks: self.options.follow_symlinks,
        };
        let provider = root.provider();

        for entry in provider.walk(root.path(), options) {
            if cancel.is_cancelled() {
                debug!("Scan of {} cancelled", root);
                report.cancelled = true;
                break;
            }

            report.scanned += 1;
            if report.scanned % self.options.progress_interval == 0 {
                progress(report.scanned);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error walking {}: {}", root, e);
                    report.failures.push(e.to_string());
                    continue;
                }
            };

            if entry.is_dir || !self.options.has_supported_extension(&entry.path) {
                continue;
            }

            let handle = root.with_path(entry.path);
            if self.options.min_file_size > 0 {
                match handle.size() {
                    Ok(size) if size < self.options.min_file_size => continue,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Cannot read size of {}: {}", handle, e);
                        report
                            .failures
                            .push(format!("{}: {}", handle.path(), e));
                        continue;
                    }
                }
            }
            report.found.push(handle);
        }

        info!(
            "Scan of {} finished: {} ebooks in {} entries",
            root,
            report.found.len(),
            report.scanned
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_resource::{MemoryProvider, SharedProvider};
    use std::io::ErrorKind;
    use std::sync::Arc;

    fn library() -> (MemoryProvider, ResourceHandle) {
        let memory = MemoryProvider::new();
        memory.add_file("/lib/a.epub", &[0u8; 10]);
        memory.add_file("/lib/notes.md", b"x");
        memory.add_file("/lib/sub/b.PDF", &[0u8; 2048]);
        memory.add_file("/lib/sub/deep/c.cbz", &[0u8; 2048]);
        let provider: SharedProvider = Arc::new(memory.clone());
        let root = ResourceHandle::resolve(&provider, "/lib");
        (memory, root)
    }

    fn found(report: &ScanReport) -> Vec<String> {
        let mut names: Vec<_> = report.found.iter().map(|h| h.path().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_scan_finds_supported_files() {
        let (_memory, root) = library();
        let scanner = LibraryScanner::default();

        let report = scanner.scan_root(&root, &CancellationFlag::new(), |_| {});
        assert_eq!(
            found(&report),
            vec!["/lib/a.epub", "/lib/sub/b.PDF", "/lib/sub/deep/c.cbz"]
        );
        assert!(!report.cancelled);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_depth_and_size_limits() {
        let (_memory, root) = library();
        let scanner = LibraryScanner::new(
            ScanOptions::default()
                .with_max_depth(2)
                .with_min_file_size(1024),
        );

        let report = scanner.scan_root(&root, &CancellationFlag::new(), |_| {});
        assert_eq!(found(&report), vec!["/lib/sub/b.PDF"]);
    }

    #[test]
    fn test_unreadable_directory_is_skipped() {
        let (memory, root) = library();
        memory.fail_listing("/lib/sub", ErrorKind::PermissionDenied);

        let report = LibraryScanner::default().scan_root(&root, &CancellationFlag::new(), |_| {});
        assert_eq!(found(&report), vec!["/lib/a.epub"]);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_progress_and_cancellation() {
        let (_memory, root) = library();
        let scanner =
            LibraryScanner::new(ScanOptions::default().with_progress_interval(1));
        let cancel = CancellationFlag::new();

        let mut calls = Vec::new();
        let report = scanner.scan_root(&root, &cancel, |n| {
            calls.push(n);
            if n == 2 {
                cancel.cancel();
            }
        });

        assert_eq!(calls, vec![1, 2]);
        assert!(report.cancelled);
        assert_eq!(report.scanned, 2);
    }
}
