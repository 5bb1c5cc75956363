use std::fmt;
use std::io::{self, Read, Write};

use folio_core::ResourcePath;

/// A directory entry as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub path: ResourcePath,
    pub is_dir: bool,
    /// Distance from the walk root (1 = direct child); 1 for listings
    pub depth: usize,
}

/// Options for recursive enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum depth below the root; `None` = unlimited
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: false,
        }
    }
}

/// Access to a tree of resources (the local disk, or a virtual tree).
///
/// Every method is blocking. Callers on the model-owning task are expected
/// to run them through `spawn_blocking`.
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    fn exists(&self, path: &ResourcePath) -> bool;

    fn is_directory(&self, path: &ResourcePath) -> bool;

    /// Lists the direct children of a directory.
    ///
    /// Any failure while enumerating fails the whole listing; a truncated
    /// result is never returned.
    fn list(&self, path: &ResourcePath) -> io::Result<Vec<ResourceEntry>>;

    /// Renames `from` to `to`. Fails with `AlreadyExists` on a name collision.
    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> io::Result<()>;

    /// Deletes a file, or a directory with its contents
    fn delete(&self, path: &ResourcePath) -> io::Result<()>;

    fn open_read(&self, path: &ResourcePath) -> io::Result<Box<dyn Read + Send>>;

    fn open_write(&self, path: &ResourcePath) -> io::Result<Box<dyn Write + Send>>;

    fn size(&self, path: &ResourcePath) -> io::Result<u64>;

    /// Recursively enumerates everything below `root` (excluding `root`).
    ///
    /// Unlike [`list`](Self::list), errors are yielded per entry so a scan
    /// can skip unreadable subdirectories and keep going.
    fn walk<'a>(
        &'a self,
        root: &ResourcePath,
        options: WalkOptions,
    ) -> Box<dyn Iterator<Item = io::Result<ResourceEntry>> + 'a> {
        Box::new(ListingWalk::new(self, root.clone(), options))
    }
}

/// Depth-first walk built on [`ResourceProvider::list`]
struct ListingWalk<'a, P: ?Sized> {
    provider: &'a P,
    options: WalkOptions,
    pending: Vec<(ResourcePath, usize)>,
    ready: std::vec::IntoIter<ResourceEntry>,
}

impl<'a, P: ResourceProvider + ?Sized> ListingWalk<'a, P> {
    fn new(provider: &'a P, root: ResourcePath, options: WalkOptions) -> Self {
        Self {
            provider,
            options,
            pending: vec![(root, 0)],
            ready: Vec::new().into_iter(),
        }
    }
}

impl<P: ResourceProvider + ?Sized> Iterator for ListingWalk<'_, P> {
    type Item = io::Result<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.ready.next() {
                let within_depth = self
                    .options
                    .max_depth
                    .map(|max| entry.depth < max)
                    .unwrap_or(true);
                if entry.is_dir && within_depth {
                    self.pending.push((entry.path.clone(), entry.depth));
                }
                return Some(Ok(entry));
            }

            let (dir, depth) = self.pending.pop()?;
            match self.provider.list(&dir) {
                Ok(mut entries) => {
                    for entry in &mut entries {
                        entry.depth = depth + 1;
                    }
                    self.ready = entries.into_iter();
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
