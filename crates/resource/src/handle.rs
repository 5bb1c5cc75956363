use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::path::Path;

use folio_core::ResourcePath;

use crate::SharedProvider;

/// Handle over one filesystem entry.
///
/// Equality and hashing only look at the path: two handles resolved from the
/// same path string are the same resource even if they are distinct values.
#[derive(Clone)]
pub struct ResourceHandle {
    path: ResourcePath,
    provider: SharedProvider,
}

/// A child returned by [`ResourceHandle::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildResource {
    pub handle: ResourceHandle,
    pub is_dir: bool,
}

impl ResourceHandle {
    /// Resolves a raw path against `provider`
    pub fn resolve(provider: &SharedProvider, raw: impl AsRef<Path>) -> Self {
        Self::new(provider.clone(), ResourcePath::new(raw))
    }

    pub fn new(provider: SharedProvider, path: ResourcePath) -> Self {
        Self { path, provider }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn display_name(&self) -> &str {
        self.path.display_name()
    }

    pub fn exists(&self) -> bool {
        self.provider.exists(&self.path)
    }

    pub fn is_directory(&self) -> bool {
        self.provider.is_directory(&self.path)
    }

    pub fn parent(&self) -> Option<ResourceHandle> {
        self.path.parent().map(|p| self.with_path(p))
    }

    /// Handle for `name` next to this resource
    pub fn sibling(&self, name: &str) -> Option<ResourceHandle> {
        self.path.parent().map(|p| self.with_path(p.join(name)))
    }

    pub fn child(&self, name: &str) -> ResourceHandle {
        self.with_path(self.path.join(name))
    }

    /// Handle on the same provider for another path
    pub fn with_path(&self, path: ResourcePath) -> ResourceHandle {
        Self::new(self.provider.clone(), path)
    }

    pub fn list(&self) -> io::Result<Vec<ChildResource>> {
        let entries = self.provider.list(&self.path)?;
        Ok(entries
            .into_iter()
            .map(|entry| ChildResource {
                handle: self.with_path(entry.path),
                is_dir: entry.is_dir,
            })
            .collect())
    }

    /// Renames the underlying resource to `target`'s path
    pub fn rename(&self, target: &ResourceHandle) -> io::Result<()> {
        self.provider.rename(&self.path, &target.path)
    }

    pub fn delete(&self) -> io::Result<()> {
        self.provider.delete(&self.path)
    }

    pub fn open_read(&self) -> io::Result<Box<dyn Read + Send>> {
        self.provider.open_read(&self.path)
    }

    pub fn open_write(&self) -> io::Result<Box<dyn Write + Send>> {
        self.provider.open_write(&self.path)
    }

    pub fn size(&self) -> io::Result<u64> {
        self.provider.size(&self.path)
    }

    /// Reads up to `limit` leading bytes, e.g. for magic-byte detection
    pub fn read_header(&self, limit: usize) -> io::Result<Vec<u8>> {
        let mut header = Vec::with_capacity(limit);
        self.open_read()?
            .take(limit as u64)
            .read_to_end(&mut header)?;
        Ok(header)
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ResourceHandle {}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle").field(&self.path.as_str()).finish()
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}
