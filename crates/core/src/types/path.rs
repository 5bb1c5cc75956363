//! Resource identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Identity of a filesystem entry.
///
/// Holds a lexically normalized path string: `.` segments are dropped, `..`
/// segments resolved against the preceding segment, and duplicate or
/// trailing separators removed. Nothing touches the disk, so identities can
/// be built for entries that no longer (or do not yet) exist. Two handles
/// with equal `ResourcePath`s refer to the same resource.
///
/// Segments that are not valid UTF-8 are converted lossily, so such names
/// do not round-trip; providers leave those entries out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Normalizes `raw` into a resource identity
    pub fn new(raw: impl AsRef<Path>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Last path segment, or the whole path for roots such as `/` or `C:\`
    pub fn display_name(&self) -> &str {
        self.as_path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.0)
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        self.as_path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        self.as_path().parent().map(ResourcePath::new)
    }

    /// Identity of the child `name` below this resource
    pub fn join(&self, name: &str) -> ResourcePath {
        ResourcePath::new(self.as_path().join(name))
    }

    /// True if `self` lies strictly below `ancestor`.
    ///
    /// Compares whole components, so `/lib2` is not below `/lib`.
    pub fn is_descendant_of(&self, ancestor: &ResourcePath) -> bool {
        self != ancestor && self.as_path().starts_with(ancestor.as_path())
    }

    /// True if `self` is `ancestor` or lies below it
    pub fn is_within(&self, ancestor: &ResourcePath) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Moves this identity from below `from` to below `to`.
    ///
    /// Returns `None` when `self` is not within `from`.
    pub fn rebase(&self, from: &ResourcePath, to: &ResourcePath) -> Option<ResourcePath> {
        let rest = self.as_path().strip_prefix(from.as_path()).ok()?;
        if rest.as_os_str().is_empty() {
            return Some(to.clone());
        }
        Some(ResourcePath::new(to.as_path().join(rest)))
    }
}

fn normalize(raw: &Path) -> String {
    let mut prefix = PathBuf::new();
    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
    let mut rooted = false;
    let mut leading_parents = 0usize;

    for component in raw.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => rooted = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() && !rooted {
                    leading_parents += 1;
                }
            }
            Component::Normal(segment) => segments.push(segment),
        }
    }

    let mut out = prefix;
    if rooted {
        out.push(Component::RootDir.as_os_str());
    }
    for _ in 0..leading_parents {
        out.push("..");
    }
    for segment in segments {
        out.push(segment);
    }

    if out.as_os_str().is_empty() {
        return ".".to_string();
    }
    out.to_string_lossy().into_owned()
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourcePath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl From<&str> for ResourcePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<&Path> for ResourcePath {
    fn from(raw: &Path) -> Self {
        Self::new(raw)
    }
}

impl AsRef<Path> for ResourcePath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_is_lexical() {
        assert_eq!(ResourcePath::new("/lib/").as_str(), "/lib");
        assert_eq!(ResourcePath::new("/lib//books/./a.epub").as_str(), "/lib/books/a.epub");
        assert_eq!(ResourcePath::new("/lib/books/../a.epub").as_str(), "/lib/a.epub");
        assert_eq!(ResourcePath::new("/").as_str(), "/");
        assert_eq!(ResourcePath::new("").as_str(), ".");
        assert_eq!(ResourcePath::new("../up").as_str(), "../up");
    }

    #[test]
    fn test_equal_after_normalization() {
        assert_eq!(ResourcePath::new("/lib/a.epub"), ResourcePath::new("/lib/./a.epub"));
        assert_ne!(ResourcePath::new("/lib/a.epub"), ResourcePath::new("/lib/A.epub"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(ResourcePath::new("/lib/a.epub").display_name(), "a.epub");
        assert_eq!(ResourcePath::new("/").display_name(), "/");
    }

    #[test]
    fn test_descendant_checks_whole_components() {
        let lib = ResourcePath::new("/lib");
        assert!(ResourcePath::new("/lib/a.epub").is_descendant_of(&lib));
        assert!(ResourcePath::new("/lib/sub/a.epub").is_descendant_of(&lib));
        assert!(!ResourcePath::new("/lib2/a.epub").is_descendant_of(&lib));
        assert!(!lib.is_descendant_of(&lib));
        assert!(lib.is_within(&lib));
        assert!(ResourcePath::new("/lib").is_descendant_of(&ResourcePath::new("/")));
    }

    #[test]
    fn test_parent_and_join() {
        let file = ResourcePath::new("/lib/sub/a.epub");
        assert_eq!(file.parent(), Some(ResourcePath::new("/lib/sub")));
        assert_eq!(ResourcePath::new("/lib").join("b.epub"), ResourcePath::new("/lib/b.epub"));
        assert_eq!(ResourcePath::new("/").parent(), None);
    }

    #[test]
    fn test_rebase() {
        let from = ResourcePath::new("/lib/old");
        let to = ResourcePath::new("/lib/new");
        assert_eq!(
            ResourcePath::new("/lib/old/a.epub").rebase(&from, &to),
            Some(ResourcePath::new("/lib/new/a.epub"))
        );
        assert_eq!(from.rebase(&from, &to), Some(to.clone()));
        assert_eq!(ResourcePath::new("/other/a.epub").rebase(&from, &to), None);
    }

    #[test]
    fn test_extension_is_lowercase() {
        assert_eq!(ResourcePath::new("/lib/A.EPUB").extension().as_deref(), Some("epub"));
        assert_eq!(ResourcePath::new("/lib/README").extension(), None);
    }

    #[test]
    fn test_serde_normalizes_on_read() {
        let path: ResourcePath = serde_json::from_str("\"/lib/./a.epub\"").unwrap();
        assert_eq!(path.as_str(), "/lib/a.epub");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"/lib/a.epub\"");
    }
}
