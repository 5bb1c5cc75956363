//! Local disk provider

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use directories::UserDirs;
use folio_core::ResourcePath;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::traits::{ResourceEntry, ResourceProvider, WalkOptions};

/// Provider over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceProvider for LocalProvider {
    fn exists(&self, path: &ResourcePath) -> bool {
        // symlink_metadata so dangling links still count as present
        fs::symlink_metadata(path).is_ok()
    }

    fn is_directory(&self, path: &ResourcePath) -> bool {
        path.as_path().is_dir()
    }

    fn list(&self, path: &ResourcePath) -> io::Result<Vec<ResourceEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if !has_utf8_name(&entry.path()) {
                continue;
            }
            let child = ResourcePath::new(entry.path());
            // file_type() does not follow links; a link to a directory is a directory
            let is_dir = match entry.file_type()? {
                ft if ft.is_symlink() => child.as_path().is_dir(),
                ft => ft.is_dir(),
            };
            entries.push(ResourceEntry {
                path: child,
                is_dir,
                depth: 1,
            });
        }
        Ok(entries)
    }

    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> io::Result<()> {
        // fs::rename silently replaces files on unix
        if self.exists(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to),
            ));
        }
        debug!("Renaming {} to {}", from, to);
        fs::rename(from, to)
    }

    fn delete(&self, path: &ResourcePath) -> io::Result<()> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn open_read(&self, path: &ResourcePath) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn open_write(&self, path: &ResourcePath) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(fs::File::create(path)?))
    }

    fn size(&self, path: &ResourcePath) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn walk<'a>(
        &'a self,
        root: &ResourcePath,
        options: WalkOptions,
    ) -> Box<dyn Iterator<Item = io::Result<ResourceEntry>> + 'a> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(options.follow_symlinks)
            .max_depth(options.max_depth.unwrap_or(usize::MAX));

        // A skipped directory takes its contents along
        let entries = walker.into_iter().filter_entry(|e| has_utf8_name(e.path()));
        Box::new(entries.map(|entry| {
            let entry = entry.map_err(io::Error::from)?;
            Ok(ResourceEntry {
                path: ResourcePath::new(entry.path()),
                is_dir: entry.file_type().is_dir(),
                depth: entry.depth(),
            })
        }))
    }
}

/// Identities are UTF-8 strings; an entry whose name is not valid UTF-8 is
/// left out of listings and walks.
fn has_utf8_name(path: &Path) -> bool {
    match path.file_name() {
        Some(name) if name.to_str().is_none() => {
            warn!("Skipping {}: name is not valid UTF-8", path.display());
            false
        }
        _ => true,
    }
}

/// Folders shown above the filesystem roots: the user's documents folder,
/// then the home folder when it differs.
pub fn special_folders() -> Vec<ResourcePath> {
    let Some(dirs) = UserDirs::new() else {
        warn!("No home directory found; skipping special folders");
        return Vec::new();
    };

    let home = ResourcePath::new(dirs.home_dir());
    let mut folders = Vec::new();
    if let Some(documents) = dirs.document_dir() {
        folders.push(ResourcePath::new(documents));
    }
    if !folders.contains(&home) {
        folders.push(home);
    }
    folders
}

/// Top-level filesystem roots, sorted.
///
/// On Windows, floppy drive `A:` is skipped because probing it blocks.
pub fn filesystem_roots() -> Vec<ResourcePath> {
    let mut roots: Vec<ResourcePath> = candidate_roots()
        .into_iter()
        .filter(|root| root.exists())
        .map(ResourcePath::new)
        .collect();
    roots.sort();
    roots.dedup();
    roots
}

#[cfg(windows)]
fn candidate_roots() -> Vec<PathBuf> {
    (b'B'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .collect()
}

#[cfg(not(windows))]
fn candidate_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> io::Result<(TempDir, ResourcePath)> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("a.epub"), b"epub")?;
        fs::write(dir.path().join("sub").join("b.pdf"), b"%PDF")?;
        let root = ResourcePath::new(dir.path());
        Ok((dir, root))
    }

    #[test]
    fn test_list_reports_kind() -> io::Result<()> {
        let (_dir, root) = setup()?;
        let mut entries = LocalProvider.list(&root)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path.display_name(), "a.epub");
        assert!(!entries[0].is_dir);
        assert!(entries[1].is_dir);
        Ok(())
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let err = LocalProvider
            .list(&ResourcePath::new("/definitely/not/here"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_rename_refuses_to_overwrite() -> io::Result<()> {
        let (_dir, root) = setup()?;
        fs::write(root.join("b.epub").as_path(), b"other")?;
        let err = LocalProvider
            .rename(&root.join("a.epub"), &root.join("b.epub"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(root.join("b.epub").as_path())?, b"other");
        Ok(())
    }

    #[test]
    fn test_delete_directory_recursively() -> io::Result<()> {
        let (_dir, root) = setup()?;
        LocalProvider.delete(&root.join("sub"))?;
        assert!(!LocalProvider.exists(&root.join("sub")));
        Ok(())
    }

    #[test]
    fn test_walk_excludes_root_and_honours_depth() -> io::Result<()> {
        let (_dir, root) = setup()?;
        let all: Vec<_> = LocalProvider
            .walk(&root, WalkOptions::default())
            .collect::<io::Result<_>>()?;
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|e| e.path != root));

        let shallow: Vec<_> = LocalProvider
            .walk(
                &root,
                WalkOptions {
                    max_depth: Some(1),
                    follow_symlinks: false,
                },
            )
            .collect::<io::Result<_>>()?;
        assert_eq!(shallow.len(), 2);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() -> io::Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, root) = setup()?;
        let bad = OsStr::from_bytes(b"bad\xff.epub");
        fs::write(dir.path().join(bad), b"epub")?;
        fs::create_dir(dir.path().join(OsStr::from_bytes(b"dir\xfe")))?;
        fs::write(dir.path().join(OsStr::from_bytes(b"dir\xfe")).join("c.epub"), b"epub")?;

        let listed = LocalProvider.list(&root)?;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| !e.path.as_str().contains('\u{fffd}')));

        let walked: Vec<_> = LocalProvider
            .walk(&root, WalkOptions::default())
            .collect::<io::Result<_>>()?;
        assert_eq!(walked.len(), 3);
        assert!(walked.iter().all(|e| !e.path.as_str().contains('\u{fffd}')));
        Ok(())
    }

    #[test]
    fn test_filesystem_roots_not_empty() {
        assert!(!filesystem_roots().is_empty());
    }
}
