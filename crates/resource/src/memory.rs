//! In-memory virtual filesystem

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use folio_core::ResourcePath;

use crate::traits::{ResourceEntry, ResourceProvider};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<ResourcePath, Node>,
    listing_failures: HashMap<ResourcePath, io::ErrorKind>,
}

/// Provider backed by a map of paths, used for virtual roots and tests.
///
/// Parents are created implicitly. Listing failures can be injected per
/// directory to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    state: Arc<Mutex<State>>,
    listings: Arc<AtomicUsize>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a directory and any missing parents
    pub fn add_dir(&self, raw: &str) {
        let path = ResourcePath::new(raw);
        let mut state = self.state();
        insert_parents(&mut state, &path);
        state.nodes.insert(path, Node::Dir);
    }

    /// Creates or replaces a file, creating missing parents
    pub fn add_file(&self, raw: &str, content: &[u8]) {
        let path = ResourcePath::new(raw);
        let mut state = self.state();
        insert_parents(&mut state, &path);
        state.nodes.insert(path, Node::File(content.to_vec()));
    }

    /// Removes an entry and everything below it, as an external process would
    pub fn remove(&self, raw: &str) {
        let path = ResourcePath::new(raw);
        self.state().nodes.retain(|p, _| !p.is_within(&path));
    }

    /// Makes every listing of `raw` fail with `kind` until cleared
    pub fn fail_listing(&self, raw: &str, kind: io::ErrorKind) {
        self.state()
            .listing_failures
            .insert(ResourcePath::new(raw), kind);
    }

    pub fn clear_failure(&self, raw: &str) {
        self.state().listing_failures.remove(&ResourcePath::new(raw));
    }

    /// Number of `list` calls served so far
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::Relaxed)
    }
}

fn insert_parents(state: &mut State, path: &ResourcePath) {
    let mut current = path.parent();
    while let Some(dir) = current {
        current = dir.parent();
        state.nodes.entry(dir).or_insert(Node::Dir);
    }
}

fn not_found(path: &ResourcePath) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", path))
}

impl ResourceProvider for MemoryProvider {
    fn exists(&self, path: &ResourcePath) -> bool {
        self.state().nodes.contains_key(path)
    }

    fn is_directory(&self, path: &ResourcePath) -> bool {
        matches!(self.state().nodes.get(path), Some(Node::Dir))
    }

    fn list(&self, path: &ResourcePath) -> io::Result<Vec<ResourceEntry>> {
        self.listings.fetch_add(1, Ordering::Relaxed);
        let state = self.state();

        if let Some(kind) = state.listing_failures.get(path) {
            return Err(io::Error::new(*kind, format!("cannot list {}", path)));
        }
        match state.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", path),
                ))
            }
            None => return Err(not_found(path)),
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent().as_ref() == Some(path))
            .map(|(p, node)| ResourceEntry {
                path: p.clone(),
                is_dir: matches!(node, Node::Dir),
                depth: 1,
            })
            .collect())
    }

    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> io::Result<()> {
        let mut state = self.state();
        if !state.nodes.contains_key(from) {
            return Err(not_found(from));
        }
        if state.nodes.contains_key(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to),
            ));
        }
        match to.parent() {
            Some(parent) if matches!(state.nodes.get(&parent), Some(Node::Dir)) => {}
            _ => return Err(not_found(to)),
        }

        let moved: Vec<(ResourcePath, Node)> = state
            .nodes
            .iter()
            .filter(|(p, _)| p.is_within(from))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        for (old, node) in moved {
            state.nodes.remove(&old);
            if let Some(new) = old.rebase(from, to) {
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn delete(&self, path: &ResourcePath) -> io::Result<()> {
        let mut state = self.state();
        if !state.nodes.contains_key(path) {
            return Err(not_found(path));
        }
        state.nodes.retain(|p, _| !p.is_within(path));
        Ok(())
    }

    fn open_read(&self, path: &ResourcePath) -> io::Result<Box<dyn Read + Send>> {
        match self.state().nodes.get(path) {
            Some(Node::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path),
            )),
            None => Err(not_found(path)),
        }
    }

    fn open_write(&self, path: &ResourcePath) -> io::Result<Box<dyn Write + Send>> {
        {
            let mut state = self.state();
            if matches!(state.nodes.get(path), Some(Node::Dir)) {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("{} is a directory", path),
                ));
            }
            insert_parents(&mut state, path);
            state.nodes.insert(path.clone(), Node::File(Vec::new()));
        }
        Ok(Box::new(MemoryWriter {
            path: path.clone(),
            state: self.state.clone(),
            buffer: Vec::new(),
        }))
    }

    fn size(&self, path: &ResourcePath) -> io::Result<u64> {
        match self.state().nodes.get(path) {
            Some(Node::File(content)) => Ok(content.len() as u64),
            Some(Node::Dir) => Ok(0),
            None => Err(not_found(path)),
        }
    }
}

/// Buffers writes and publishes them on flush and on drop
struct MemoryWriter {
    path: ResourcePath,
    state: Arc<Mutex<State>>,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn publish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .nodes
            .insert(self.path.clone(), Node::File(self.buffer.clone()));
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.publish();
    }
}
