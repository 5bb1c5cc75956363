// FILE: crates/library/tests/manager_tests.rs
//! Integration tests for LibraryManager over an in-memory filesystem

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use folio_config::{Config, ConfigManager};
use folio_core::{ResourcePath, RowFilter};
use folio_library::{
    ImportReport, LibraryError, LibraryEvent, LibraryListener, LibraryManager, LibraryResult,
    MemoryStore, MetadataStore, Selection, WorkSummary,
};
use folio_resource::{MemoryProvider, ResourceEntry, ResourceProvider, SharedProvider};
use folio_tree::NodeState;
use tempfile::TempDir;

type Manager = LibraryManager<MemoryStore>;

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<LibraryEvent>>>);

impl LibraryListener for Recorder {
    fn on_library_event(&self, event: &LibraryEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event.clone());
        }
    }
}

impl Recorder {
    fn events(&self) -> Vec<LibraryEvent> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

fn library() -> MemoryProvider {
    let memory = MemoryProvider::new();
    memory.add_file("/lib/Frank Herbert - Dune.epub", b"PK\x03\x04dune");
    memory.add_file("/lib/sub/Manual.pdf", b"%PDF-1.7");
    memory.add_file("/lib/x.epub", b"PK\x03\x04x");
    memory.add_file("/lib/notes.md", b"not a book");
    memory.add_file("/other/Kept.epub", b"PK\x03\x04kept");
    memory
}

fn manager(memory: &MemoryProvider) -> Manager {
    let _ = env_logger::builder().is_test(true).try_init();
    let provider: SharedProvider = Arc::new(memory.clone());
    let mut config = Config::default();
    config.tree.include_special_folders = false;
    config.tree.include_filesystem_roots = false;
    LibraryManager::new(MemoryStore::new(), provider, config)
}

fn imports(summaries: &[WorkSummary]) -> Vec<&ImportReport> {
    summaries
        .iter()
        .filter_map(|s| match s {
            WorkSummary::Imported { report, .. } => Some(report),
            _ => None,
        })
        .collect()
}

async fn indexed(memory: &MemoryProvider) -> LibraryResult<Manager> {
    let mut manager = manager(memory);
    manager.add_base_path(&ResourcePath::new("/lib")).await?;
    manager.run_until_idle().await?;
    Ok(manager)
}

#[tokio::test]
async fn test_add_base_path_scans_and_imports() -> LibraryResult<()> {
    let memory = library();
    let mut manager = manager(&memory);
    let recorder = Recorder::default();
    manager.add_library_listener(Box::new(recorder.clone()));

    assert!(manager.add_base_path(&ResourcePath::new("/lib")).await?);
    assert!(manager.is_scanning(&ResourcePath::new("/lib")));
    assert_eq!(manager.pending(), 1);

    let summaries = manager.run_until_idle().await?;
    let reports = imports(&summaries);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].added_count(), 3);
    assert!(!manager.is_scanning(&ResourcePath::new("/lib")));

    let dune = manager
        .store()
        .get_row(&ResourcePath::new("/lib/Frank Herbert - Dune.epub"))?
        .ok_or_else(|| LibraryError::RowNotFound("Dune".to_string()))?;
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.authors, vec!["Frank Herbert"]);

    assert_eq!(manager.synchronizer().roots().len(), 1);
    assert_eq!(manager.config().library.base_paths.len(), 1);
    assert_eq!(recorder.events().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_adding_same_base_path_twice_does_not_rescan() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;

    assert!(!manager.add_base_path(&ResourcePath::new("/lib/")).await?);
    assert_eq!(manager.pending(), 0);
    assert_eq!(manager.synchronizer().roots().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rescan_skips_indexed_rows() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    memory.add_file("/lib/New.fb2", b"<?xml version=\"1.0\"?><FictionBook>");

    assert_eq!(manager.scan_all(), 1);
    let summaries = manager.run_until_idle().await?;
    let reports = imports(&summaries);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].added_count(), 1);
    assert_eq!(reports[0].already_indexed, 3);
    assert_eq!(manager.store().len()?, 4);
    Ok(())
}

#[tokio::test]
async fn test_superseded_scan_is_discarded() -> LibraryResult<()> {
    let memory = library();
    let mut manager = manager(&memory);
    manager.add_base_path(&ResourcePath::new("/lib")).await?;
    manager.scan_all();

    let summaries = manager.run_until_idle().await?;
    assert_eq!(imports(&summaries).len(), 1);
    assert!(summaries
        .iter()
        .any(|s| matches!(s, WorkSummary::Discarded)));
    assert_eq!(manager.store().len()?, 3);
    Ok(())
}

#[tokio::test]
async fn test_remove_base_path_removes_exactly_its_rows() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    manager.add_base_path(&ResourcePath::new("/other")).await?;
    manager.run_until_idle().await?;
    assert_eq!(manager.store().len()?, 4);

    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;

    let removed = manager.remove_base_path(&ResourcePath::new("/lib"))?;
    assert_eq!(removed, 3);
    assert_eq!(manager.store().len()?, 1);
    assert!(manager
        .store()
        .get_row(&ResourcePath::new("/other/Kept.epub"))?
        .is_some());
    assert_eq!(manager.synchronizer().roots().len(), 1);
    assert_eq!(manager.config().library.base_paths.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_remove_base_path_cancels_running_scan() -> LibraryResult<()> {
    let memory = library();
    let mut manager = manager(&memory);
    manager.add_base_path(&ResourcePath::new("/lib")).await?;
    manager.remove_base_path(&ResourcePath::new("/lib"))?;

    let summaries = manager.run_until_idle().await?;
    assert!(imports(&summaries).is_empty());
    assert!(manager.store().is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_expand_lists_in_background() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];

    manager.expand(root)?;
    assert_eq!(manager.model().state(root), NodeState::Loading);
    assert!(manager.synchronizer().is_expanded(root));

    let summaries = manager.run_until_idle().await?;
    assert!(matches!(
        summaries.as_slice(),
        [WorkSummary::TreeChanged { events, .. }] if *events > 0
    ));
    assert_eq!(manager.model().state(root), NodeState::Loaded);
    // The tree lists every file; only the scan filters by extension
    assert_eq!(manager.model().loaded_children(root).len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_listing_superseded_by_inline_reconcile_is_discarded() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];

    manager.expand(root)?;
    manager.synchronizer_mut().reconcile(root)?;
    let children = manager.model().loaded_children(root).to_vec();

    let summaries = manager.run_until_idle().await?;
    assert!(matches!(summaries.as_slice(), [WorkSummary::Discarded]));
    assert_eq!(manager.model().loaded_children(root), children.as_slice());
    Ok(())
}

#[tokio::test]
async fn test_listing_of_removed_root_is_discarded() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];

    manager.expand(root)?;
    manager.remove_base_path(&ResourcePath::new("/lib"))?;

    let summaries = manager.run_until_idle().await?;
    assert!(matches!(summaries.as_slice(), [WorkSummary::Discarded]));
    assert!(manager.model().node(root).is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_listing_is_reported() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];
    memory.fail_listing("/lib", std::io::ErrorKind::PermissionDenied);

    manager.expand(root)?;
    let summaries = manager.run_until_idle().await?;
    assert!(matches!(
        summaries.as_slice(),
        [WorkSummary::ListingFailed { node, .. }] if *node == root
    ));
    assert_eq!(manager.model().state(root), NodeState::LoadFailed);

    memory.clear_failure("/lib");
    manager.expand(root)?;
    manager.run_until_idle().await?;
    assert_eq!(manager.model().state(root), NodeState::Loaded);
    Ok(())
}

#[tokio::test]
async fn test_rename_keeps_node_and_row() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let old = ResourcePath::new("/lib/x.epub");
    let row = manager
        .store()
        .get_row(&old)?
        .ok_or_else(|| LibraryError::RowNotFound(old.to_string()))?;
    let node = manager.reveal(&old).await?;

    let current = manager.rename_path(&old, "y.epub").await?;
    assert_eq!(current, ResourcePath::new("/lib/y.epub"));
    assert_eq!(manager.model().find(&current), Some(node));
    assert!(manager.model().find(&old).is_none());

    // The parent re-listing runs in the background and keeps the node
    assert_eq!(manager.pending(), 1);
    manager.run_until_idle().await?;
    assert_eq!(manager.model().find(&current), Some(node));

    let renamed = manager
        .store()
        .get_row_by_id(row.id)?
        .ok_or_else(|| LibraryError::RowNotFound(row.id.to_string()))?;
    assert_eq!(renamed.resource, current);
    assert_eq!(renamed.display_name, "y.epub");
    assert_eq!(renamed.added, row.added);
    assert!(manager.store().get_row(&old)?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_rename_onto_existing_entry_fails() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;

    let err = manager
        .rename_path(&ResourcePath::new("/lib/x.epub"), "notes.md")
        .await
        .unwrap_err();
    assert!(!err.is_benign());
    assert!(manager
        .store()
        .get_row(&ResourcePath::new("/lib/x.epub"))?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn test_delete_selection_removes_files_rows_and_nodes() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;

    let target = ResourcePath::new("/lib/x.epub");
    let row = manager
        .store()
        .get_row(&target)?
        .ok_or_else(|| LibraryError::RowNotFound(target.to_string()))?;

    let deleted = manager.delete_selection(&Selection::Table(vec![row.id])).await?;
    assert_eq!(deleted, vec![target.clone()]);
    assert!(!manager.provider().exists(&target));
    assert!(manager.store().get_row(&target)?.is_none());
    assert!(manager.model().find(&target).is_none());
    assert_eq!(manager.store().len()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_delete_of_directory_drops_rows_below_it() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let sub = manager.reveal(&ResourcePath::new("/lib/sub")).await?;

    manager.delete_selection(&Selection::Tree(vec![sub])).await?;
    assert!(manager
        .store()
        .list_rows(&RowFilter::within(ResourcePath::new("/lib/sub")))?
        .is_empty());
    assert_eq!(manager.store().len()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_background_sweep_drops_rows_of_deleted_files() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;

    memory.remove("/lib/x.epub");
    manager.sweep();
    let summaries = manager.run_until_idle().await?;

    assert!(matches!(
        summaries.as_slice(),
        [WorkSummary::TreeChanged { rows, .. }] if rows.rows_removed == 1
    ));
    assert!(manager
        .model()
        .find(&ResourcePath::new("/lib/x.epub"))
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_sweep_racing_a_rename_keeps_the_renamed_entry() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;
    let old = ResourcePath::new("/lib/x.epub");
    let node = manager.reveal(&old).await?;

    manager.sweep();
    let current = manager.rename(node, "y.epub").await?;
    manager.run_until_idle().await?;

    assert_eq!(current, ResourcePath::new("/lib/y.epub"));
    assert_eq!(manager.model().find(&current), Some(node));
    assert!(manager.store().get_row(&current)?.is_some());
    assert!(manager.store().get_row(&old)?.is_none());
    assert_eq!(manager.store().len()?, 3);
    Ok(())
}

#[tokio::test]
async fn test_prune_missing_rows() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    memory.remove("/lib/sub");

    let pruned = manager.prune_missing_rows().await?;
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].resource, ResourcePath::new("/lib/sub/Manual.pdf"));
    assert!(manager.prune_missing_rows().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_refresh_rows_keeps_ids() -> LibraryResult<()> {
    let memory = library();
    let mut manager = indexed(&memory).await?;
    let target = ResourcePath::new("/lib/x.epub");
    let before = manager
        .store()
        .get_row(&target)?
        .ok_or_else(|| LibraryError::RowNotFound(target.to_string()))?;
    memory.add_file("/lib/x.epub", b"PK\x03\x04 a longer body");

    let refreshed = manager.refresh_rows(&Selection::Table(vec![before.id])).await?;
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].id, before.id);
    assert_eq!(refreshed[0].file_size, 18);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_persists_expansion() -> LibraryResult<()> {
    let memory = library();
    let temp = TempDir::new()?;
    let config_manager = ConfigManager::with_directory(temp.path().to_path_buf())?;

    let mut manager = manager(&memory).with_config_manager(config_manager.clone());
    manager.add_base_path(&ResourcePath::new("/lib")).await?;
    manager.run_until_idle().await?;
    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;
    let sub = manager.reveal(&ResourcePath::new("/lib/sub")).await?;
    manager.expand(sub)?;
    manager.run_until_idle().await?;
    manager.shutdown()?;

    let saved = config_manager.load()?;
    assert_eq!(saved.library.base_paths.len(), 1);
    assert_eq!(
        saved.tree.expanded_paths,
        vec![
            vec!["/lib".to_string()],
            vec!["/lib".to_string(), "sub".to_string()]
        ]
    );

    let mut restored = manager_from(&memory, saved);
    restored.install_default_roots();
    let last = restored.restore_expansion().await;
    assert_eq!(
        last.and_then(|id| restored.model().node(id).map(|n| n.path().clone())),
        Some(ResourcePath::new("/lib/sub"))
    );
    Ok(())
}

fn manager_from(memory: &MemoryProvider, config: Config) -> Manager {
    let provider: SharedProvider = Arc::new(memory.clone());
    LibraryManager::new(MemoryStore::new(), provider, config)
}

/// Counts provider calls made on the thread that owns the manager
#[derive(Debug)]
struct OwnerThreadWatch {
    inner: MemoryProvider,
    owner: ThreadId,
    on_owner: AtomicUsize,
}

impl OwnerThreadWatch {
    fn new(inner: MemoryProvider) -> Self {
        Self {
            inner,
            owner: thread::current().id(),
            on_owner: AtomicUsize::new(0),
        }
    }

    fn check(&self) {
        if thread::current().id() == self.owner {
            self.on_owner.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn calls_on_owner(&self) -> usize {
        self.on_owner.load(Ordering::Relaxed)
    }
}

impl ResourceProvider for OwnerThreadWatch {
    fn exists(&self, path: &ResourcePath) -> bool {
        self.check();
        self.inner.exists(path)
    }

    fn is_directory(&self, path: &ResourcePath) -> bool {
        self.check();
        self.inner.is_directory(path)
    }

    fn list(&self, path: &ResourcePath) -> io::Result<Vec<ResourceEntry>> {
        self.check();
        self.inner.list(path)
    }

    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> io::Result<()> {
        self.check();
        self.inner.rename(from, to)
    }

    fn delete(&self, path: &ResourcePath) -> io::Result<()> {
        self.check();
        self.inner.delete(path)
    }

    fn open_read(&self, path: &ResourcePath) -> io::Result<Box<dyn Read + Send>> {
        self.check();
        self.inner.open_read(path)
    }

    fn open_write(&self, path: &ResourcePath) -> io::Result<Box<dyn Write + Send>> {
        self.check();
        self.inner.open_write(path)
    }

    fn size(&self, path: &ResourcePath) -> io::Result<u64> {
        self.check();
        self.inner.size(path)
    }
}

#[tokio::test]
async fn test_filesystem_work_stays_off_the_owner_thread() -> LibraryResult<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let memory = library();
    let watch = Arc::new(OwnerThreadWatch::new(memory.clone()));
    let provider: SharedProvider = watch.clone();
    let mut config = Config::default();
    config.tree.include_special_folders = false;
    config.tree.include_filesystem_roots = false;
    let mut manager = LibraryManager::new(MemoryStore::new(), provider, config);

    manager.add_base_path(&ResourcePath::new("/lib")).await?;
    manager.run_until_idle().await?;
    let root = manager.synchronizer().roots()[0];
    manager.expand(root)?;
    manager.run_until_idle().await?;

    // A refresh only queues the listing
    let listings = memory.listing_count();
    assert!(manager.refresh(&ResourcePath::new("/lib"))?);
    assert_eq!(manager.pending(), 1);
    assert_eq!(memory.listing_count(), listings);
    manager.run_until_idle().await?;
    assert_eq!(memory.listing_count(), listings + 1);

    let manual = manager.reveal(&ResourcePath::new("/lib/sub/Manual.pdf")).await?;
    manager
        .rename_path(&ResourcePath::new("/lib/x.epub"), "y.epub")
        .await?;
    manager.run_until_idle().await?;
    let target = ResourcePath::new("/lib/y.epub");
    let row = manager
        .store()
        .get_row(&target)?
        .ok_or_else(|| LibraryError::RowNotFound(target.to_string()))?;
    manager.refresh_rows(&Selection::Table(vec![row.id])).await?;
    manager.delete_selection(&Selection::Tree(vec![manual])).await?;
    manager.sweep();
    manager.run_until_idle().await?;
    memory.remove("/lib/notes.md");
    manager.prune_missing_rows().await?;
    manager.scan_all();
    manager.run_until_idle().await?;

    assert!(!memory.exists(&ResourcePath::new("/lib/sub/Manual.pdf")));
    assert_eq!(manager.store().len()?, 2);
    assert_eq!(watch.calls_on_owner(), 0);
    Ok(())
}
