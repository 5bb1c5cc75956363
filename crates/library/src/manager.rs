// FILE: crates/library/src/manager.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use folio_config::{Config, ConfigManager};
use folio_core::{FolioError, LibraryRow, ResourcePath, RowFilter};
use folio_resource::{
    filesystem_roots, special_folders, LocalProvider, ResourceHandle, SharedProvider,
};
use folio_tree::{
    run_listing, run_rename, run_sweep, CancellationFlag, ExpansionState, ListingOutcome, NodeId, NodeState,
    Synchronizer, SweepOutcome, TreeDelta, TreeModel,
};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::bridge::{DeltaReport, ImportReport, LibraryBridge, LibraryListener, RowBatch};
use crate::error::{LibraryError, Result};
use crate::json_store::JsonFileStore;
use crate::metadata::MetadataReaders;
use crate::scanner::{LibraryScanner, ScanOptions, ScanReport};
use crate::selection::{resolve_selection, Selection, SelectionSet};
use crate::store::MetadataStore;

/// Result of background work, delivered back to the owning task
#[derive(Debug)]
pub enum WorkResult {
    Listing(ListingOutcome),
    Sweep(SweepOutcome),
    ScanProgress { root: ResourcePath, scanned: usize },
    ScanFinished {
        scan: u64,
        report: ScanReport,
        batch: RowBatch,
    },
}

/// What applying one [`WorkResult`] did
#[derive(Debug, Clone)]
pub enum WorkSummary {
    TreeChanged { events: usize, rows: DeltaReport },
    ListingFailed { node: NodeId, error: String },
    /// Result for a node, epoch or scan that is gone
    Discarded,
    ScanProgress { root: ResourcePath, scanned: usize },
    Imported { root: ResourcePath, report: ImportReport },
}

/// Owns the tree, the library index and the background work feeding them.
///
/// All mutation happens on the task that owns the manager; filesystem access
/// never does. Listings, sweeps and scans run on Tokio's blocking pool and
/// come back as [`WorkResult`]s, which [`process_next`](Self::process_next)
/// applies one at a time. The `async` operations (rename, delete, reveal and
/// friends) await their own blocking step and apply it before returning.
/// Everything here must be called from within a Tokio runtime.
pub struct LibraryManager<S: MetadataStore = JsonFileStore> {
    sync: Synchronizer,
    bridge: LibraryBridge<S>,
    provider: SharedProvider,
    config: Config,
    config_manager: Option<ConfigManager>,
    readers: Arc<MetadataReaders>,
    tx: UnboundedSender<WorkResult>,
    rx: UnboundedReceiver<WorkResult>,
    pending: usize,
    next_scan: u64,
    scans: HashMap<ResourcePath, (u64, CancellationFlag)>,
}

impl LibraryManager<JsonFileStore> {
    /// Opens the library described by the configuration in `config_manager`,
    /// on the local filesystem
    pub fn open(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.load()?;
        let store_path = config_manager.store_path(&config);
        info!("Opening library store {}", store_path.display());
        let store = JsonFileStore::open(store_path)?;

        let provider: SharedProvider = Arc::new(LocalProvider::new());
        let mut manager = Self::new(store, provider, config);
        manager.config_manager = Some(config_manager);
        Ok(manager)
    }
}

impl<S: MetadataStore> LibraryManager<S> {
    pub fn new(store: S, provider: SharedProvider, config: Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let model = TreeModel::with_hidden(config.tree.show_hidden);
        Self {
            sync: Synchronizer::new(model),
            bridge: LibraryBridge::new(store),
            provider,
            config,
            config_manager: None,
            readers: Arc::new(MetadataReaders::new()),
            tx,
            rx,
            pending: 0,
            next_scan: 0,
            scans: HashMap::new(),
        }
    }

    /// Persists configuration changes through `config_manager`
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn with_readers(mut self, readers: MetadataReaders) -> Self {
        self.readers = Arc::new(readers);
        self
    }

    // ===== Accessors =====

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn synchronizer_mut(&mut self) -> &mut Synchronizer {
        &mut self.sync
    }

    pub fn model(&self) -> &TreeModel {
        self.sync.model()
    }

    pub fn store(&self) -> &S {
        self.bridge.store()
    }

    pub fn bridge(&self) -> &LibraryBridge<S> {
        &self.bridge
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn add_library_listener(&mut self, listener: Box<dyn LibraryListener>) {
        self.bridge.add_listener(listener);
    }

    /// Background results not yet applied
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_scanning(&self, root: &ResourcePath) -> bool {
        self.scans.contains_key(root)
    }

    pub fn handle(&self, path: impl Into<ResourcePath>) -> ResourceHandle {
        ResourceHandle::new(self.provider.clone(), path.into())
    }

    pub fn rows(&self, filter: &RowFilter) -> Result<Vec<LibraryRow>> {
        Ok(self.bridge.store().list_rows(filter)?)
    }

    // ===== Roots =====

    /// Adds the configured roots: special folders, then filesystem roots,
    /// then library base paths. Returns the number of roots added.
    pub fn install_default_roots(&mut self) -> usize {
        let mut paths = Vec::new();
        if self.config.tree.include_special_folders {
            paths.extend(special_folders());
        }
        if self.config.tree.include_filesystem_roots {
            paths.extend(filesystem_roots());
        }
        paths.extend(
            self.config
                .library
                .base_paths
                .iter()
                .map(ResourcePath::new),
        );

        let before = self.sync.roots().len();
        for path in paths {
            let handle = self.handle(path);
            self.sync.add_root(handle);
        }
        let added = self.sync.roots().len() - before;
        debug!("Installed {} default roots", added);
        added
    }

    /// Registers a library base path: persists it, shows it as a root and
    /// starts scanning it. Returns `false` when it was already registered.
    pub async fn add_base_path(&mut self, path: &ResourcePath) -> Result<bool> {
        let handle = self.handle(path.clone());
        let dir = handle.clone();
        if !blocking("Directory check", move || dir.is_directory()).await? {
            return Err(LibraryError::NotADirectory(path.to_string()));
        }

        let added = self
            .config
            .library
            .add_base_path(path.as_path().to_path_buf());
        self.persist_config()?;
        self.sync.add_root(handle.clone());
        if added {
            info!("Added base path {}", path);
            self.spawn_scan(handle);
        }
        Ok(added)
    }

    /// Unregisters a base path, cancels its scan, removes its root and every
    /// row below it. Returns the number of rows removed.
    pub fn remove_base_path(&mut self, path: &ResourcePath) -> Result<usize> {
        if let Some((_, cancel)) = self.scans.remove(path) {
            debug!("Cancelling scan of {}", path);
            cancel.cancel();
        }
        if self.config.library.remove_base_path(path.as_path()) {
            self.persist_config()?;
        }

        let delta = self.sync.remove_root(path);
        let removed = if delta.is_empty() {
            self.bridge.on_root_removed(std::slice::from_ref(path))?
        } else {
            self.bridge.on_tree_delta(&delta)?.rows_removed
        };
        info!("Removed base path {} ({} rows)", path, removed);
        Ok(removed)
    }

    // ===== Tree =====

    /// Expands `node`, listing it in the background when it was never
    /// loaded or its last listing failed
    pub fn expand(&mut self, node: NodeId) -> Result<()> {
        let Some(entry) = self.sync.model().node(node) else {
            return Err(FolioError::not_found(node).into());
        };
        if !entry.is_dir() {
            return Ok(());
        }
        if matches!(entry.state(), NodeState::Unloaded | NodeState::LoadFailed) {
            let job = self.sync.begin_listing(node)?;
            self.spawn_listing(job);
        }
        self.sync.mark_expanded(node);
        Ok(())
    }

    pub fn collapse(&mut self, node: NodeId) -> bool {
        self.sync.collapse(node)
    }

    /// Starts a background re-listing of the entry for `path` (or of its
    /// directory). Returns `false` when that directory was never loaded.
    pub fn refresh(&mut self, path: &ResourcePath) -> Result<bool> {
        match self.sync.begin_refresh(path)? {
            Some(job) => {
                self.spawn_listing(job);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finds the node for `path`, loading directories on the way down
    pub async fn reveal(&mut self, path: &ResourcePath) -> Result<NodeId> {
        loop {
            let not_found = || LibraryError::from(FolioError::not_found(path));
            let node = self.sync.model().nearest(path).ok_or_else(not_found)?;
            let entry = self.sync.model().node(node).ok_or_else(not_found)?;
            if entry.path() == path {
                return Ok(node);
            }
            if !entry.is_dir() {
                return Err(not_found());
            }
            match entry.state() {
                NodeState::Unloaded | NodeState::Loading | NodeState::LoadFailed => {
                    self.load(node).await?
                }
                NodeState::Loaded | NodeState::Stale | NodeState::Removed => {
                    return Err(not_found())
                }
            }
        }
    }

    /// Renames `node` on disk and in the tree, keeping its row, then
    /// re-lists the parent in the background. Returns the new identity.
    pub async fn rename(&mut self, node: NodeId, new_name: &str) -> Result<ResourcePath> {
        let job = self.sync.begin_rename(node, new_name)?;
        let delta = self.sync.finish_rename(run_rename(job).await)?;
        self.apply_delta(&delta)?;

        let (current, parent) = match self.sync.model().node(node) {
            Some(n) => (
                n.path().clone(),
                n.parent()
                    .and_then(|p| self.sync.model().node(p))
                    .map(|p| p.path().clone()),
            ),
            None => return Err(FolioError::not_found(node).into()),
        };
        if let Some(parent) = parent {
            if let Err(e) = self.refresh(&parent) {
                warn!("Cannot refresh {} after rename: {}", parent, e);
            }
        }
        Ok(current)
    }

    /// Renames the entry at `path`, revealing it in the tree first
    pub async fn rename_path(&mut self, path: &ResourcePath, new_name: &str) -> Result<ResourcePath> {
        let node = self.reveal(path).await?;
        self.rename(node, new_name).await
    }

    /// Deletes the selected files, drops their rows and sweeps the tree.
    ///
    /// Entries that are already gone count as deleted. Other failures are
    /// logged; the first one is returned after the rest were processed.
    pub async fn delete_selection(&mut self, selection: &Selection) -> Result<Vec<ResourcePath>> {
        let set = self.resolve(selection)?;
        let handles: Vec<ResourceHandle> = set
            .resources()
            .iter()
            .map(|r| self.handle(r.clone()))
            .collect();
        let results = blocking("Delete", move || {
            handles
                .into_iter()
                .map(|handle| {
                    let result = handle.delete();
                    (handle.path().clone(), result)
                })
                .collect::<Vec<_>>()
        })
        .await?;

        let mut deleted = Vec::new();
        let mut first_error = None;
        for (resource, result) in results {
            match result {
                Ok(()) => deleted.push(resource),
                Err(e) => {
                    let err = FolioError::io(&resource, e);
                    if err.is_benign() {
                        deleted.push(resource);
                    } else {
                        warn!("Cannot delete {}: {}", resource, err);
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        self.bridge.on_resources_deleted(&deleted)?;
        let outcome = run_sweep(self.sync.begin_sweep()).await;
        let delta = self.sync.finish_sweep(outcome);
        self.apply_delta(&delta)?;
        info!("Deleted {} of {} selected entries", deleted.len(), set.len());

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(deleted),
        }
    }

    /// Starts a background sweep of displayed entries deleted on disk
    pub fn sweep(&mut self) {
        let job = self.sync.begin_sweep();
        if job.is_empty() {
            return;
        }
        let tx = self.tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let outcome = run_sweep(job).await;
            let _ = tx.send(WorkResult::Sweep(outcome));
        });
    }

    // ===== Library =====

    /// Rescans every base path. Returns the number of scans started.
    pub fn scan_all(&mut self) -> usize {
        let roots: Vec<ResourcePath> = self
            .config
            .library
            .base_paths
            .iter()
            .map(ResourcePath::new)
            .collect();
        let count = roots.len();
        for root in roots {
            let handle = self.handle(root);
            self.spawn_scan(handle);
        }
        count
    }

    /// Removes rows whose file no longer exists
    pub async fn prune_missing_rows(&mut self) -> Result<Vec<LibraryRow>> {
        let resources = self.bridge.resources()?;
        let provider = self.provider.clone();
        let missing = blocking("Prune", move || {
            resources
                .into_iter()
                .filter(|resource| !provider.exists(resource))
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(self.bridge.remove_missing(&missing)?)
    }

    /// Re-reads metadata for the selected, indexed resources
    pub async fn refresh_rows(&mut self, selection: &Selection) -> Result<Vec<LibraryRow>> {
        let handles: Vec<ResourceHandle> = self
            .resolve(selection)?
            .resources()
            .iter()
            .map(|r| self.handle(r.clone()))
            .collect();
        let indexed = self.bridge.indexed(&handles)?;
        let handles: Vec<ResourceHandle> = handles
            .into_iter()
            .filter(|h| indexed.contains(h.path()))
            .collect();

        let readers = self.readers.clone();
        let batch = blocking("Metadata", move || {
            RowBatch::read(&handles, &readers, &HashSet::new())
        })
        .await?;
        Ok(self.bridge.refresh_batch(batch)?)
    }

    pub fn resolve(&self, selection: &Selection) -> Result<SelectionSet> {
        Ok(resolve_selection(
            selection,
            self.sync.model(),
            self.bridge.store(),
        )?)
    }

    // ===== Background work =====

    fn spawn_listing(&mut self, job: folio_tree::ListingJob) {
        debug!("Listing {} in the background", job.handle());
        let tx = self.tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let outcome = run_listing(job).await;
            let _ = tx.send(WorkResult::Listing(outcome));
        });
    }

    fn spawn_scan(&mut self, root: ResourceHandle) {
        let path = root.path().clone();
        self.next_scan += 1;
        let scan = self.next_scan;
        let cancel = CancellationFlag::new();
        if let Some((_, previous)) = self.scans.insert(path.clone(), (scan, cancel.clone())) {
            previous.cancel();
        }

        let scanner = LibraryScanner::new(ScanOptions::from(&self.config.library));
        let known: HashSet<ResourcePath> = match self
            .bridge
            .store()
            .list_rows(&RowFilter::within(path.clone()))
        {
            Ok(rows) => rows.into_iter().map(|row| row.resource).collect(),
            Err(e) => {
                warn!("Cannot list indexed rows below {}: {}", path, e);
                HashSet::new()
            }
        };
        let readers = self.readers.clone();
        let tx = self.tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress_root = path.clone();
            let task = tokio::task::spawn_blocking(move || {
                let report = scanner.scan_root(&root, &cancel, |scanned| {
                    let _ = progress_tx.send(WorkResult::ScanProgress {
                        root: progress_root.clone(),
                        scanned,
                    });
                });
                let batch = if report.cancelled {
                    RowBatch::default()
                } else {
                    RowBatch::read(&report.found, &readers, &known)
                };
                (report, batch)
            });
            let (report, batch) = match task.await {
                Ok(done) => done,
                Err(e) => {
                    error!("Scan task for {} failed: {}", path, e);
                    (ScanReport::aborted(path, e.to_string()), RowBatch::default())
                }
            };
            let _ = tx.send(WorkResult::ScanFinished {
                scan,
                report,
                batch,
            });
        });
    }

    /// Waits for the next background result and applies it. Returns `None`
    /// once nothing is pending.
    pub async fn process_next(&mut self) -> Result<Option<WorkSummary>> {
        if self.pending == 0 {
            return Ok(None);
        }
        let Some(result) = self.rx.recv().await else {
            self.pending = 0;
            return Ok(None);
        };
        self.apply(result).map(Some)
    }

    /// Applies background results until none are pending
    pub async fn run_until_idle(&mut self) -> Result<Vec<WorkSummary>> {
        let mut summaries = Vec::new();
        while let Some(summary) = self.process_next().await? {
            summaries.push(summary);
        }
        Ok(summaries)
    }

    fn apply(&mut self, result: WorkResult) -> Result<WorkSummary> {
        match result {
            WorkResult::Listing(outcome) => {
                self.pending -= 1;
                let node = outcome.node();
                match self.sync.finish_listing(outcome) {
                    Ok(delta) => {
                        let rows = self.apply_delta(&delta)?;
                        Ok(WorkSummary::TreeChanged {
                            events: delta.len(),
                            rows,
                        })
                    }
                    Err(e @ FolioError::StaleState { .. }) => {
                        debug!("Discarding listing result: {}", e);
                        Ok(WorkSummary::Discarded)
                    }
                    Err(e) => {
                        warn!("Listing of node {} failed: {}", node, e);
                        Ok(WorkSummary::ListingFailed {
                            node,
                            error: e.user_message(),
                        })
                    }
                }
            }
            WorkResult::Sweep(outcome) => {
                self.pending -= 1;
                let delta = self.sync.finish_sweep(outcome);
                let rows = self.apply_delta(&delta)?;
                Ok(WorkSummary::TreeChanged {
                    events: delta.len(),
                    rows,
                })
            }
            WorkResult::ScanProgress { root, scanned } => {
                debug!("Scanning {}: {} entries", root, scanned);
                Ok(WorkSummary::ScanProgress { root, scanned })
            }
            WorkResult::ScanFinished {
                scan,
                report,
                batch,
            } => {
                self.pending -= 1;
                let current = matches!(self.scans.get(&report.root), Some((id, _)) if *id == scan);
                if !current || report.cancelled {
                    debug!("Discarding scan result for {}", report.root);
                    return Ok(WorkSummary::Discarded);
                }
                self.scans.remove(&report.root);

                let imported = self.bridge.import_batch(batch)?;
                info!(
                    "Scan of {}: {} new rows, {} already indexed",
                    report.root,
                    imported.added_count(),
                    imported.already_indexed
                );
                Ok(WorkSummary::Imported {
                    root: report.root,
                    report: imported,
                })
            }
        }
    }

    fn apply_delta(&mut self, delta: &TreeDelta) -> Result<DeltaReport> {
        if delta.is_empty() {
            return Ok(DeltaReport::default());
        }
        Ok(self.bridge.on_tree_delta(delta)?)
    }

    // ===== Expansion & lifecycle =====

    /// Records the expanded entries into the configuration
    pub fn capture_expansion(&mut self) -> ExpansionState {
        let state = self.sync.capture_expansion();
        self.config.tree.expanded_paths = state.paths().to_vec();
        state
    }

    /// Re-expands the entries recorded in the configuration, loading them
    /// as needed. Returns the last node reattached.
    pub async fn restore_expansion(&mut self) -> Option<NodeId> {
        let state = ExpansionState::from_paths(self.config.tree.expanded_paths.clone());
        let mut last = None;
        for segments in state.paths() {
            let Some((first, rest)) = segments.split_first() else {
                continue;
            };
            let Some(mut current) = self.sync.model().find_root(&ResourcePath::new(first)) else {
                debug!("Expanded root {} is gone", first);
                continue;
            };
            if let Err(e) = self.open_node(current).await {
                warn!("Cannot restore expansion of {}: {}", first, e);
                continue;
            }
            last = Some(current);

            for name in rest {
                let model = self.sync.model();
                let Some(target) = model.node(current).map(|n| n.path().join(name)) else {
                    break;
                };
                let next = model.loaded_children(current).iter().copied().find(|c| {
                    model.node(*c).map(|n| n.path() == &target).unwrap_or(false)
                });
                let Some(next) = next else {
                    debug!("Expanded entry {} is gone", target);
                    break;
                };
                if let Err(e) = self.open_node(next).await {
                    warn!("Cannot restore expansion of {}: {}", target, e);
                    break;
                }
                current = next;
                last = Some(current);
            }
        }
        last
    }

    /// Loads `node` if needed, then marks it expanded
    async fn open_node(&mut self, node: NodeId) -> Result<()> {
        if matches!(
            self.sync.model().state(node),
            NodeState::Unloaded | NodeState::Loading | NodeState::LoadFailed
        ) {
            self.load(node).await?;
        }
        self.sync.mark_expanded(node);
        Ok(())
    }

    /// Lists `node` on the blocking pool and applies the result
    async fn load(&mut self, node: NodeId) -> Result<()> {
        let job = self.sync.begin_listing(node)?;
        let delta = self.sync.finish_listing(run_listing(job).await)?;
        self.apply_delta(&delta)?;
        Ok(())
    }

    fn persist_config(&self) -> Result<()> {
        if let Some(config_manager) = &self.config_manager {
            config_manager.save(&self.config)?;
        }
        Ok(())
    }

    /// Cancels running scans and saves the expansion state
    pub fn shutdown(mut self) -> Result<()> {
        for (root, (_, cancel)) in self.scans.drain() {
            debug!("Cancelling scan of {}", root);
            cancel.cancel();
        }
        self.capture_expansion();
        self.persist_config()?;
        info!("Library closed");
        Ok(())
    }
}

/// Runs `task` on the blocking pool
async fn blocking<T, F>(what: &str, task: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        error!("{} task failed: {}", what, e);
        LibraryError::from(FolioError::Internal {
            message: format!("{} task failed: {}", what, e),
        })
    })
}

impl<S: MetadataStore + std::fmt::Debug> std::fmt::Debug for LibraryManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("roots", &self.sync.roots().len())
            .field("bridge", &self.bridge)
            .field("pending", &self.pending)
            .field("scans", &self.scans.len())
            .finish()
    }
}
