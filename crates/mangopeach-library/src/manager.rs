//! Library registration, rescans and bundle reads across libraries.

use std::sync::Arc;

use dashmap::DashMap;
use mangopeach_analyze::{ChangeSet, reconcile};
use mangopeach_core::{
    Bundle, BundleDetails, BundleId, CatalogError, CatalogTree, FileHandle, FileSystemProvider,
    Library, LibraryConfig, LibraryId, LibraryKind, LibraryStore, LibraryUpdate, NewLibrary,
    ParentScope, ScanConfig,
};
use mangopeach_scan::{ProviderRegistry, ScanOutcome, ScanProgress, ScanRegistry, Scanner};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::scheduler::{JobRun, Scheduler, parse_interval};

/// Owns the scanners of every registered library.
///
/// One [`Scanner`] is built per library from the filesystem backend
/// registered for its type. All scanners share a single [`ScanRegistry`], so
/// a library is never scanned twice at once even when a scheduled rescan
/// overlaps a manual one.
pub struct LibraryManager {
    store: Arc<dyn LibraryStore>,
    providers: ProviderRegistry,
    scan_config: ScanConfig,
    registry: ScanRegistry,
    scanners: DashMap<LibraryId, Arc<Scanner>>,
    recently_deleted: DashMap<LibraryId, Vec<Bundle>>,
    scheduler: Scheduler,
}

impl LibraryManager {
    /// Create a manager. Fails if the scan config's ignore patterns are invalid.
    pub fn new(
        store: Arc<dyn LibraryStore>,
        providers: ProviderRegistry,
        scan_config: ScanConfig,
    ) -> Result<Self, CatalogError> {
        scan_config.ignore_matcher()?;
        Ok(Self {
            store,
            providers,
            scan_config,
            registry: ScanRegistry::new(),
            scanners: DashMap::new(),
            recently_deleted: DashMap::new(),
            scheduler: Scheduler::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    /// Registry of running scans.
    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Resolve a configured library to its persistent record.
    ///
    /// The record is looked up by the durable handle of the root directory,
    /// then by path, and created when neither matches. Edited settings are
    /// written back onto an existing record.
    pub async fn register(&self, config: &LibraryConfig) -> Result<Library, CatalogError> {
        let fs = self.filesystem(config.kind)?;
        let handle = match fs.stat(&config.path).await {
            Ok(stat) => stat.handle,
            Err(err) => {
                warn!(
                    library = %config.name,
                    path = %config.path.display(),
                    error = %err,
                    "Could not stat library root"
                );
                None
            }
        };

        let by_handle = match &handle {
            Some(handle) => self.store.find_library_by_handle(handle).await?,
            None => None,
        };
        let existing = match by_handle {
            Some(library) => Some(library),
            None => self.store.find_library_by_path(&config.path).await?,
        };

        let library = match existing {
            Some(library) => {
                let update = library_update(&library, config, handle.as_ref());
                if update.is_empty() {
                    debug!(library = %library.id, "Library settings unchanged");
                    library
                } else {
                    info!(
                        library = %library.id,
                        name = %config.name,
                        path = %config.path.display(),
                        "Updating library settings"
                    );
                    self.store
                        .update_library(&library.id, update)
                        .await?
                        .ok_or_else(|| CatalogError::not_found("Library", &library.id))?
                }
            }
            None => {
                let created = self
                    .store
                    .create_library(NewLibrary {
                        name: config.name.clone(),
                        path: config.path.clone(),
                        kind: config.kind,
                        enabled: config.enabled,
                        scan_interval: config.scan_interval.clone(),
                        directory_handle: handle,
                    })
                    .await?;
                info!(
                    library = %created.id,
                    name = %created.name,
                    path = %created.path.display(),
                    "Registered library"
                );
                created
            }
        };

        // The type may have changed; rebuild the scanner on next use.
        self.scanners.remove(&library.id);
        Ok(library)
    }

    /// Register every configured library and bring its catalog up to date.
    ///
    /// Libraries of an unsupported type are skipped. Disabled libraries are
    /// registered but not scanned. A library without catalog data gets a
    /// full scan; any other is rescanned and compared. Failures are logged
    /// per library and never abort the rest.
    ///
    /// Returns the registered libraries.
    pub async fn initialize(&self, configs: &[LibraryConfig]) -> Vec<Library> {
        let mut registered = Vec::with_capacity(configs.len());

        for config in configs {
            if !self.providers.supports(config.kind) {
                warn!(
                    library = %config.name,
                    kind = %config.kind,
                    "Unsupported library type, skipping"
                );
                continue;
            }

            let library = match self.register(config).await {
                Ok(library) => library,
                Err(err) => {
                    error!(library = %config.name, error = %err, "Failed to register library");
                    continue;
                }
            };

            if library.enabled {
                if let Err(err) = self.refresh(&library).await {
                    error!(
                        library = %library.id,
                        name = %library.name,
                        error = %err,
                        "Initial scan failed"
                    );
                }
            } else {
                info!(library = %library.id, name = %library.name, "Library disabled, not scanning");
            }

            registered.push(library);
        }

        info!(libraries = registered.len(), "Libraries initialized");
        registered
    }

    async fn refresh(&self, library: &Library) -> Result<(), CatalogError> {
        let groups = self.store.get_groups(&library.id, ParentScope::Any).await?;
        let bundles = self.store.get_bundles(&library.id, ParentScope::Any).await?;

        if groups.is_empty() && bundles.is_empty() {
            info!(library = %library.id, name = %library.name, "No catalog data, performing full scan");
            self.rescan_library(&library.id).await?;
        } else {
            info!(library = %library.id, name = %library.name, "Catalog data found, scanning for changes");
            self.rescan_and_compare(&library.id).await?;
        }
        Ok(())
    }

    /// Scan a library and return the full outcome.
    pub async fn scan_library(&self, library_id: &LibraryId) -> Result<ScanOutcome, CatalogError> {
        let library = self.library(library_id).await?;
        let scanner = self.scanner(&library)?;
        scanner.scan_library(&library.id, &library.path).await
    }

    /// Rescan a library. Returns the bundles deleted by this scan, which also
    /// become the library's recently deleted list.
    pub async fn rescan_library(&self, library_id: &LibraryId) -> Result<Vec<Bundle>, CatalogError> {
        let outcome = self.scan_library(library_id).await?;
        self.recently_deleted
            .insert(library_id.clone(), outcome.deleted.clone());
        Ok(outcome.deleted)
    }

    /// Rescan a library and report what changed since the previous catalog.
    pub async fn rescan_and_compare(
        &self,
        library_id: &LibraryId,
    ) -> Result<ChangeSet, CatalogError> {
        let library = self.library(library_id).await?;
        let scanner = self.scanner(&library)?;

        let before = self.store.get_bundles(&library.id, ParentScope::Any).await?;
        scanner.scan_library(&library.id, &library.path).await?;
        let after = self.store.get_bundles(&library.id, ParentScope::Any).await?;

        let changes = reconcile(&before, &after);
        self.recently_deleted
            .insert(library.id.clone(), changes.deleted.clone());

        info!(
            library = %library.id,
            name = %library.name,
            added = changes.added.len(),
            updated = changes.updated.len(),
            moved = changes.moved.len(),
            deleted = changes.deleted.len(),
            "Rescan compared"
        );
        Ok(changes)
    }

    /// Bundles deleted by the last rescan of a library.
    pub fn recently_deleted(&self, library_id: &LibraryId) -> Vec<Bundle> {
        self.recently_deleted
            .get(library_id)
            .map(|deleted| deleted.value().clone())
            .unwrap_or_default()
    }

    pub async fn libraries(&self) -> Result<Vec<Library>, CatalogError> {
        Ok(self.store.get_all_libraries().await?)
    }

    /// Look up a library, failing with `NotFound` when it does not exist.
    pub async fn library(&self, library_id: &LibraryId) -> Result<Library, CatalogError> {
        self.store
            .get_library(library_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Library", library_id))
    }

    /// Group/bundle tree of a library. `None` until the library was scanned.
    pub async fn library_tree(
        &self,
        library_id: &LibraryId,
    ) -> Result<Option<CatalogTree>, CatalogError> {
        let library = self.library(library_id).await?;
        let groups = self.store.get_groups(&library.id, ParentScope::Any).await?;
        let bundles = self.store.get_bundles(&library.id, ParentScope::Any).await?;
        Ok(CatalogTree::build(groups, bundles))
    }

    /// Subscribe to progress updates of a library's scans.
    pub async fn subscribe(
        &self,
        library_id: &LibraryId,
    ) -> Result<broadcast::Receiver<ScanProgress>, CatalogError> {
        let library = self.library(library_id).await?;
        Ok(self.scanner(&library)?.subscribe())
    }

    pub async fn bundle_details(&self, bundle_id: &BundleId) -> Result<BundleDetails, CatalogError> {
        let scanner = self.scanner_for_bundle(bundle_id).await?;
        scanner.bundle_details(bundle_id).await
    }

    pub async fn image_data(
        &self,
        bundle_id: &BundleId,
        page_index: usize,
    ) -> Result<Vec<u8>, CatalogError> {
        let scanner = self.scanner_for_bundle(bundle_id).await?;
        scanner.image_data(bundle_id, page_index).await
    }

    pub async fn image_data_by_path(
        &self,
        bundle_id: &BundleId,
        page: &str,
    ) -> Result<Vec<u8>, CatalogError> {
        let scanner = self.scanner_for_bundle(bundle_id).await?;
        scanner.image_data_by_path(bundle_id, page).await
    }

    /// Schedule a periodic rescan for every enabled library with an interval.
    ///
    /// Jobs from a previous call are replaced. Intervals that do not parse
    /// are logged and skipped. Returns the number of scheduled libraries.
    pub async fn schedule_scans(self: &Arc<Self>) -> Result<usize, CatalogError> {
        self.scheduler.shutdown();

        let mut scheduled = 0;
        for library in self.store.get_all_libraries().await? {
            if !library.enabled {
                continue;
            }
            let Some(interval) = library.scan_interval.as_deref() else {
                continue;
            };
            if !self.providers.supports(library.kind) {
                warn!(library = %library.id, kind = %library.kind, "Unsupported library type, not scheduling");
                continue;
            }
            let period = match parse_interval(interval) {
                Ok(period) => period,
                Err(err) => {
                    warn!(
                        library = %library.id,
                        name = %library.name,
                        interval,
                        error = %err,
                        "Scan will not be scheduled"
                    );
                    continue;
                }
            };

            let manager = Arc::downgrade(self);
            let id = library.id.clone();
            self.scheduler.schedule(
                library.id.clone(),
                period,
                Box::new(move || {
                    let manager = manager.upgrade()?;
                    let id = id.clone();
                    let run: JobRun =
                        Box::pin(async move { manager.rescan_and_compare(&id).await.map(|_| ()) });
                    Some(run)
                }),
            );
            info!(library = %library.id, name = %library.name, interval, "Scheduled periodic scan");
            scheduled += 1;
        }

        Ok(scheduled)
    }

    /// Cancel every scheduled scan.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn filesystem(&self, kind: LibraryKind) -> Result<Arc<dyn FileSystemProvider>, CatalogError> {
        self.providers
            .filesystem(kind)
            .ok_or(CatalogError::UnsupportedLibraryKind { kind })
    }

    fn scanner(&self, library: &Library) -> Result<Arc<Scanner>, CatalogError> {
        if let Some(scanner) = self
            .scanners
            .get(&library.id)
            .map(|entry| Arc::clone(entry.value()))
        {
            return Ok(scanner);
        }

        let scanner = Scanner::new(
            self.filesystem(library.kind)?,
            self.providers.archives().to_vec(),
            Arc::clone(&self.store),
            self.scan_config.clone(),
        )?
        .with_registry(self.registry.clone());
        let scanner = Arc::new(scanner);
        self.scanners
            .insert(library.id.clone(), Arc::clone(&scanner));
        Ok(scanner)
    }

    async fn scanner_for_bundle(&self, bundle_id: &BundleId) -> Result<Arc<Scanner>, CatalogError> {
        let bundle = self
            .store
            .get_bundle(bundle_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Bundle", bundle_id))?;
        let library = self.library(&bundle.library_id).await?;
        self.scanner(&library)
    }
}

impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("providers", &self.providers)
            .field("scanners", &self.scanners.len())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Settings of `config` that differ from the stored library.
fn library_update(
    library: &Library,
    config: &LibraryConfig,
    handle: Option<&FileHandle>,
) -> LibraryUpdate {
    let mut update = LibraryUpdate::default();
    if library.name != config.name {
        update.name = Some(config.name.clone());
    }
    if library.path != config.path {
        update.path = Some(config.path.clone());
    }
    if library.kind != config.kind {
        update.kind = Some(config.kind);
    }
    if library.enabled != config.enabled {
        update.enabled = Some(config.enabled);
    }
    if library.scan_interval != config.scan_interval {
        update.scan_interval = Some(config.scan_interval.clone());
    }
    // A failed stat keeps the stored handle.
    if let Some(handle) = handle {
        if library.directory_handle.as_ref() != Some(handle) {
            update.directory_handle = Some(Some(handle.clone()));
        }
    }
    update
}
