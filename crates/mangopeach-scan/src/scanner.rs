//! Library tree walk: classification, upserts and stale removal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use globset::GlobSet;
use mangopeach_core::file_types::{is_archive_file, is_image_file};
use mangopeach_core::identity::{relative_path, stable_id, ROOT_RELATIVE_PATH};
use mangopeach_core::natural_sort::natural_cmp;
use mangopeach_core::{
    ArchiveProvider, Bundle, BundleId, BundleKind, CatalogError, DirEntry, FileStat,
    FileSystemProvider, Group, GroupId, LibraryId, LibraryStore, ParentScope, ProviderError,
    ProviderResult, ScanConfig, ScanWarning, StoreResult, WarningKind,
};
use tokio::sync::broadcast;

use crate::classify::{DirectoryRole, DirectorySummary};
use crate::guard::ScanRegistry;
use crate::progress::{ProgressTracker, ScanProgress, ScanStats};
use crate::providers::archive_for_path;

/// Result of one library scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub library_id: LibraryId,
    /// Bundles removed from the store because they no longer exist.
    pub deleted: Vec<Bundle>,
    pub stats: ScanStats,
    /// Non-fatal problems encountered along the way.
    pub warnings: Vec<ScanWarning>,
    pub duration: Duration,
}

/// Walks a library through injected providers and keeps the store in sync.
pub struct Scanner {
    pub(crate) fs: Arc<dyn FileSystemProvider>,
    pub(crate) archives: Vec<Arc<dyn ArchiveProvider>>,
    pub(crate) store: Arc<dyn LibraryStore>,
    config: ScanConfig,
    ignore: GlobSet,
    registry: ScanRegistry,
    progress_tx: broadcast::Sender<ScanProgress>,
}

/// Mutable state of a single scan run.
struct ScanRun {
    library_id: LibraryId,
    root: PathBuf,
    scanned_at: DateTime<Utc>,
    seen_groups: HashSet<GroupId>,
    seen_bundles: HashSet<BundleId>,
    /// Paths whose existing records must survive the stale pass.
    preserved: Vec<PathBuf>,
    warnings: Vec<ScanWarning>,
    tracker: ProgressTracker,
}

impl ScanRun {
    fn warn(&mut self, warning: ScanWarning) {
        self.tracker.record_warning();
        self.warnings.push(warning);
    }

    fn preserve(&mut self, path: &Path) {
        self.preserved.push(path.to_path_buf());
    }

    fn is_preserved(&self, path: &Path) -> bool {
        self.preserved.iter().any(|prefix| path.starts_with(prefix))
    }
}

impl Scanner {
    /// Create a scanner over the given providers and store.
    ///
    /// Archive providers are consulted in order; the first that supports a
    /// file handles it.
    pub fn new(
        fs: Arc<dyn FileSystemProvider>,
        archives: Vec<Arc<dyn ArchiveProvider>>,
        store: Arc<dyn LibraryStore>,
        config: ScanConfig,
    ) -> Result<Self, CatalogError> {
        let ignore = config.ignore_matcher()?;
        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self {
            fs,
            archives,
            store,
            config,
            ignore,
            registry: ScanRegistry::new(),
            progress_tx,
        })
    }

    /// Share a scan registry with other scanners.
    pub fn with_registry(mut self, registry: ScanRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registry of running scans.
    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan a library rooted at `root` and bring the store in line with it.
    ///
    /// Returns the bundles that were deleted because they are gone from disk.
    /// Fails without touching the store when the root cannot be stat'ed.
    pub async fn scan_library(
        &self,
        library_id: &LibraryId,
        root: &Path,
    ) -> Result<ScanOutcome, CatalogError> {
        let _guard = self
            .registry
            .try_acquire(library_id)
            .ok_or_else(|| CatalogError::ScanInProgress {
                library: library_id.clone(),
            })?;

        tracing::info!(library = %library_id, path = %root.display(), "Starting scan");

        let existing_groups = self.store.get_groups(library_id, ParentScope::Any).await?;
        let existing_bundles = self.store.get_bundles(library_id, ParentScope::Any).await?;
        let root_stat = self.fs.stat(root).await?;

        let mut run = ScanRun {
            library_id: library_id.clone(),
            root: root.to_path_buf(),
            scanned_at: Utc::now(),
            seen_groups: HashSet::new(),
            seen_bundles: HashSet::new(),
            preserved: Vec::new(),
            warnings: Vec::new(),
            tracker: ProgressTracker::new(library_id.clone()),
        };

        let root_id = GroupId::new(stable_id(
            library_id,
            root_stat.handle.as_ref(),
            ROOT_RELATIVE_PATH,
        ));
        let root_name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let root_group = Group::new(root_id.clone(), root_name, root, library_id.clone(), None);

        if self.write_group(&mut run, root_group).await {
            match self.read_children(root).await {
                Ok(children) => self.visit(&mut run, root, children, &root_id).await,
                Err(err) => self.unreadable(&mut run, root, &err),
            }
        }

        let deleted = self
            .remove_stale(&mut run, existing_groups, existing_bundles)
            .await;

        let _ = self.progress_tx.send(run.tracker.snapshot());
        let (stats, duration) = run.tracker.finish();

        tracing::info!(
            library = %library_id,
            groups = stats.groups_upserted,
            bundles = stats.bundles_upserted,
            deleted = deleted.len(),
            warnings = run.warnings.len(),
            elapsed_ms = duration.as_millis() as u64,
            "Scan complete"
        );

        Ok(ScanOutcome {
            library_id: library_id.clone(),
            deleted,
            stats,
            warnings: run.warnings,
            duration,
        })
    }

    /// List a directory, dropping ignored and hidden entries.
    async fn read_children(&self, dir: &Path) -> ProviderResult<Vec<DirEntry>> {
        let entries = self.fs.read_dir(dir).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                !self.config.should_skip_hidden(&entry.name) && !self.ignore.is_match(&entry.name)
            })
            .collect())
    }

    /// Visit the already-listed children of a group directory.
    fn visit<'a>(
        &'a self,
        run: &'a mut ScanRun,
        dir: &'a Path,
        children: Vec<DirEntry>,
        parent_id: &'a GroupId,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            run.tracker.record_dir(dir);
            let _ = self.progress_tx.send(run.tracker.snapshot());

            for entry in children {
                if entry.is_dir() {
                    self.visit_directory(run, entry, parent_id).await;
                } else if entry.is_file() && is_archive_file(&entry.name) {
                    self.visit_archive(run, entry, parent_id).await;
                }
            }
        })
    }

    async fn visit_directory(&self, run: &mut ScanRun, entry: DirEntry, parent_id: &GroupId) {
        let children = match self.read_children(&entry.path).await {
            Ok(children) => children,
            Err(err) => {
                self.unreadable(run, &entry.path, &err);
                return;
            }
        };

        let summary = DirectorySummary::of(&children);
        let role = summary.role();
        if role == DirectoryRole::Ignore {
            tracing::debug!(path = %entry.path.display(), "Skipping directory without images or containers");
            return;
        }

        let Some(stat) = self.stat_or_preserve(run, &entry.path).await else {
            return;
        };
        let relative = relative_path(&run.root, &entry.path);
        let id = stable_id(&run.library_id, stat.handle.as_ref(), &relative);

        if role.is_bundle() {
            let mut bundle = Bundle::new(
                BundleId::new(id.clone()),
                BundleKind::Directory,
                entry.name.as_str(),
                &entry.path,
                run.library_id.clone(),
                summary.image_count(),
                stat.modified_at,
                stat.handle.clone(),
                Some(parent_id.clone()),
            );
            bundle.cover_image = summary.cover().map(str::to_string);
            bundle.created_at = stat.created_at;
            bundle.scanned_at = run.scanned_at;
            self.write_bundle(run, bundle).await;
        }

        if role.is_group() {
            let group_id = GroupId::new(id);
            let group = Group::new(
                group_id.clone(),
                entry.name.as_str(),
                &entry.path,
                run.library_id.clone(),
                Some(parent_id.clone()),
            );
            if self.write_group(run, group).await {
                self.visit(run, &entry.path, children, &group_id).await;
            }
        }
    }

    async fn visit_archive(&self, run: &mut ScanRun, entry: DirEntry, parent_id: &GroupId) {
        let Some(provider) = archive_for_path(&self.archives, &entry.path) else {
            tracing::warn!(path = %entry.path.display(), "Unsupported archive type");
            run.warn(ScanWarning::unsupported_archive(&entry.path));
            return;
        };

        let listing = match provider.entries(&entry.path).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!(path = %entry.path.display(), error = %err, "Failed to list archive");
                run.warn(ScanWarning::new(
                    &entry.path,
                    err.to_string(),
                    WarningKind::ArchiveError,
                ));
                run.preserve(&entry.path);
                return;
            }
        };

        let mut pages: Vec<&str> = listing
            .iter()
            .filter(|e| !e.is_dir && is_image_file(&e.path))
            .map(|e| e.path.as_str())
            .collect();
        pages.sort_by(|a, b| natural_cmp(a, b));

        let Some(stat) = self.stat_or_preserve(run, &entry.path).await else {
            return;
        };
        let relative = relative_path(&run.root, &entry.path);
        let id = stable_id(&run.library_id, stat.handle.as_ref(), &relative);

        let mut bundle = Bundle::new(
            BundleId::new(id),
            provider.kind(),
            entry.name.as_str(),
            &entry.path,
            run.library_id.clone(),
            pages.len(),
            stat.modified_at,
            stat.handle.clone(),
            Some(parent_id.clone()),
        );
        bundle.cover_image = pages.first().map(|page| page.to_string());
        bundle.created_at = stat.created_at;
        bundle.scanned_at = run.scanned_at;
        self.write_bundle(run, bundle).await;
    }

    async fn stat_or_preserve(
        &self,
        run: &mut ScanRun,
        path: &Path,
    ) -> Option<FileStat> {
        match self.fs.stat(path).await {
            Ok(stat) => Some(stat),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to stat entry");
                run.warn(ScanWarning::new(path, err.to_string(), WarningKind::MetadataError));
                run.preserve(path);
                None
            }
        }
    }

    fn unreadable(&self, run: &mut ScanRun, path: &Path, err: &ProviderError) {
        tracing::warn!(
            library = %run.library_id,
            path = %path.display(),
            error = %err,
            "Failed to read directory"
        );
        run.warn(ScanWarning::read_error(path, err));
        if self.config.preserve_unreadable {
            run.preserve(path);
        }
    }

    /// Upsert a group. Returns `false` when the write failed and the branch
    /// below it must not be walked.
    async fn write_group(&self, run: &mut ScanRun, group: Group) -> bool {
        let id = group.id.clone();
        let path = group.path.clone();
        let result = self.retry(|| self.store.upsert_group(group.clone())).await;
        run.seen_groups.insert(id);

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Upserted group");
                run.tracker.record_group();
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to write group");
                run.warn(ScanWarning::new(&path, err.to_string(), WarningKind::StoreWrite));
                run.preserve(&path);
                false
            }
        }
    }

    async fn write_bundle(&self, run: &mut ScanRun, bundle: Bundle) {
        let id = bundle.id.clone();
        let path = bundle.path.clone();
        let pages = bundle.page_count;
        let result = self.retry(|| self.store.upsert_bundle(bundle.clone())).await;
        run.seen_bundles.insert(id);

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), pages, "Upserted bundle");
                run.tracker.record_bundle(pages);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to write bundle");
                run.warn(ScanWarning::new(&path, err.to_string(), WarningKind::StoreWrite));
            }
        }
    }

    /// Run a store operation, retrying up to `store_retries` extra times.
    async fn retry<'s, F>(&'s self, mut operation: F) -> StoreResult<()>
    where
        F: FnMut() -> BoxFuture<'s, StoreResult<()>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.config.store_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "Store operation failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn remove_stale(
        &self,
        run: &mut ScanRun,
        existing_groups: Vec<Group>,
        existing_bundles: Vec<Bundle>,
    ) -> Vec<Bundle> {
        for group in existing_groups {
            if run.seen_groups.contains(&group.id) {
                continue;
            }
            if run.is_preserved(&group.path) {
                run.tracker.stats_mut().records_preserved += 1;
                continue;
            }
            match self.retry(|| self.store.delete_group(&group.id)).await {
                Ok(()) => {
                    tracing::debug!(path = %group.path.display(), "Deleted stale group");
                    run.tracker.stats_mut().groups_deleted += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %group.path.display(), error = %err, "Failed to delete group");
                    run.warn(ScanWarning::new(&group.path, err.to_string(), WarningKind::StoreDelete));
                }
            }
        }

        let mut deleted = Vec::new();
        for bundle in existing_bundles {
            if run.seen_bundles.contains(&bundle.id) {
                continue;
            }
            if run.is_preserved(&bundle.path) {
                run.tracker.stats_mut().records_preserved += 1;
                continue;
            }
            match self.retry(|| self.store.delete_bundle(&bundle.id)).await {
                Ok(()) => {
                    tracing::debug!(path = %bundle.path.display(), "Deleted stale bundle");
                    run.tracker.stats_mut().bundles_deleted += 1;
                    deleted.push(bundle);
                }
                Err(err) => {
                    tracing::warn!(path = %bundle.path.display(), error = %err, "Failed to delete bundle");
                    run.warn(ScanWarning::new(&bundle.path, err.to_string(), WarningKind::StoreDelete));
                }
            }
        }
        deleted
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("archives", &self.archives.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
