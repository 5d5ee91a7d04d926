use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mangopeach_core::{
    ArchiveProvider, FileHandle, Library, LibraryStore, LibraryUpdate, NewLibrary, ParentScope,
    StoreError, StoreResult,
};
use mangopeach_scan::{
    Bundle, BundleId, BundleKind, CatalogError, Group, GroupId, LibraryId, LocalFileSystem,
    MemoryFileSystem, MemoryLibraryStore, ProviderRegistry, ScanConfig, Scanner, WarningKind,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ROOT: &str = "/lib";

fn library() -> LibraryId {
    LibraryId::new("testlibrary0")
}

fn default_archives() -> Vec<Arc<dyn ArchiveProvider>> {
    ProviderRegistry::with_defaults().archives().to_vec()
}

fn memory_scanner(
    fs: &Arc<MemoryFileSystem>,
    store: &Arc<MemoryLibraryStore>,
    config: ScanConfig,
) -> Scanner {
    Scanner::new(
        fs.clone(),
        default_archives(),
        store.clone(),
        config,
    )
    .unwrap()
}

fn local_scanner(store: &Arc<MemoryLibraryStore>) -> Scanner {
    Scanner::new(
        Arc::new(LocalFileSystem::new()),
        default_archives(),
        store.clone(),
        ScanConfig::default(),
    )
    .unwrap()
}

async fn groups(store: &dyn LibraryStore) -> Vec<Group> {
    store.get_groups(&library(), ParentScope::Any).await.unwrap()
}

async fn bundles(store: &dyn LibraryStore) -> Vec<Bundle> {
    store.get_bundles(&library(), ParentScope::Any).await.unwrap()
}

async fn id_sets(store: &dyn LibraryStore) -> (BTreeSet<GroupId>, BTreeSet<BundleId>) {
    let groups = groups(store).await.into_iter().map(|g| g.id).collect();
    let bundles = bundles(store).await.into_iter().map(|b| b.id).collect();
    (groups, bundles)
}

fn bundle_at<'a>(bundles: &'a [Bundle], path: &str) -> &'a Bundle {
    bundles
        .iter()
        .find(|b| b.path == Path::new(path))
        .unwrap_or_else(|| panic!("no bundle at {path}"))
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Two series; Beta holds its own pages next to an extras folder.
fn sample_tree() -> Arc<MemoryFileSystem> {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/lib/Alpha/Vol 1/001.jpg", b"a1".to_vec());
    fs.add_file("/lib/Alpha/Vol 1/002.jpg", b"a2".to_vec());
    fs.add_file("/lib/Alpha/Vol 2/001.png", b"b1".to_vec());
    fs.add_file("/lib/Beta/010.jpg", b"c10".to_vec());
    fs.add_file("/lib/Beta/002.jpg", b"c2".to_vec());
    fs.add_file("/lib/Beta/Extras/01.webp", b"e1".to_vec());
    fs
}

#[tokio::test]
async fn test_images_only_directory_is_bundle_only() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/lib/Vol 1/1.jpg", b"1".to_vec());
    fs.add_file("/lib/Vol 1/2.jpg", b"2".to_vec());
    fs.add_file("/lib/Vol 1/info.txt", b"-".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());

    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let groups = groups(&*store).await;
    let bundles = bundles(&*store).await;
    assert_eq!(groups.len(), 1);
    assert!(groups[0].is_root());
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].kind, BundleKind::Directory);
    assert_eq!(bundles[0].page_count, 2);
    assert_eq!(bundles[0].cover_image.as_deref(), Some("1.jpg"));
    assert_eq!(bundles[0].parent_id.as_ref(), Some(&groups[0].id));
    assert!(outcome.deleted.is_empty());
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_directory_can_be_bundle_and_group() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let groups = groups(&*store).await;
    let bundles = bundles(&*store).await;

    let beta_group = groups
        .iter()
        .find(|g| g.path == Path::new("/lib/Beta"))
        .expect("Beta should be a group");
    let beta_bundle = bundle_at(&bundles, "/lib/Beta");
    assert_eq!(beta_bundle.page_count, 2);
    assert_eq!(beta_bundle.cover_image.as_deref(), Some("002.jpg"));

    let extras = bundle_at(&bundles, "/lib/Beta/Extras");
    assert_eq!(extras.parent_id.as_ref(), Some(&beta_group.id));

    // Alpha only holds volumes: a group, not a bundle.
    assert!(groups.iter().any(|g| g.path == Path::new("/lib/Alpha")));
    assert!(!bundles.iter().any(|b| b.path == Path::new("/lib/Alpha")));

    // root, Alpha, Beta
    assert_eq!(groups.len(), 3);
    // Vol 1, Vol 2, Beta, Extras
    assert_eq!(bundles.len(), 4);
}

#[tokio::test]
async fn test_archive_makes_image_directory_a_group() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let series = root.join("S");
    fs::create_dir_all(&series).unwrap();
    fs::write(series.join("1.jpg"), b"one").unwrap();
    write_zip(&series.join("Vol 2.cbz"), &[("001.jpg", "v2")]);

    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = local_scanner(&store);
    let outcome = scanner.scan_library(&library(), &root).await.unwrap();
    assert!(outcome.warnings.is_empty());

    let groups = groups(&*store).await;
    let bundles = bundles(&*store).await;

    let series_group = groups
        .iter()
        .find(|g| g.path == series)
        .expect("S should be a group");
    let series_path = series.to_string_lossy().into_owned();
    let series_bundle = bundle_at(&bundles, &series_path);
    assert_eq!(series_bundle.kind, BundleKind::Directory);
    assert_eq!(series_bundle.page_count, 1);

    let volume_path = series.join("Vol 2.cbz").to_string_lossy().into_owned();
    let volume = bundle_at(&bundles, &volume_path);
    assert_eq!(volume.kind, BundleKind::Zip);
    assert_eq!(volume.parent_id.as_ref(), Some(&series_group.id));

    // root and S
    assert_eq!(groups.len(), 2);
    assert_eq!(bundles.len(), 2);
}

#[tokio::test]
async fn test_empty_directories_are_ignored() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_dir("/lib/Empty");
    fs.add_file("/lib/Notes/readme.txt", b"hi".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());

    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert_eq!(groups(&*store).await.len(), 1);
    assert!(bundles(&*store).await.is_empty());
}

#[tokio::test]
async fn test_rescan_is_idempotent_in_memory() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());

    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let first = id_sets(&*store).await;

    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let second = id_sets(&*store).await;

    assert_eq!(first, second);
    assert!(outcome.deleted.is_empty());
    assert_eq!(outcome.stats.groups_deleted, 0);
}

#[tokio::test]
async fn test_rescan_is_idempotent_on_disk() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("library");
    fs::create_dir_all(root.join("Series/Vol 1")).unwrap();
    fs::create_dir_all(root.join("Series/Vol 2")).unwrap();
    fs::write(root.join("Series/Vol 1/01.jpg"), b"1").unwrap();
    fs::write(root.join("Series/Vol 2/01.jpg"), b"2").unwrap();
    write_zip(&root.join("Series/Vol 3.cbz"), &[("01.jpg", "3")]);

    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = local_scanner(&store);

    let first_outcome = scanner.scan_library(&library(), &root).await.unwrap();
    let first = id_sets(&*store).await;
    let second_outcome = scanner.scan_library(&library(), &root).await.unwrap();
    let second = id_sets(&*store).await;

    assert_eq!(first, second);
    assert_eq!(first.1.len(), 3);
    assert_eq!(first_outcome.stats.bundles_upserted, 3);
    assert!(second_outcome.deleted.is_empty());
}

#[tokio::test]
async fn test_removed_bundle_is_returned_as_deleted() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    fs.remove("/lib/Alpha/Vol 2");
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.deleted[0].path, PathBuf::from("/lib/Alpha/Vol 2"));
    assert_eq!(outcome.stats.bundles_deleted, 1);
    assert_eq!(bundles(&*store).await.len(), 3);
}

#[tokio::test]
async fn test_removed_group_is_deleted_but_not_returned() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    fs.remove("/lib/Beta/Extras");
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    // Beta lost its only sub-folder: still a bundle, no longer a group.
    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.deleted[0].path, PathBuf::from("/lib/Beta/Extras"));
    assert_eq!(outcome.stats.groups_deleted, 1);
    let groups = groups(&*store).await;
    assert!(!groups.iter().any(|g| g.path == Path::new("/lib/Beta")));
    bundle_at(&bundles(&*store).await, "/lib/Beta");
}

#[tokio::test]
async fn test_rename_keeps_id_with_durable_handles() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let before = bundle_at(&bundles(&*store).await, "/lib/Alpha/Vol 1").id.clone();

    fs.rename("/lib/Alpha/Vol 1", "/lib/Alpha/Volume 01");
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let after = bundle_at(&bundles(&*store).await, "/lib/Alpha/Volume 01").id.clone();
    assert_eq!(before, after);
    assert!(outcome.deleted.is_empty());
}

#[tokio::test]
async fn test_rename_changes_id_without_handles() {
    let fs = Arc::new(MemoryFileSystem::without_handles());
    fs.add_file("/lib/Vol 1/1.jpg", b"1".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let before = bundles(&*store).await[0].id.clone();

    fs.rename("/lib/Vol 1", "/lib/Vol 01");
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.deleted[0].id, before);
    assert_ne!(bundles(&*store).await[0].id, before);
}

#[tokio::test]
async fn test_unreadable_subtree_is_preserved() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let before = id_sets(&*store).await;

    fs.set_unreadable("/lib/Alpha", true);
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert!(outcome.deleted.is_empty());
    assert_eq!(id_sets(&*store).await, before);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::ReadError);
    assert_eq!(outcome.warnings[0].path, PathBuf::from("/lib/Alpha"));
    // Alpha group plus its two volumes
    assert_eq!(outcome.stats.records_preserved, 3);
}

#[tokio::test]
async fn test_unreadable_subtree_legacy_policy_deletes() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let config = ScanConfig::builder()
        .preserve_unreadable(false)
        .build()
        .unwrap();
    let scanner = memory_scanner(&fs, &store, config);
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    fs.set_unreadable("/lib/Alpha", true);
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let deleted: BTreeSet<PathBuf> = outcome.deleted.iter().map(|b| b.path.clone()).collect();
    assert_eq!(
        deleted,
        BTreeSet::from([
            PathBuf::from("/lib/Alpha/Vol 1"),
            PathBuf::from("/lib/Alpha/Vol 2")
        ])
    );
    assert!(!groups(&*store)
        .await
        .iter()
        .any(|g| g.path == Path::new("/lib/Alpha")));
}

#[tokio::test]
async fn test_root_stat_failure_touches_nothing() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let before = id_sets(&*store).await;

    let err = scanner
        .scan_library(&library(), Path::new("/missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Provider(_)));
    assert_eq!(id_sets(&*store).await, before);
}

#[tokio::test]
async fn test_ignore_patterns_and_hidden_entries() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/lib/Vol 1/1.jpg", b"1".to_vec());
    fs.add_file("/lib/Vol 1/._1.jpg", b"junk".to_vec());
    fs.add_file("/lib/__MACOSX/Vol 1/1.jpg", b"junk".to_vec());
    fs.add_file("/lib/.trash/Vol 9/1.jpg", b"junk".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());
    let config = ScanConfig::builder()
        .include_hidden(false)
        .ignore_patterns(vec!["__MACOSX".to_string()])
        .build()
        .unwrap();

    let scanner = memory_scanner(&fs, &store, config);
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let bundles = bundles(&*store).await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].page_count, 1);
    assert_eq!(groups(&*store).await.len(), 1);
}

#[tokio::test]
async fn test_progress_is_published() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    let mut rx = scanner.subscribe();

    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    let mut updates = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        updates.push(progress);
    }
    // root, Alpha and Beta are walked, plus the final snapshot
    assert_eq!(updates.len(), 4);
    let last = updates.last().unwrap();
    assert_eq!(last.dirs_scanned, 3);
    assert_eq!(last.bundles_found, 4);
    assert_eq!(last.library_id, library());
}

#[tokio::test]
async fn test_concurrent_scan_rejected() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());

    let guard = scanner.registry().try_acquire(&library()).unwrap();
    let err = scanner
        .scan_library(&library(), Path::new(ROOT))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ScanInProgress { .. }));
    assert!(bundles(&*store).await.is_empty());

    drop(guard);
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    assert_eq!(bundles(&*store).await.len(), 4);
}

#[tokio::test]
async fn test_registry_shared_between_scanners() {
    let fs = sample_tree();
    let store = Arc::new(MemoryLibraryStore::new());
    let first = memory_scanner(&fs, &store, ScanConfig::default());
    let second = memory_scanner(&fs, &store, ScanConfig::default())
        .with_registry(first.registry().clone());

    let _guard = first.registry().try_acquire(&library()).unwrap();
    assert!(matches!(
        second.scan_library(&library(), Path::new(ROOT)).await,
        Err(CatalogError::ScanInProgress { .. })
    ));
    // A different library is not blocked.
    second
        .scan_library(&LibraryId::new("otherlibrary"), Path::new(ROOT))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_zip_bundle_pages() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    fs::create_dir_all(root.join("Series")).unwrap();
    write_zip(
        &root.join("Series/Vol 1.cbz"),
        &[
            ("pages/", ""),
            ("pages/10.jpg", "ten"),
            ("pages/2.jpg", "two"),
            ("pages/1.jpg", "one"),
            ("ComicInfo.xml", "<xml/>"),
        ],
    );

    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = local_scanner(&store);
    scanner.scan_library(&library(), &root).await.unwrap();

    let bundles = bundles(&*store).await;
    assert_eq!(bundles.len(), 1);
    let bundle = &bundles[0];
    assert_eq!(bundle.kind, BundleKind::Zip);
    assert_eq!(bundle.name, "Vol 1.cbz");
    assert_eq!(bundle.page_count, 3);
    assert_eq!(bundle.cover_image.as_deref(), Some("pages/1.jpg"));

    let details = scanner.bundle_details(&bundle.id).await.unwrap();
    assert_eq!(details.pages, vec!["pages/1.jpg", "pages/2.jpg", "pages/10.jpg"]);

    assert_eq!(scanner.image_data(&bundle.id, 2).await.unwrap(), b"ten");
    assert_eq!(
        scanner.image_data_by_path(&bundle.id, "pages/2.jpg").await.unwrap(),
        b"two"
    );

    let err = scanner.image_data(&bundle.id, 3).await.unwrap_err();
    assert_eq!(err.to_string(), "Page index 3 out of range: valid pages are 0-2");
}

#[tokio::test]
async fn test_directory_bundle_pages() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/lib/Vol 1/10.jpg", b"ten".to_vec());
    fs.add_file("/lib/Vol 1/1.jpg", b"one".to_vec());
    fs.add_file("/lib/Vol 1/2.jpg", b"two".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let id = bundles(&*store).await[0].id.clone();

    let details = scanner.bundle_details(&id).await.unwrap();
    assert_eq!(details.pages, vec!["1.jpg", "2.jpg", "10.jpg"]);
    assert_eq!(details.page_count(), 3);
    assert_eq!(scanner.image_data(&id, 1).await.unwrap(), b"two");
    assert_eq!(scanner.image_data_by_path(&id, "10.jpg").await.unwrap(), b"ten");

    for unlisted in ["../Vol 2/1.jpg", "./10.jpg", "/lib/Vol 1/10.jpg", "11.jpg", ""] {
        let err = scanner.image_data_by_path(&id, unlisted).await.unwrap_err();
        assert!(
            matches!(err, CatalogError::InvalidPagePath { .. }),
            "{unlisted:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_zip_page_reads_accept_exactly_listed_entries() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_zip(
        &root.join("Vol 1.cbz"),
        &[("001.jpg", "one"), ("extras/../cover.jpg", "cover")],
    );

    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = local_scanner(&store);
    scanner.scan_library(&library(), &root).await.unwrap();
    let id = bundles(&*store).await[0].id.clone();

    let details = scanner.bundle_details(&id).await.unwrap();
    assert_eq!(details.pages, vec!["001.jpg", "extras/../cover.jpg"]);
    for page in &details.pages {
        assert!(scanner.image_data_by_path(&id, page).await.is_ok());
    }
    assert_eq!(
        scanner
            .image_data_by_path(&id, "extras/../cover.jpg")
            .await
            .unwrap(),
        b"cover"
    );

    for unlisted in ["./001.jpg", "cover.jpg", "../001.jpg"] {
        let err = scanner.image_data_by_path(&id, unlisted).await.unwrap_err();
        assert!(
            matches!(err, CatalogError::InvalidPagePath { .. }),
            "{unlisted:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_unknown_bundle_and_unsupported_type() {
    let fs = Arc::new(MemoryFileSystem::new());
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());

    let err = scanner
        .bundle_details(&BundleId::new("000000000000"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Bundle with ID 000000000000 not found");

    let rar = Bundle::new(
        BundleId::new("rarbundle000"),
        BundleKind::Rar,
        "Vol 1.cbr",
        "/lib/Vol 1.cbr",
        library(),
        10,
        Utc::now(),
        None,
        None,
    );
    store.upsert_bundle(rar).await.unwrap();
    let err = scanner.image_data(&BundleId::new("rarbundle000"), 0).await.unwrap_err();
    assert!(matches!(err, CatalogError::UnsupportedType { kind: BundleKind::Rar }));
}

#[tokio::test]
async fn test_unsupported_archive_is_skipped() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/lib/Series/Vol 1.cbr", b"rar".to_vec());
    fs.add_file("/lib/Series/Vol 2/1.jpg", b"1".to_vec());
    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = memory_scanner(&fs, &store, ScanConfig::default());

    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::UnsupportedArchive);
    let bundles = bundles(&*store).await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].path, PathBuf::from("/lib/Series/Vol 2"));
}

#[tokio::test]
async fn test_broken_archive_keeps_existing_record() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let archive = root.join("Vol 1.cbz");
    write_zip(&archive, &[("1.jpg", "1"), ("2.jpg", "2")]);

    let store = Arc::new(MemoryLibraryStore::new());
    let scanner = local_scanner(&store);
    scanner.scan_library(&library(), &root).await.unwrap();
    let before = id_sets(&*store).await;

    fs::write(&archive, vec![0u8; 512]).unwrap();
    let outcome = scanner.scan_library(&library(), &root).await.unwrap();

    assert!(outcome.deleted.is_empty());
    assert_eq!(outcome.warnings[0].kind, WarningKind::ArchiveError);
    assert_eq!(id_sets(&*store).await, before);
}

/// Store wrapper whose group/bundle writes fail on demand.
struct FlakyStore {
    inner: MemoryLibraryStore,
    failures_left: AtomicU32,
    always_fail: AtomicBool,
    attempts: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryLibraryStore::new(),
            failures_left: AtomicU32::new(failures),
            always_fail: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    fn should_fail(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn failure() -> StoreError {
        StoreError::Unavailable {
            message: "disk full".to_string(),
        }
    }
}

#[async_trait]
impl LibraryStore for FlakyStore {
    async fn get_all_libraries(&self) -> StoreResult<Vec<Library>> {
        self.inner.get_all_libraries().await
    }

    async fn get_library(&self, id: &LibraryId) -> StoreResult<Option<Library>> {
        self.inner.get_library(id).await
    }

    async fn find_library_by_handle(&self, handle: &FileHandle) -> StoreResult<Option<Library>> {
        self.inner.find_library_by_handle(handle).await
    }

    async fn find_library_by_path(&self, path: &Path) -> StoreResult<Option<Library>> {
        self.inner.find_library_by_path(path).await
    }

    async fn create_library(&self, library: NewLibrary) -> StoreResult<Library> {
        self.inner.create_library(library).await
    }

    async fn update_library(
        &self,
        id: &LibraryId,
        update: LibraryUpdate,
    ) -> StoreResult<Option<Library>> {
        self.inner.update_library(id, update).await
    }

    async fn delete_library(&self, id: &LibraryId) -> StoreResult<()> {
        self.inner.delete_library(id).await
    }

    async fn get_groups(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Group>> {
        self.inner.get_groups(library_id, parent).await
    }

    async fn get_bundles(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Bundle>> {
        self.inner.get_bundles(library_id, parent).await
    }

    async fn upsert_group(&self, group: Group) -> StoreResult<()> {
        if self.should_fail() {
            return Err(Self::failure());
        }
        self.inner.upsert_group(group).await
    }

    async fn upsert_bundle(&self, bundle: Bundle) -> StoreResult<()> {
        if self.should_fail() {
            return Err(Self::failure());
        }
        self.inner.upsert_bundle(bundle).await
    }

    async fn delete_group(&self, id: &GroupId) -> StoreResult<()> {
        self.inner.delete_group(id).await
    }

    async fn delete_bundle(&self, id: &BundleId) -> StoreResult<()> {
        self.inner.delete_bundle(id).await
    }

    async fn get_group(&self, id: &GroupId) -> StoreResult<Option<Group>> {
        self.inner.get_group(id).await
    }

    async fn get_bundle(&self, id: &BundleId) -> StoreResult<Option<Bundle>> {
        self.inner.get_bundle(id).await
    }
}

fn flaky_scanner(fs: &Arc<MemoryFileSystem>, store: &Arc<FlakyStore>) -> Scanner {
    Scanner::new(fs.clone(), Vec::new(), store.clone(), ScanConfig::default()).unwrap()
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let fs = sample_tree();
    // Default config allows two extra attempts per write.
    let store = Arc::new(FlakyStore::new(2));
    let scanner = flaky_scanner(&fs, &store);

    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(groups(&*store).await.len(), 3);
    assert_eq!(bundles(&*store).await.len(), 4);
    // 7 records written, the first one needed two retries
    assert_eq!(store.attempts.load(Ordering::SeqCst), 9);
}

#[tokio::test]
async fn test_exhausted_retries_keep_existing_records() {
    let fs = sample_tree();
    let store = Arc::new(FlakyStore::new(0));
    let scanner = flaky_scanner(&fs, &store);
    scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();
    let before = id_sets(&*store).await;

    store.always_fail.store(true, Ordering::SeqCst);
    let outcome = scanner.scan_library(&library(), Path::new(ROOT)).await.unwrap();

    assert!(outcome.deleted.is_empty());
    assert_eq!(id_sets(&*store).await, before);
    // The root write fails, so nothing below it is walked.
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::StoreWrite);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 7 + 3);
}
