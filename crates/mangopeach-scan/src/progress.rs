//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use mangopeach_core::LibraryId;
use serde::{Deserialize, Serialize};

/// Progress information during a scan, published once per visited directory.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Library being scanned.
    pub library_id: LibraryId,
    /// Number of directories visited so far.
    pub dirs_scanned: u64,
    /// Number of bundles recorded so far.
    pub bundles_found: u64,
    /// Number of groups recorded so far.
    pub groups_found: u64,
    /// Directory currently being visited.
    pub current_path: PathBuf,
    /// Number of warnings encountered.
    pub warnings_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new(library_id: LibraryId) -> Self {
        Self {
            library_id,
            dirs_scanned: 0,
            bundles_found: 0,
            groups_found: 0,
            current_path: PathBuf::new(),
            warnings_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Directories visited per second.
    pub fn dirs_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.dirs_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total records written (groups + bundles).
    pub fn total_items(&self) -> u64 {
        self.bundles_found + self.groups_found
    }
}

/// Counters for a finished scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub dirs_scanned: u64,
    pub groups_upserted: u64,
    pub bundles_upserted: u64,
    /// Pages counted across upserted bundles.
    pub pages_indexed: u64,
    pub groups_deleted: u64,
    pub bundles_deleted: u64,
    /// Stale records kept because their subtree could not be read or written.
    pub records_preserved: u64,
}

/// Running counters of one scan.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    library_id: LibraryId,
    stats: ScanStats,
    warnings_count: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new(library_id: LibraryId) -> Self {
        Self {
            start_time: Instant::now(),
            library_id,
            stats: ScanStats::default(),
            warnings_count: 0,
            current_path: PathBuf::new(),
        }
    }

    pub fn record_dir(&mut self, path: &Path) {
        self.stats.dirs_scanned += 1;
        self.current_path = path.to_path_buf();
    }

    pub fn record_group(&mut self) {
        self.stats.groups_upserted += 1;
    }

    pub fn record_bundle(&mut self, pages: usize) {
        self.stats.bundles_upserted += 1;
        self.stats.pages_indexed += pages as u64;
    }

    pub fn record_warning(&mut self) {
        self.warnings_count += 1;
    }

    pub fn stats_mut(&mut self) -> &mut ScanStats {
        &mut self.stats
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            library_id: self.library_id.clone(),
            dirs_scanned: self.stats.dirs_scanned,
            bundles_found: self.stats.bundles_upserted,
            groups_found: self.stats.groups_upserted,
            current_path: self.current_path.clone(),
            warnings_count: self.warnings_count,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub fn finish(self) -> (ScanStats, Duration) {
        (self.stats, self.start_time.elapsed())
    }
}
