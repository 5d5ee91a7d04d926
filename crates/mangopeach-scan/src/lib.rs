//! Library scanning engine for mangopeach.
//!
//! This crate walks a library through an injected [`FileSystemProvider`],
//! decides which directories are bundles and which are groups, writes the
//! records through a [`LibraryStore`] and removes the ones that disappeared.
//!
//! # Overview
//!
//! - **Dual classification**: a directory holding images *and* sub-folders
//!   is both a bundle and a group
//! - **Stable identity** across rescans (durable handle, else relative path)
//! - **Progress updates** via broadcast channels
//! - **Failure containment**: unreadable subtrees and failed writes keep their
//!   existing records instead of being deleted
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use mangopeach_scan::{
//!     LibraryId, LocalFileSystem, MemoryLibraryStore, ProviderRegistry, ScanConfig, Scanner,
//! };
//!
//! # async fn run() -> Result<(), mangopeach_scan::CatalogError> {
//! let scanner = Scanner::new(
//!     Arc::new(LocalFileSystem::new()),
//!     ProviderRegistry::with_defaults().archives().to_vec(),
//!     Arc::new(MemoryLibraryStore::new()),
//!     ScanConfig::default(),
//! )?;
//!
//! let outcome = scanner
//!     .scan_library(&LibraryId::new("comics"), Path::new("/srv/comics"))
//!     .await?;
//! println!("Indexed {} bundles", outcome.stats.bundles_upserted);
//! # Ok(())
//! # }
//! ```
//!
//! [`FileSystemProvider`]: mangopeach_core::FileSystemProvider
//! [`LibraryStore`]: mangopeach_core::LibraryStore

mod classify;
mod guard;
mod progress;
mod providers;
mod reader;
mod scanner;

pub use classify::{DirectoryRole, DirectorySummary};
pub use guard::{ScanGuard, ScanRegistry};
pub use progress::{ScanProgress, ScanStats};
pub use providers::{
    LocalFileSystem, MemoryFileSystem, ProviderRegistry, ZIP_EXTENSIONS, ZipArchiveProvider,
    archive_for_kind, archive_for_path,
};
pub use scanner::{ScanOutcome, Scanner};

// Re-export core types for convenience
pub use mangopeach_core::{
    Bundle, BundleDetails, BundleId, BundleKind, CatalogError, Group, GroupId, LibraryId,
    MemoryLibraryStore, ScanConfig, ScanWarning, WarningKind,
};
