//! Core types and traits for mangopeach.
//!
//! This crate provides the catalog records (libraries, groups, bundles),
//! the storage and provider contracts, stable identity derivation, natural
//! sorting and configuration shared by the rest of the workspace.

mod config;
mod error;
pub mod file_types;
pub mod identity;
mod model;
pub mod natural_sort;
mod provider;
mod store;
mod tree;

pub use config::{
    CATALOG_FILE_NAME, CONFIG_FILE_NAME, DATA_PATH_ENV, LibraryConfig, ScanConfig,
    ScanConfigBuilder, ServerConfig, default_data_dir,
};
pub use error::{
    CatalogError, ProviderError, ProviderResult, ScanWarning, StoreError, StoreResult,
    WarningKind,
};
pub use model::{
    Bundle, BundleDetails, BundleId, BundleKind, FileHandle, Group, GroupId, Library, LibraryId,
    LibraryKind,
};
pub use provider::{
    ArchiveEntry, ArchiveProvider, DirEntry, EntryKind, FileStat, FileSystemProvider,
};
pub use store::{
    LibraryStore, LibraryUpdate, MemoryLibraryStore, NewLibrary, ParentScope, StoreSnapshot,
};
pub use tree::{CatalogStats, CatalogTree, GroupNode};
