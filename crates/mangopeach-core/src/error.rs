//! Error types for catalog operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BundleKind, LibraryId, LibraryKind};

/// Errors raised by filesystem and archive providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be parsed.
    #[error("Archive error at {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// The requested entry does not exist inside the archive.
    #[error("Entry {entry} not found in {archive}")]
    EntryNotFound { archive: PathBuf, entry: String },
}

impl ProviderError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an archive error.
    pub fn archive(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by a [`LibraryStore`](crate::LibraryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or could not perform the operation.
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// Reading or writing a snapshot file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot contents could not be (de)serialized.
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by catalog operations (scans, page reads, orchestration).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An entity with the given id does not exist.
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A page index outside of the bundle's page range.
    #[error("Page index {index} out of range: {}", page_range(.len))]
    OutOfRange { index: usize, len: usize },

    /// No archive provider is registered for a bundle's type.
    #[error("No archive provider found for type: {kind}")]
    UnsupportedType { kind: BundleKind },

    /// No filesystem provider is registered for a library's storage type.
    #[error("Unsupported library type: {kind}")]
    UnsupportedLibraryKind { kind: LibraryKind },

    /// A page identifier that is not one of the bundle's pages.
    #[error("Invalid page path: {path}")]
    InvalidPagePath { path: String },

    /// A scan of this library is already running.
    #[error("A scan of library {library} is already in progress")]
    ScanInProgress { library: LibraryId },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A directory could not be listed.
    ReadError,
    /// An entry could not be stat'ed.
    MetadataError,
    /// No archive provider supports the file.
    UnsupportedArchive,
    /// An archive could not be listed.
    ArchiveError,
    /// A store write failed after retries.
    StoreWrite,
    /// A stale record could not be deleted.
    StoreDelete,
}

/// Non-fatal warning encountered during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &ProviderError) -> Self {
        Self::new(path, format!("Read error: {error}"), WarningKind::ReadError)
    }

    /// Create an unsupported archive warning.
    pub fn unsupported_archive(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Unsupported archive type: {}", path.display()),
            path,
            kind: WarningKind::UnsupportedArchive,
        }
    }
}

fn page_range(len: &usize) -> String {
    match *len {
        0 => "bundle has no pages".to_string(),
        len => format!("valid pages are 0-{}", len - 1),
    }
}
