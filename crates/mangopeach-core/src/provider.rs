//! Storage backend traits.
//!
//! The scanner never touches a filesystem or archive format directly; it goes
//! through a [`FileSystemProvider`] and an ordered list of
//! [`ArchiveProvider`]s injected at construction time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::model::{BundleKind, FileHandle};

/// Type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
    /// Symlinks, sockets, devices and anything else.
    Other,
}

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// File name (not full path).
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create a new entry.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Metadata returned by [`FileSystemProvider::stat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Durable handle, when the backend exposes one.
    pub handle: Option<FileHandle>,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

/// Directory listing, stat and reads over a storage backend.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// List the direct children of a directory.
    async fn read_dir(&self, path: &Path) -> ProviderResult<Vec<DirEntry>>;

    /// Read metadata of a file or directory.
    async fn stat(&self, path: &Path) -> ProviderResult<FileStat>;

    /// Read a whole file.
    async fn read_file(&self, path: &Path) -> ProviderResult<Vec<u8>>;

    /// Check whether a path exists.
    async fn exists(&self, path: &Path) -> bool;
}

/// An entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    /// Path of the entry inside the archive.
    pub path: String,
    pub is_dir: bool,
}

/// Lists and extracts entries of one container format.
#[async_trait]
pub trait ArchiveProvider: Send + Sync {
    /// Check if this provider handles the given archive (e.g. by extension).
    fn supports(&self, path: &Path) -> bool;

    /// Bundle type produced for archives handled by this provider.
    fn kind(&self) -> BundleKind;

    /// List the entries of an archive without extracting them.
    async fn entries(&self, archive: &Path) -> ProviderResult<Vec<ArchiveEntry>>;

    /// Extract a single entry.
    async fn extract(&self, archive: &Path, entry: &str) -> ProviderResult<Vec<u8>>;
}
