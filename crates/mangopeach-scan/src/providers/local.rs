//! Local filesystem backend on `tokio::fs`.

use std::fs::Metadata;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mangopeach_core::{
    DirEntry, EntryKind, FileHandle, FileStat, FileSystemProvider, ProviderError, ProviderResult,
};

/// Reads directories and files from the local disk.
///
/// Symlinks are reported as [`EntryKind::Other`] and not followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystemProvider for LocalFileSystem {
    async fn read_dir(&self, path: &Path) -> ProviderResult<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ProviderError::io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ProviderError::io(path, e))?
        {
            let entry_path = entry.path();
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => EntryKind::Directory,
                Ok(ft) if ft.is_file() => EntryKind::File,
                Ok(_) => EntryKind::Other,
                Err(err) => {
                    tracing::debug!(path = %entry_path.display(), error = %err, "Cannot read file type");
                    EntryKind::Other
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(DirEntry::new(name, entry_path, kind));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> ProviderResult<FileStat> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ProviderError::io(path, e))?;
        Ok(file_stat(&metadata))
    }

    async fn read_file(&self, path: &Path) -> ProviderResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| ProviderError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

fn file_stat(metadata: &Metadata) -> FileStat {
    let modified_at: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or(DateTime::UNIX_EPOCH);
    let created_at = metadata
        .created()
        .map(DateTime::from)
        .unwrap_or(modified_at);

    FileStat {
        handle: durable_handle(metadata),
        modified_at,
        created_at,
        size: metadata.len(),
    }
}

/// Device and inode pair, stable across renames within one filesystem.
#[cfg(unix)]
fn durable_handle(metadata: &Metadata) -> Option<FileHandle> {
    Some(FileHandle::new(format!("{}:{}", metadata.dev(), metadata.ino())))
}

#[cfg(not(unix))]
fn durable_handle(_metadata: &Metadata) -> Option<FileHandle> {
    None
}
