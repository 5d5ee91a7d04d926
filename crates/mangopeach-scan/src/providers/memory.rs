//! In-memory filesystem backend.
//!
//! Used as a fixture backend: tree shape, timestamps, durable handles and read
//! failures are all under the caller's control.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mangopeach_core::{
    DirEntry, EntryKind, FileHandle, FileStat, FileSystemProvider, ProviderError, ProviderResult,
};

#[derive(Debug, Clone)]
enum NodeData {
    Directory,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemoryNode {
    data: NodeData,
    handle: FileHandle,
    modified_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    unreadable: bool,
}

/// A filesystem held in a concurrent map keyed by absolute path.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: DashMap<PathBuf, MemoryNode>,
    next_handle: AtomicU64,
    with_handles: bool,
}

impl MemoryFileSystem {
    /// Create an empty filesystem that exposes durable handles.
    pub fn new() -> Self {
        Self {
            with_handles: true,
            ..Self::default()
        }
    }

    /// Create an empty filesystem without durable handles, so identities fall
    /// back to relative paths.
    pub fn without_handles() -> Self {
        Self::default()
    }

    /// Create a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() || self.nodes.contains_key(ancestor) {
                continue;
            }
            let node = self.new_node(NodeData::Directory);
            self.nodes.insert(ancestor.to_path_buf(), node);
        }
    }

    /// Create or overwrite a file, creating parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let node = self.new_node(NodeData::File(contents.into()));
        self.nodes.insert(path.to_path_buf(), node);
    }

    /// Make a directory fail on listing (or succeed again).
    pub fn set_unreadable(&self, path: impl AsRef<Path>, unreadable: bool) {
        if let Some(mut node) = self.nodes.get_mut(path.as_ref()) {
            node.unreadable = unreadable;
        }
    }

    /// Remove a path and everything under it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.nodes.retain(|key, _| !key.starts_with(path));
    }

    /// Move a path and everything under it, keeping durable handles.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        let (from, to) = (from.as_ref(), to.as_ref());
        let moved: Vec<PathBuf> = self
            .nodes
            .iter()
            .filter(|entry| entry.key().starts_with(from))
            .map(|entry| entry.key().clone())
            .collect();

        if let Some(parent) = to.parent() {
            self.add_dir(parent);
        }
        for old_path in moved {
            if let Some((_, node)) = self.nodes.remove(&old_path) {
                let suffix = old_path.strip_prefix(from).unwrap_or(Path::new(""));
                let new_path = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                self.nodes.insert(new_path, node);
            }
        }
    }

    /// Advance the modification time of a path.
    pub fn touch(&self, path: impl AsRef<Path>) {
        if let Some(mut node) = self.nodes.get_mut(path.as_ref()) {
            let now = Utc::now();
            node.modified_at = if now > node.modified_at {
                now
            } else {
                node.modified_at + Duration::milliseconds(1)
            };
        }
    }

    /// Get the durable handle of a path.
    pub fn handle_of(&self, path: impl AsRef<Path>) -> Option<FileHandle> {
        self.nodes.get(path.as_ref()).map(|node| node.handle.clone())
    }

    fn new_node(&self, data: NodeData) -> MemoryNode {
        let now = Utc::now();
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        MemoryNode {
            data,
            handle: FileHandle::new(format!("mem:{id}")),
            modified_at: now,
            created_at: now,
            unreadable: false,
        }
    }
}

#[async_trait]
impl FileSystemProvider for MemoryFileSystem {
    async fn read_dir(&self, path: &Path) -> ProviderResult<Vec<DirEntry>> {
        {
            let node = self
                .nodes
                .get(path)
                .ok_or_else(|| ProviderError::NotFound { path: path.to_path_buf() })?;
            if node.unreadable {
                return Err(ProviderError::PermissionDenied { path: path.to_path_buf() });
            }
            if !matches!(node.data, NodeData::Directory) {
                return Err(ProviderError::io(
                    path,
                    std::io::Error::other("not a directory"),
                ));
            }
        }

        let mut entries: Vec<DirEntry> = self
            .nodes
            .iter()
            .filter(|entry| entry.key().parent() == Some(path))
            .filter_map(|entry| {
                let name = entry.key().file_name()?.to_string_lossy().into_owned();
                let kind = match entry.value().data {
                    NodeData::Directory => EntryKind::Directory,
                    NodeData::File(_) => EntryKind::File,
                };
                Some(DirEntry::new(name, entry.key().clone(), kind))
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> ProviderResult<FileStat> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| ProviderError::NotFound { path: path.to_path_buf() })?;
        let size = match &node.data {
            NodeData::Directory => 0,
            NodeData::File(bytes) => bytes.len() as u64,
        };
        Ok(FileStat {
            handle: self.with_handles.then(|| node.handle.clone()),
            modified_at: node.modified_at,
            created_at: node.created_at,
            size,
        })
    }

    async fn read_file(&self, path: &Path) -> ProviderResult<Vec<u8>> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| ProviderError::NotFound { path: path.to_path_buf() })?;
        match &node.data {
            NodeData::File(bytes) => Ok(bytes.clone()),
            NodeData::Directory => Err(ProviderError::io(
                path,
                std::io::Error::other("is a directory"),
            )),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }
}
