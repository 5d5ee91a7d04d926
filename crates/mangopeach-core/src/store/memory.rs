//! In-memory [`LibraryStore`] with JSON snapshot persistence.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{LibraryStore, LibraryUpdate, NewLibrary, ParentScope};
use crate::error::{StoreError, StoreResult};
use crate::identity;
use crate::model::{Bundle, BundleId, FileHandle, Group, GroupId, Library, LibraryId};

/// Serializable copy of a store's contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub libraries: Vec<Library>,
    pub groups: Vec<Group>,
    pub bundles: Vec<Bundle>,
}

/// Keyed in-memory collections, safe to share between concurrent scans.
#[derive(Debug, Default)]
pub struct MemoryLibraryStore {
    libraries: DashMap<LibraryId, Library>,
    groups: DashMap<GroupId, Group>,
    bundles: DashMap<BundleId, Bundle>,
}

impl MemoryLibraryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for library in snapshot.libraries {
            store.libraries.insert(library.id.clone(), library);
        }
        for group in snapshot.groups {
            store.groups.insert(group.id.clone(), group);
        }
        for bundle in snapshot.bundles {
            store.bundles.insert(bundle.id.clone(), bundle);
        }
        store
    }

    /// Copy the current contents, ordered by path.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut libraries: Vec<Library> = self.libraries.iter().map(|e| e.value().clone()).collect();
        libraries.sort_by(|a, b| a.path.cmp(&b.path));
        let mut groups: Vec<Group> = self.groups.iter().map(|e| e.value().clone()).collect();
        groups.sort_by(|a, b| a.path.cmp(&b.path));
        let mut bundles: Vec<Bundle> = self.bundles.iter().map(|e| e.value().clone()).collect();
        bundles.sort_by(|a, b| a.path.cmp(&b.path));
        StoreSnapshot {
            libraries,
            groups,
            bundles,
        }
    }

    /// Load a store from a JSON snapshot file. A missing file yields an empty store.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No catalog snapshot, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let snapshot: StoreSnapshot = serde_json::from_slice(&data)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents to a JSON snapshot file.
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let io_error = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        tokio::fs::write(path, json).await.map_err(io_error)?;
        tracing::debug!(path = %path.display(), "Catalog snapshot saved");
        Ok(())
    }

    fn find_library(&self, predicate: impl Fn(&Library) -> bool) -> Option<Library> {
        self.libraries
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl LibraryStore for MemoryLibraryStore {
    async fn get_all_libraries(&self) -> StoreResult<Vec<Library>> {
        Ok(self.snapshot().libraries)
    }

    async fn get_library(&self, id: &LibraryId) -> StoreResult<Option<Library>> {
        Ok(self.libraries.get(id).map(|e| e.value().clone()))
    }

    async fn find_library_by_handle(&self, handle: &FileHandle) -> StoreResult<Option<Library>> {
        Ok(self.find_library(|library| library.directory_handle.as_ref() == Some(handle)))
    }

    async fn find_library_by_path(&self, path: &Path) -> StoreResult<Option<Library>> {
        Ok(self.find_library(|library| library.path == path))
    }

    async fn create_library(&self, library: NewLibrary) -> StoreResult<Library> {
        let now = Utc::now();
        let created = Library {
            id: identity::library_id(library.directory_handle.as_ref(), &library.path),
            name: library.name,
            path: library.path,
            kind: library.kind,
            enabled: library.enabled,
            scan_interval: library.scan_interval,
            directory_handle: library.directory_handle,
            created_at: now,
            updated_at: now,
        };
        self.libraries.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_library(
        &self,
        id: &LibraryId,
        update: LibraryUpdate,
    ) -> StoreResult<Option<Library>> {
        let Some(mut library) = self.libraries.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            library.name = name;
        }
        if let Some(path) = update.path {
            library.path = path;
        }
        if let Some(kind) = update.kind {
            library.kind = kind;
        }
        if let Some(enabled) = update.enabled {
            library.enabled = enabled;
        }
        if let Some(scan_interval) = update.scan_interval {
            library.scan_interval = scan_interval;
        }
        if let Some(handle) = update.directory_handle {
            library.directory_handle = handle;
        }
        library.updated_at = Utc::now();
        Ok(Some(library.clone()))
    }

    async fn delete_library(&self, id: &LibraryId) -> StoreResult<()> {
        self.libraries.remove(id);
        self.groups.retain(|_, group| &group.library_id != id);
        self.bundles.retain(|_, bundle| &bundle.library_id != id);
        Ok(())
    }

    async fn get_groups(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|e| &e.library_id == library_id && parent.matches(e.parent_id.as_ref()))
            .map(|e| e.value().clone())
            .collect();
        groups.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(groups)
    }

    async fn get_bundles(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Bundle>> {
        let mut bundles: Vec<Bundle> = self
            .bundles
            .iter()
            .filter(|e| &e.library_id == library_id && parent.matches(e.parent_id.as_ref()))
            .map(|e| e.value().clone())
            .collect();
        bundles.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(bundles)
    }

    async fn upsert_group(&self, group: Group) -> StoreResult<()> {
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn upsert_bundle(&self, bundle: Bundle) -> StoreResult<()> {
        self.bundles.insert(bundle.id.clone(), bundle);
        Ok(())
    }

    async fn delete_group(&self, id: &GroupId) -> StoreResult<()> {
        self.groups.remove(id);
        Ok(())
    }

    async fn delete_bundle(&self, id: &BundleId) -> StoreResult<()> {
        self.bundles.remove(id);
        Ok(())
    }

    async fn get_group(&self, id: &GroupId) -> StoreResult<Option<Group>> {
        Ok(self.groups.get(id).map(|e| e.value().clone()))
    }

    async fn get_bundle(&self, id: &BundleId) -> StoreResult<Option<Bundle>> {
        Ok(self.bundles.get(id).map(|e| e.value().clone()))
    }
}
