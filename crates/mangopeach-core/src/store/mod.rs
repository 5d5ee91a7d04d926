//! Persistence contract for libraries, groups and bundles.

mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Bundle, BundleId, FileHandle, Group, GroupId, Library, LibraryId, LibraryKind};

pub use memory::{MemoryLibraryStore, StoreSnapshot};

/// Which records of a library a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentScope<'a> {
    /// Every record of the library.
    Any,
    /// Records without a parent (the root group).
    Root,
    /// Direct children of a group.
    Group(&'a GroupId),
}

impl ParentScope<'_> {
    /// Check if a record with the given parent falls inside this scope.
    pub fn matches(&self, parent: Option<&GroupId>) -> bool {
        match self {
            ParentScope::Any => true,
            ParentScope::Root => parent.is_none(),
            ParentScope::Group(id) => parent == Some(*id),
        }
    }
}

/// Data for a library that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLibrary {
    pub name: String,
    pub path: PathBuf,
    pub kind: LibraryKind,
    pub enabled: bool,
    pub scan_interval: Option<String>,
    pub directory_handle: Option<FileHandle>,
}

/// Partial update of a library. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryUpdate {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub kind: Option<LibraryKind>,
    pub enabled: Option<bool>,
    pub scan_interval: Option<Option<String>>,
    pub directory_handle: Option<Option<FileHandle>>,
}

impl LibraryUpdate {
    /// Check if the update changes anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Contract for storing and retrieving catalog records.
///
/// Listings are ordered by path. Implementations must keep libraries
/// independent: operations on one library id never touch another's records.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Retrieve every library.
    async fn get_all_libraries(&self) -> StoreResult<Vec<Library>>;

    /// Retrieve a library by id.
    async fn get_library(&self, id: &LibraryId) -> StoreResult<Option<Library>>;

    /// Find a library by the durable handle of its root directory.
    async fn find_library_by_handle(&self, handle: &FileHandle) -> StoreResult<Option<Library>>;

    /// Find a library by its configured path.
    async fn find_library_by_path(&self, path: &Path) -> StoreResult<Option<Library>>;

    /// Create a library, assigning its id and timestamps.
    async fn create_library(&self, library: NewLibrary) -> StoreResult<Library>;

    /// Apply a partial update. Returns `None` if the library does not exist.
    async fn update_library(
        &self,
        id: &LibraryId,
        update: LibraryUpdate,
    ) -> StoreResult<Option<Library>>;

    /// Delete a library together with its groups and bundles.
    async fn delete_library(&self, id: &LibraryId) -> StoreResult<()>;

    /// List groups of a library.
    async fn get_groups(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Group>>;

    /// List bundles of a library.
    async fn get_bundles(
        &self,
        library_id: &LibraryId,
        parent: ParentScope<'_>,
    ) -> StoreResult<Vec<Bundle>>;

    /// Insert or replace a group.
    async fn upsert_group(&self, group: Group) -> StoreResult<()>;

    /// Insert or replace a bundle.
    async fn upsert_bundle(&self, bundle: Bundle) -> StoreResult<()>;

    /// Delete a group. Deleting a missing group is not an error.
    async fn delete_group(&self, id: &GroupId) -> StoreResult<()>;

    /// Delete a bundle. Deleting a missing bundle is not an error.
    async fn delete_bundle(&self, id: &BundleId) -> StoreResult<()>;

    /// Retrieve a group by id.
    async fn get_group(&self, id: &GroupId) -> StoreResult<Option<Group>>;

    /// Retrieve a bundle by id.
    async fn get_bundle(&self, id: &BundleId) -> StoreResult<Option<Bundle>>;
}
