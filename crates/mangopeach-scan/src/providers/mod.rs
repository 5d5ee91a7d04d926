//! Storage backends and provider selection.

mod local;
mod memory;
mod zip_archive;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mangopeach_core::{ArchiveProvider, BundleKind, FileSystemProvider, LibraryKind};

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;
pub use zip_archive::{ZIP_EXTENSIONS, ZipArchiveProvider};

/// First archive provider that supports the given file.
pub fn archive_for_path<'a>(
    providers: &'a [Arc<dyn ArchiveProvider>],
    path: &Path,
) -> Option<&'a Arc<dyn ArchiveProvider>> {
    providers.iter().find(|provider| provider.supports(path))
}

/// First archive provider producing the given bundle type.
pub fn archive_for_kind(
    providers: &[Arc<dyn ArchiveProvider>],
    kind: BundleKind,
) -> Option<&Arc<dyn ArchiveProvider>> {
    providers.iter().find(|provider| provider.kind() == kind)
}

/// Filesystem backends per library type plus the ordered archive providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    filesystems: HashMap<LibraryKind, Arc<dyn FileSystemProvider>>,
    archives: Vec<Arc<dyn ArchiveProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local disk plus zip archives.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_filesystem(LibraryKind::Local, Arc::new(LocalFileSystem::new()))
            .with_archive(Arc::new(ZipArchiveProvider::new()))
    }

    /// Register the backend for a library type, replacing any previous one.
    pub fn with_filesystem(
        mut self,
        kind: LibraryKind,
        filesystem: Arc<dyn FileSystemProvider>,
    ) -> Self {
        self.filesystems.insert(kind, filesystem);
        self
    }

    /// Append an archive provider. Earlier providers take precedence.
    pub fn with_archive(mut self, provider: Arc<dyn ArchiveProvider>) -> Self {
        self.archives.push(provider);
        self
    }

    /// Backend for a library type, if one is registered.
    pub fn filesystem(&self, kind: LibraryKind) -> Option<Arc<dyn FileSystemProvider>> {
        self.filesystems.get(&kind).cloned()
    }

    pub fn supports(&self, kind: LibraryKind) -> bool {
        self.filesystems.contains_key(&kind)
    }

    pub fn archives(&self) -> &[Arc<dyn ArchiveProvider>] {
        &self.archives
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self.filesystems.keys().map(ToString::to_string).collect();
        let archives: Vec<String> = self.archives.iter().map(|a| a.kind().to_string()).collect();
        f.debug_struct("ProviderRegistry")
            .field("filesystems", &kinds)
            .field("archives", &archives)
            .finish()
    }
}
