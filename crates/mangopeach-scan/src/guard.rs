//! Per-library scan exclusion.

use std::sync::Arc;

use dashmap::DashSet;
use mangopeach_core::LibraryId;

/// Tracks which libraries are currently being scanned.
///
/// Clones share the same set, so scanners built for different libraries can
/// still refuse overlapping scans of one library.
#[derive(Debug, Clone, Default)]
pub struct ScanRegistry {
    active: Arc<DashSet<LibraryId>>,
}

impl ScanRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a library as scanning. Returns `None` if it already is.
    pub fn try_acquire(&self, library_id: &LibraryId) -> Option<ScanGuard> {
        if self.active.insert(library_id.clone()) {
            Some(ScanGuard {
                active: Arc::clone(&self.active),
                library_id: library_id.clone(),
            })
        } else {
            None
        }
    }

    /// Check if a library is being scanned.
    pub fn is_scanning(&self, library_id: &LibraryId) -> bool {
        self.active.contains(library_id)
    }

    /// Get the number of running scans.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Check if no scan is running.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Held for the duration of a scan; releases the library on drop.
#[derive(Debug)]
pub struct ScanGuard {
    active: Arc<DashSet<LibraryId>>,
    library_id: LibraryId,
}

impl ScanGuard {
    pub fn library_id(&self) -> &LibraryId {
        &self.library_id
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.active.remove(&self.library_id);
    }
}
