//! Diffing of two bundle snapshots into a change set.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use mangopeach_core::{Bundle, FileHandle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A bundle that kept its durable handle but changed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMove {
    pub from: Bundle,
    pub to: Bundle,
}

/// Difference between two snapshots of a library's bundles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New bundles, in the order of the new snapshot.
    pub added: Vec<Bundle>,
    /// Bundles at an unchanged path whose modification time changed.
    pub updated: Vec<Bundle>,
    /// Bundles matched by durable handle at a different path.
    pub moved: Vec<BundleMove>,
    /// Bundles gone from the new snapshot, in the order of the old one.
    pub deleted: Vec<Bundle>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Number of changes across all categories.
    pub fn total(&self) -> usize {
        self.added.len() + self.updated.len() + self.moved.len() + self.deleted.len()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            added: self.added.len(),
            updated: self.updated.len(),
            moved: self.moved.len(),
            deleted: self.deleted.len(),
        }
    }
}

/// Per-category counts of a [`ChangeSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub updated: usize,
    pub moved: usize,
    pub deleted: usize,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} moved, {} deleted",
            self.added, self.updated, self.moved, self.deleted
        )
    }
}

/// Compare two bundle snapshots.
///
/// Bundles are paired by path first; a pair whose modification time differs
/// is reported as updated. Unpaired bundles are then matched by durable
/// handle and reported as moves. Whatever is left over is deleted (old side)
/// or added (new side).
///
/// When a snapshot contains the same path or handle twice, the first
/// occurrence wins.
pub fn reconcile(old: &[Bundle], new: &[Bundle]) -> ChangeSet {
    let mut old_by_path: IndexMap<&Path, &Bundle> = IndexMap::with_capacity(old.len());
    let mut old_by_handle: IndexMap<&FileHandle, &Bundle> = IndexMap::new();
    for bundle in old {
        old_by_path.entry(bundle.path.as_path()).or_insert(bundle);
        if let Some(handle) = &bundle.file_handle {
            old_by_handle.entry(handle).or_insert(bundle);
        }
    }

    let mut new_by_path: IndexMap<&Path, &Bundle> = IndexMap::with_capacity(new.len());
    for bundle in new {
        new_by_path.entry(bundle.path.as_path()).or_insert(bundle);
    }

    let mut changes = ChangeSet::default();

    // Pair by path.
    let mut unmatched = Vec::new();
    for (path, bundle) in new_by_path {
        match old_by_path.shift_remove(path) {
            Some(previous) => {
                if let Some(handle) = &previous.file_handle {
                    old_by_handle.shift_remove(handle);
                }
                if previous.modified_at != bundle.modified_at {
                    changes.updated.push(bundle.clone());
                }
            }
            None => unmatched.push(bundle),
        }
    }

    // Pair the rest by durable handle.
    for bundle in unmatched {
        let previous = bundle
            .file_handle
            .as_ref()
            .and_then(|handle| old_by_handle.shift_remove(handle))
            .filter(|previous| old_by_path.shift_remove(previous.path.as_path()).is_some());
        match previous {
            Some(previous) => changes.moved.push(BundleMove {
                from: previous.clone(),
                to: bundle.clone(),
            }),
            None => changes.added.push(bundle.clone()),
        }
    }

    changes.deleted = old_by_path.into_values().cloned().collect();

    debug!(
        old = old.len(),
        new = new.len(),
        changes = %changes.summary(),
        "Reconciled bundle snapshots"
    );

    changes
}
