//! Change analysis for mangopeach catalogs.
//!
//! This crate compares two snapshots of a library's bundles and reports
//! what happened between them:
//!
//! - **Updated** - same path, different modification time
//! - **Moved** - different path, same durable handle
//! - **Added** / **Deleted** - everything left unpaired
//!
//! # Reconciliation
//!
//! Pairing happens in two passes:
//!
//! 1. Pair by path. A bundle paired here is never considered for a move,
//!    even if its handle shows up elsewhere.
//! 2. Pair the remaining bundles by durable handle.
//!
//! ```rust,ignore
//! use mangopeach_analyze::reconcile;
//!
//! let before = store.get_bundles(&library_id, ParentScope::Any).await?;
//! scanner.scan_library(&library_id, &root).await?;
//! let after = store.get_bundles(&library_id, ParentScope::Any).await?;
//!
//! let changes = reconcile(&before, &after);
//! println!("{}", changes.summary());
//! for change in &changes.moved {
//!     println!("{} -> {}", change.from.path.display(), change.to.path.display());
//! }
//! ```

mod reconcile;

pub use reconcile::{BundleMove, ChangeSet, ChangeSummary, reconcile};
