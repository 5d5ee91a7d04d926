//! Stable identity generation.
//!
//! Ids are recomputed on every scan rather than stored as opaque state, so the
//! same physical object must always hash to the same id. A durable handle is
//! preferred because it survives renames; the root-relative path is the
//! fallback (archive members, backends without stable handles).
//!
//! Ids are the first [`ID_LENGTH`] hex characters of a BLAKE3 digest. The
//! truncation trades length against collision probability and is a tuning
//! parameter, not a guarantee at unbounded scale.

use std::path::{Component, Path};

use crate::model::{FileHandle, LibraryId};

/// Number of hex characters kept from the digest.
pub const ID_LENGTH: usize = 12;

/// Relative path used for a library's root directory.
pub const ROOT_RELATIVE_PATH: &str = ".";

/// Derive a stable id for an object inside a library.
pub fn stable_id(
    library_id: &LibraryId,
    handle: Option<&FileHandle>,
    fallback_relative_path: &str,
) -> String {
    let input = match handle {
        Some(handle) => format!("{library_id}:{handle}"),
        None => format!("{library_id}:{fallback_relative_path}"),
    };
    digest(&input)
}

/// Derive the id of a library from its directory handle, or its path.
pub fn library_id(directory_handle: Option<&FileHandle>, path: &Path) -> LibraryId {
    let input = match directory_handle {
        Some(handle) => handle.to_string(),
        None => path.to_string_lossy().into_owned(),
    };
    LibraryId::new(digest(&input))
}

/// Path of `path` relative to `root`, `/`-separated on every platform.
///
/// Returns [`ROOT_RELATIVE_PATH`] for the root itself. Paths outside `root`
/// are returned whole.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let Ok(stripped) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };

    let parts: Vec<_> = stripped
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        ROOT_RELATIVE_PATH.to_string()
    } else {
        parts.join("/")
    }
}

fn digest(input: &str) -> String {
    let hash = blake3::hash(input.as_bytes());
    hash.to_hex().as_str()[..ID_LENGTH].to_string()
}
