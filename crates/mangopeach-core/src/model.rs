//! Library, group and bundle records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id! {
    /// Identifier of a configured library.
    LibraryId
}

string_id! {
    /// Identifier of a navigational group.
    GroupId
}

string_id! {
    /// Identifier of a viewable bundle.
    BundleId
}

string_id! {
    /// Durable filesystem handle (for example device + inode) that survives
    /// renames and moves.
    FileHandle
}

/// Storage backend of a library.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LibraryKind {
    /// Local filesystem.
    Local,
    /// SMB share.
    Smb,
    /// FTP server.
    Ftp,
}

/// Container type of a bundle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum BundleKind {
    /// A plain directory of images.
    #[serde(rename = "directory")]
    #[strum(serialize = "directory")]
    Directory,
    /// Zip (or cbz) archive.
    #[serde(rename = "zip")]
    #[strum(serialize = "zip")]
    Zip,
    /// Rar (or cbr) archive.
    #[serde(rename = "rar")]
    #[strum(serialize = "rar")]
    Rar,
    /// 7-Zip archive.
    #[serde(rename = "7z")]
    #[strum(serialize = "7z")]
    SevenZip,
}

impl BundleKind {
    /// Check if pages are read through an archive provider.
    pub fn is_archive(&self) -> bool {
        !matches!(self, BundleKind::Directory)
    }
}

/// A configured scan root with its own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub path: PathBuf,
    pub kind: LibraryKind,
    pub enabled: bool,
    /// Periodic rescan interval, e.g. `"1h"`.
    pub scan_interval: Option<String>,
    /// Durable handle of the root directory, when the backend exposes one.
    pub directory_handle: Option<FileHandle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A folder acting as a navigational container of bundles and sub-groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: CompactString,
    pub path: PathBuf,
    pub library_id: LibraryId,
    /// `None` only for the root group of a library.
    pub parent_id: Option<GroupId>,
}

impl Group {
    /// Create a group record.
    pub fn new(
        id: GroupId,
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        library_id: LibraryId,
        parent_id: Option<GroupId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            library_id,
            parent_id,
        }
    }

    /// Check if this is the root group of its library.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A leaf, viewable volume: an image directory or an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub kind: BundleKind,
    pub name: CompactString,
    pub path: PathBuf,
    pub library_id: LibraryId,
    pub page_count: usize,
    /// Identifier of the cover page (first page in natural order).
    pub cover_image: Option<String>,
    pub display_name: CompactString,
    pub sort_name: CompactString,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
    pub file_handle: Option<FileHandle>,
    pub parent_id: Option<GroupId>,
}

impl Bundle {
    /// Create a bundle with display and sort names defaulted to `name`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: BundleId,
        kind: BundleKind,
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        library_id: LibraryId,
        page_count: usize,
        modified_at: DateTime<Utc>,
        file_handle: Option<FileHandle>,
        parent_id: Option<GroupId>,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id,
            kind,
            display_name: name.clone(),
            sort_name: name.clone(),
            name,
            path: path.into(),
            library_id,
            page_count,
            cover_image: None,
            tags: Vec::new(),
            created_at: now,
            modified_at,
            scanned_at: now,
            file_handle,
            parent_id,
        }
    }
}

/// Ordered page listing of a bundle, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDetails {
    pub id: BundleId,
    /// Page identifiers in natural order.
    pub pages: Vec<String>,
}

impl BundleDetails {
    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
