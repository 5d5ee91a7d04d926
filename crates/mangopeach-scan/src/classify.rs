//! Directory role classification.

use mangopeach_core::file_types::{is_archive_file, is_image_file};
use mangopeach_core::natural_sort::natural_cmp;
use mangopeach_core::DirEntry;

/// What a directory becomes in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRole {
    /// Neither images nor containers: nothing is recorded.
    Ignore,
    /// Images only: a viewable bundle.
    BundleOnly,
    /// Sub-directories or archives only: a navigational group.
    GroupOnly,
    /// Images next to sub-directories or archives: both at the same path.
    BundleAndGroup,
}

impl DirectoryRole {
    /// Decide the role from what a directory directly contains.
    pub fn classify(has_images: bool, has_container: bool) -> Self {
        match (has_images, has_container) {
            (false, false) => DirectoryRole::Ignore,
            (true, false) => DirectoryRole::BundleOnly,
            (false, true) => DirectoryRole::GroupOnly,
            (true, true) => DirectoryRole::BundleAndGroup,
        }
    }

    /// Check if the directory is recorded as a bundle.
    pub fn is_bundle(self) -> bool {
        matches!(self, DirectoryRole::BundleOnly | DirectoryRole::BundleAndGroup)
    }

    /// Check if the directory is recorded as a group and walked further.
    pub fn is_group(self) -> bool {
        matches!(self, DirectoryRole::GroupOnly | DirectoryRole::BundleAndGroup)
    }
}

/// The direct children of a directory that matter for classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySummary {
    /// Names of image files, in natural order.
    pub images: Vec<String>,
    /// At least one sub-directory or archive file.
    pub has_container: bool,
}

impl DirectorySummary {
    /// Summarize a directory listing.
    pub fn of(entries: &[DirEntry]) -> Self {
        let mut images: Vec<String> = entries
            .iter()
            .filter(|e| e.is_file() && is_image_file(&e.name))
            .map(|e| e.name.clone())
            .collect();
        images.sort_by(|a, b| natural_cmp(a, b));

        let has_container = entries
            .iter()
            .any(|e| e.is_dir() || (e.is_file() && is_archive_file(&e.name)));

        Self {
            images,
            has_container,
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// First page in natural order.
    pub fn cover(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn role(&self) -> DirectoryRole {
        DirectoryRole::classify(!self.images.is_empty(), self.has_container)
    }
}
