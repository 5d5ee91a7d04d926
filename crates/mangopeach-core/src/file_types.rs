//! Fixed classification tables for page images and archives.

/// Extensions recognized as page images.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Extensions recognized as bundle archives.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".cbz", ".rar", ".cbr"];

/// Check if a file name is a page image (case-insensitive suffix match).
pub fn is_image_file(name: &str) -> bool {
    has_extension(name, IMAGE_EXTENSIONS)
}

/// Check if a file name is a bundle archive (case-insensitive suffix match).
pub fn is_archive_file(name: &str) -> bool {
    has_extension(name, ARCHIVE_EXTENSIONS)
}

/// Case-insensitive suffix match against a list of extensions.
pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lowered = name.to_ascii_lowercase();
    extensions.iter().any(|ext| lowered.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_files() {
        assert!(is_image_file("001.jpg"));
        assert!(is_image_file("COVER.JPEG"));
        assert!(is_image_file("page.WebP"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("jpg"));
    }

    #[test]
    fn test_archive_files() {
        assert!(is_archive_file("Vol. 01.cbz"));
        assert!(is_archive_file("chapter.RAR"));
        assert!(!is_archive_file("chapter.7z"));
        assert!(!is_archive_file("cover.png"));
    }
}
