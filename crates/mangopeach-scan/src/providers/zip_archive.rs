//! Zip / cbz archive backend.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mangopeach_core::file_types::has_extension;
use mangopeach_core::{ArchiveEntry, ArchiveProvider, BundleKind, ProviderError, ProviderResult};
use zip::result::ZipError;
use zip::ZipArchive;

/// Extensions handled by [`ZipArchiveProvider`].
pub const ZIP_EXTENSIONS: &[&str] = &[".zip", ".cbz"];

/// Lists and extracts zip archives from the local disk.
///
/// Archive parsing is blocking and runs on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveProvider;

impl ZipArchiveProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveProvider for ZipArchiveProvider {
    fn supports(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| has_extension(&name.to_string_lossy(), ZIP_EXTENSIONS))
            .unwrap_or(false)
    }

    fn kind(&self) -> BundleKind {
        BundleKind::Zip
    }

    async fn entries(&self, archive: &Path) -> ProviderResult<Vec<ArchiveEntry>> {
        let archive = archive.to_path_buf();
        let path = archive.clone();
        tokio::task::spawn_blocking(move || list_entries(&archive))
            .await
            .map_err(|e| ProviderError::archive(path, e))?
    }

    async fn extract(&self, archive: &Path, entry: &str) -> ProviderResult<Vec<u8>> {
        let archive = archive.to_path_buf();
        let entry = entry.to_string();
        let path = archive.clone();
        tokio::task::spawn_blocking(move || extract_entry(&archive, &entry))
            .await
            .map_err(|e| ProviderError::archive(path, e))?
    }
}

fn open(path: &Path) -> ProviderResult<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| ProviderError::io(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(path, e))
}

fn list_entries(path: &Path) -> ProviderResult<Vec<ArchiveEntry>> {
    let mut archive = open(path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive.by_index(index).map_err(|e| zip_error(path, e))?;
        let entry_path = file.name().to_string();
        let name = entry_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        entries.push(ArchiveEntry {
            name,
            path: entry_path,
            is_dir: file.is_dir(),
        });
    }

    tracing::debug!(path = %path.display(), entries = entries.len(), "Listed archive");
    Ok(entries)
}

fn extract_entry(path: &Path, entry: &str) -> ProviderResult<Vec<u8>> {
    let mut archive = open(path)?;
    let mut file = match archive.by_name(entry) {
        Ok(file) if !file.is_dir() => file,
        Ok(_) | Err(ZipError::FileNotFound) => {
            return Err(ProviderError::EntryNotFound {
                archive: path.to_path_buf(),
                entry: entry.to_string(),
            });
        }
        Err(err) => return Err(zip_error(path, err)),
    };

    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| ProviderError::io(PathBuf::from(path), e))?;
    Ok(bytes)
}

fn zip_error(path: &Path, err: ZipError) -> ProviderError {
    match err {
        ZipError::Io(source) => ProviderError::io(path, source),
        other => ProviderError::archive(path, other),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use super::*;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        writer.add_directory("pages/", options).unwrap();
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_supports_extensions() {
        let provider = ZipArchiveProvider::new();
        assert!(provider.supports(Path::new("/lib/Vol 1.cbz")));
        assert!(provider.supports(Path::new("/lib/Vol 1.ZIP")));
        assert!(!provider.supports(Path::new("/lib/Vol 1.cbr")));
        assert!(!provider.supports(Path::new("/lib/cbz")));
        assert_eq!(provider.kind(), BundleKind::Zip);
    }

    #[tokio::test]
    async fn test_entries_and_extract() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vol.cbz");
        write_zip(&path, &[("pages/01.jpg", "one"), ("pages/02.jpg", "two")]);

        let provider = ZipArchiveProvider::new();
        let entries = provider.entries(&path).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name, "01.jpg");
        assert_eq!(entries[1].path, "pages/01.jpg");

        let data = provider.extract(&path, "pages/02.jpg").await.unwrap();
        assert_eq!(data, b"two");
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vol.zip");
        write_zip(&path, &[("01.png", "one")]);

        let err = ZipArchiveProvider::new()
            .extract(&path, "99.png")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.cbz");
        std::fs::write(&path, vec![b'x'; 256]).unwrap();

        let err = ZipArchiveProvider::new().entries(&path).await.unwrap_err();
        assert!(matches!(err, ProviderError::Archive { .. }));
    }
}
