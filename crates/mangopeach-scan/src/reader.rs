//! Page listing and page reads for stored bundles.

use std::sync::Arc;

use mangopeach_core::file_types::is_image_file;
use mangopeach_core::natural_sort::natural_sort;
use mangopeach_core::{
    ArchiveProvider, Bundle, BundleDetails, BundleId, BundleKind, CatalogError,
};

use crate::providers::archive_for_kind;
use crate::scanner::Scanner;

impl Scanner {
    /// List a bundle's pages in natural order.
    ///
    /// Pages are file names for directory bundles and entry paths for archives.
    pub async fn bundle_details(&self, bundle_id: &BundleId) -> Result<BundleDetails, CatalogError> {
        let bundle = self.load_bundle(bundle_id).await?;
        let pages = self.list_pages(&bundle).await?;
        Ok(BundleDetails {
            id: bundle.id,
            pages,
        })
    }

    /// Read the page at `page_index` (0-based, natural order).
    pub async fn image_data(
        &self,
        bundle_id: &BundleId,
        page_index: usize,
    ) -> Result<Vec<u8>, CatalogError> {
        let bundle = self.load_bundle(bundle_id).await?;
        let pages = self.list_pages(&bundle).await?;
        let page = pages.get(page_index).ok_or(CatalogError::OutOfRange {
            index: page_index,
            len: pages.len(),
        })?;
        self.read_page(&bundle, page).await
    }

    /// Read a page by its identifier.
    ///
    /// Only identifiers listed by [`Scanner::bundle_details`] are accepted,
    /// compared verbatim. Anything else, including `./` spellings of a listed
    /// page or paths leaving the bundle, is an `InvalidPagePath`.
    pub async fn image_data_by_path(
        &self,
        bundle_id: &BundleId,
        page: &str,
    ) -> Result<Vec<u8>, CatalogError> {
        let bundle = self.load_bundle(bundle_id).await?;
        let pages = self.list_pages(&bundle).await?;
        if !pages.iter().any(|listed| listed == page) {
            return Err(CatalogError::InvalidPagePath {
                path: page.to_string(),
            });
        }
        self.read_page(&bundle, page).await
    }

    async fn load_bundle(&self, bundle_id: &BundleId) -> Result<Bundle, CatalogError> {
        self.store
            .get_bundle(bundle_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Bundle", bundle_id))
    }

    async fn list_pages(&self, bundle: &Bundle) -> Result<Vec<String>, CatalogError> {
        let pages: Vec<String> = match bundle.kind {
            BundleKind::Directory => self
                .fs
                .read_dir(&bundle.path)
                .await?
                .into_iter()
                .filter(|entry| entry.is_file() && is_image_file(&entry.name))
                .map(|entry| entry.name)
                .collect(),
            kind => self
                .archive_provider(kind)?
                .entries(&bundle.path)
                .await?
                .into_iter()
                .filter(|entry| !entry.is_dir && is_image_file(&entry.path))
                .map(|entry| entry.path)
                .collect(),
        };
        Ok(natural_sort(&pages))
    }

    async fn read_page(&self, bundle: &Bundle, page: &str) -> Result<Vec<u8>, CatalogError> {
        let data = match bundle.kind {
            BundleKind::Directory => self.fs.read_file(&bundle.path.join(page)).await?,
            kind => {
                self.archive_provider(kind)?
                    .extract(&bundle.path, page)
                    .await?
            }
        };
        Ok(data)
    }

    fn archive_provider(&self, kind: BundleKind) -> Result<&Arc<dyn ArchiveProvider>, CatalogError> {
        archive_for_kind(&self.archives, kind).ok_or(CatalogError::UnsupportedType { kind })
    }
}
