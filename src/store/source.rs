//! Page source: writes pages through the codec into a backend and loads
//! them back, verifying checksums and caching decoded pages.

use std::ops::Deref;
use std::sync::Arc;

use tracing::trace;

use crate::data::{EncodeError, NodeFactory};

use super::arena::PageArena;
use super::backend::Backend;
use super::codec::{checksum, PageCodec};
use super::error::{PageError, Result};
use super::metrics::StoreMetrics;
use super::page::Page;
use super::page_cache::{CommittedPage, PageCache};
use super::page_reference::{PageLocator, PageReference};

/// A page reached while walking a tree: either owned by the write
/// transaction or shared from a committed revision.
pub enum PageView<'a> {
    Dirty(&'a Page),
    Committed(CommittedPage),
}

impl Deref for PageView<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match self {
            PageView::Dirty(page) => *page,
            PageView::Committed(page) => &**page,
        }
    }
}

/// Reads and writes pages for one store.
pub struct PageSource {
    backend: Arc<dyn Backend>,
    codec: PageCodec,
    cache: PageCache,
    metrics: Arc<StoreMetrics>,
}

impl PageSource {
    pub fn new(
        backend: Arc<dyn Backend>,
        factory: Arc<dyn NodeFactory>,
        cache_capacity: usize,
        metrics: Arc<StoreMetrics>,
    ) -> Self {
        Self {
            backend,
            codec: PageCodec::new(factory),
            cache: PageCache::new(cache_capacity),
            metrics,
        }
    }

    pub fn codec(&self) -> &PageCodec {
        &self.codec
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Encodes and stores a page with no in-memory references.
    pub fn write_page(&self, page: &Page) -> Result<PageLocator> {
        let bytes = self.codec.encode(page)?;
        self.write_encoded(&bytes)
    }

    /// Stores already-encoded page bytes.
    pub fn write_encoded(&self, bytes: &[u8]) -> Result<PageLocator> {
        let length =
            u32::try_from(bytes.len()).map_err(|_| EncodeError::TooLarge(bytes.len()))?;
        let storage_key = self.backend.append(bytes)?;
        self.metrics.inc_pages_written(bytes.len() as u64);
        Ok(PageLocator {
            storage_key,
            length,
            checksum: checksum(bytes),
        })
    }

    /// Loads a committed page, from cache when possible.
    pub fn load(&self, locator: &PageLocator) -> Result<CommittedPage> {
        if let Some(page) = self.cache.get(locator.storage_key) {
            self.metrics.inc_cache_hits();
            return Ok(page);
        }
        let bytes = self.backend.read(locator.storage_key, locator.length)?;
        if bytes.len() != locator.length as usize || checksum(&bytes) != locator.checksum {
            return Err(PageError::ChecksumMismatch {
                storage_key: locator.storage_key,
            });
        }
        self.metrics.inc_pages_read(bytes.len() as u64);
        let page = CommittedPage::new(self.codec.decode(&bytes)?);
        trace!(storage_key = locator.storage_key, kind = ?page.kind(), "page loaded");
        self.cache.insert(locator.storage_key, page.clone());
        Ok(page)
    }

    /// Resolves a reference. In-memory references need the owning arena.
    pub fn resolve<'a>(
        &self,
        reference: &PageReference,
        arena: Option<&'a PageArena>,
    ) -> Result<Option<PageView<'a>>> {
        match reference {
            PageReference::Null => Ok(None),
            PageReference::Persisted(locator) => Ok(Some(PageView::Committed(self.load(locator)?))),
            PageReference::InMemory { handle, .. } => {
                let arena = arena.ok_or(PageError::Unpersisted)?;
                Ok(Some(PageView::Dirty(arena.get(*handle)?)))
            }
        }
    }

    pub fn read_root(&self) -> Result<Option<PageLocator>> {
        self.backend.read_root()
    }

    pub fn write_root(&self, root: &PageLocator) -> Result<()> {
        self.backend.write_root(root)
    }

    pub fn sync(&self) -> Result<()> {
        self.backend.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DefaultNodeFactory;
    use crate::store::{MemoryBackend, NamePage, PageArena};

    fn source(backend: Arc<MemoryBackend>, cache: usize) -> PageSource {
        PageSource::new(
            backend,
            Arc::new(DefaultNodeFactory),
            cache,
            Arc::new(StoreMetrics::new()),
        )
    }

    fn names() -> Page {
        let mut names = NamePage::default();
        names.insert(1, "one".into());
        Page::Name(names)
    }

    #[test]
    fn test_write_then_load() {
        let source = source(Arc::new(MemoryBackend::new()), 8);
        let locator = source.write_page(&names()).unwrap();
        assert_eq!(*source.load(&locator).unwrap(), names());
        // Second load is a cache hit.
        source.load(&locator).unwrap();
        let snap = source.metrics().snapshot();
        assert_eq!(snap.pages_written, 1);
        assert_eq!(snap.pages_read, 1);
        assert_eq!(snap.cache_hits, 1);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let source = source(Arc::new(MemoryBackend::new()), 0);
        let mut locator = source.write_page(&names()).unwrap();
        locator.checksum[0] ^= 0xff;
        assert!(matches!(
            source.load(&locator),
            Err(PageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_resolve_variants() {
        let source = source(Arc::new(MemoryBackend::new()), 8);
        assert!(source.resolve(&PageReference::Null, None).unwrap().is_none());

        let locator = source.write_page(&names()).unwrap();
        let view = source
            .resolve(&PageReference::Persisted(locator), None)
            .unwrap()
            .unwrap();
        assert!(matches!(view, PageView::Committed(_)));

        let mut arena = PageArena::new();
        let handle = arena.insert(names());
        let dirty = PageReference::InMemory { handle, base: None };
        assert!(matches!(source.resolve(&dirty, None), Err(PageError::Unpersisted)));
        let view = source.resolve(&dirty, Some(&arena)).unwrap().unwrap();
        assert!(matches!(view, PageView::Dirty(_)));
    }
}
