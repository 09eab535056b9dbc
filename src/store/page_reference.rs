//! References between pages.

use super::arena::PageHandle;

/// Where a persisted page lives and how to check it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageLocator {
    /// Opaque backend key.
    pub storage_key: u64,
    /// Encoded length in bytes.
    pub length: u32,
    /// keccak256 of the encoded bytes.
    pub checksum: [u8; 32],
}

/// A child pointer held by a page.
///
/// Committed pages only hold `Null` or `Persisted` references. `InMemory`
/// points into the write transaction's arena; `base` records the committed
/// page it was cloned from, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PageReference {
    #[default]
    Null,
    Persisted(PageLocator),
    InMemory {
        handle: PageHandle,
        base: Option<PageLocator>,
    },
}

impl PageReference {
    pub fn is_null(&self) -> bool {
        matches!(self, PageReference::Null)
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, PageReference::InMemory { .. })
    }

    pub fn locator(&self) -> Option<&PageLocator> {
        match self {
            PageReference::Persisted(locator) => Some(locator),
            _ => None,
        }
    }

    pub fn handle(&self) -> Option<PageHandle> {
        match self {
            PageReference::InMemory { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}
