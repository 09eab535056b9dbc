//! The closed set of page kinds.

use super::error::{PageError, Result};
use super::page_reference::PageReference;
use super::page_types::{IndirectPage, MetaPage, NamePage, NodePage, RevisionRootPage, UberPage};

/// Page kind tag, also the first byte of every encoded page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageKind {
    Uber = 1,
    RevisionRoot = 2,
    Indirect = 3,
    Node = 4,
    Name = 5,
    Meta = 6,
}

impl PageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Uber),
            2 => Some(Self::RevisionRoot),
            3 => Some(Self::Indirect),
            4 => Some(Self::Node),
            5 => Some(Self::Name),
            6 => Some(Self::Meta),
            _ => None,
        }
    }
}

/// Any page of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Page {
    Uber(UberPage),
    RevisionRoot(RevisionRootPage),
    Indirect(IndirectPage),
    Node(NodePage),
    Name(NamePage),
    Meta(MetaPage),
}

macro_rules! page_accessors {
    ($($variant:ident, $ty:ty, $as_ref:ident, $as_mut:ident;)*) => {
        $(
            pub fn $as_ref(&self) -> Result<&$ty> {
                match self {
                    Page::$variant(page) => Ok(page),
                    other => Err(PageError::UnexpectedPage {
                        expected: PageKind::$variant,
                        found: other.kind(),
                    }),
                }
            }

            pub fn $as_mut(&mut self) -> Result<&mut $ty> {
                let found = self.kind();
                match self {
                    Page::$variant(page) => Ok(page),
                    _ => Err(PageError::UnexpectedPage {
                        expected: PageKind::$variant,
                        found,
                    }),
                }
            }
        )*
    };
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Uber(_) => PageKind::Uber,
            Page::RevisionRoot(_) => PageKind::RevisionRoot,
            Page::Indirect(_) => PageKind::Indirect,
            Page::Node(_) => PageKind::Node,
            Page::Name(_) => PageKind::Name,
            Page::Meta(_) => PageKind::Meta,
        }
    }

    /// Child references, in persisted order.
    pub fn references(&self) -> &[PageReference] {
        match self {
            Page::Uber(page) => &page.references,
            Page::RevisionRoot(page) => &page.references,
            Page::Indirect(page) => page.references(),
            Page::Node(_) | Page::Name(_) | Page::Meta(_) => &[],
        }
    }

    pub fn references_mut(&mut self) -> &mut [PageReference] {
        match self {
            Page::Uber(page) => &mut page.references,
            Page::RevisionRoot(page) => &mut page.references,
            Page::Indirect(page) => page.references_mut(),
            Page::Node(_) | Page::Name(_) | Page::Meta(_) => &mut [],
        }
    }

    page_accessors! {
        Uber, UberPage, as_uber, as_uber_mut;
        RevisionRoot, RevisionRootPage, as_revision_root, as_revision_root_mut;
        Indirect, IndirectPage, as_indirect, as_indirect_mut;
        Node, NodePage, as_node, as_node_mut;
        Name, NamePage, as_name, as_name_mut;
        Meta, MetaPage, as_meta, as_meta_mut;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for tag in 1..=6 {
            assert_eq!(PageKind::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(PageKind::from_tag(0).is_none());
        assert!(PageKind::from_tag(7).is_none());
    }

    #[test]
    fn test_accessor_mismatch() {
        let mut page = Page::Node(NodePage::new(0, 2));
        assert!(page.as_node().is_ok());
        assert!(matches!(
            page.as_indirect_mut(),
            Err(PageError::UnexpectedPage {
                expected: PageKind::Indirect,
                found: PageKind::Node
            })
        ));
    }

    #[test]
    fn test_references_per_kind() {
        assert_eq!(Page::Indirect(IndirectPage::new(0, 16)).references().len(), 16);
        assert_eq!(Page::RevisionRoot(RevisionRootPage::new(0)).references().len(), 3);
        assert!(Page::Node(NodePage::new(0, 2)).references().is_empty());
        assert!(Page::Name(NamePage::default()).references().is_empty());
    }
}
