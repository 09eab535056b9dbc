//! Lookups against one revision's page tree.

use crate::data::{KeyLayout, Node, NodeKey};
use crate::store::{
    PageArena, PageError, PageReference, PageSource, PageView, RevisionRootPage, Slot,
};

/// Follows `offsets` down from `start`, one indirect page per offset.
///
/// Returns the page the last offset points at, or `None` when the path
/// runs into a null reference.
pub(crate) fn descend<'a>(
    source: &PageSource,
    arena: Option<&'a PageArena>,
    start: &PageReference,
    offsets: &[usize],
) -> Result<Option<PageView<'a>>, PageError> {
    let Some(mut current) = source.resolve(start, arena)? else {
        return Ok(None);
    };
    for &offset in offsets {
        let next = current
            .as_indirect()?
            .reference(offset)
            .cloned()
            .ok_or_else(|| PageError::Corrupted(format!("indirect offset {offset} out of range")))?;
        match source.resolve(&next, arena)? {
            Some(view) => current = view,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Read access to a revision, committed or in progress.
#[derive(Clone, Copy)]
pub(crate) struct RevisionReader<'a> {
    source: &'a PageSource,
    arena: Option<&'a PageArena>,
    root: &'a RevisionRootPage,
    layout: &'a KeyLayout,
}

impl<'a> RevisionReader<'a> {
    pub fn new(
        source: &'a PageSource,
        arena: Option<&'a PageArena>,
        root: &'a RevisionRootPage,
        layout: &'a KeyLayout,
    ) -> Self {
        Self {
            source,
            arena,
            root,
            layout,
        }
    }

    pub fn max_node_key(&self) -> u64 {
        self.root.max_node_key()
    }

    pub fn revision(&self) -> u64 {
        self.root.revision()
    }

    /// Raw slot content for `key`; keys outside the layout hold nothing.
    pub fn slot(&self, key: NodeKey) -> Result<Option<Slot>, PageError> {
        let Ok(path) = self.layout.path(key.0) else {
            return Ok(None);
        };
        let start = &self.root.references()[RevisionRootPage::NODE_TREE];
        let Some(view) = descend(self.source, self.arena, start, &path.offsets)? else {
            return Ok(None);
        };
        let page = view.as_node()?;
        if page.page_key() != path.page_key {
            return Err(PageError::Corrupted(format!(
                "node page {} found at path of page {}",
                page.page_key(),
                path.page_key
            )));
        }
        Ok(page.slot(path.slot).cloned())
    }

    pub fn node(&self, key: NodeKey) -> Result<Option<Node>, PageError> {
        Ok(match self.slot(key)? {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        })
    }

    pub fn name(&self, name_key: u32) -> Result<Option<String>, PageError> {
        let start = &self.root.references()[RevisionRootPage::NAMES];
        let Some(view) = self.source.resolve(start, self.arena)? else {
            return Ok(None);
        };
        Ok(view.as_name()?.get(name_key).map(str::to_owned))
    }

    pub fn meta(&self, key: &str) -> Result<Option<Vec<u8>>, PageError> {
        let start = &self.root.references()[RevisionRootPage::META];
        let Some(view) = self.source.resolve(start, self.arena)? else {
            return Ok(None);
        };
        Ok(view.as_meta()?.get(key).map(<[u8]>::to_vec))
    }
}
