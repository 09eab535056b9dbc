//! Pages of the in-progress revision.
//!
//! A `TrxLog` owns every page cloned or created since the last commit. The
//! staged uber page, the revision tree path to the new revision and its
//! revision root are prepared when the log is created; node pages are
//! prepared on demand, root to leaf, and memoised by page key.

use hashbrown::HashMap;
use rayon::prelude::*;
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace};

use crate::data::{KeyLayout, KeyPath};
use crate::store::{
    IndirectPage, MetaPage, NamePage, NodePage, Page, PageArena, PageError, PageHandle,
    PageLocator, PageReference, PageSource, RevisionRootPage, UberPage,
};

type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

type Result<T> = std::result::Result<T, PageError>;

pub(crate) struct TrxLog {
    arena: PageArena,
    uber: PageHandle,
    root: PageHandle,
    node_pages: FastHashMap<u64, PageHandle>,
    names: Option<PageHandle>,
    meta: Option<PageHandle>,
}

/// Returns the page behind `parent.references()[index]`, cloning a
/// committed page or creating one with `make` first when needed. The
/// parent must already be owned by the arena.
fn cow_child(
    arena: &mut PageArena,
    source: &PageSource,
    parent: PageHandle,
    index: usize,
    make: impl FnOnce() -> Page,
) -> Result<PageHandle> {
    let reference = arena
        .get(parent)?
        .references()
        .get(index)
        .cloned()
        .ok_or_else(|| PageError::Corrupted(format!("reference index {index} out of range")))?;
    let (handle, base) = match reference {
        PageReference::InMemory { handle, .. } => return Ok(handle),
        PageReference::Persisted(locator) => {
            let committed = source.load(&locator)?;
            source.metrics().inc_cow_clones();
            trace!(storage_key = locator.storage_key, kind = ?committed.kind(), "cloned committed page");
            (arena.insert((*committed).clone()), Some(locator))
        }
        PageReference::Null => {
            source.metrics().inc_pages_created();
            (arena.insert(make()), None)
        }
    };
    set_reference(arena, parent, index, PageReference::InMemory { handle, base })?;
    Ok(handle)
}

fn set_reference(
    arena: &mut PageArena,
    parent: PageHandle,
    index: usize,
    reference: PageReference,
) -> Result<()> {
    let slot = arena
        .get_mut(parent)?
        .references_mut()
        .get_mut(index)
        .ok_or_else(|| PageError::Corrupted(format!("reference index {index} out of range")))?;
    *slot = reference;
    Ok(())
}

/// Walks `offsets` below `parent.references()[index]`, making every
/// indirect page on the way owned. Returns the last indirect page and the
/// offset of the leaf reference inside it.
fn prepare_indirect_path(
    arena: &mut PageArena,
    source: &PageSource,
    layout: &KeyLayout,
    mut parent: PageHandle,
    mut index: usize,
    offsets: &[usize],
) -> Result<(PageHandle, usize)> {
    for (level, &offset) in offsets.iter().enumerate() {
        let fanout = layout.fanout(level);
        parent = cow_child(arena, source, parent, index, || {
            Page::Indirect(IndirectPage::new(level as u8, fanout))
        })?;
        index = offset;
    }
    Ok((parent, index))
}

impl TrxLog {
    /// Stages the revision after `committed`, starting from `base_root`.
    ///
    /// `key_floor` is the highest node key ever handed out; the new root
    /// never allocates below it.
    pub fn begin(
        source: &PageSource,
        committed: &UberPage,
        base_root: &RevisionRootPage,
        key_floor: u64,
    ) -> Result<Self> {
        let uber = committed.successor();
        let revision = uber.revision_number();
        let root = base_root.successor(revision, key_floor);
        debug!(revision, base = base_root.revision(), "staging revision");
        Self::stage(source, uber, root)
    }

    /// Stages revision 0 of an empty store.
    pub fn bootstrap(source: &PageSource, uber: UberPage) -> Result<Self> {
        Self::stage(source, uber, RevisionRootPage::new(0))
    }

    fn stage(source: &PageSource, uber: UberPage, root: RevisionRootPage) -> Result<Self> {
        let layout = uber.settings().revision_layout.clone();
        let path = layout.path(uber.revision_number())?;

        let mut arena = PageArena::new();
        let uber = arena.insert(Page::Uber(uber));
        let (parent, index) =
            prepare_indirect_path(&mut arena, source, &layout, uber, 0, &path.offsets)?;

        let occupied = arena
            .get(parent)?
            .references()
            .get(index)
            .is_some_and(|r| !r.is_null());
        if occupied {
            return Err(PageError::Corrupted(format!(
                "revision {} already present",
                root.revision()
            )));
        }
        let root = arena.insert(Page::RevisionRoot(root));
        source.metrics().inc_pages_created();
        set_reference(
            &mut arena,
            parent,
            index,
            PageReference::InMemory {
                handle: root,
                base: None,
            },
        )?;

        Ok(Self {
            arena,
            uber,
            root,
            node_pages: FastHashMap::with_hasher(FxBuildHasher),
            names: None,
            meta: None,
        })
    }

    pub fn arena(&self) -> &PageArena {
        &self.arena
    }

    pub fn uber(&self) -> Result<&UberPage> {
        self.arena.get(self.uber)?.as_uber()
    }

    pub fn root(&self) -> Result<&RevisionRootPage> {
        self.arena.get(self.root)?.as_revision_root()
    }

    pub fn root_mut(&mut self) -> Result<&mut RevisionRootPage> {
        self.arena.get_mut(self.root)?.as_revision_root_mut()
    }

    /// Makes the node page holding `path` owned by this log.
    pub fn prepare_node_page(
        &mut self,
        source: &PageSource,
        layout: &KeyLayout,
        path: &KeyPath,
    ) -> Result<PageHandle> {
        if let Some(handle) = self.node_pages.get(&path.page_key) {
            return Ok(*handle);
        }
        let (parent, index) = prepare_indirect_path(
            &mut self.arena,
            source,
            layout,
            self.root,
            RevisionRootPage::NODE_TREE,
            &path.offsets,
        )?;
        let page_key = path.page_key;
        let capacity = layout.slots_per_page();
        let handle = cow_child(&mut self.arena, source, parent, index, || {
            Page::Node(NodePage::new(page_key, capacity))
        })?;

        let page = self.arena.get(handle)?.as_node()?;
        if page.page_key() != page_key || page.capacity() != capacity {
            return Err(PageError::Corrupted(format!(
                "node page {} ({} slots) found at path of page {page_key}",
                page.page_key(),
                page.capacity()
            )));
        }
        self.node_pages.insert(page_key, handle);
        Ok(handle)
    }

    pub fn prepare_names(&mut self, source: &PageSource) -> Result<PageHandle> {
        if let Some(handle) = self.names {
            return Ok(handle);
        }
        let handle = cow_child(
            &mut self.arena,
            source,
            self.root,
            RevisionRootPage::NAMES,
            || Page::Name(NamePage::default()),
        )?;
        self.names = Some(handle);
        Ok(handle)
    }

    pub fn prepare_meta(&mut self, source: &PageSource) -> Result<PageHandle> {
        if let Some(handle) = self.meta {
            return Ok(handle);
        }
        let handle = cow_child(
            &mut self.arena,
            source,
            self.root,
            RevisionRootPage::META,
            || Page::Meta(MetaPage::default()),
        )?;
        self.meta = Some(handle);
        Ok(handle)
    }

    pub fn page_mut(&mut self, handle: PageHandle) -> Result<&mut Page> {
        self.arena.get_mut(handle)
    }

    /// Writes every owned page, children before parents, and returns the
    /// locator of the staged uber page. The log itself is left untouched,
    /// so a failed write can be retried or discarded.
    pub fn persist(&self, source: &PageSource) -> Result<PageLocator> {
        // Owned pages form a tree under the uber page; group them by depth.
        let mut levels: Vec<Vec<PageHandle>> = vec![vec![self.uber]];
        loop {
            let mut next = Vec::new();
            for &handle in levels.last().map(Vec::as_slice).unwrap_or_default() {
                next.extend(
                    self.arena
                        .get(handle)?
                        .references()
                        .iter()
                        .filter_map(PageReference::handle),
                );
            }
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }

        let mut written: FastHashMap<PageHandle, PageLocator> =
            FastHashMap::with_capacity_and_hasher(levels.iter().map(Vec::len).sum(), FxBuildHasher);
        for level in levels.iter().rev() {
            let encoded: Vec<Result<Vec<u8>>> = level
                .par_iter()
                .map(|&handle| {
                    let page = self.arena.get(handle)?;
                    source
                        .codec()
                        .encode_with(page, &|child| written.get(&child).copied())
                })
                .collect();
            for (&handle, bytes) in level.iter().zip(encoded) {
                let locator = source.write_encoded(&bytes?)?;
                written.insert(handle, locator);
            }
        }

        written
            .get(&self.uber)
            .copied()
            .ok_or_else(|| PageError::Corrupted("uber page was not written".into()))
    }

    /// Number of pages owned by the log.
    pub fn dirty_pages(&self) -> usize {
        self.arena.len()
    }
}
