//! Concrete page kinds.
//!
//! - `UberPage`: store root, owns the revision tree
//! - `RevisionRootPage`: root of one revision (node tree, names, meta)
//! - `IndirectPage`: fan-out level of a radix tree
//! - `NodePage`: leaf holding a fixed number of node slots
//! - `NamePage` / `MetaPage`: per-revision dictionaries

use std::collections::BTreeMap;

use crate::data::{KeyLayout, Node, NodeKey};
use crate::hash::{keccak256, HashKind};

use super::error::{PageError, Result};
use super::page_reference::PageReference;

// ============================================================================
// NodePage
// ============================================================================

/// Marker left in place of a removed node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tombstone {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
}

/// Content of one node page slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Empty,
    Tombstone(Tombstone),
    Occupied(Node),
}

impl Slot {
    pub fn node(&self) -> Option<&Node> {
        match self {
            Slot::Occupied(node) => Some(node),
            _ => None,
        }
    }
}

/// Leaf page with a fixed number of slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePage {
    page_key: u64,
    slots: Vec<Slot>,
}

impl NodePage {
    pub fn new(page_key: u64, capacity: usize) -> Self {
        Self {
            page_key,
            slots: vec![Slot::Empty; capacity],
        }
    }

    pub(crate) fn from_slots(page_key: u64, slots: Vec<Slot>) -> Self {
        Self { page_key, slots }
    }

    pub fn page_key(&self) -> u64 {
        self.page_key
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, offset: usize) -> Option<&Slot> {
        self.slots.get(offset)
    }

    /// The node at `offset`, if the slot is occupied.
    pub fn get(&self, offset: usize) -> Option<&Node> {
        self.slots.get(offset).and_then(Slot::node)
    }

    pub fn set(&mut self, offset: usize, node: Node) -> Result<()> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(offset)
            .ok_or(PageError::SlotOutOfRange { slot: offset, capacity })?;
        *slot = Slot::Occupied(node);
        Ok(())
    }

    /// Replaces the slot with a tombstone and returns the node it held.
    pub fn remove(&mut self, offset: usize, tombstone: Tombstone) -> Result<Option<Node>> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(offset)
            .ok_or(PageError::SlotOutOfRange { slot: offset, capacity })?;
        match std::mem::replace(slot, Slot::Tombstone(tombstone)) {
            Slot::Occupied(node) => Ok(Some(node)),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// IndirectPage
// ============================================================================

/// One fan-out level of a radix tree. Cloning copies references only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndirectPage {
    level: u8,
    references: Vec<PageReference>,
}

impl IndirectPage {
    pub fn new(level: u8, fanout: usize) -> Self {
        Self {
            level,
            references: vec![PageReference::Null; fanout],
        }
    }

    pub(crate) fn from_references(level: u8, references: Vec<PageReference>) -> Self {
        Self { level, references }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn fanout(&self) -> usize {
        self.references.len()
    }

    pub fn reference(&self, offset: usize) -> Option<&PageReference> {
        self.references.get(offset)
    }

    pub fn reference_mut(&mut self, offset: usize) -> Option<&mut PageReference> {
        self.references.get_mut(offset)
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut [PageReference] {
        &mut self.references
    }
}

// ============================================================================
// RevisionRootPage
// ============================================================================

/// Root of one revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionRootPage {
    pub(crate) revision: u64,
    pub(crate) max_node_key: u64,
    pub(crate) committed_at: u64,
    pub(crate) references: [PageReference; 3],
}

impl RevisionRootPage {
    /// Reference to the node tree.
    pub const NODE_TREE: usize = 0;
    /// Reference to the name dictionary.
    pub const NAMES: usize = 1;
    /// Reference to the metadata dictionary.
    pub const META: usize = 2;

    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            max_node_key: 0,
            committed_at: 0,
            references: Default::default(),
        }
    }

    /// Starts the next revision from this one's content.
    pub fn successor(&self, revision: u64, key_floor: u64) -> Self {
        Self {
            revision,
            max_node_key: self.max_node_key.max(key_floor),
            committed_at: 0,
            references: self.references.clone(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Highest node key allocated so far.
    pub fn max_node_key(&self) -> u64 {
        self.max_node_key
    }

    /// Records the allocation of one node key.
    pub fn increment_max_node_key(&mut self) -> NodeKey {
        self.max_node_key += 1;
        NodeKey(self.max_node_key)
    }

    /// Commit time in milliseconds since the Unix epoch.
    pub fn committed_at(&self) -> u64 {
        self.committed_at
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}

// ============================================================================
// UberPage
// ============================================================================

/// Store-wide settings fixed at bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSettings {
    pub hash_kind: HashKind,
    pub node_layout: KeyLayout,
    pub revision_layout: KeyLayout,
}

/// Root of the whole store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UberPage {
    pub(crate) revision_count: u64,
    pub(crate) bootstrap: bool,
    pub(crate) settings: StoreSettings,
    pub(crate) references: [PageReference; 1],
}

impl UberPage {
    /// The bootstrap page: one revision, not yet committed by a user.
    pub fn bootstrap(settings: StoreSettings) -> Self {
        Self {
            revision_count: 1,
            bootstrap: true,
            settings,
            references: Default::default(),
        }
    }

    /// Stages the next revision on top of this committed page.
    pub fn successor(&self) -> Self {
        Self {
            revision_count: self.revision_count + 1,
            bootstrap: false,
            settings: self.settings.clone(),
            references: self.references.clone(),
        }
    }

    pub fn revision_count(&self) -> u64 {
        self.revision_count
    }

    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Newest revision held by this page (in-progress when staged).
    pub fn revision_number(&self) -> u64 {
        self.revision_count - 1
    }

    /// Revision before [`UberPage::revision_number`], if it is durable.
    pub fn last_committed_revision_number(&self) -> Option<u64> {
        if self.bootstrap {
            None
        } else {
            self.revision_count.checked_sub(2)
        }
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}

// ============================================================================
// Dictionaries
// ============================================================================

/// Append-only dictionary of names keyed by a hash of the name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamePage {
    pub(crate) entries: BTreeMap<u32, String>,
}

impl NamePage {
    /// Preferred key of a name; collisions probe upward.
    pub fn hash_name(name: &str) -> u32 {
        let digest = keccak256(name.as_bytes());
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    pub fn get(&self, key: u32) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    /// Inserts under `key`; an existing entry is left untouched.
    pub fn insert(&mut self, key: u32, name: String) {
        self.entries.entry(key).or_insert(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Key to opaque bytes metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaPage {
    pub(crate) entries: BTreeMap<String, Vec<u8>>,
}

impl MetaPage {
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: String, value: Vec<u8>) -> Option<Vec<u8>> {
        self.entries.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
