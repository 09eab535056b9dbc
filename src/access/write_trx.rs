//! The write transaction.
//!
//! Mutations are staged in a [`TrxLog`] holding the next revision. Every
//! operator builds its effect in a [`NodeEdits`] overlay, runs hash
//! maintenance on it, and only then writes the result into the log's pages.
//! Commit writes the log bottom-up and publishes the new uber page; abort
//! drops the log.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::data::{NameRef, Node, NodeKey, NodeKind, Payload, QName, Structure};
use crate::hash::{self_hash, HashKind};
use crate::store::{CommittedPage, PageError, Slot};

use super::cursor::NodeReader;
use super::edits::{EditPlan, NodeEdits, Staged};
use super::error::{Result, TrxError};
use super::hash_maintenance::{after_insert, after_remove, after_update};
use super::reader::RevisionReader;
use super::store::StoreInner;
use super::trx_log::TrxLog;

/// The single write transaction of a store.
pub struct WriteTrx {
    store: Arc<StoreInner>,
    /// Latest committed uber page; the next revision is staged on top of it.
    base_uber: CommittedPage,
    /// Revision root the pending revision starts from.
    base_root: CommittedPage,
    /// The pending revision once a change is staged, else the base revision.
    revision: u64,
    log: Option<TrxLog>,
    cursor: Node,
    modifications: u64,
    closed: bool,
}

impl WriteTrx {
    pub(crate) fn new(store: Arc<StoreInner>) -> Result<Self> {
        let base_uber = store.committed_uber();
        let latest = base_uber.as_uber()?.revision_number();
        let base_root = store.load_revision_root(&base_uber, latest)?;
        let mut trx = Self {
            store,
            base_uber,
            base_root,
            revision: latest,
            log: None,
            cursor: Node::document_root(),
            modifications: 0,
            closed: false,
        };
        trx.rebind_cursor(NodeKey::DOCUMENT_ROOT)?;
        Ok(trx)
    }

    fn reader(&self) -> Result<RevisionReader<'_>> {
        let (arena, root) = match &self.log {
            Some(log) => (Some(log.arena()), log.root()?),
            None => (None, self.base_root.as_revision_root()?),
        };
        Ok(RevisionReader::new(
            &self.store.source,
            arena,
            root,
            self.store.node_layout(),
        ))
    }

    fn hash_kind(&self) -> HashKind {
        self.store.settings.hash_kind
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(TrxError::Closed)
        } else {
            Ok(())
        }
    }

    fn require_kind(&self, allowed: &[NodeKind], operation: &str) -> Result<()> {
        self.check_open()?;
        let kind = self.cursor.kind();
        if allowed.contains(&kind) {
            Ok(())
        } else {
            Err(TrxError::precondition(format!(
                "cannot {operation} on {kind:?} node {}",
                self.cursor.key
            )))
        }
    }

    /// Moves the cursor to `key`, falling back to the document root.
    fn rebind_cursor(&mut self, key: NodeKey) -> Result<()> {
        let reader = self.reader()?;
        let node = match reader.node(key)? {
            Some(node) => node,
            None => reader
                .node(NodeKey::DOCUMENT_ROOT)?
                .ok_or_else(|| TrxError::invariant("revision without document root"))?,
        };
        self.cursor = node;
        Ok(())
    }

    fn ensure_log(&mut self) -> Result<&mut TrxLog> {
        if self.log.is_none() {
            let log = TrxLog::begin(
                &self.store.source,
                self.base_uber.as_uber()?,
                self.base_root.as_revision_root()?,
                self.store.key_watermark(),
            )?;
            self.revision = log.root()?.revision();
            self.log = Some(log);
        }
        self.log
            .as_mut()
            .ok_or_else(|| TrxError::invariant("transaction log missing"))
    }

    /// Runs one operator: stages it, applies it, moves the cursor to the
    /// key it returns and counts the modification.
    fn mutate<F>(&mut self, stage: F) -> Result<NodeKey>
    where
        F: FnOnce(&mut NodeEdits<'_>, &Node) -> Result<NodeKey>,
    {
        self.ensure_log()?;
        let (plan, cursor_key) = {
            let mut edits = NodeEdits::new(self.reader()?);
            let cursor_key = stage(&mut edits, &self.cursor)?;
            (edits.into_plan(), cursor_key)
        };
        self.apply(plan)?;
        self.modifications += 1;
        self.rebind_cursor(cursor_key)?;
        self.auto_commit()?;
        Ok(cursor_key)
    }

    /// Writes a plan into the log. Every page is prepared before the first
    /// node is written.
    fn apply(&mut self, plan: EditPlan) -> Result<()> {
        let store = Arc::clone(&self.store);
        let layout = store.node_layout();
        let log = self.ensure_log()?;

        let mut targets = Vec::with_capacity(plan.nodes.len());
        for key in plan.nodes.keys() {
            let path = layout.path(key.0).map_err(PageError::from)?;
            let handle = log.prepare_node_page(&store.source, layout, &path)?;
            targets.push((handle, path.slot));
        }
        let names = if plan.names.is_empty() {
            None
        } else {
            Some(log.prepare_names(&store.source)?)
        };

        for ((handle, slot), (_, staged)) in targets.into_iter().zip(plan.nodes) {
            let page = log.page_mut(handle)?.as_node_mut()?;
            match staged {
                Staged::Node(node) => page.set(slot, node)?,
                Staged::Removed(tombstone) => {
                    page.remove(slot, tombstone)?;
                }
            }
        }
        if let Some(handle) = names {
            let page = log.page_mut(handle)?.as_name_mut()?;
            for (key, name) in plan.names {
                page.insert(key, name);
            }
        }
        let root = log.root_mut()?;
        for _ in 0..plan.allocated {
            root.increment_max_node_key();
        }
        store.raise_key_watermark(root.max_node_key());
        Ok(())
    }

    fn auto_commit(&mut self) -> Result<()> {
        let limit = self.store.config.max_uncommitted_modifications;
        if limit > 0 && self.modifications > limit {
            debug!(modifications = self.modifications, limit, "auto-commit");
            self.commit()?;
        }
        Ok(())
    }

    fn name_ref(edits: &mut NodeEdits<'_>, name: &QName) -> Result<NameRef> {
        Ok(NameRef {
            name_key: edits.intern(&name.lexical())?,
            uri_key: edits.intern(&name.uri)?,
        })
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Inserts an element as first child of the current element or document
    /// root and moves the cursor onto it.
    pub fn insert_element_as_first_child(&mut self, name: QName) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element, NodeKind::DocumentRoot], "insert a first child")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let payload = Payload::Element {
                structure: Structure::default(),
                name: Self::name_ref(edits, &name)?,
                attributes: Vec::new(),
                namespaces: Vec::new(),
            };
            let key = edits.insert_first_child(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    /// Inserts an element right of the current element or text node.
    pub fn insert_element_as_right_sibling(&mut self, name: QName) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element, NodeKind::Text], "insert a right sibling")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let payload = Payload::Element {
                structure: Structure::default(),
                name: Self::name_ref(edits, &name)?,
                attributes: Vec::new(),
                namespaces: Vec::new(),
            };
            let key = edits.insert_right_sibling(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    /// Inserts a text node as first child of the current element or
    /// document root.
    pub fn insert_text_as_first_child(&mut self, value: &str) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element, NodeKind::DocumentRoot], "insert a first child")?;
        let hash_kind = self.hash_kind();
        let payload = Payload::Text {
            structure: Structure::default(),
            value: value.to_owned(),
        };
        self.mutate(|edits, cursor| {
            let key = edits.insert_first_child(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    /// Inserts a text node right of the current element or text node.
    pub fn insert_text_as_right_sibling(&mut self, value: &str) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element, NodeKind::Text], "insert a right sibling")?;
        let hash_kind = self.hash_kind();
        let payload = Payload::Text {
            structure: Structure::default(),
            value: value.to_owned(),
        };
        self.mutate(|edits, cursor| {
            let key = edits.insert_right_sibling(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    /// Adds an attribute to the current element; the cursor moves onto it.
    pub fn insert_attribute(&mut self, name: QName, value: &str) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element], "insert an attribute")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let payload = Payload::Attribute {
                name: Self::name_ref(edits, &name)?,
                value: value.to_owned(),
            };
            let key = edits.insert_non_structural(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    /// Adds a namespace declaration to the current element; the cursor
    /// moves onto it.
    pub fn insert_namespace(&mut self, uri: &str, prefix: &str) -> Result<NodeKey> {
        self.require_kind(&[NodeKind::Element], "insert a namespace")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let payload = Payload::Namespace {
                uri_key: edits.intern(uri)?,
                prefix_key: edits.intern(prefix)?,
            };
            let key = edits.insert_non_structural(cursor.key, payload)?;
            after_insert(edits, hash_kind, key)?;
            Ok(key)
        })
    }

    // ========================================================================
    // Remove / update
    // ========================================================================

    /// Removes the current node with its subtree. The cursor moves to the
    /// right sibling, else the left sibling, else the parent.
    pub fn remove(&mut self) -> Result<()> {
        self.check_open()?;
        if self.cursor.kind() == NodeKind::DocumentRoot {
            return Err(TrxError::precondition("the document root cannot be removed"));
        }
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let removal = edits.remove(cursor.key)?;
            after_remove(edits, hash_kind, removal.parent, removal.removed_hash)?;
            Ok(removal.next_cursor)
        })?;
        Ok(())
    }

    /// Replaces the value of the current text or attribute node.
    pub fn set_value(&mut self, value: &str) -> Result<()> {
        self.require_kind(&[NodeKind::Text, NodeKind::Attribute], "set a value")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let mut node = edits.require(cursor.key)?;
            let old_self = self_hash(&node);
            match &mut node.payload {
                Payload::Text { value: v, .. } | Payload::Attribute { value: v, .. } => {
                    *v = value.to_owned();
                }
                _ => return Err(TrxError::precondition("node has no value")),
            }
            edits.put(node);
            after_update(edits, hash_kind, cursor.key, old_self)?;
            Ok(cursor.key)
        })?;
        Ok(())
    }

    /// Renames the current element or attribute.
    pub fn set_qname(&mut self, name: QName) -> Result<()> {
        self.require_kind(&[NodeKind::Element, NodeKind::Attribute], "set a name")?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let name_ref = Self::name_ref(edits, &name)?;
            let mut node = edits.require(cursor.key)?;
            let old_self = self_hash(&node);
            match &mut node.payload {
                Payload::Element { name, .. } | Payload::Attribute { name, .. } => {
                    *name = name_ref;
                }
                _ => return Err(TrxError::precondition("node has no name")),
            }
            edits.put(node);
            after_update(edits, hash_kind, cursor.key, old_self)?;
            Ok(cursor.key)
        })?;
        Ok(())
    }

    /// Changes the namespace URI of the current element, attribute or
    /// namespace node.
    pub fn set_uri(&mut self, uri: &str) -> Result<()> {
        self.require_kind(
            &[NodeKind::Element, NodeKind::Attribute, NodeKind::Namespace],
            "set a URI",
        )?;
        let hash_kind = self.hash_kind();
        self.mutate(|edits, cursor| {
            let uri = edits.intern(uri)?;
            let mut node = edits.require(cursor.key)?;
            let old_self = self_hash(&node);
            match &mut node.payload {
                Payload::Element { name, .. } | Payload::Attribute { name, .. } => {
                    name.uri_key = uri;
                }
                Payload::Namespace { uri_key, .. } => *uri_key = uri,
                _ => return Err(TrxError::precondition("node has no URI")),
            }
            edits.put(node);
            after_update(edits, hash_kind, cursor.key, old_self)?;
            Ok(cursor.key)
        })?;
        Ok(())
    }

    /// Stores a metadata entry in the pending revision.
    pub fn set_meta(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.check_open()?;
        let store = Arc::clone(&self.store);
        let log = self.ensure_log()?;
        let handle = log.prepare_meta(&store.source)?;
        log.page_mut(handle)?
            .as_meta_mut()?
            .set(key.to_owned(), value.to_vec());
        self.modifications += 1;
        self.auto_commit()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Writes the pending revision and returns its number. Commits with no
    /// pending changes still produce a new revision.
    pub fn commit(&mut self) -> Result<u64> {
        self.check_open()?;
        let store = Arc::clone(&self.store);
        let log = self.ensure_log()?;
        log.root_mut()?.committed_at = now_millis();
        let revision = log.uber()?.revision_number();
        let dirty = log.dirty_pages();

        let locator = log.persist(&store.source)?;
        let uber = store.publish(locator)?;
        let root = store.load_revision_root(&uber, revision)?;

        let modifications = self.modifications;
        self.log = None;
        self.base_uber = uber;
        self.base_root = root;
        self.revision = revision;
        self.modifications = 0;
        self.rebind_cursor(self.cursor.key)?;
        info!(revision, modifications, pages = dirty, "revision committed");
        Ok(revision)
    }

    /// Discards pending changes and rebinds to the latest committed
    /// revision. Calling it again, or on a closed transaction, is a no-op.
    pub fn abort(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let had_changes = self.log.take().is_some();
        self.modifications = 0;
        let latest = self.base_uber.as_uber()?.revision_number();
        if self.base_root.as_revision_root()?.revision() != latest {
            self.base_root = self.store.load_revision_root(&self.base_uber, latest)?;
        }
        self.revision = latest;
        if had_changes {
            self.store.metrics().inc_trx_aborted();
            debug!(revision = latest, "write transaction aborted");
        }
        self.rebind_cursor(self.cursor.key)
    }

    /// Discards pending changes and continues from `revision`. The next
    /// commit stores a new revision whose content starts from it.
    pub fn revert_to(&mut self, revision: u64) -> Result<()> {
        self.check_open()?;
        let root = self.store.load_revision_root(&self.base_uber, revision)?;
        if self.log.take().is_some() {
            warn!(
                discarded = self.modifications,
                "revert discarded uncommitted modifications"
            );
        }
        self.modifications = 0;
        self.base_root = root;
        self.revision = revision;
        debug!(revision, "write transaction reverted");
        self.rebind_cursor(NodeKey::DOCUMENT_ROOT)
    }

    /// Closes the transaction. Fails while modifications are pending.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.modifications > 0 {
            return Err(TrxError::Uncommitted(self.modifications));
        }
        self.log = None;
        self.closed = true;
        self.store.release_writer();
        Ok(())
    }

    /// Modifications since the last commit, abort or revert.
    pub fn modification_count(&self) -> u64 {
        self.modifications
    }

    /// Whether `key` holds a tombstone in the pending revision.
    pub fn is_removed(&self, key: NodeKey) -> Result<bool> {
        Ok(matches!(self.reader()?.slot(key)?, Some(Slot::Tombstone(_))))
    }

    /// Highest node key allocated in the pending revision.
    pub fn max_node_key(&self) -> Result<u64> {
        Ok(self.reader()?.max_node_key())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl NodeReader for WriteTrx {
    fn node(&self, key: NodeKey) -> Result<Option<Node>> {
        self.check_open()?;
        Ok(self.reader()?.node(key)?)
    }

    fn current(&self) -> &Node {
        &self.cursor
    }

    fn reposition(&mut self, node: Node) {
        self.cursor = node;
    }

    fn name(&self, name_key: u32) -> Result<Option<String>> {
        Ok(self.reader()?.name(name_key)?)
    }

    fn meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.reader()?.meta(key)?)
    }

    fn revision_number(&self) -> u64 {
        self.revision
    }
}

impl Drop for WriteTrx {
    fn drop(&mut self) {
        if !self.closed {
            if self.modifications > 0 {
                warn!(
                    modifications = self.modifications,
                    "write transaction dropped with uncommitted modifications"
                );
            }
            self.store.release_writer();
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
