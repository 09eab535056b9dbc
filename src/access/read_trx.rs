//! Read-only transactions bound to one committed revision.

use std::sync::Arc;

use crate::data::{Node, NodeKey};
use crate::store::{CommittedPage, Slot};

use super::cursor::NodeReader;
use super::error::{Result, TrxError};
use super::reader::RevisionReader;
use super::store::StoreInner;

/// A cursor over one committed revision.
///
/// The revision's pages are immutable, so a reader never blocks and never
/// observes later commits.
pub struct ReadTrx {
    store: Arc<StoreInner>,
    root: CommittedPage,
    revision: u64,
    cursor: Node,
}

impl ReadTrx {
    pub(crate) fn new(store: Arc<StoreInner>, root: CommittedPage) -> Result<Self> {
        let revision = root.as_revision_root()?.revision();
        let mut trx = Self {
            store,
            root,
            revision,
            cursor: Node::document_root(),
        };
        let document = trx
            .node(NodeKey::DOCUMENT_ROOT)?
            .ok_or_else(|| TrxError::invariant("revision without document root"))?;
        trx.cursor = document;
        Ok(trx)
    }

    fn reader(&self) -> Result<RevisionReader<'_>> {
        Ok(RevisionReader::new(
            &self.store.source,
            None,
            self.root.as_revision_root()?,
            self.store.node_layout(),
        ))
    }

    /// Highest node key allocated in this revision.
    pub fn max_node_key(&self) -> Result<u64> {
        Ok(self.root.as_revision_root()?.max_node_key())
    }

    /// Commit time of this revision in milliseconds since the Unix epoch.
    pub fn committed_at(&self) -> Result<u64> {
        Ok(self.root.as_revision_root()?.committed_at())
    }

    /// Whether `key` was allocated and later removed in this revision.
    pub fn is_removed(&self, key: NodeKey) -> Result<bool> {
        Ok(matches!(
            self.reader()?.slot(key)?,
            Some(Slot::Tombstone(_))
        ))
    }

    pub fn close(self) {}
}

impl NodeReader for ReadTrx {
    fn node(&self, key: NodeKey) -> Result<Option<Node>> {
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

impl std::fmt::Debug for ReadTrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTrx")
            .field("revision", &self.revision_number())
            .field("cursor", &self.cursor.key)
            .finish()
    }
}
