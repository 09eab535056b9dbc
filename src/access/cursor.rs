//! Cursor navigation shared by read and write transactions.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::data::{Node, NodeKey, QName};
use crate::hash::{self_hash, subtree_hash};

use super::error::{Result, TrxError};

/// A cursor over one revision.
///
/// Implementors supply node lookup and cursor storage; navigation is
/// provided. Every `move_to*` method returns `Ok(false)` and leaves the
/// cursor in place when the target does not exist.
pub trait NodeReader {
    /// Looks up a live node. Removed and never-allocated keys yield `None`.
    fn node(&self, key: NodeKey) -> Result<Option<Node>>;

    /// Node under the cursor.
    fn current(&self) -> &Node;

    /// Moves the cursor onto an already resolved node.
    fn reposition(&mut self, node: Node);

    /// Resolves a name dictionary key.
    fn name(&self, name_key: u32) -> Result<Option<String>>;

    /// Reads a metadata entry.
    fn meta(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Revision this cursor reads.
    fn revision_number(&self) -> u64;

    // ========================================================================
    // Provided navigation
    // ========================================================================

    fn move_to(&mut self, key: NodeKey) -> Result<bool> {
        match self.node(key)? {
            Some(node) => {
                self.reposition(node);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn move_to_optional(&mut self, key: Option<NodeKey>) -> Result<bool> {
        match key {
            Some(key) => self.move_to(key),
            None => Ok(false),
        }
    }

    fn move_to_document_root(&mut self) -> Result<bool> {
        self.move_to(NodeKey::DOCUMENT_ROOT)
    }

    fn move_to_parent(&mut self) -> Result<bool> {
        let target = self.current().parent;
        self.move_to_optional(target)
    }

    fn move_to_first_child(&mut self) -> Result<bool> {
        let target = self.current().first_child();
        self.move_to_optional(target)
    }

    fn move_to_left_sibling(&mut self) -> Result<bool> {
        let target = self.current().left_sibling();
        self.move_to_optional(target)
    }

    fn move_to_right_sibling(&mut self) -> Result<bool> {
        let target = self.current().right_sibling();
        self.move_to_optional(target)
    }

    /// Moves to the `index`th attribute of the current element.
    fn move_to_attribute(&mut self, index: usize) -> Result<bool> {
        let target = self.current().attributes().get(index).copied();
        self.move_to_optional(target)
    }

    /// Moves to the `index`th namespace of the current element.
    fn move_to_namespace(&mut self, index: usize) -> Result<bool> {
        let target = self.current().namespaces().get(index).copied();
        self.move_to_optional(target)
    }

    /// Keys of the children of `key`, left to right.
    fn children(&self, key: NodeKey) -> Result<Vec<NodeKey>> {
        let node = self
            .node(key)?
            .ok_or_else(|| TrxError::precondition(format!("node {key} does not exist")))?;
        let mut out = Vec::with_capacity(node.child_count() as usize);
        let mut next = node.first_child();
        while let Some(child) = next {
            let child_node = self
                .node(child)?
                .ok_or_else(|| TrxError::invariant(format!("dangling child pointer {child}")))?;
            out.push(child);
            next = child_node.right_sibling();
        }
        Ok(out)
    }

    /// Qualified name of the current element or attribute.
    fn qname(&self) -> Result<Option<QName>> {
        let Some(name) = self.current().name() else {
            return Ok(None);
        };
        let lexical = self.name(name.name_key)?.unwrap_or_default();
        let uri = self.name(name.uri_key)?.unwrap_or_default();
        Ok(Some(QName::from_lexical(&lexical, uri)))
    }

    /// Value of the current text or attribute node.
    fn value(&self) -> Option<&str> {
        self.current().value()
    }

    /// Computes the subtree hash of `key` from scratch, ignoring stored
    /// hashes. Matches the stored hash whenever hashing is enabled.
    fn recompute_hash(&self, key: NodeKey) -> Result<u64> {
        let mut computed: HashMap<NodeKey, u64, FxBuildHasher> = HashMap::with_hasher(FxBuildHasher);
        let mut stack = vec![(key, false)];
        while let Some((current, expanded)) = stack.pop() {
            let node = self
                .node(current)?
                .ok_or_else(|| TrxError::invariant(format!("missing node {current}")))?;
            let mut contributors: Vec<NodeKey> = node.attributes().to_vec();
            contributors.extend_from_slice(node.namespaces());
            if node.first_child().is_some() {
                contributors.extend(self.children(current)?);
            }
            if expanded {
                let hashes = contributors
                    .iter()
                    .map(|c| computed.get(c).copied().unwrap_or_default())
                    .collect::<Vec<_>>();
                computed.insert(current, subtree_hash(self_hash(&node), hashes));
            } else {
                stack.push((current, true));
                stack.extend(contributors.into_iter().map(|c| (c, false)));
            }
        }
        computed
            .get(&key)
            .copied()
            .ok_or_else(|| TrxError::invariant("hash recomputation lost its root"))
    }
}
