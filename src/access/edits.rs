//! Staged node changes.
//!
//! Operators build their whole effect here first: reads go through the
//! staged overlay, writes only touch the overlay. The resulting
//! [`EditPlan`] is applied to the revision in one step, so an operator that
//! fails part way leaves the revision as it was.

use std::collections::BTreeMap;

use crate::data::{Node, NodeKey, NodeKind, Payload, Structure};
use crate::store::{NamePage, Tombstone};

use super::error::{Result, TrxError};
use super::reader::RevisionReader;

pub(crate) enum Staged {
    Node(Node),
    Removed(Tombstone),
}

/// Everything an operator changes.
pub(crate) struct EditPlan {
    pub nodes: BTreeMap<NodeKey, Staged>,
    pub allocated: u64,
    pub names: BTreeMap<u32, String>,
}

/// What [`NodeEdits::remove`] did.
pub(crate) struct Removal {
    pub parent: NodeKey,
    pub removed_hash: u64,
    pub next_cursor: NodeKey,
}

pub(crate) struct NodeEdits<'a> {
    reader: RevisionReader<'a>,
    staged: BTreeMap<NodeKey, Staged>,
    next_key: u64,
    allocated: u64,
    names: BTreeMap<u32, String>,
}

impl<'a> NodeEdits<'a> {
    pub fn new(reader: RevisionReader<'a>) -> Self {
        Self {
            next_key: reader.max_node_key() + 1,
            reader,
            staged: BTreeMap::new(),
            allocated: 0,
            names: BTreeMap::new(),
        }
    }

    pub fn into_plan(self) -> EditPlan {
        EditPlan {
            nodes: self.staged,
            allocated: self.allocated,
            names: self.names,
        }
    }

    pub fn node(&self, key: NodeKey) -> Result<Option<Node>> {
        match self.staged.get(&key) {
            Some(Staged::Node(node)) => Ok(Some(node.clone())),
            Some(Staged::Removed(_)) => Ok(None),
            None => Ok(self.reader.node(key)?),
        }
    }

    /// Like [`NodeEdits::node`], for keys that must exist.
    pub fn require(&self, key: NodeKey) -> Result<Node> {
        self.node(key)?
            .ok_or_else(|| TrxError::invariant(format!("node {key} is referenced but missing")))
    }

    pub fn put(&mut self, node: Node) {
        self.staged.insert(node.key, Staged::Node(node));
    }

    fn tombstone(&mut self, node: &Node) {
        self.staged.insert(
            node.key,
            Staged::Removed(Tombstone {
                key: node.key,
                parent: node.parent,
            }),
        );
    }

    fn allocate_key(&mut self) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        self.allocated += 1;
        key
    }

    /// Dictionary key for `name`, adding it when new.
    pub fn intern(&mut self, name: &str) -> Result<u32> {
        let mut key = NamePage::hash_name(name);
        loop {
            let existing = match self.names.get(&key) {
                Some(staged) => Some(staged.clone()),
                None => self.reader.name(key)?,
            };
            match existing {
                Some(existing) if existing == name => return Ok(key),
                Some(_) => key = key.wrapping_add(1),
                None => {
                    self.names.insert(key, name.to_owned());
                    return Ok(key);
                }
            }
        }
    }

    /// Children of `node`, left to right, read through the overlay.
    pub fn children(&self, node: &Node) -> Result<Vec<NodeKey>> {
        let mut out = Vec::new();
        let mut next = node.first_child();
        while let Some(key) = next {
            out.push(key);
            next = self.require(key)?.right_sibling();
        }
        Ok(out)
    }

    /// Attributes, namespaces and children of `node`: the nodes whose
    /// hashes feed into its subtree hash.
    pub fn contributors(&self, node: &Node) -> Result<Vec<NodeKey>> {
        let mut out = node.attributes().to_vec();
        out.extend_from_slice(node.namespaces());
        out.extend(self.children(node)?);
        Ok(out)
    }

    // ========================================================================
    // Structural operators
    // ========================================================================

    /// Inserts a structural node as the first child of `parent_key`.
    pub fn insert_first_child(&mut self, parent_key: NodeKey, payload: Payload) -> Result<NodeKey> {
        let mut parent = self.require(parent_key)?;
        let key = self.allocate_key();
        let old_first = parent.first_child();

        let mut node = Node::new(key, Some(parent_key), payload);
        *structure_of(&mut node)? = Structure {
            right_sibling: old_first,
            ..Structure::default()
        };

        if let Some(first_key) = old_first {
            let mut first = self.require(first_key)?;
            structure_of(&mut first)?.left_sibling = Some(key);
            self.put(first);
        }

        let parent_structure = structure_of(&mut parent)?;
        parent_structure.first_child = Some(key);
        parent_structure.child_count += 1;
        self.put(parent);
        self.put(node);
        Ok(key)
    }

    /// Inserts a structural node directly right of `left_key`.
    pub fn insert_right_sibling(&mut self, left_key: NodeKey, payload: Payload) -> Result<NodeKey> {
        let mut left = self.require(left_key)?;
        let parent_key = left
            .parent
            .ok_or_else(|| TrxError::precondition("node without parent has no siblings"))?;
        let mut parent = self.require(parent_key)?;
        let key = self.allocate_key();
        let old_right = left.right_sibling();

        let mut node = Node::new(key, Some(parent_key), payload);
        *structure_of(&mut node)? = Structure {
            left_sibling: Some(left_key),
            right_sibling: old_right,
            ..Structure::default()
        };

        if let Some(right_key) = old_right {
            let mut right = self.require(right_key)?;
            structure_of(&mut right)?.left_sibling = Some(key);
            self.put(right);
        }
        structure_of(&mut left)?.right_sibling = Some(key);
        structure_of(&mut parent)?.child_count += 1;

        self.put(left);
        self.put(parent);
        self.put(node);
        Ok(key)
    }

    /// Adds an attribute or namespace node to `element_key`.
    pub fn insert_non_structural(&mut self, element_key: NodeKey, payload: Payload) -> Result<NodeKey> {
        let mut element = self.require(element_key)?;
        let key = self.allocate_key();
        let is_namespace = payload.kind() == NodeKind::Namespace;
        match &mut element.payload {
            Payload::Element { namespaces, .. } if is_namespace => namespaces.push(key),
            Payload::Element { attributes, .. } => attributes.push(key),
            _ => {
                return Err(TrxError::precondition(
                    "attributes and namespaces belong to elements",
                ))
            }
        }
        self.put(element);
        self.put(Node::new(key, Some(element_key), payload));
        Ok(key)
    }

    /// Removes `key` together with its subtree, attributes and namespaces,
    /// and detaches it from its parent.
    pub fn remove(&mut self, key: NodeKey) -> Result<Removal> {
        let node = self.require(key)?;
        if node.kind() == NodeKind::DocumentRoot {
            return Err(TrxError::precondition("the document root cannot be removed"));
        }
        let parent_key = node
            .parent
            .ok_or_else(|| TrxError::invariant(format!("node {key} has no parent")))?;

        let mut pending = self.contributors(&node)?;
        while let Some(descendant) = pending.pop() {
            let descendant = self.require(descendant)?;
            pending.extend(self.contributors(&descendant)?);
            self.tombstone(&descendant);
        }

        let mut parent = self.require(parent_key)?;
        let next_cursor = if node.structure().is_none() {
            if let Payload::Element {
                attributes,
                namespaces,
                ..
            } = &mut parent.payload
            {
                attributes.retain(|k| *k != key);
                namespaces.retain(|k| *k != key);
            }
            parent_key
        } else {
            let left = node.left_sibling();
            let right = node.right_sibling();
            if let Some(left_key) = left {
                let mut left_node = self.require(left_key)?;
                structure_of(&mut left_node)?.right_sibling = right;
                self.put(left_node);
            }
            if let Some(right_key) = right {
                let mut right_node = self.require(right_key)?;
                structure_of(&mut right_node)?.left_sibling = left;
                self.put(right_node);
            }
            let parent_structure = structure_of(&mut parent)?;
            if parent_structure.first_child == Some(key) {
                parent_structure.first_child = right;
            }
            parent_structure.child_count = parent_structure.child_count.saturating_sub(1);
            right.or(left).unwrap_or(parent_key)
        };
        self.put(parent);
        self.tombstone(&node);

        Ok(Removal {
            parent: parent_key,
            removed_hash: node.hash,
            next_cursor,
        })
    }
}

fn structure_of(node: &mut Node) -> Result<&mut Structure> {
    let key = node.key;
    node.structure_mut()
        .ok_or_else(|| TrxError::invariant(format!("node {key} has no tree pointers")))
}
