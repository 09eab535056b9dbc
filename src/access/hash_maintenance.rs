//! Keeps stored subtree hashes current after an operator has staged its
//! structural changes.
//!
//! Rolling maintenance moves a delta up the ancestor chain, multiplying it
//! by `PRIME` at each level. Postorder maintenance recomputes each node on
//! the chain from its contributors' stored hashes. Both produce the hashes
//! that [`NodeReader::recompute_hash`](super::NodeReader::recompute_hash)
//! computes from scratch.

use crate::data::NodeKey;
use crate::hash::{lift, self_hash, subtree_hash, HashKind};

use super::edits::NodeEdits;
use super::error::Result;

/// Adds `delta` to every ancestor starting at `start`, lifting it one level
/// before each step.
fn propagate(edits: &mut NodeEdits<'_>, start: Option<NodeKey>, delta: u64) -> Result<()> {
    let mut current = start;
    let mut delta = delta;
    while let Some(key) = current {
        let mut node = edits.require(key)?;
        node.hash = node.hash.wrapping_add(delta);
        current = node.parent;
        edits.put(node);
        delta = lift(delta);
    }
    Ok(())
}

/// Recomputes `start` and every ancestor from stored contributor hashes.
fn recompute_upward(edits: &mut NodeEdits<'_>, start: Option<NodeKey>) -> Result<()> {
    let mut current = start;
    while let Some(key) = current {
        let mut node = edits.require(key)?;
        let hashes = edits
            .contributors(&node)?
            .into_iter()
            .map(|c| edits.require(c).map(|n| n.hash))
            .collect::<Result<Vec<_>>>()?;
        node.hash = subtree_hash(self_hash(&node), hashes);
        current = node.parent;
        edits.put(node);
    }
    Ok(())
}

/// A new leaf node `key` was staged.
pub(crate) fn after_insert(edits: &mut NodeEdits<'_>, kind: HashKind, key: NodeKey) -> Result<()> {
    match kind {
        HashKind::None => Ok(()),
        HashKind::Rolling => {
            let mut node = edits.require(key)?;
            let own = self_hash(&node);
            node.hash = own;
            let parent = node.parent;
            edits.put(node);
            propagate(edits, parent, lift(own))
        }
        HashKind::Postorder => recompute_upward(edits, Some(key)),
    }
}

/// A subtree whose root hash was `removed_hash` was detached from `parent`.
pub(crate) fn after_remove(
    edits: &mut NodeEdits<'_>,
    kind: HashKind,
    parent: NodeKey,
    removed_hash: u64,
) -> Result<()> {
    match kind {
        HashKind::None => Ok(()),
        HashKind::Rolling => propagate(edits, Some(parent), lift(removed_hash.wrapping_neg())),
        HashKind::Postorder => recompute_upward(edits, Some(parent)),
    }
}

/// The content of `key` changed; `old_self` is its self hash before.
pub(crate) fn after_update(
    edits: &mut NodeEdits<'_>,
    kind: HashKind,
    key: NodeKey,
    old_self: u64,
) -> Result<()> {
    match kind {
        HashKind::None => Ok(()),
        HashKind::Rolling => {
            let node = edits.require(key)?;
            let delta = self_hash(&node).wrapping_sub(old_self);
            propagate(edits, Some(key), delta)
        }
        HashKind::Postorder => recompute_upward(edits, Some(key)),
    }
}
