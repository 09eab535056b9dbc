//! Per-node hash functions.

use super::{keccak256, PRIME};
use crate::data::{Node, Payload};

/// Hash of the node's own content, excluding tree pointers.
pub fn self_hash(node: &Node) -> u64 {
    let mut buf = Vec::with_capacity(32);
    buf.push(node.kind().tag());
    match &node.payload {
        Payload::DocumentRoot(_) => {}
        Payload::Element { name, .. } => {
            buf.extend_from_slice(&name.name_key.to_le_bytes());
            buf.extend_from_slice(&name.uri_key.to_le_bytes());
        }
        Payload::Text { value, .. } => buf.extend_from_slice(value.as_bytes()),
        Payload::Attribute { name, value } => {
            buf.extend_from_slice(&name.name_key.to_le_bytes());
            buf.extend_from_slice(&name.uri_key.to_le_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        Payload::Namespace {
            uri_key,
            prefix_key,
        } => {
            buf.extend_from_slice(&uri_key.to_le_bytes());
            buf.extend_from_slice(&prefix_key.to_le_bytes());
        }
    }
    let digest = keccak256(&buf);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Adds one child's subtree hash into a running parent hash.
#[inline]
pub fn fold_child(running: u64, child_hash: u64) -> u64 {
    running.wrapping_add(child_hash.wrapping_mul(PRIME))
}

/// Subtree hash from the node's self hash and its contributors' hashes.
pub fn subtree_hash(own: u64, contributors: impl IntoIterator<Item = u64>) -> u64 {
    contributors.into_iter().fold(own, fold_child)
}

/// Moves a delta one level up the tree.
#[inline]
pub fn lift(delta: u64) -> u64 {
    delta.wrapping_mul(PRIME)
}
