//! Subtree integrity hashes.
//!
//! The hash of a node covers its whole subtree:
//!
//! ```text
//! H(n) = self(n) + PRIME * (H(a_1) + ... + H(ns_1) + ... + H(c_1) + ...)
//! ```
//!
//! over attributes, namespaces and children, in wrapping `u64` arithmetic.
//! `self(n)` covers the node kind and its value-bearing fields, never its
//! structural pointers. Because each level multiplies by `PRIME`, a change
//! of `d` in `H(x)` changes the ancestor `k` levels above by `d * PRIME^k`,
//! which is what lets rolling maintenance touch only the path to the root.

mod kind;
mod node_hash;

#[cfg(test)]
mod tests;

use tiny_keccak::{Hasher, Keccak};

pub use kind::HashKind;
pub use node_hash::{fold_child, lift, self_hash, subtree_hash};

/// Multiplier applied once per tree level.
pub const PRIME: u64 = 77081;

/// Computes keccak256 hash of data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
