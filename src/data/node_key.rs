//! Node keys and radix addressing.
//!
//! A node key is split into a page key (high bits) and a slot inside the
//! node page (low `leaf_bits`). The page key is then split into one offset
//! per indirect level, most significant level first:
//!
//! ```text
//!   key = | level 0 | level 1 | ... | level n-1 | slot |
//!           offset0   offset1         offset n-1
//! ```
//!
//! The same scheme with `leaf_bits = 0` addresses revision root pages from
//! a revision number.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest value usable as a node key or revision number.
pub const MAX_KEY: u64 = i64::MAX as u64;

/// Identity of a node. Allocated once, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// Key of the document root, created when a store is bootstrapped.
    pub const DOCUMENT_ROOT: NodeKey = NodeKey(0);

    /// Encodes an optional key as a signed integer with `-1` for none.
    pub fn encode_optional(key: Option<NodeKey>) -> i64 {
        match key {
            Some(k) => k.0 as i64,
            None => -1,
        }
    }

    /// Inverse of [`NodeKey::encode_optional`].
    pub fn decode_optional(raw: i64) -> Option<Option<NodeKey>> {
        match raw {
            -1 => Some(None),
            k if k >= 0 => Some(Some(NodeKey(k as u64))),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Addressing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("key {key} exceeds addressable range (max {max})")]
    Overflow { key: u64, max: u64 },
    #[error("invalid key layout: {0}")]
    InvalidLayout(String),
}

/// Bit widths of the radix tree: slot bits in the leaf page plus one entry
/// per indirect level, root level first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    leaf_bits: u8,
    level_bits: Vec<u8>,
}

/// Location of a key in the page tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPath {
    /// Identity of the leaf page (`key >> leaf_bits`).
    pub page_key: u64,
    /// Slot inside the leaf page.
    pub slot: usize,
    /// Reference offset at each indirect level, root level first.
    pub offsets: Vec<usize>,
}

impl KeyLayout {
    /// Creates a validated layout.
    pub fn new(leaf_bits: u8, level_bits: Vec<u8>) -> Result<Self, AddressError> {
        let layout = Self {
            leaf_bits,
            level_bits,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Default node-tree layout: 128 nodes per page, five levels of 128.
    pub fn node_default() -> Self {
        Self {
            leaf_bits: 7,
            level_bits: vec![7; 5],
        }
    }

    /// Default revision-tree layout: one revision root per leaf reference.
    pub fn revision_default() -> Self {
        Self {
            leaf_bits: 0,
            level_bits: vec![7; 5],
        }
    }

    /// Checks bit widths. Layouts decoded through serde must be validated
    /// before use.
    pub fn validate(&self) -> Result<(), AddressError> {
        if self.level_bits.is_empty() {
            return Err(AddressError::InvalidLayout(
                "at least one indirect level is required".into(),
            ));
        }
        if self.level_bits.iter().any(|&b| b == 0 || b > 16) {
            return Err(AddressError::InvalidLayout(
                "indirect level widths must be between 1 and 16 bits".into(),
            ));
        }
        if self.leaf_bits > 16 {
            return Err(AddressError::InvalidLayout(
                "leaf width must be at most 16 bits".into(),
            ));
        }
        if self.total_bits() > 63 {
            return Err(AddressError::InvalidLayout(format!(
                "layout uses {} bits, keys have 63",
                self.total_bits()
            )));
        }
        Ok(())
    }

    pub fn leaf_bits(&self) -> u8 {
        self.leaf_bits
    }

    pub fn level_bits(&self) -> &[u8] {
        &self.level_bits
    }

    /// Number of indirect levels.
    pub fn levels(&self) -> usize {
        self.level_bits.len()
    }

    /// Reference count of an indirect page at `level`.
    pub fn fanout(&self, level: usize) -> usize {
        1usize << self.level_bits[level]
    }

    /// Slot count of a leaf page.
    pub fn slots_per_page(&self) -> usize {
        1usize << self.leaf_bits
    }

    pub fn total_bits(&self) -> u32 {
        self.leaf_bits as u32 + self.level_bits.iter().map(|&b| b as u32).sum::<u32>()
    }

    /// Largest key this layout can address.
    pub fn max_key(&self) -> u64 {
        let bits = self.total_bits();
        if bits >= 63 {
            MAX_KEY
        } else {
            (1u64 << bits) - 1
        }
    }

    pub fn page_key(&self, key: u64) -> u64 {
        key >> self.leaf_bits
    }

    pub fn slot(&self, key: u64) -> usize {
        (key & ((1u64 << self.leaf_bits) - 1)) as usize
    }

    /// Computes the path to `key`.
    pub fn path(&self, key: u64) -> Result<KeyPath, AddressError> {
        if key > self.max_key() {
            return Err(AddressError::Overflow {
                key,
                max: self.max_key(),
            });
        }
        let page_key = self.page_key(key);
        Ok(KeyPath {
            page_key,
            slot: self.slot(key),
            offsets: self.page_offsets(page_key),
        })
    }

    /// Offsets of a page key, root level first.
    pub fn page_offsets(&self, page_key: u64) -> Vec<usize> {
        let mut offsets = vec![0usize; self.level_bits.len()];
        let mut shift = 0u32;
        for (level, &bits) in self.level_bits.iter().enumerate().rev() {
            let mask = (1u64 << bits) - 1;
            offsets[level] = ((page_key >> shift) & mask) as usize;
            shift += bits as u32;
        }
        offsets
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::node_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layouts_are_valid() {
        assert!(KeyLayout::node_default().validate().is_ok());
        assert!(KeyLayout::revision_default().validate().is_ok());
        assert_eq!(KeyLayout::node_default().slots_per_page(), 128);
        assert_eq!(KeyLayout::revision_default().slots_per_page(), 1);
    }

    #[test]
    fn test_path_small_key() {
        let layout = KeyLayout::node_default();
        let path = layout.path(5).unwrap();
        assert_eq!(path.page_key, 0);
        assert_eq!(path.slot, 5);
        assert_eq!(path.offsets, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_path_splits_levels() {
        let layout = KeyLayout::new(2, vec![3, 2]).unwrap();
        // page key 0b10111 -> level 0 = 0b101, level 1 = 0b11
        let key = (0b10111 << 2) | 0b01;
        let path = layout.path(key).unwrap();
        assert_eq!(path.page_key, 0b10111);
        assert_eq!(path.slot, 1);
        assert_eq!(path.offsets, vec![0b101, 0b11]);
    }

    #[test]
    fn test_path_overflow() {
        let layout = KeyLayout::new(2, vec![2]).unwrap();
        assert_eq!(layout.max_key(), 15);
        assert!(layout.path(15).is_ok());
        assert_eq!(
            layout.path(16),
            Err(AddressError::Overflow { key: 16, max: 15 })
        );
    }

    #[test]
    fn test_layout_rejects_too_many_bits() {
        assert!(KeyLayout::new(16, vec![16, 16, 16]).is_err());
        assert!(KeyLayout::new(15, vec![16, 16, 16]).is_ok());
        assert!(KeyLayout::new(7, vec![]).is_err());
        assert!(KeyLayout::new(7, vec![0]).is_err());
    }

    #[test]
    fn test_revision_layout_leaf_is_page() {
        let layout = KeyLayout::revision_default();
        let path = layout.path(300).unwrap();
        assert_eq!(path.page_key, 300);
        assert_eq!(path.slot, 0);
        assert_eq!(path.offsets, vec![0, 0, 0, 2, 44]);
    }

    #[test]
    fn test_optional_key_encoding() {
        assert_eq!(NodeKey::encode_optional(None), -1);
        assert_eq!(NodeKey::encode_optional(Some(NodeKey(9))), 9);
        assert_eq!(NodeKey::decode_optional(-1), Some(None));
        assert_eq!(NodeKey::decode_optional(9), Some(Some(NodeKey(9))));
        assert_eq!(NodeKey::decode_optional(-2), None);
    }
}
