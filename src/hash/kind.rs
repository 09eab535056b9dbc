//! Hash maintenance strategies.

use serde::{Deserialize, Serialize};

use crate::data::DecodeError;

/// How subtree hashes are kept current. Fixed for the lifetime of a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// Propagate deltas along the path to the root.
    #[default]
    Rolling,
    /// Recompute each ancestor from its children's stored hashes.
    Postorder,
    /// No hashing; stored hashes stay zero.
    None,
}

impl HashKind {
    pub fn tag(self) -> u8 {
        match self {
            HashKind::Rolling => 0,
            HashKind::Postorder => 1,
            HashKind::None => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(HashKind::Rolling),
            1 => Ok(HashKind::Postorder),
            2 => Ok(HashKind::None),
            other => Err(DecodeError::UnknownHashKind(other)),
        }
    }

    pub fn is_enabled(self) -> bool {
        self != HashKind::None
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HashKind::Rolling => "rolling",
            HashKind::Postorder => "postorder",
            HashKind::None => "none",
        };
        f.write_str(name)
    }
}
