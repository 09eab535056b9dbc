//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::data::KeyLayout;
use crate::hash::HashKind;

use super::error::{Result, TrxError};

/// Configuration of a store.
///
/// `hash_kind` and both layouts are recorded when the store is created and
/// must match on every later open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Subtree hash maintenance strategy.
    pub hash_kind: HashKind,

    /// Addressing of node keys.
    pub node_layout: KeyLayout,

    /// Addressing of revision numbers.
    pub revision_layout: KeyLayout,

    /// Number of decoded committed pages kept in memory (0 disables).
    pub page_cache_capacity: usize,

    /// Commit automatically once a write transaction holds more than this
    /// many uncommitted modifications (0 disables).
    pub max_uncommitted_modifications: u64,

    /// Sync the backend after every commit.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hash_kind: HashKind::Rolling,
            node_layout: KeyLayout::node_default(),
            revision_layout: KeyLayout::revision_default(),
            page_cache_capacity: 1024,
            max_uncommitted_modifications: 0,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hash_kind(mut self, hash_kind: HashKind) -> Self {
        self.hash_kind = hash_kind;
        self
    }

    pub fn with_node_layout(mut self, layout: KeyLayout) -> Self {
        self.node_layout = layout;
        self
    }

    pub fn with_revision_layout(mut self, layout: KeyLayout) -> Self {
        self.revision_layout = layout;
        self
    }

    pub fn with_page_cache_capacity(mut self, capacity: usize) -> Self {
        self.page_cache_capacity = capacity;
        self
    }

    pub fn with_max_uncommitted_modifications(mut self, max: u64) -> Self {
        self.max_uncommitted_modifications = max;
        self
    }

    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Validates the layouts.
    pub fn validate(&self) -> Result<()> {
        self.node_layout
            .validate()
            .map_err(|e| TrxError::Config(format!("node layout: {e}")))?;
        self.revision_layout
            .validate()
            .map_err(|e| TrxError::Config(format!("revision layout: {e}")))?;
        if self.revision_layout.leaf_bits() != 0 {
            return Err(TrxError::Config(
                "revision layout must address one revision per leaf reference".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hash_kind, HashKind::Rolling);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .with_hash_kind(HashKind::Postorder)
            .with_page_cache_capacity(16)
            .with_max_uncommitted_modifications(100)
            .with_sync_on_commit(false);
        assert_eq!(config.hash_kind, HashKind::Postorder);
        assert_eq!(config.page_cache_capacity, 16);
        assert_eq!(config.max_uncommitted_modifications, 100);
        assert!(!config.sync_on_commit);
    }

    #[test]
    fn test_revision_layout_needs_zero_leaf_bits() {
        let config = StoreConfig::new().with_revision_layout(KeyLayout::node_default());
        assert!(matches!(config.validate(), Err(TrxError::Config(_))));
    }

    #[test]
    fn test_serde_partial_document() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "hash_kind": "postorder", "page_cache_capacity": 8 }"#)
                .unwrap();
        assert_eq!(config.hash_kind, HashKind::Postorder);
        assert_eq!(config.page_cache_capacity, 8);
        assert_eq!(config.node_layout, KeyLayout::node_default());

        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
