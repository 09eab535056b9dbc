//! # revtree_db
//!
//! An embedded, versioned store for ordered node trees. Every commit
//! produces an immutable revision that shares all unchanged pages with the
//! revisions before it.
//!
//! ## Architecture
//!
//! ```text
//! UberPage ── revision tree ── RevisionRootPage ── node tree ── NodePage ── Node
//!                                   ├── NamePage
//!                                   └── MetaPage
//! ```
//!
//! Node keys are mapped onto the node tree by radix addressing. A write
//! clones only the pages on the path from the uber page to the touched
//! node pages; everything else stays shared.
//!
//! ## Modules
//!
//! - `data` - Node keys, addressing and node payloads
//! - `store` - Page kinds, codec, backends and the page source
//! - `hash` - Subtree hashes and maintenance strategies
//! - `access` - Store session, read and write transactions

pub mod access;
pub mod data;
pub mod hash;
pub mod store;

pub use access::{NodeReader, ReadTrx, Store, StoreConfig, TrxError, WriteTrx};
pub use data::{NodeKey, QName};
pub use hash::HashKind;
