//! Page storage.
//!
//! Pages form two radix trees: the revision tree under the uber page and,
//! per revision, the node tree under a revision root page. Committed pages
//! are immutable and shared between revisions; a write transaction owns
//! clones of the pages it touches in a [`PageArena`] until commit.

mod arena;
mod backend;
mod codec;
mod error;
mod metrics;
mod page;
mod page_cache;
mod page_reference;
mod page_types;
mod source;

pub use arena::{PageArena, PageHandle};
pub use backend::{Backend, FileBackend, MemoryBackend};
pub use codec::{checksum, PageCodec};
pub use error::{PageError, Result};
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use page::{Page, PageKind};
pub use page_cache::{CommittedPage, PageCache};
pub use page_reference::{PageLocator, PageReference};
pub use page_types::{
    IndirectPage, MetaPage, NamePage, NodePage, RevisionRootPage, Slot, StoreSettings, Tombstone,
    UberPage,
};
pub use source::{PageSource, PageView};
