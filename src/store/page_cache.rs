//! Read-only committed pages and a bounded cache of them.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use super::page::Page;

type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// A page belonging to a committed revision.
///
/// Only shared access is possible; producing a mutable page requires
/// cloning it into a write transaction's arena.
#[derive(Clone, Debug)]
pub struct CommittedPage(Arc<Page>);

impl CommittedPage {
    pub(crate) fn new(page: Page) -> Self {
        Self(Arc::new(page))
    }
}

impl Deref for CommittedPage {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.0
    }
}

struct CacheState {
    pages: FastHashMap<u64, CommittedPage>,
    order: VecDeque<u64>,
}

/// FIFO-bounded map from storage key to decoded page.
pub struct PageCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl PageCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState {
                pages: FastHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn get(&self, storage_key: u64) -> Option<CommittedPage> {
        self.state.lock().pages.get(&storage_key).cloned()
    }

    pub fn insert(&self, storage_key: u64, page: CommittedPage) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        if state.pages.insert(storage_key, page).is_some() {
            return;
        }
        state.order.push_back(storage_key);
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.pages.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
