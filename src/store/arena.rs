//! Arena owning the pages of an in-progress revision.

use std::sync::atomic::{AtomicU32, Ordering};

use super::error::{PageError, Result};
use super::page::Page;

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(0);

/// Index into a [`PageArena`], stamped with the arena's generation so that
/// handles kept past an abort or commit are detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHandle {
    index: u32,
    generation: u32,
}

/// Owns mutable pages. Pages are never shared with readers. The arena only
/// grows and is dropped as a whole.
pub struct PageArena {
    generation: u32,
    pages: Vec<Page>,
}

impl Default for PageArena {
    fn default() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            pages: Vec::new(),
        }
    }
}

impl PageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: Page) -> PageHandle {
        let handle = PageHandle {
            index: self.pages.len() as u32,
            generation: self.generation,
        };
        self.pages.push(page);
        handle
    }

    fn index(&self, handle: PageHandle) -> Result<usize> {
        if handle.generation == self.generation {
            Ok(handle.index as usize)
        } else {
            Err(PageError::StaleHandle)
        }
    }

    pub fn get(&self, handle: PageHandle) -> Result<&Page> {
        let index = self.index(handle)?;
        self.pages.get(index).ok_or(PageError::StaleHandle)
    }

    pub fn get_mut(&mut self, handle: PageHandle) -> Result<&mut Page> {
        let index = self.index(handle)?;
        self.pages.get_mut(index).ok_or(PageError::StaleHandle)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
