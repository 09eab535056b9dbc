//! Page-layer errors.

use std::io;

use thiserror::Error;

use crate::data::{AddressError, DecodeError, EncodeError};
use super::page::PageKind;

/// Errors raised while storing, loading or walking pages.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("address error: {0}")]
    Address(#[from] AddressError),
    #[error("checksum mismatch for page at {storage_key}")]
    ChecksumMismatch { storage_key: u64 },
    #[error("no page stored at {storage_key} with length {length}")]
    NotFound { storage_key: u64, length: u32 },
    #[error("page references an in-memory page that has not been written")]
    Unpersisted,
    #[error("stale page handle")]
    StaleHandle,
    #[error("expected {expected:?} page, found {found:?}")]
    UnexpectedPage { expected: PageKind, found: PageKind },
    #[error("slot {slot} out of range for page of {capacity} slots")]
    SlotOutOfRange { slot: usize, capacity: usize },
    #[error("store is corrupted: {0}")]
    Corrupted(String),
}

impl PageError {
    /// True when the error indicates damaged persisted data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PageError::Decode(_)
                | PageError::ChecksumMismatch { .. }
                | PageError::NotFound { .. }
                | PageError::Corrupted(_)
        )
    }
}

/// Result type for page operations.
pub type Result<T> = std::result::Result<T, PageError>;
