//! Transaction-layer errors.

use thiserror::Error;

use crate::store::PageError;

/// Errors returned by stores and transactions.
#[derive(Error, Debug)]
pub enum TrxError {
    #[error("page error: {0}")]
    Page(#[from] PageError),
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("revision {requested} out of range (latest is {latest})")]
    RevisionOutOfRange { requested: u64, latest: u64 },
    #[error("transaction is closed")]
    Closed,
    #[error("another write transaction is open")]
    WriterBusy,
    #[error("{0} uncommitted modifications; commit or abort first")]
    Uncommitted(u64),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("configuration does not match store: {0}")]
    ConfigMismatch(String),
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl TrxError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        TrxError::Precondition(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        TrxError::Invariant(msg.into())
    }
}

/// Result type for store and transaction operations.
pub type Result<T> = std::result::Result<T, TrxError>;
