//! Stores and transactions.
//!
//! A [`Store`] hands out any number of [`ReadTrx`] bound to committed
//! revisions and at most one [`WriteTrx`] at a time. Both implement
//! [`NodeReader`] for cursor navigation.

mod config;
mod cursor;
mod edits;
mod error;
mod hash_maintenance;
mod read_trx;
mod reader;
mod store;
mod trx_log;
mod write_trx;


pub use config::StoreConfig;
pub use cursor::NodeReader;
pub use error::{Result, TrxError};
pub use read_trx::ReadTrx;
pub use store::Store;
pub use write_trx::WriteTrx;
