//! Node identities, addressing and node payloads.

mod bytes;
mod node;
mod node_key;


pub use bytes::{put_blob, put_len, ByteReader, DecodeError, EncodeError};
pub use node::{
    DefaultNodeFactory, NameRef, Node, NodeFactory, NodeKind, Payload, QName, Structure,
};
pub use node_key::{AddressError, KeyLayout, KeyPath, NodeKey, MAX_KEY};
