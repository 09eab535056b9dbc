//! Page encoding.
//!
//! Every page starts with its kind tag followed by kind-specific fields.
//! References are written as a presence byte, then `storage_key`, `length`
//! and `checksum` when present. Node slots are written as a slot tag:
//!
//! - `0`: empty
//! - `1`: tombstone, then key and parent
//! - `2`: node, then kind tag, key, parent, hash and the factory payload
//!
//! All integers are little-endian.

use std::sync::Arc;

use crate::data::{
    put_blob, put_len, ByteReader, DecodeError, KeyLayout, Node, NodeFactory, NodeKey,
};
use crate::hash::{keccak256, HashKind};

use super::arena::PageHandle;
use super::error::{PageError, Result};
use super::page::{Page, PageKind};
use super::page_reference::{PageLocator, PageReference};
use super::page_types::{
    IndirectPage, MetaPage, NamePage, NodePage, RevisionRootPage, Slot, StoreSettings, Tombstone,
    UberPage,
};

const SLOT_EMPTY: u8 = 0;
const SLOT_TOMBSTONE: u8 = 1;
const SLOT_NODE: u8 = 2;

/// Checksum stored in page locators.
pub fn checksum(bytes: &[u8]) -> [u8; 32] {
    keccak256(bytes)
}

/// Serializes pages; node payloads go through the configured factory.
#[derive(Clone)]
pub struct PageCodec {
    factory: Arc<dyn NodeFactory>,
}

impl PageCodec {
    pub fn new(factory: Arc<dyn NodeFactory>) -> Self {
        Self { factory }
    }

    /// Encodes a page whose references are all `Null` or `Persisted`.
    pub fn encode(&self, page: &Page) -> Result<Vec<u8>> {
        self.encode_with(page, &|_| None)
    }

    /// Encodes a page, mapping in-memory references through `resolve`.
    pub fn encode_with(
        &self,
        page: &Page,
        resolve: &(dyn Fn(PageHandle) -> Option<PageLocator> + Sync),
    ) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.push(page.kind().tag());
        match page {
            Page::Uber(uber) => {
                out.extend_from_slice(&uber.revision_count.to_le_bytes());
                out.push(uber.bootstrap as u8);
                out.push(uber.settings.hash_kind.tag());
                put_layout(&mut out, &uber.settings.node_layout);
                put_layout(&mut out, &uber.settings.revision_layout);
            }
            Page::RevisionRoot(root) => {
                out.extend_from_slice(&root.revision.to_le_bytes());
                out.extend_from_slice(&root.max_node_key.to_le_bytes());
                out.extend_from_slice(&root.committed_at.to_le_bytes());
            }
            Page::Indirect(indirect) => {
                out.push(indirect.level());
                out.extend_from_slice(&(indirect.fanout() as u32).to_le_bytes());
            }
            Page::Node(node_page) => {
                out.extend_from_slice(&node_page.page_key().to_le_bytes());
                out.extend_from_slice(&(node_page.capacity() as u32).to_le_bytes());
                for slot in node_page.slots() {
                    self.put_slot(&mut out, slot)?;
                }
            }
            Page::Name(names) => {
                put_len(&mut out, names.len())?;
                for (key, name) in names.iter() {
                    out.extend_from_slice(&key.to_le_bytes());
                    put_blob(&mut out, name.as_bytes())?;
                }
            }
            Page::Meta(meta) => {
                put_len(&mut out, meta.len())?;
                for (key, value) in meta.iter() {
                    put_blob(&mut out, key.as_bytes())?;
                    put_blob(&mut out, value)?;
                }
            }
        }
        for reference in page.references() {
            put_reference(&mut out, reference, resolve)?;
        }
        Ok(out)
    }

    fn put_slot(&self, out: &mut Vec<u8>, slot: &Slot) -> Result<()> {
        match slot {
            Slot::Empty => out.push(SLOT_EMPTY),
            Slot::Tombstone(tomb) => {
                out.push(SLOT_TOMBSTONE);
                out.extend_from_slice(&tomb.key.0.to_le_bytes());
                out.extend_from_slice(&NodeKey::encode_optional(tomb.parent).to_le_bytes());
            }
            Slot::Occupied(node) => {
                out.push(SLOT_NODE);
                out.push(node.kind().tag());
                out.extend_from_slice(&node.key.0.to_le_bytes());
                out.extend_from_slice(&NodeKey::encode_optional(node.parent).to_le_bytes());
                out.extend_from_slice(&node.hash.to_le_bytes());
                let mut payload = Vec::new();
                self.factory.serialize(&node.payload, &mut payload)?;
                put_blob(out, &payload)?;
            }
        }
        Ok(())
    }

    /// Decodes a page. The whole input must be consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<Page> {
        let mut reader = ByteReader::new(bytes);
        let tag = reader.u8()?;
        let kind = PageKind::from_tag(tag).ok_or(DecodeError::UnknownPageTag(tag))?;
        let page = match kind {
            PageKind::Uber => {
                let revision_count = reader.u64()?;
                let bootstrap = reader.u8()? != 0;
                let hash_kind = HashKind::from_tag(reader.u8()?)?;
                let node_layout = read_layout(&mut reader)?;
                let revision_layout = read_layout(&mut reader)?;
                if revision_count == 0 {
                    return Err(PageError::Corrupted("uber page with zero revisions".into()));
                }
                Page::Uber(UberPage {
                    revision_count,
                    bootstrap,
                    settings: StoreSettings {
                        hash_kind,
                        node_layout,
                        revision_layout,
                    },
                    references: [read_reference(&mut reader)?],
                })
            }
            PageKind::RevisionRoot => {
                let revision = reader.u64()?;
                let max_node_key = reader.u64()?;
                let committed_at = reader.u64()?;
                Page::RevisionRoot(RevisionRootPage {
                    revision,
                    max_node_key,
                    committed_at,
                    references: [
                        read_reference(&mut reader)?,
                        read_reference(&mut reader)?,
                        read_reference(&mut reader)?,
                    ],
                })
            }
            PageKind::Indirect => {
                let level = reader.u8()?;
                let fanout = reader.u32()? as usize;
                check_count(&reader, fanout, 1)?;
                let references = (0..fanout)
                    .map(|_| read_reference(&mut reader))
                    .collect::<Result<Vec<_>>>()?;
                Page::Indirect(IndirectPage::from_references(level, references))
            }
            PageKind::Node => {
                let page_key = reader.u64()?;
                let capacity = reader.u32()? as usize;
                check_count(&reader, capacity, 1)?;
                let slots = (0..capacity)
                    .map(|_| self.read_slot(&mut reader))
                    .collect::<Result<Vec<_>>>()?;
                Page::Node(NodePage::from_slots(page_key, slots))
            }
            PageKind::Name => {
                let count = reader.u32()? as usize;
                check_count(&reader, count, 8)?;
                let mut names = NamePage::default();
                for _ in 0..count {
                    let key = reader.u32()?;
                    names.entries.insert(key, reader.string()?);
                }
                Page::Name(names)
            }
            PageKind::Meta => {
                let count = reader.u32()? as usize;
                check_count(&reader, count, 8)?;
                let mut meta = MetaPage::default();
                for _ in 0..count {
                    let key = reader.string()?;
                    meta.entries.insert(key, reader.blob()?.to_vec());
                }
                Page::Meta(meta)
            }
        };
        reader.finish()?;
        Ok(page)
    }

    fn read_slot(&self, reader: &mut ByteReader<'_>) -> Result<Slot> {
        match reader.u8()? {
            SLOT_EMPTY => Ok(Slot::Empty),
            SLOT_TOMBSTONE => Ok(Slot::Tombstone(Tombstone {
                key: NodeKey(reader.u64()?),
                parent: read_optional_key(reader)?,
            })),
            SLOT_NODE => {
                let kind = reader.u8()?;
                let key = NodeKey(reader.u64()?);
                let parent = read_optional_key(reader)?;
                let hash = reader.u64()?;
                let payload = self.factory.deserialize(kind, reader.blob()?)?;
                Ok(Slot::Occupied(Node {
                    key,
                    parent,
                    hash,
                    payload,
                }))
            }
            other => Err(DecodeError::UnknownSlotTag(other).into()),
        }
    }
}

fn check_count(reader: &ByteReader<'_>, count: usize, min_size: usize) -> Result<()> {
    let needed = count.saturating_mul(min_size);
    if needed > reader.remaining() {
        return Err(DecodeError::Truncated {
            needed,
            remaining: reader.remaining(),
        }
        .into());
    }
    Ok(())
}

fn read_optional_key(reader: &mut ByteReader<'_>) -> Result<Option<NodeKey>> {
    let raw = reader.i64()?;
    Ok(NodeKey::decode_optional(raw).ok_or(DecodeError::InvalidNodeKey(raw))?)
}

fn put_layout(out: &mut Vec<u8>, layout: &KeyLayout) {
    out.push(layout.leaf_bits());
    out.push(layout.levels() as u8);
    out.extend_from_slice(layout.level_bits());
}

fn read_layout(reader: &mut ByteReader<'_>) -> Result<KeyLayout> {
    let leaf_bits = reader.u8()?;
    let levels = reader.u8()? as usize;
    let level_bits = reader.take(levels)?.to_vec();
    Ok(KeyLayout::new(leaf_bits, level_bits)?)
}

fn put_reference(
    out: &mut Vec<u8>,
    reference: &PageReference,
    resolve: &(dyn Fn(PageHandle) -> Option<PageLocator> + Sync),
) -> Result<()> {
    let locator = match reference {
        PageReference::Null => None,
        PageReference::Persisted(locator) => Some(*locator),
        PageReference::InMemory { handle, .. } => {
            Some(resolve(*handle).ok_or(PageError::Unpersisted)?)
        }
    };
    match locator {
        None => out.push(0),
        Some(locator) => {
            out.push(1);
            out.extend_from_slice(&locator.storage_key.to_le_bytes());
            out.extend_from_slice(&locator.length.to_le_bytes());
            out.extend_from_slice(&locator.checksum);
        }
    }
    Ok(())
}

fn read_reference(reader: &mut ByteReader<'_>) -> Result<PageReference> {
    match reader.u8()? {
        0 => Ok(PageReference::Null),
        1 => Ok(PageReference::Persisted(PageLocator {
            storage_key: reader.u64()?,
            length: reader.u32()?,
            checksum: reader.bytes32()?,
        })),
        other => Err(PageError::Corrupted(format!("invalid reference flag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DefaultNodeFactory, NameRef, Payload, Structure};
    use crate::store::PageArena;

    fn codec() -> PageCodec {
        PageCodec::new(Arc::new(DefaultNodeFactory))
    }

    fn locator(n: u64) -> PageLocator {
        PageLocator {
            storage_key: n,
            length: 10 + n as u32,
            checksum: [n as u8; 32],
        }
    }

    fn roundtrip(page: Page) {
        let codec = codec();
        let bytes = codec.encode(&page).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), page);
    }

    #[test]
    fn test_uber_roundtrip() {
        let mut uber = UberPage::bootstrap(StoreSettings {
            hash_kind: HashKind::Postorder,
            node_layout: KeyLayout::new(3, vec![4, 4]).unwrap(),
            revision_layout: KeyLayout::revision_default(),
        });
        uber.references[0] = PageReference::Persisted(locator(3));
        roundtrip(Page::Uber(uber.successor()));
        roundtrip(Page::Uber(uber));
    }

    #[test]
    fn test_revision_root_roundtrip() {
        let mut root = RevisionRootPage::new(7);
        root.max_node_key = 99;
        root.committed_at = 1_700_000_000_000;
        root.references[RevisionRootPage::NODE_TREE] = PageReference::Persisted(locator(1));
        root.references[RevisionRootPage::META] = PageReference::Persisted(locator(2));
        roundtrip(Page::RevisionRoot(root));
    }

    #[test]
    fn test_indirect_roundtrip() {
        let mut page = IndirectPage::new(2, 16);
        *page.reference_mut(5).unwrap() = PageReference::Persisted(locator(5));
        *page.reference_mut(15).unwrap() = PageReference::Persisted(locator(15));
        roundtrip(Page::Indirect(page));
    }

    #[test]
    fn test_node_page_roundtrip() {
        let mut page = NodePage::new(3, 8);
        page.set(
            0,
            Node {
                key: NodeKey(24),
                parent: Some(NodeKey(0)),
                hash: 0xdead_beef,
                payload: Payload::Element {
                    structure: Structure {
                        first_child: Some(NodeKey(25)),
                        child_count: 1,
                        ..Structure::default()
                    },
                    name: NameRef { name_key: 1, uri_key: 2 },
                    attributes: vec![NodeKey(26)],
                    namespaces: vec![],
                },
            },
        )
        .unwrap();
        page.set(
            1,
            Node::new(
                NodeKey(25),
                Some(NodeKey(24)),
                Payload::Text {
                    structure: Structure::default(),
                    value: "hello".into(),
                },
            ),
        )
        .unwrap();
        page.remove(
            2,
            Tombstone {
                key: NodeKey(26),
                parent: Some(NodeKey(24)),
            },
        )
        .unwrap();
        roundtrip(Page::Node(page));
    }

    #[test]
    fn test_dictionary_roundtrip() {
        let mut names = NamePage::default();
        names.insert(NamePage::hash_name("a"), "a".into());
        names.insert(NamePage::hash_name("p:b"), "p:b".into());
        roundtrip(Page::Name(names));

        let mut meta = MetaPage::default();
        meta.set("created-by".into(), b"test".to_vec());
        meta.set("empty".into(), Vec::new());
        roundtrip(Page::Meta(meta));
    }

    #[test]
    fn test_in_memory_reference_requires_resolution() {
        let mut arena = PageArena::new();
        let handle = arena.insert(Page::Name(NamePage::default()));
        let mut page = IndirectPage::new(0, 2);
        *page.reference_mut(0).unwrap() = PageReference::InMemory { handle, base: None };
        let page = Page::Indirect(page);

        assert!(matches!(codec().encode(&page), Err(PageError::Unpersisted)));

        let bytes = codec().encode_with(&page, &|h| (h == handle).then(|| locator(9))).unwrap();
        let decoded = codec().decode(&bytes).unwrap();
        assert_eq!(
            decoded.references()[0],
            PageReference::Persisted(locator(9))
        );
    }

    #[test]
    fn test_decode_unknown_tags() {
        assert!(matches!(
            codec().decode(&[42]),
            Err(PageError::Decode(DecodeError::UnknownPageTag(42)))
        ));

        // Node page with one slot carrying an unknown slot tag.
        let mut bytes = vec![PageKind::Node.tag()];
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(9);
        assert!(matches!(
            codec().decode(&bytes),
            Err(PageError::Decode(DecodeError::UnknownSlotTag(9)))
        ));
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = codec().encode(&Page::RevisionRoot(RevisionRootPage::new(1))).unwrap();
        let err = codec().decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_corruption());
    }
}
