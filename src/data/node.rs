//! Nodes stored in node pages and the factory that encodes their payloads.

use super::bytes::{put_blob, put_len, ByteReader, DecodeError, EncodeError};
use super::node_key::NodeKey;

/// Node kinds. The discriminant is the persisted tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    DocumentRoot = 1,
    Element = 2,
    Attribute = 3,
    Text = 4,
    Namespace = 5,
}

impl NodeKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            1 => Ok(Self::DocumentRoot),
            2 => Ok(Self::Element),
            3 => Ok(Self::Attribute),
            4 => Ok(Self::Text),
            5 => Ok(Self::Namespace),
            other => Err(DecodeError::UnknownNodeKind(other)),
        }
    }
}

/// Qualified name as supplied by callers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QName {
    pub uri: String,
    pub prefix: String,
    pub local: String,
}

impl QName {
    /// Name without namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            ..Self::default()
        }
    }

    pub fn new(uri: impl Into<String>, prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            prefix: prefix.into(),
            local: local.into(),
        }
    }

    /// `prefix:local`, or `local` without a prefix. This is the string
    /// interned in the name dictionary.
    pub fn lexical(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }

    /// Rebuilds a name from its interned lexical form and URI.
    pub fn from_lexical(lexical: &str, uri: String) -> Self {
        match lexical.split_once(':') {
            Some((prefix, local)) => Self::new(uri, prefix, local),
            None => Self::new(uri, "", lexical),
        }
    }
}

/// Name dictionary keys of a named node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NameRef {
    pub name_key: u32,
    pub uri_key: u32,
}

/// Tree pointers of nodes that take part in the child/sibling structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Structure {
    pub first_child: Option<NodeKey>,
    pub left_sibling: Option<NodeKey>,
    pub right_sibling: Option<NodeKey>,
    pub child_count: u64,
}

/// Kind-specific node content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    DocumentRoot(Structure),
    Element {
        structure: Structure,
        name: NameRef,
        attributes: Vec<NodeKey>,
        namespaces: Vec<NodeKey>,
    },
    Text {
        structure: Structure,
        value: String,
    },
    Attribute {
        name: NameRef,
        value: String,
    },
    Namespace {
        uri_key: u32,
        prefix_key: u32,
    },
}

impl Payload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Payload::DocumentRoot(_) => NodeKind::DocumentRoot,
            Payload::Element { .. } => NodeKind::Element,
            Payload::Text { .. } => NodeKind::Text,
            Payload::Attribute { .. } => NodeKind::Attribute,
            Payload::Namespace { .. } => NodeKind::Namespace,
        }
    }
}

/// A node as held in a node page slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    /// Subtree hash; zero when hashing is disabled.
    pub hash: u64,
    pub payload: Payload,
}

impl Node {
    pub fn new(key: NodeKey, parent: Option<NodeKey>, payload: Payload) -> Self {
        Self {
            key,
            parent,
            hash: 0,
            payload,
        }
    }

    pub fn document_root() -> Self {
        Self::new(
            NodeKey::DOCUMENT_ROOT,
            None,
            Payload::DocumentRoot(Structure::default()),
        )
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn structure(&self) -> Option<&Structure> {
        match &self.payload {
            Payload::DocumentRoot(s) => Some(s),
            Payload::Element { structure, .. } | Payload::Text { structure, .. } => Some(structure),
            Payload::Attribute { .. } | Payload::Namespace { .. } => None,
        }
    }

    pub fn structure_mut(&mut self) -> Option<&mut Structure> {
        match &mut self.payload {
            Payload::DocumentRoot(s) => Some(s),
            Payload::Element { structure, .. } | Payload::Text { structure, .. } => Some(structure),
            Payload::Attribute { .. } | Payload::Namespace { .. } => None,
        }
    }

    pub fn first_child(&self) -> Option<NodeKey> {
        self.structure().and_then(|s| s.first_child)
    }

    pub fn left_sibling(&self) -> Option<NodeKey> {
        self.structure().and_then(|s| s.left_sibling)
    }

    pub fn right_sibling(&self) -> Option<NodeKey> {
        self.structure().and_then(|s| s.right_sibling)
    }

    pub fn child_count(&self) -> u64 {
        self.structure().map_or(0, |s| s.child_count)
    }

    pub fn attributes(&self) -> &[NodeKey] {
        match &self.payload {
            Payload::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn namespaces(&self) -> &[NodeKey] {
        match &self.payload {
            Payload::Element { namespaces, .. } => namespaces,
            _ => &[],
        }
    }

    pub fn name(&self) -> Option<NameRef> {
        match &self.payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => Some(*name),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { value, .. } | Payload::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Payload factory
// ============================================================================

/// Encodes and decodes node payloads so that pages never look inside them.
pub trait NodeFactory: Send + Sync {
    /// Appends the payload bytes to `out`.
    fn serialize(&self, payload: &Payload, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    /// Rebuilds a payload from its kind tag and bytes.
    fn deserialize(&self, kind: u8, bytes: &[u8]) -> Result<Payload, DecodeError>;
}

/// Little-endian encoding of the built-in node kinds.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultNodeFactory;

fn put_key(out: &mut Vec<u8>, key: Option<NodeKey>) {
    out.extend_from_slice(&NodeKey::encode_optional(key).to_le_bytes());
}

fn read_key(reader: &mut ByteReader<'_>) -> Result<Option<NodeKey>, DecodeError> {
    let raw = reader.i64()?;
    NodeKey::decode_optional(raw).ok_or(DecodeError::InvalidNodeKey(raw))
}

fn put_structure(out: &mut Vec<u8>, s: &Structure) {
    put_key(out, s.first_child);
    put_key(out, s.left_sibling);
    put_key(out, s.right_sibling);
    out.extend_from_slice(&s.child_count.to_le_bytes());
}

fn read_structure(reader: &mut ByteReader<'_>) -> Result<Structure, DecodeError> {
    Ok(Structure {
        first_child: read_key(reader)?,
        left_sibling: read_key(reader)?,
        right_sibling: read_key(reader)?,
        child_count: reader.u64()?,
    })
}

fn put_name(out: &mut Vec<u8>, name: &NameRef) {
    out.extend_from_slice(&name.name_key.to_le_bytes());
    out.extend_from_slice(&name.uri_key.to_le_bytes());
}

fn read_name(reader: &mut ByteReader<'_>) -> Result<NameRef, DecodeError> {
    Ok(NameRef {
        name_key: reader.u32()?,
        uri_key: reader.u32()?,
    })
}

fn put_key_list(out: &mut Vec<u8>, keys: &[NodeKey]) -> Result<(), EncodeError> {
    put_len(out, keys.len())?;
    for key in keys {
        out.extend_from_slice(&key.0.to_le_bytes());
    }
    Ok(())
}

fn read_key_list(reader: &mut ByteReader<'_>) -> Result<Vec<NodeKey>, DecodeError> {
    let count = reader.u32()? as usize;
    // Each key needs 8 bytes; reject impossible counts before allocating.
    if count.saturating_mul(8) > reader.remaining() {
        return Err(DecodeError::Truncated {
            needed: count.saturating_mul(8),
            remaining: reader.remaining(),
        });
    }
    (0..count).map(|_| reader.u64().map(NodeKey)).collect()
}

impl NodeFactory for DefaultNodeFactory {
    fn serialize(&self, payload: &Payload, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match payload {
            Payload::DocumentRoot(structure) => put_structure(out, structure),
            Payload::Element {
                structure,
                name,
                attributes,
                namespaces,
            } => {
                put_structure(out, structure);
                put_name(out, name);
                put_key_list(out, attributes)?;
                put_key_list(out, namespaces)?;
            }
            Payload::Text { structure, value } => {
                put_structure(out, structure);
                put_blob(out, value.as_bytes())?;
            }
            Payload::Attribute { name, value } => {
                put_name(out, name);
                put_blob(out, value.as_bytes())?;
            }
            Payload::Namespace {
                uri_key,
                prefix_key,
            } => {
                out.extend_from_slice(&uri_key.to_le_bytes());
                out.extend_from_slice(&prefix_key.to_le_bytes());
            }
        }
        Ok(())
    }

    fn deserialize(&self, kind: u8, bytes: &[u8]) -> Result<Payload, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let payload = match NodeKind::from_tag(kind)? {
            NodeKind::DocumentRoot => Payload::DocumentRoot(read_structure(&mut reader)?),
            NodeKind::Element => Payload::Element {
                structure: read_structure(&mut reader)?,
                name: read_name(&mut reader)?,
                attributes: read_key_list(&mut reader)?,
                namespaces: read_key_list(&mut reader)?,
            },
            NodeKind::Text => Payload::Text {
                structure: read_structure(&mut reader)?,
                value: reader.string()?,
            },
            NodeKind::Attribute => Payload::Attribute {
                name: read_name(&mut reader)?,
                value: reader.string()?,
            },
            NodeKind::Namespace => Payload::Namespace {
                uri_key: reader.u32()?,
                prefix_key: reader.u32()?,
            },
        };
        reader.finish()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element() -> Payload {
        Payload::Element {
            structure: Structure {
                first_child: Some(NodeKey(4)),
                left_sibling: None,
                right_sibling: Some(NodeKey(9)),
                child_count: 2,
            },
            name: NameRef {
                name_key: 11,
                uri_key: 12,
            },
            attributes: vec![NodeKey(5), NodeKey(6)],
            namespaces: vec![NodeKey(7)],
        }
    }

    #[test]
    fn test_factory_element() {
        let factory = DefaultNodeFactory;
        let mut buf = Vec::new();
        factory.serialize(&element(), &mut buf).unwrap();
        let decoded = factory.deserialize(NodeKind::Element.tag(), &buf).unwrap();
        assert_eq!(decoded, element());
    }

    #[test]
    fn test_factory_unknown_kind() {
        let factory = DefaultNodeFactory;
        assert_eq!(
            factory.deserialize(99, &[]),
            Err(DecodeError::UnknownNodeKind(99))
        );
    }

    #[test]
    fn test_factory_rejects_trailing_bytes() {
        let factory = DefaultNodeFactory;
        let mut buf = Vec::new();
        factory.serialize(&Payload::Namespace { uri_key: 1, prefix_key: 2 }, &mut buf).unwrap();
        buf.push(0);
        assert_eq!(
            factory.deserialize(NodeKind::Namespace.tag(), &buf),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_node_accessors() {
        let node = Node::new(NodeKey(3), Some(NodeKey(0)), element());
        assert_eq!(node.kind(), NodeKind::Element);
        assert_eq!(node.first_child(), Some(NodeKey(4)));
        assert_eq!(node.right_sibling(), Some(NodeKey(9)));
        assert_eq!(node.child_count(), 2);
        assert_eq!(node.attributes().len(), 2);
        assert_eq!(node.namespaces(), &[NodeKey(7)]);
        assert!(node.value().is_none());

        let attr = Node::new(
            NodeKey(5),
            Some(NodeKey(3)),
            Payload::Attribute {
                name: NameRef::default(),
                value: "v".into(),
            },
        );
        assert!(attr.structure().is_none());
        assert_eq!(attr.value(), Some("v"));
        assert_eq!(attr.child_count(), 0);
    }

    #[test]
    fn test_qname_lexical() {
        let name = QName::new("urn:a", "p", "item");
        assert_eq!(name.lexical(), "p:item");
        assert_eq!(QName::from_lexical("p:item", "urn:a".into()), name);
        assert_eq!(QName::local("x").lexical(), "x");
        assert_eq!(QName::from_lexical("x", String::new()), QName::local("x"));
    }
}
