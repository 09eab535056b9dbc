use super::*;
use crate::data::{NameRef, Node, NodeKey, Payload, Structure};

fn text(key: u64, value: &str) -> Node {
    Node::new(
        NodeKey(key),
        Some(NodeKey(0)),
        Payload::Text {
            structure: Structure::default(),
            value: value.into(),
        },
    )
}

#[test]
fn test_keccak256_empty() {
    assert_eq!(
        hex::encode(keccak256(&[])),
        "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
    );
}

#[test]
fn test_self_hash_ignores_structure() {
    let a = text(1, "hello");
    let mut b = text(1, "hello");
    b.structure_mut().unwrap().right_sibling = Some(NodeKey(8));
    b.parent = Some(NodeKey(3));
    b.hash = 99;
    assert_eq!(self_hash(&a), self_hash(&b));
}

#[test]
fn test_self_hash_covers_value_and_kind() {
    assert_ne!(self_hash(&text(1, "a")), self_hash(&text(1, "b")));

    let attr = Node::new(
        NodeKey(1),
        None,
        Payload::Attribute {
            name: NameRef::default(),
            value: "a".into(),
        },
    );
    assert_ne!(self_hash(&attr), self_hash(&text(1, "a")));
}

#[test]
fn test_lift_matches_fold() {
    // Changing one child by d changes the parent by lift(d).
    let own = 17;
    let before = subtree_hash(own, [5, 9]);
    let after = subtree_hash(own, [5, 9u64.wrapping_add(100)]);
    assert_eq!(after.wrapping_sub(before), lift(100));
}

#[test]
fn test_subtree_hash_leaf_is_self() {
    assert_eq!(subtree_hash(42, std::iter::empty()), 42);
}

#[test]
fn test_hash_kind_tags() {
    for kind in [HashKind::Rolling, HashKind::Postorder, HashKind::None] {
        assert_eq!(HashKind::from_tag(kind.tag()).unwrap(), kind);
    }
    assert!(HashKind::from_tag(7).is_err());
    assert!(!HashKind::None.is_enabled());
}
