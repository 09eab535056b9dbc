#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use revtree_db::{HashKind, NodeKey, NodeReader, QName, Store, StoreConfig, TrxError};

#[derive(Arbitrary, Debug)]
struct TrxInput {
    postorder: bool,
    operations: Vec<TrxOp>,
}

#[derive(Arbitrary, Debug)]
enum TrxOp {
    MoveTo(u16),
    MoveToParent,
    MoveToFirstChild,
    MoveToRightSibling,
    InsertElementFirstChild(u8),
    InsertElementRightSibling(u8),
    InsertTextFirstChild(String),
    InsertTextRightSibling(String),
    InsertAttribute(u8, String),
    InsertNamespace(u8),
    SetValue(String),
    SetQName(u8),
    Remove,
    SetMeta(u8, Vec<u8>),
    Commit,
    Abort,
    RevertTo(u8),
}

fuzz_target!(|input: TrxInput| {
    if input.operations.len() > 100 {
        return;
    }

    let kind = if input.postorder {
        HashKind::Postorder
    } else {
        HashKind::Rolling
    };
    let store = Store::in_memory(StoreConfig::default().with_hash_kind(kind)).unwrap();
    let mut wtx = store.begin_write().unwrap();
    let mut last_key = 0u64;

    for op in input.operations {
        let result = match op {
            TrxOp::MoveTo(k) => wtx.move_to(NodeKey(k as u64)).map(|_| None),
            TrxOp::MoveToParent => wtx.move_to_parent().map(|_| None),
            TrxOp::MoveToFirstChild => wtx.move_to_first_child().map(|_| None),
            TrxOp::MoveToRightSibling => wtx.move_to_right_sibling().map(|_| None),
            TrxOp::InsertElementFirstChild(n) => wtx
                .insert_element_as_first_child(QName::local(format!("e{n}")))
                .map(Some),
            TrxOp::InsertElementRightSibling(n) => wtx
                .insert_element_as_right_sibling(QName::local(format!("e{n}")))
                .map(Some),
            TrxOp::InsertTextFirstChild(v) => wtx.insert_text_as_first_child(&v).map(Some),
            TrxOp::InsertTextRightSibling(v) => wtx.insert_text_as_right_sibling(&v).map(Some),
            TrxOp::InsertAttribute(n, v) => wtx
                .insert_attribute(QName::local(format!("a{n}")), &v)
                .map(Some),
            TrxOp::InsertNamespace(n) => wtx
                .insert_namespace(&format!("urn:{n}"), &format!("p{n}"))
                .map(Some),
            TrxOp::SetValue(v) => wtx.set_value(&v).map(|_| None),
            TrxOp::SetQName(n) => wtx.set_qname(QName::local(format!("q{n}"))).map(|_| None),
            TrxOp::Remove => wtx.remove().map(|_| None),
            TrxOp::SetMeta(k, v) => wtx.set_meta(&format!("m{k}"), &v).map(|_| None),
            TrxOp::Commit => wtx.commit().map(|_| None),
            TrxOp::Abort => wtx.abort().map(|_| None),
            TrxOp::RevertTo(r) => wtx.revert_to(r as u64).map(|_| None),
        };

        match result {
            Ok(Some(key)) => {
                // Keys are never reused.
                assert!(key.0 > last_key);
                last_key = key.0;
            }
            Ok(None) | Err(TrxError::Precondition(_)) | Err(TrxError::RevisionOutOfRange { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let max = wtx.max_node_key().unwrap();
    for key in 0..=max {
        if let Some(node) = wtx.node(NodeKey(key)).unwrap() {
            assert_eq!(node.hash, wtx.recompute_hash(NodeKey(key)).unwrap());
        }
    }
    wtx.commit().unwrap();
});
