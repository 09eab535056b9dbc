//! Integration tests for revtree_db.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;

use revtree_db::store::{Backend, MemoryBackend, PageError};
use revtree_db::{HashKind, NodeKey, NodeReader, QName, Store, StoreConfig, TrxError};
use tempfile::tempdir;

/// Builds `<catalog><book id="..">title</book>...</catalog>` and commits it.
fn build_catalog(store: &Store, books: usize) -> Vec<NodeKey> {
    let mut wtx = store.begin_write().unwrap();
    let catalog = wtx
        .insert_element_as_first_child(QName::new("urn:catalog", "c", "catalog"))
        .unwrap();
    wtx.insert_namespace("urn:catalog", "c").unwrap();
    assert!(wtx.move_to(catalog).unwrap());

    let mut book_keys = Vec::new();
    for i in 0..books {
        let book = if i == 0 {
            wtx.insert_element_as_first_child(QName::local("book")).unwrap()
        } else {
            assert!(wtx.move_to(book_keys[i - 1]).unwrap());
            wtx.insert_element_as_right_sibling(QName::local("book"))
                .unwrap()
        };
        wtx.insert_attribute(QName::local("id"), &i.to_string())
            .unwrap();
        assert!(wtx.move_to(book).unwrap());
        wtx.insert_text_as_first_child(&format!("title {i}")).unwrap();
        book_keys.push(book);
    }
    wtx.commit().unwrap();
    wtx.close().unwrap();
    book_keys
}

fn assert_all_hashes_consistent<R: NodeReader>(reader: &R, max_key: u64) {
    for key in 0..=max_key {
        if let Some(node) = reader.node(NodeKey(key)).unwrap() {
            assert_eq!(node.hash, reader.recompute_hash(NodeKey(key)).unwrap());
        }
    }
}

#[test]
fn test_full_workflow() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let books = build_catalog(&store, 3);
    assert_eq!(store.latest_revision().unwrap(), 1);

    let mut rtx = store.begin_read().unwrap();
    assert!(rtx.move_to_first_child().unwrap());
    assert_eq!(
        rtx.qname().unwrap(),
        Some(QName::new("urn:catalog", "c", "catalog"))
    );
    assert_eq!(rtx.children(rtx.current().key).unwrap(), books);

    assert!(rtx.move_to(books[1]).unwrap());
    assert!(rtx.move_to_attribute(0).unwrap());
    assert_eq!(rtx.value(), Some("1"));
    assert!(rtx.move_to(books[1]).unwrap());
    assert!(rtx.move_to_first_child().unwrap());
    assert_eq!(rtx.value(), Some("title 1"));

    assert_all_hashes_consistent(&rtx, rtx.max_node_key().unwrap());
}

#[test]
fn test_many_nodes_span_pages() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let books = build_catalog(&store, 200);
    let rtx = store.begin_read().unwrap();
    // Three nodes per book plus the catalog and its namespace.
    assert_eq!(rtx.max_node_key().unwrap(), 602);
    let catalog = rtx.node(books[0]).unwrap().unwrap().parent.unwrap();
    assert_eq!(rtx.children(catalog).unwrap(), books);
    assert_all_hashes_consistent(&rtx, 602);
}

#[test]
fn test_time_travel_reads() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let mut wtx = store.begin_write().unwrap();
    let text = wtx.insert_text_as_first_child("v1").unwrap();
    wtx.commit().unwrap();
    for revision in 2..=10 {
        wtx.set_value(&format!("v{revision}")).unwrap();
        assert_eq!(wtx.commit().unwrap(), revision);
    }

    for revision in 1..=10u64 {
        let rtx = store.begin_read_at(revision).unwrap();
        assert_eq!(rtx.revision_number(), revision);
        let node = rtx.node(text).unwrap().unwrap();
        assert_eq!(node.value(), Some(format!("v{revision}").as_str()));
    }
    let bootstrap = store.begin_read_at(0).unwrap();
    assert!(bootstrap.node(text).unwrap().is_none());
}

#[test]
fn test_file_store_reopen() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::default();
    let (books, root_hash) = {
        let store = Store::open_dir(dir.path(), config.clone()).unwrap();
        let books = build_catalog(&store, 20);
        let rtx = store.begin_read().unwrap();
        (books, rtx.node(NodeKey::DOCUMENT_ROOT).unwrap().unwrap().hash)
    };

    let store = Store::open_dir(dir.path(), config).unwrap();
    assert_eq!(store.latest_revision().unwrap(), 1);
    assert_eq!(store.last_committed_revision().unwrap(), Some(1));
    let rtx = store.begin_read().unwrap();
    assert_eq!(
        rtx.node(NodeKey::DOCUMENT_ROOT).unwrap().unwrap().hash,
        root_hash
    );
    let catalog = rtx.node(books[0]).unwrap().unwrap().parent.unwrap();
    assert_eq!(rtx.children(catalog).unwrap(), books);

    // Keys keep growing after a reopen.
    let mut wtx = store.begin_write().unwrap();
    assert!(wtx.move_to(books[19]).unwrap());
    let key = wtx
        .insert_element_as_right_sibling(QName::local("book"))
        .unwrap();
    assert_eq!(key.0, rtx.max_node_key().unwrap() + 1);
    assert_eq!(wtx.commit().unwrap(), 2);
}

#[test]
fn test_reopen_with_other_settings_fails() {
    let dir = tempdir().unwrap();
    drop(Store::open_dir(dir.path(), StoreConfig::default()).unwrap());

    let other = StoreConfig::default().with_hash_kind(HashKind::Postorder);
    assert!(matches!(
        Store::open_dir(dir.path(), other),
        Err(TrxError::ConfigMismatch(_))
    ));
}

#[test]
fn test_corrupted_page_is_detected() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open_dir(dir.path(), StoreConfig::default()).unwrap();
        build_catalog(&store, 2);
    }

    // The uber page is the last page written.
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(dir.path().join("pages.dat"))
        .unwrap();
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).unwrap();
    file.read_exact(&mut last).unwrap();
    file.seek(SeekFrom::End(-1)).unwrap();
    file.write_all(&[last[0] ^ 0xFF]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    match Store::open_dir(dir.path(), StoreConfig::default().with_page_cache_capacity(0)) {
        Err(TrxError::Page(err)) => assert!(err.is_corruption(), "{err}"),
        other => panic!("expected corruption, got {other:?}"),
    }
}

#[test]
fn test_abort_leaves_backend_untouched() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::open(backend.clone(), StoreConfig::default()).unwrap();
    build_catalog(&store, 5);
    let before = backend.contents();
    let root_before = backend.read_root().unwrap();

    let mut wtx = store.begin_write().unwrap();
    wtx.insert_text_as_first_child("pending").unwrap();
    wtx.set_meta("note", b"pending").unwrap();
    wtx.abort().unwrap();
    wtx.close().unwrap();

    assert_eq!(backend.contents(), before);
    assert_eq!(backend.read_root().unwrap(), root_before);
}

#[test]
fn test_empty_commit_writes_revision_path_only() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    build_catalog(&store, 1);
    let before = store.metrics();
    let mut wtx = store.begin_write().unwrap();
    wtx.commit().unwrap();
    let diff = store.metrics().diff(&before);
    // Uber page, revision root and five revision-tree indirect pages.
    assert_eq!(diff.pages_written, 7);
}

#[test]
fn test_single_insert_shares_untouched_pages() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let before = store.metrics();
    let mut wtx = store.begin_write().unwrap();
    wtx.insert_text_as_first_child("only").unwrap();
    wtx.commit().unwrap();
    let diff = store.metrics().diff(&before);
    assert_eq!(diff.pages_written, 13);
    assert_eq!(diff.revisions_committed, 1);
}

#[test]
fn test_concurrent_readers() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let mut wtx = store.begin_write().unwrap();
    let text = wtx.insert_text_as_first_child("r1").unwrap();
    wtx.commit().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let rtx = store.begin_read_at(1).unwrap();
                    assert_eq!(rtx.node(text).unwrap().unwrap().value(), Some("r1"));
                    let latest = store.begin_read().unwrap();
                    assert!(latest.revision_number() >= 1);
                    assert!(latest.node(text).unwrap().is_some());
                }
            })
        })
        .collect();

    for revision in 2..=20u64 {
        wtx.set_value(&format!("r{revision}")).unwrap();
        assert_eq!(wtx.commit().unwrap(), revision);
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(
        store.begin_read_at(20).unwrap().node(text).unwrap().unwrap().value(),
        Some("r20")
    );
}

#[test]
fn test_reader_outlives_newer_commits() {
    let store = Store::in_memory(StoreConfig::default()).unwrap();
    let mut wtx = store.begin_write().unwrap();
    let text = wtx.insert_text_as_first_child("before").unwrap();
    wtx.commit().unwrap();
    let rtx = store.begin_read().unwrap();

    wtx.remove().unwrap();
    wtx.commit().unwrap();

    assert_eq!(rtx.revision_number(), 1);
    assert_eq!(rtx.node(text).unwrap().unwrap().value(), Some("before"));
    assert!(store.begin_read().unwrap().is_removed(text).unwrap());
}

#[test]
fn test_backend_errors_surface() {
    let backend = MemoryBackend::new();
    assert!(matches!(
        backend.read(0, 16),
        Err(PageError::NotFound { storage_key: 0, length: 16 })
    ));
}
