//! Performance benchmarks for revtree_db building blocks
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use revtree_db::data::{DefaultNodeFactory, KeyLayout, Node, NodeKey, Payload, Structure};
use revtree_db::hash::{keccak256, self_hash, subtree_hash};
use revtree_db::store::{NodePage, Page, PageCodec};

/// Generate random bytes
fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

fn text_node(key: u64, value: String) -> Node {
    Node::new(
        NodeKey(key),
        Some(NodeKey::DOCUMENT_ROOT),
        Payload::Text {
            structure: Structure {
                left_sibling: key.checked_sub(1).map(NodeKey),
                right_sibling: Some(NodeKey(key + 1)),
                ..Structure::default()
            },
            value,
        },
    )
}

/// Benchmark key path computation
fn bench_key_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("KeyLayout");
    let layout = KeyLayout::node_default();
    let mut rng = rand::thread_rng();
    let keys: Vec<u64> = (0..1000).map(|_| rng.gen_range(0..layout.max_key())).collect();

    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("path_1000", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(layout.path(black_box(*key)).ok());
            }
        })
    });

    group.bench_function("page_key", |b| {
        b.iter(|| layout.page_key(black_box(123_456_789)))
    });

    group.finish();
}

/// Benchmark hashing
fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Hashing");

    for size in [32, 256, 4096].iter() {
        let data = random_bytes(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("keccak256", size), &data, |b, data| {
            b.iter(|| keccak256(black_box(data)))
        });
    }

    let node = text_node(42, "some text value".to_string());
    group.bench_function("self_hash_text", |b| b.iter(|| self_hash(black_box(&node))));

    let children: Vec<u64> = (0..128).map(|_| rand::random()).collect();
    group.bench_function("subtree_hash_128", |b| {
        b.iter(|| subtree_hash(black_box(7), children.iter().copied()))
    });

    group.finish();
}

/// Benchmark node page encoding
fn bench_page_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("PageCodec");
    let codec = PageCodec::new(Arc::new(DefaultNodeFactory));

    for fill in [16usize, 64, 128].iter() {
        let mut page = NodePage::new(0, 128);
        for slot in 0..*fill {
            page.set(slot, text_node(slot as u64 + 1, format!("text {slot}")))
                .unwrap();
        }
        let page = Page::Node(page);
        let bytes = codec.encode(&page).unwrap();

        group.throughput(Throughput::Elements(*fill as u64));
        group.bench_with_input(BenchmarkId::new("encode", fill), &page, |b, page| {
            b.iter(|| codec.encode(black_box(page)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", fill), &bytes, |b, bytes| {
            b.iter(|| codec.decode(black_box(bytes)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_layout, bench_hashing, bench_page_codec);

criterion_main!(benches);
