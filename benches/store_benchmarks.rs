//! Store and transaction benchmarks
//!
//! Run with: cargo bench --bench store_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use tempfile::tempdir;

use revtree_db::{HashKind, NodeKey, NodeReader, QName, Store, StoreConfig};

fn populated_store(config: StoreConfig, texts: usize) -> (Store, Vec<NodeKey>) {
    let store = Store::in_memory(config).unwrap();
    let keys = insert_texts(&store, texts);
    (store, keys)
}

fn insert_texts(store: &Store, texts: usize) -> Vec<NodeKey> {
    let mut wtx = store.begin_write().unwrap();
    let mut keys = Vec::with_capacity(texts);
    for i in 0..texts {
        let key = if i == 0 {
            wtx.insert_text_as_first_child("text 0").unwrap()
        } else {
            wtx.insert_text_as_right_sibling(&format!("text {i}")).unwrap()
        };
        keys.push(key);
    }
    wtx.commit().unwrap();
    wtx.close().unwrap();
    keys
}

/// Benchmark inserting siblings and committing
fn bench_insert_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("InsertCommit");
    group.sample_size(20);

    for size in [100usize, 1000, 5000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("in_memory", size), size, |b, &size| {
            b.iter(|| populated_store(StoreConfig::default(), size))
        });
    }

    group.bench_function("file_1000", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let config = StoreConfig::default().with_sync_on_commit(false);
            let store = Store::open_dir(dir.path(), config).unwrap();
            insert_texts(&store, 1000)
        })
    });

    group.finish();
}

/// Benchmark hash maintenance strategies on a deep chain
fn bench_hash_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("HashKinds");
    group.sample_size(20);

    for kind in [HashKind::None, HashKind::Rolling, HashKind::Postorder] {
        group.bench_function(BenchmarkId::new("deep_chain_64", kind), |b| {
            b.iter(|| {
                let store = Store::in_memory(StoreConfig::default().with_hash_kind(kind)).unwrap();
                let mut wtx = store.begin_write().unwrap();
                for depth in 0..64 {
                    wtx.insert_element_as_first_child(QName::local(format!("d{depth}")))
                        .unwrap();
                }
                wtx.commit().unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark small updates against a large committed revision
fn bench_update_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("UpdateCommit");
    let (store, keys) = populated_store(StoreConfig::default(), 10_000);
    let mut wtx = store.begin_write().unwrap();
    let mut rng = rand::thread_rng();

    group.bench_function("set_value_10_of_10000", |b| {
        b.iter(|| {
            for _ in 0..10 {
                let key = *keys.choose(&mut rng).unwrap();
                wtx.move_to(key).unwrap();
                wtx.set_value("updated").unwrap();
            }
            wtx.commit().unwrap()
        })
    });

    group.finish();
}

/// Benchmark random reads from a committed revision
fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reads");
    let (store, keys) = populated_store(StoreConfig::default(), 10_000);
    let mut rng = rand::thread_rng();
    let sample: Vec<NodeKey> = keys.choose_multiple(&mut rng, 1000).copied().collect();

    group.throughput(Throughput::Elements(sample.len() as u64));
    group.bench_function("random_node_1000", |b| {
        let rtx = store.begin_read().unwrap();
        b.iter(|| {
            for key in &sample {
                black_box(rtx.node(*key).unwrap());
            }
        })
    });

    group.bench_function("children_of_root", |b| {
        let rtx = store.begin_read().unwrap();
        b.iter(|| rtx.children(NodeKey::DOCUMENT_ROOT).unwrap().len())
    });

    group.bench_function("begin_read", |b| b.iter(|| store.begin_read().unwrap()));

    group.finish();
}

criterion_group!(
    store_benches,
    bench_insert_commit,
    bench_hash_kinds,
    bench_update_commit,
    bench_reads,
);

criterion_main!(store_benches);
