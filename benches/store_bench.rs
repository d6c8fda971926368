//! REMNANT - Performance Benchmarks
//! Measures throughput of core store operations using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use remnant::config::Config;
use remnant::document::Document;
use remnant::store::encoded_path::encode_path;
use remnant::store::{Query, RemoteDocumentStore};
use remnant::types::{DocumentKey, FieldValue, ObjectValue, ReadTime, ResourcePath};

fn sample_doc(path: &str, i: i64) -> Document {
    let mut data = ObjectValue::new();
    data.insert("index".to_string(), FieldValue::Integer(i));
    data.insert("title".to_string(), FieldValue::String(format!("title_{:06}", i)));
    let key: DocumentKey = path.parse().unwrap();
    Document::found(key, ReadTime::new(1, 0).unwrap(), data)
}

fn populated_store(dir: &std::path::Path, rows: i64) -> RemoteDocumentStore {
    let config = Config::new(dir).with_sync_writes(false);
    let store = RemoteDocumentStore::open(config).unwrap();
    for i in 0..rows {
        let doc = sample_doc(&format!("rooms/{:06}", i), i);
        store.add(&doc, ReadTime::new(1 + i, 0).unwrap()).unwrap();
    }
    store
}

fn bench_key_encoding(c: &mut Criterion) {
    let path: ResourcePath = "rooms/123456/messages/abcdef".parse().unwrap();
    c.bench_function("encode_path", |b| {
        b.iter(|| black_box(encode_path(black_box(&path))));
    });
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(dir.path(), 1000);

    // Benchmark: Point lookups
    group.bench_function("get_hit", |b| {
        let key: DocumentKey = "rooms/000500".parse().unwrap();
        b.iter(|| black_box(store.get(&key).unwrap()));
    });

    group.bench_function("get_miss", |b| {
        let key: DocumentKey = "rooms/missing".parse().unwrap();
        b.iter(|| black_box(store.get(&key).unwrap()));
    });

    // Benchmark: Batched lookup across one collection
    group.bench_function("get_all_50", |b| {
        let keys: Vec<DocumentKey> = (0..50)
            .map(|i| format!("rooms/{:06}", i * 20).parse().unwrap())
            .collect();
        b.iter(|| black_box(store.get_all(&keys).unwrap()));
    });

    group.bench_function("latest_read_time", |b| {
        b.iter(|| black_box(store.get_latest_read_time().unwrap()));
    });

    group.finish();
}

fn bench_collection_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.sample_size(20);

    for workers in [1usize, 4] {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path())
            .with_sync_writes(false)
            .with_decode_workers(workers)
            .with_parallel_decode_threshold(if workers == 1 { usize::MAX } else { 32 });
        let store = RemoteDocumentStore::open(config).unwrap();
        for i in 0..2000 {
            let doc = sample_doc(&format!("rooms/{:06}", i), i);
            store.add(&doc, ReadTime::new(1 + i, 0).unwrap()).unwrap();
        }
        let query = Query::collection("rooms".parse().unwrap()).unwrap();

        group.bench_with_input(BenchmarkId::new("full_2000", workers), &workers, |b, _| {
            b.iter(|| black_box(store.get_all_matching_query(&query, ReadTime::NONE).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_encoding,
    bench_store_operations,
    bench_collection_scan
);
criterion_main!(benches);
