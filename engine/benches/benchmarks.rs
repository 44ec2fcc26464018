//! Performance benchmarks for tandem-engine

use chrono::Duration;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tandem_engine::{
    epoch, ChangeLog, ChangeOperation, ConflictDetection, MemoryAdapter, Record, SyncEngine,
    SyncPayload, VersionVector,
};

fn vector_with(devices: usize, offset: u64) -> VersionVector {
    (0..devices)
        .map(|i| (format!("device-{}", i), i as u64 + offset))
        .collect()
}

fn bench_version_vectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_vectors");

    for devices in [4usize, 64, 512] {
        let older = vector_with(devices, 1);
        let newer = vector_with(devices, 2);

        group.bench_with_input(BenchmarkId::new("is_successor", devices), &devices, |b, _| {
            b.iter(|| black_box(&newer).is_successor(black_box(&older)))
        });

        group.bench_with_input(BenchmarkId::new("merge", devices), &devices, |b, _| {
            b.iter(|| black_box(&older).merged(black_box(&newer)))
        });
    }

    group.finish();
}

fn bench_change_log(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_log");

    // Distinct records never prune
    group.bench_function("append_distinct", |b| {
        let mut log = ChangeLog::new();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            log.append(format!("r{}", i), "device-a", epoch(), ChangeOperation::Create)
        })
    });

    // A single hot record prunes on every append
    group.bench_function("append_hot_record", |b| {
        let mut log = ChangeLog::new();
        b.iter(|| log.append("hot", "device-a", epoch(), ChangeOperation::Update))
    });

    for size in [100usize, 1000, 10000] {
        let mut log = ChangeLog::new();
        for i in 0..size {
            let device = if i % 2 == 0 { "device-a" } else { "device-b" };
            log.append(format!("r{}", i), device, epoch(), ChangeOperation::Create);
        }

        group.bench_with_input(BenchmarkId::new("changed_ids_since", size), &size, |b, _| {
            b.iter(|| log.changed_ids_since(black_box(epoch()), black_box("device-a")))
        });
    }

    group.finish();
}

fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for mode in [ConflictDetection::Timestamp, ConflictDetection::VersionVector] {
        let engine = SyncEngine::new(MemoryAdapter::builder().conflict_detection(mode).build());
        let mut tick = 0i64;

        group.bench_function(format!("apply_changes_{:?}", mode), |b| {
            b.to_async(&rt).iter(|| {
                tick += 1;
                let records: Vec<Record> = (0..50)
                    .map(|i| {
                        Record::new(format!("r{}", i), "item", json!({ "tick": tick }))
                            .updated_at(epoch() + Duration::seconds(tick))
                    })
                    .collect();
                let payload = SyncPayload::new("device-a", epoch()).with_records(records);
                let engine = &engine;
                async move { engine.apply_changes(payload).await }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_version_vectors, bench_change_log, bench_sync);
criterion_main!(benches);
