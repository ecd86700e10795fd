use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use escore_core::{AggregateId, CommitId, InstanceId};
use escore_events::{Event, EventCommitRequest, Payload};
use escore_infra::adapter::{Adapter, InMemoryAdapter};
use escore_infra::{ReadView, WriteCoordinator};

fn commit_request(id: String) -> EventCommitRequest {
    EventCommitRequest::new(
        CommitId::new(id).unwrap(),
        "Cmd",
        vec![Event::new("e", "Updated", Payload::json(serde_json::json!({"delta": 1})))],
        Utc::now(),
    )
    .unwrap()
}

/// A single writer appending to the same instance back to back: the cost of
/// the full lease/idempotency/finalize algorithm with no contention.
fn bench_serial_write_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("serial_write_latency");
    group.sample_size(200);

    group.bench_function("write_next_version", |b| {
        let adapter: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new());
        let coordinator = WriteCoordinator::new(adapter);
        rt.block_on(coordinator.ensure_indexes()).unwrap();
        let agg = AggregateId::new("bench-agg").unwrap();
        let inst = InstanceId::new("bench-inst").unwrap();
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            rt.block_on(coordinator.write(
                agg.clone(),
                inst.clone(),
                black_box(commit_request(format!("serial-{counter}"))),
            ))
            .unwrap();
        });
    });
}

/// N concurrent writers racing for the same instance's next version: the
/// cost of the lease-contention path (spec.md scenario S4).
fn bench_concurrent_write_contention(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_write_contention");
    group.throughput(Throughput::Elements(1));

    for writers in [2, 4, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::new("writers", writers), writers, |b, &writers| {
            b.iter(|| {
                let adapter: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new());
                let coordinator = Arc::new(WriteCoordinator::new(adapter));
                rt.block_on(coordinator.ensure_indexes()).unwrap();
                let agg = AggregateId::new("bench-agg").unwrap();
                let inst = InstanceId::new("bench-inst").unwrap();

                rt.block_on(async {
                    let mut handles = Vec::with_capacity(writers);
                    for i in 0..writers {
                        let coordinator = coordinator.clone();
                        let agg = agg.clone();
                        let inst = inst.clone();
                        handles.push(tokio::spawn(async move {
                            coordinator
                                .write(agg, inst, commit_request(format!("concurrent-{i}")))
                                .await
                                .unwrap()
                        }));
                    }
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                });
            });
        });
    }
    group.finish();
}

/// Reading back a growing commit log (spec.md §4.D `ReadAll`).
fn bench_read_all_by_log_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("read_all_by_log_size");

    for commit_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("read_all", commit_count),
            commit_count,
            |b, &count| {
                let adapter: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new());
                let coordinator = WriteCoordinator::new(adapter.clone());
                rt.block_on(coordinator.ensure_indexes()).unwrap();
                let agg = AggregateId::new("bench-agg").unwrap();
                let inst = InstanceId::new("bench-inst").unwrap();

                rt.block_on(async {
                    for i in 0..count {
                        coordinator
                            .write(agg.clone(), inst.clone(), commit_request(format!("seed-{i}")))
                            .await
                            .unwrap();
                    }
                });

                let read = ReadView::new(adapter, agg, inst);
                b.iter(|| {
                    black_box(rt.block_on(read.read_all()).unwrap());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_serial_write_latency,
    bench_concurrent_write_contention,
    bench_read_all_by_log_size
);
criterion_main!(benches);
