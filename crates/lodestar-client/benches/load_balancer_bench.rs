// Criterion benchmarks for lodestar-client
//
// Run benchmarks with:
//   cargo bench -p lodestar-client
//
// For detailed output with plots:
//   cargo bench -p lodestar-client -- --save-baseline main

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lodestar_client::{Correlator, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer};
use lodestar_common::{generate_call_id, RpcResponse, ServiceInstance};
use serde_json::json;

fn instances(n: usize) -> Vec<ServiceInstance> {
    (0..n)
        .map(|i| ServiceInstance::new("Echo", format!("host{}", i), 9000 + i as u16))
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for size in [2, 10, 50] {
        let list = instances(size);

        let round_robin = RoundRobinLoadBalancer::new();
        group.bench_with_input(BenchmarkId::new("round_robin", size), &list, |b, list| {
            b.iter(|| round_robin.select(black_box(list)).map(|i| i.port))
        });

        let random = RandomLoadBalancer::new();
        group.bench_with_input(BenchmarkId::new("random", size), &list, |b, list| {
            b.iter(|| random.select(black_box(list)).map(|i| i.port))
        });
    }

    group.finish();
}

fn bench_correlator(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlator");
    let correlator = Correlator::new();

    group.bench_function("register_complete", |b| {
        b.iter(|| {
            let id = generate_call_id();
            let mut handle = correlator
                .register(id, "Echo", "echo", Duration::from_secs(5))
                .unwrap();
            correlator.complete(id, RpcResponse::success(id, json!(1)));
            black_box(handle.try_take())
        })
    });

    group.bench_function("register_drop", |b| {
        b.iter(|| {
            let handle = correlator
                .register(generate_call_id(), "Echo", "echo", Duration::from_secs(5))
                .unwrap();
            drop(black_box(handle))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_select, bench_correlator);
criterion_main!(benches);
