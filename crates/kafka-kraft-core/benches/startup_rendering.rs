//! Performance benchmarks for listener planning and startup script rendering.
//!
//! Measures the pure configuration pipeline and a full bootstrap against the
//! in-memory runtime.

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kafka_kraft_core::cluster::{ClusterIdentity, NodeRole};
use kafka_kraft_core::listener::{AdvertisedAddress, KafkaListener, ListenerPlan, ReservedListeners};
use kafka_kraft_core::script::StartupScript;
use kafka_kraft_core::testing::BootstrapHarness;
use kafka_kraft_core::RunOptions;

/// Create `count` user listeners on distinct ports.
fn listeners(count: u16) -> Vec<KafkaListener> {
    (0..count)
        .map(|i| KafkaListener::new(format!("external_{i}"), format!("host-{i}"), (19092 + i).to_string()))
        .collect()
}

fn address() -> AdvertisedAddress {
    AdvertisedAddress {
        host: "localhost".to_string(),
        mapped_port: 49153,
        hostname: "c0ffee123456".to_string(),
    }
}

/// Benchmark listener validation and plan building.
fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");
    let reserved = ReservedListeners::kraft_defaults();
    let aliases = vec!["kafka".to_string()];

    for count in [0, 1, 10, 100] {
        let input = listeners(count);
        group.throughput(Throughput::Elements(u64::from(count.max(1))));
        group.bench_with_input(BenchmarkId::new("listeners", count), &input, |b, l| {
            b.iter(|| black_box(ListenerPlan::build(l, &reserved, &aliases).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark startup script rendering.
fn bench_script_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_render");
    let reserved = ReservedListeners::kraft_defaults();
    let identity = ClusterIdentity::new("kraftCluster", NodeRole::Combined).unwrap();
    let address = address();
    let extra = BTreeMap::from([("auto.create.topics.enable".to_string(), "true".to_string())]);

    for count in [0, 10, 100] {
        let plan = ListenerPlan::build(&listeners(count), &reserved, &[]).unwrap();
        group.bench_with_input(BenchmarkId::new("listeners", count), &plan, |b, p| {
            b.iter(|| black_box(StartupScript::render(p, &identity, &address, &extra)));
        });
    }

    group.finish();
}

/// Benchmark a full run against the in-memory runtime.
fn bench_mock_bootstrap(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let harness = BootstrapHarness::new();

    c.bench_function("mock_bootstrap", |b| {
        b.to_async(&rt).iter(|| async {
            let container = harness.run(RunOptions::default()).await.unwrap();
            container.terminate().await.unwrap();
            harness.runtime.clear_calls().await;
        });
    });
}

criterion_group!(
    benches,
    bench_plan_build,
    bench_script_render,
    bench_mock_bootstrap,
);
criterion_main!(benches);
