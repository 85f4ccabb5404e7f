//! Throughput benchmarks for Ember.
//!
//! These benchmarks measure the raw throughput of the registry, relay and
//! bridge.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ember_bench::{user, Fixture, NullSink};
use ember_core::{Action, ConnectionRegistry, EventRelay};
use ember_protocol::ServerEvent;
use ember_transport::ConnectionId;
use std::sync::Arc;

/// Benchmark registry operations.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("register", |b| {
        let registry = ConnectionRegistry::new();
        let mut i = 0usize;
        b.iter(|| {
            registry.register(user(i % 10_000), ConnectionId::new(format!("conn-{}", i)));
            i += 1;
        });
    });

    group.bench_function("lookup_hit", |b| {
        let registry = ConnectionRegistry::new();
        for i in 0..10_000 {
            registry.register(user(i), ConnectionId::new(format!("conn-{}", i)));
        }
        let target = user(4_242);
        b.iter(|| registry.lookup(black_box(&target)));
    });

    group.bench_function("lookup_miss", |b| {
        let registry = ConnectionRegistry::new();
        let target = user(1);
        b.iter(|| registry.lookup(black_box(&target)));
    });

    group.finish();
}

/// Benchmark relay delivery.
fn bench_relay(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay");
    let event = ServerEvent::NewMessage {
        from: user(0),
        message: "x".repeat(64),
    };

    group.bench_function("deliver_null_sink", |b| {
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register(user(1), ConnectionId::new("conn-1"));
        let relay = EventRelay::new(registry, Arc::new(NullSink));
        let target = user(1);
        b.iter(|| relay.deliver(black_box(&target), black_box(&event)));
    });

    group.bench_function("deliver_offline", |b| {
        let relay = EventRelay::new(Arc::new(ConnectionRegistry::new()), Arc::new(NullSink));
        let target = user(1);
        b.iter(|| relay.deliver(black_box(&target), black_box(&event)));
    });

    group.bench_function("deliver_hub", |b| {
        let mut fixture = Fixture::new(1);
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register(user(0), fixture.sessions[0].handle().clone());
        let relay = EventRelay::new(registry, fixture.hub.clone());
        let target = user(0);

        let mut sent = 0usize;
        b.iter(|| {
            relay.deliver(black_box(&target), black_box(&event));
            sent += 1;
            if sent % 1024 == 0 {
                fixture.drain();
            }
        });
    });

    group.finish();
}

/// Benchmark bridge notifications.
fn bench_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge");

    group.bench_function("mutual_like", |b| {
        let mut fixture = Fixture::new(2);
        let action = Action::ProfileLiked {
            from: user(0),
            from_name: Some("Ann".to_string()),
            to: user(1),
            to_name: Some("Bo".to_string()),
            mutual: true,
        };

        let mut sent = 0usize;
        b.iter(|| {
            fixture.realtime.bridge().notify(black_box(&action));
            sent += 1;
            if sent % 1024 == 0 {
                fixture.drain();
            }
        });
    });

    group.finish();
}

/// Benchmark notifying many distinct users.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut fixture = Fixture::new(size);
            let actions: Vec<Action> = (0..size)
                .map(|n| Action::MessageSent {
                    from: user(size),
                    to: user(n),
                    message: "hi".to_string(),
                })
                .collect();

            b.iter(|| {
                for action in &actions {
                    fixture.realtime.bridge().notify(black_box(action));
                }
                fixture.drain();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registry, bench_relay, bench_bridge, bench_fanout);
criterion_main!(benches);
