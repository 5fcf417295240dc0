//! Performance benchmarks for the resolution engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use wirebox_di::{DiResult, Lifetime, ServiceCollection, ServiceProvider};

/// Simple test service for benchmarking
#[derive(Debug, Clone)]
struct TestService {
    id: u32,
    data: Vec<u8>,
}

impl TestService {
    fn new(id: u32) -> Self {
        Self {
            id,
            data: vec![0; 1024], // 1KB of data
        }
    }
}

struct Wrapper {
    inner: Arc<TestService>,
}

fn provider_with(lifetime: Lifetime) -> ServiceProvider {
    let mut services = ServiceCollection::new();
    services.add_factory(
        lifetime,
        |_| Ok(Arc::new(TestService::new(42))),
        wirebox_di::DisposalHook::none(),
    );
    services.build().unwrap()
}

fn benchmark_registration(c: &mut Criterion) {
    c.bench_function("register_singleton_factory", |b| {
        b.iter(|| {
            let mut services = ServiceCollection::new();
            services.add_singleton(|_| Ok(Arc::new(TestService::new(black_box(42)))));
            black_box(services.len())
        })
    });

    c.bench_function("build_provider_with_ten_registrations", |b| {
        b.iter(|| {
            let mut services = ServiceCollection::new();
            for id in 0..10u32 {
                services.add_transient(move |_| Ok(Arc::new(TestService::new(black_box(id)))));
            }
            black_box(services.build())
        })
    });
}

fn benchmark_resolution(c: &mut Criterion) {
    c.bench_function("resolve_singleton", |b| {
        let provider = provider_with(Lifetime::Singleton);
        // warm the cache so the steady state is measured
        provider.resolve_required::<TestService>().unwrap();
        b.iter(|| {
            let result: DiResult<Arc<TestService>> = provider.resolve_required();
            black_box(result)
        })
    });

    c.bench_function("resolve_transient", |b| {
        let provider = provider_with(Lifetime::Transient);
        b.iter(|| {
            let result: DiResult<Arc<TestService>> = provider.resolve_required();
            black_box(result)
        })
    });

    c.bench_function("resolve_scoped_in_scope", |b| {
        let provider = provider_with(Lifetime::Scoped);
        let scope = provider.create_scope().unwrap();
        let scoped = scope.provider();
        b.iter(|| {
            let result: DiResult<Arc<TestService>> = scoped.resolve_required();
            black_box(result)
        })
    });

    c.bench_function("resolve_constructed_dependency_chain", |b| {
        let mut services = ServiceCollection::new();
        services.add_singleton(|_| Ok(Arc::new(TestService::new(7))));
        services.add_constructed(Lifetime::Transient, |(inner,): (Arc<TestService>,)| {
            Ok(Wrapper { inner })
        });
        let provider = services.build().unwrap();
        b.iter(|| {
            let result: DiResult<Arc<Wrapper>> = provider.resolve_required();
            black_box(result.map(|w| w.inner.id))
        })
    });
}

fn benchmark_scope_operations(c: &mut Criterion) {
    c.bench_function("create_and_dispose_scope", |b| {
        let provider = provider_with(Lifetime::Scoped);
        b.iter(|| {
            let scope = provider.create_scope().unwrap();
            scope.provider().resolve_required::<TestService>().unwrap();
            black_box(scope.dispose())
        })
    });

    c.bench_function("resolve_all_of_five", |b| {
        let mut services = ServiceCollection::new();
        for id in 0..5u32 {
            services.add_transient(move |_| Ok(Arc::new(TestService::new(id))));
        }
        let provider = services.build().unwrap();
        b.iter(|| {
            let result = provider.resolve_all::<TestService>();
            black_box(result.map(|v| v.len()))
        })
    });
}

criterion_group!(
    benches,
    benchmark_registration,
    benchmark_resolution,
    benchmark_scope_operations
);
criterion_main!(benches);
