//! Lifetime caching and scope teardown behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use wirebox_di::{
    AsyncDispose, DiError, DiResult, DisposalHook, Dispose, Lifetime, ServiceCollection,
};

struct Session {
    id: usize,
}

type DisposeLog = Arc<Mutex<Vec<&'static str>>>;

struct Tracked {
    name: &'static str,
    log: DisposeLog,
}

impl Dispose for Tracked {
    fn dispose(&self) -> DiResult<()> {
        self.log.lock().unwrap().push(self.name);
        Ok(())
    }
}

struct AsyncTracked {
    log: DisposeLog,
}

#[async_trait]
impl AsyncDispose for AsyncTracked {
    async fn dispose_async(&self) -> DiResult<()> {
        self.log.lock().unwrap().push("async");
        Ok(())
    }
}

struct DualTracked {
    log: DisposeLog,
}

impl Dispose for DualTracked {
    fn dispose(&self) -> DiResult<()> {
        self.log.lock().unwrap().push("sync");
        Ok(())
    }
}

#[async_trait]
impl AsyncDispose for DualTracked {
    async fn dispose_async(&self) -> DiResult<()> {
        self.log.lock().unwrap().push("async");
        Ok(())
    }
}

fn counting_collection(lifetime: Lifetime) -> (ServiceCollection, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let count = counter.clone();
    let mut services = ServiceCollection::new();
    services.add_factory(
        lifetime,
        move |_| {
            Ok(Arc::new(Session {
                id: count.fetch_add(1, Ordering::SeqCst),
            }))
        },
        DisposalHook::none(),
    );
    (services, counter)
}

#[test]
fn singleton_is_shared_across_scopes() {
    let (services, counter) = counting_collection(Lifetime::Singleton);
    let provider = services.build().unwrap();

    let at_root = provider.resolve_required::<Session>().unwrap();
    let scope_a = provider.create_scope().unwrap();
    let scope_b = provider.create_scope().unwrap();
    let in_a = scope_a.provider().resolve_required::<Session>().unwrap();
    let in_b = scope_b.provider().resolve_required::<Session>().unwrap();

    assert!(Arc::ptr_eq(&at_root, &in_a));
    assert!(Arc::ptr_eq(&at_root, &in_b));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn scoped_instances_are_per_scope() {
    let (services, counter) = counting_collection(Lifetime::Scoped);
    let provider = services.build().unwrap();

    let scope_a = provider.create_scope().unwrap();
    let scope_b = provider.create_scope().unwrap();
    let first = scope_a.provider().resolve_required::<Session>().unwrap();
    let again = scope_a.provider().resolve_required::<Session>().unwrap();
    let other = scope_b.provider().resolve_required::<Session>().unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn scoped_resolved_at_root_caches_in_the_root_scope() {
    let (services, counter) = counting_collection(Lifetime::Scoped);
    let provider = services.build().unwrap();

    let first = provider.resolve_required::<Session>().unwrap();
    let again = provider.resolve_required::<Session>().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn transient_is_fresh_on_every_resolution() {
    let (services, counter) = counting_collection(Lifetime::Transient);
    let provider = services.build().unwrap();

    let a = provider.resolve_required::<Session>().unwrap();
    let b = provider.resolve_required::<Session>().unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn singleton_materializes_exactly_once_under_contention() {
    let (services, counter) = {
        let counter = Arc::new(AtomicUsize::new(0));
        let count = counter.clone();
        let mut services = ServiceCollection::new();
        services.add_singleton(move |_| {
            // widen the race window
            thread::sleep(std::time::Duration::from_millis(10));
            Ok(Arc::new(Session {
                id: count.fetch_add(1, Ordering::SeqCst),
            }))
        });
        (services, counter)
    };
    let provider = services.build().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provider = provider.clone();
            thread::spawn(move || provider.resolve_required::<Session>().unwrap())
        })
        .collect();
    let resolved: Vec<Arc<Session>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    for session in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], session));
    }
}

#[test]
fn scope_disposal_runs_in_reverse_creation_order() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let provider = ServiceCollection::new().build().unwrap();
    let scope = provider.create_scope().unwrap();

    for name in ["first", "second", "third"] {
        let tracked = Arc::new(Tracked { name, log: log.clone() });
        scope.register_owned(tracked).unwrap();
    }
    scope.dispose().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
}

#[test]
fn dispose_is_idempotent() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let provider = ServiceCollection::new().build().unwrap();
    let scope = provider.create_scope().unwrap();
    scope
        .register_owned(Arc::new(Tracked { name: "only", log: log.clone() }))
        .unwrap();

    scope.dispose().unwrap();
    scope.dispose().unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
    assert!(scope.is_disposed());
}

#[test]
fn resolve_after_scope_disposal_fails() {
    let (services, _) = counting_collection(Lifetime::Scoped);
    let provider = services.build().unwrap();
    let scope = provider.create_scope().unwrap();
    let scoped = scope.provider();

    scope.dispose().unwrap();
    assert!(matches!(
        scoped.resolve::<Session>(),
        Err(DiError::AlreadyDisposed { .. })
    ));
}

#[test]
fn child_scope_creation_after_disposal_fails() {
    let provider = ServiceCollection::new().build().unwrap();
    let scope = provider.create_scope().unwrap();
    scope.dispose().unwrap();
    assert!(matches!(
        scope.create_scope(),
        Err(DiError::AlreadyDisposed { .. })
    ));
}

#[test]
fn transient_disposables_are_tracked_by_the_resolving_scope() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let source = log.clone();
    let mut services = ServiceCollection::new();
    services.add_factory(
        Lifetime::Transient,
        move |_| Ok(Arc::new(Tracked { name: "transient", log: source.clone() })),
        DisposalHook::sync::<Tracked>(),
    );
    let provider = services.build().unwrap();

    let scope = provider.create_scope().unwrap();
    scope.provider().resolve_required::<Tracked>().unwrap();
    scope.provider().resolve_required::<Tracked>().unwrap();
    scope.dispose().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["transient", "transient"]);
}

#[test]
fn singleton_disposable_outlives_the_resolving_scope() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let source = log.clone();
    let mut services = ServiceCollection::new();
    services.add_factory(
        Lifetime::Singleton,
        move |_| Ok(Arc::new(Tracked { name: "singleton", log: source.clone() })),
        DisposalHook::sync::<Tracked>(),
    );
    let provider = services.build().unwrap();

    let scope = provider.create_scope().unwrap();
    scope.provider().resolve_required::<Tracked>().unwrap();
    scope.dispose().unwrap();
    assert!(log.lock().unwrap().is_empty());

    provider.dispose().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["singleton"]);
}

#[test]
fn owned_instance_is_disposed_with_the_provider() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let mut services = ServiceCollection::new();
    services.add_owned_instance(Arc::new(Tracked { name: "owned", log: log.clone() }));
    let provider = services.build().unwrap();

    provider.dispose().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["owned"]);
}

#[test]
fn async_only_disposable_fails_the_sync_path_but_others_still_run() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let provider = ServiceCollection::new().build().unwrap();
    let scope = provider.create_scope().unwrap();
    scope
        .register_owned(Arc::new(Tracked { name: "sync", log: log.clone() }))
        .unwrap();
    scope
        .register_owned_async(Arc::new(AsyncTracked { log: log.clone() }))
        .unwrap();

    let result = scope.dispose();
    assert!(matches!(
        result,
        Err(DiError::AsyncDisposableOnSyncPath { .. })
    ));
    // the sync entry was still torn down
    assert_eq!(*log.lock().unwrap(), vec!["sync"]);
    assert!(scope.is_disposed());
}

#[tokio::test]
async fn async_disposal_prefers_the_async_capability() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let source = log.clone();
    let mut services = ServiceCollection::new();
    services.add_factory(
        Lifetime::Scoped,
        move |_| Ok(Arc::new(DualTracked { log: source.clone() })),
        DisposalHook::sync_and_async::<DualTracked>(),
    );
    let provider = services.build().unwrap();

    let scope = provider.create_scope().unwrap();
    scope.provider().resolve_required::<DualTracked>().unwrap();
    scope.dispose_async().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["async"]);
}

#[tokio::test]
async fn async_disposal_falls_back_to_sync_capability() {
    let log: DisposeLog = Arc::new(Mutex::new(Vec::new()));
    let provider = ServiceCollection::new().build().unwrap();
    let scope = provider.create_scope().unwrap();
    scope
        .register_owned(Arc::new(Tracked { name: "sync", log: log.clone() }))
        .unwrap();

    scope.dispose_async().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["sync"]);
}
