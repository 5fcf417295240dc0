//! Property-based tests for registration ordering, caching and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use wirebox_di::{DiResult, Dispose, ServiceCollection};

struct Tag(u32);

struct Numbered {
    index: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl Dispose for Numbered {
    fn dispose(&self) -> DiResult<()> {
        self.log.lock().unwrap().push(self.index);
        Ok(())
    }
}

proptest! {
    #[test]
    fn resolve_all_preserves_registration_order(
        values in proptest::collection::vec(any::<u32>(), 0..16)
    ) {
        let mut services = ServiceCollection::new();
        for value in &values {
            services.add_instance(Arc::new(Tag(*value)));
        }
        let provider = services.build().unwrap();
        let resolved: Vec<u32> = provider
            .resolve_all::<Tag>()
            .unwrap()
            .iter()
            .map(|t| t.0)
            .collect();
        prop_assert_eq!(resolved, values);
    }

    #[test]
    fn single_resolution_always_sees_the_last_registration(
        values in proptest::collection::vec(any::<u32>(), 1..16)
    ) {
        let mut services = ServiceCollection::new();
        for value in &values {
            services.add_instance(Arc::new(Tag(*value)));
        }
        let provider = services.build().unwrap();
        let resolved = provider.resolve_required::<Tag>().unwrap();
        prop_assert_eq!(resolved.0, *values.last().unwrap());
    }

    #[test]
    fn scope_teardown_is_always_lifo(count in 1usize..12) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let provider = ServiceCollection::new().build().unwrap();
        let scope = provider.create_scope().unwrap();
        for index in 0..count {
            scope
                .register_owned(Arc::new(Numbered { index, log: log.clone() }))
                .unwrap();
        }
        scope.dispose().unwrap();

        let order = log.lock().unwrap().clone();
        let expected: Vec<usize> = (0..count).rev().collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn transient_factory_runs_once_per_resolution(count in 0usize..24) {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        let mut services = ServiceCollection::new();
        services.add_transient(move |_| {
            source.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Tag(0)))
        });
        let provider = services.build().unwrap();
        for _ in 0..count {
            provider.resolve_required::<Tag>().unwrap();
        }
        prop_assert_eq!(counter.load(Ordering::SeqCst), count);
    }

    #[test]
    fn singleton_factory_runs_exactly_once(count in 1usize..24) {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        let mut services = ServiceCollection::new();
        services.add_singleton(move |_| {
            source.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Tag(9)))
        });
        let provider = services.build().unwrap();
        let first = provider.resolve_required::<Tag>().unwrap();
        for _ in 1..count {
            let again = provider.resolve_required::<Tag>().unwrap();
            prop_assert!(Arc::ptr_eq(&first, &again));
        }
        prop_assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
