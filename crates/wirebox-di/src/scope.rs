//! Scopes: lifetime boundaries with per-scope caches and deterministic
//! teardown of owned disposables.

use std::any::TypeId;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::descriptor::AnyInstance;
use crate::dispose::{AsyncDispose, DisposalHook, Dispose, DisposeEntry};
use crate::engine::Engine;
use crate::error::{DiError, DiResult};
use crate::provider::ScopedProvider;

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

pub(crate) struct ScopeInner {
    pub(crate) engine: Arc<Engine>,
    /// Keeps the chain up to the root alive; never read directly.
    #[allow(dead_code)]
    parent: Option<Arc<ScopeInner>>,
    root: Weak<ScopeInner>,
    cache: DashMap<(TypeId, usize), Arc<OnceCell<AnyInstance>>>,
    /// Secondary cache for named registries: (contract type, name).
    named: DashMap<(TypeId, String), Arc<OnceCell<AnyInstance>>>,
    disposables: Mutex<Vec<DisposeEntry>>,
    state: AtomicU8,
    is_root: bool,
}

impl ScopeInner {
    pub(crate) fn new_root(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            engine,
            parent: None,
            root: weak.clone(),
            cache: DashMap::new(),
            named: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
            state: AtomicU8::new(ACTIVE),
            is_root: true,
        })
    }

    pub(crate) fn new_child(parent: &Arc<ScopeInner>) -> DiResult<Arc<Self>> {
        parent.ensure_active()?;
        debug!("Created child scope");
        Ok(Arc::new(Self {
            engine: parent.engine.clone(),
            root: parent.root.clone(),
            parent: Some(parent.clone()),
            cache: DashMap::new(),
            named: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
            state: AtomicU8::new(ACTIVE),
            is_root: false,
        }))
    }

    pub(crate) fn root_arc(&self) -> Arc<ScopeInner> {
        // a live scope always holds its parent chain, which owns the root
        self.root.upgrade().expect("root scope outlives descendants")
    }

    pub(crate) fn ensure_active(&self) -> DiResult<()> {
        if self.state.load(Ordering::SeqCst) == ACTIVE {
            Ok(())
        } else {
            Err(DiError::AlreadyDisposed {
                context: if self.is_root { "service provider" } else { "scope" }.to_string(),
            })
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state.load(Ordering::SeqCst) != ACTIVE
    }

    pub(crate) fn cache_cell(&self, type_id: TypeId, slot: usize) -> Arc<OnceCell<AnyInstance>> {
        self.cache
            .entry((type_id, slot))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub(crate) fn named_cell(&self, type_id: TypeId, name: &str) -> Arc<OnceCell<AnyInstance>> {
        self.named
            .entry((type_id, name.to_string()))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Capture a produced value for teardown if its hook bites.
    pub(crate) fn track(&self, hook: &DisposalHook, type_name: &'static str, value: &AnyInstance) {
        if let Some(entry) = hook.capture(type_name, value) {
            self.disposables.lock().unwrap().push(entry);
        }
    }

    pub(crate) fn push_entry(&self, entry: DisposeEntry) {
        self.disposables.lock().unwrap().push(entry);
    }

    fn take_entries(&self) -> Vec<DisposeEntry> {
        let mut guard = self.disposables.lock().unwrap();
        guard.drain(..).collect()
    }

    /// Synchronous teardown, reverse capture order. Async-only entries make
    /// the call fail, but the remaining entries are still drained first.
    pub(crate) fn dispose_sync(&self) -> DiResult<()> {
        if self
            .state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // second disposal is a no-op
            return Ok(());
        }
        let mut first_err = None;
        for entry in self.take_entries().into_iter().rev() {
            match (&entry.sync, &entry.async_) {
                (Some(disposable), _) => {
                    if let Err(err) = disposable.dispose() {
                        warn!("Disposal of {} failed: {}", entry.type_name, err);
                        first_err.get_or_insert(err);
                    }
                }
                (None, Some(_)) => {
                    warn!(
                        "{} only supports asynchronous disposal; synchronous teardown requested",
                        entry.type_name
                    );
                    first_err.get_or_insert(DiError::AsyncDisposableOnSyncPath {
                        service_type: entry.type_name.to_string(),
                    });
                }
                (None, None) => {}
            }
        }
        self.state.store(DISPOSED, Ordering::SeqCst);
        debug!("Scope disposed");
        first_err.map_or(Ok(()), Err)
    }

    /// Asynchronous teardown, reverse capture order, sync fallback for
    /// entries without an async capability.
    pub(crate) async fn dispose_async_inner(&self) -> DiResult<()> {
        if self
            .state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let mut first_err = None;
        for entry in self.take_entries().into_iter().rev() {
            let result = match (&entry.sync, &entry.async_) {
                (_, Some(disposable)) => disposable.dispose_async().await,
                (Some(disposable), None) => disposable.dispose(),
                (None, None) => Ok(()),
            };
            if let Err(err) = result {
                warn!("Disposal of {} failed: {}", entry.type_name, err);
                first_err.get_or_insert(err);
            }
        }
        self.state.store(DISPOSED, Ordering::SeqCst);
        debug!("Scope disposed (async)");
        first_err.map_or(Ok(()), Err)
    }
}

/// A disposal boundary. Holds a per-scope instance cache and the disposables
/// created within it; teardown runs in reverse creation order exactly once.
pub struct ServiceScope {
    inner: Arc<ScopeInner>,
}

impl ServiceScope {
    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// The scope-bound resolver.
    pub fn provider(&self) -> ScopedProvider {
        ScopedProvider::new(self.inner.clone())
    }

    /// Create a child scope whose parent chain reaches the root.
    pub fn create_scope(&self) -> DiResult<ServiceScope> {
        Ok(ServiceScope::from_inner(ScopeInner::new_child(&self.inner)?))
    }

    /// Explicitly hand an instance's teardown to this scope.
    pub fn register_owned<T: Dispose + 'static>(&self, instance: Arc<T>) -> DiResult<()> {
        self.inner.ensure_active()?;
        self.inner.push_entry(DisposeEntry {
            type_name: std::any::type_name::<T>(),
            sync: Some(instance as Arc<dyn Dispose>),
            async_: None,
        });
        Ok(())
    }

    /// As [`ServiceScope::register_owned`] for async-only teardown.
    pub fn register_owned_async<T: AsyncDispose + 'static>(&self, instance: Arc<T>) -> DiResult<()> {
        self.inner.ensure_active()?;
        self.inner.push_entry(DisposeEntry {
            type_name: std::any::type_name::<T>(),
            sync: None,
            async_: Some(instance as Arc<dyn AsyncDispose>),
        });
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn dispose(&self) -> DiResult<()> {
        self.inner.dispose_sync()
    }

    pub async fn dispose_async(&self) -> DiResult<()> {
        self.inner.dispose_async_inner().await
    }
}

/// Creates fresh scopes off the root. Resolvable through the container so
/// factories can spin up scopes without holding the provider itself.
#[derive(Clone)]
pub struct ScopeFactory {
    root: Arc<ScopeInner>,
}

impl ScopeFactory {
    pub(crate) fn new(root: Arc<ScopeInner>) -> Self {
        Self { root }
    }

    pub fn create_scope(&self) -> DiResult<ServiceScope> {
        Ok(ServiceScope::from_inner(ScopeInner::new_child(&self.root)?))
    }
}
