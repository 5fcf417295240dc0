//! The public resolution surface: root provider, scoped provider and the
//! in-factory resolver.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::descriptor::{
    downcast, AnyInstance, Lifetime, ServiceDescriptor, ServiceKey, ServiceSource,
};
use crate::dispose::DisposalHook;
use crate::engine::{Engine, ResolveContext};
use crate::error::{DiError, DiResult};
use crate::scope::{ScopeInner, ServiceScope};

/// Type-erased resolution, the seam layered containers hang off.
pub trait DynResolve {
    /// Resolve the last-wins registration for `key`, if any.
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>>;
}

/// The resolver handed to factory closures. Borrows the ambient scope and the
/// in-flight traversal chain, so factory-driven lookups stay cycle-checked
/// and cache against the right scope.
pub struct Resolver<'a> {
    scope: &'a Arc<ScopeInner>,
    ctx: &'a ResolveContext,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(scope: &'a Arc<ScopeInner>, ctx: &'a ResolveContext) -> Self {
        Self { scope, ctx }
    }

    /// Resolve `T`, or `None` when unregistered.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self
            .scope
            .engine
            .resolve_key(self.scope, ServiceKey::of::<T>(), self.ctx)?
        {
            Some(value) => downcast::<T>(value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve `T`, failing when unregistered.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>()?.ok_or_else(|| DiError::ServiceNotRegistered {
            service_type: std::any::type_name::<T>().to_string(),
        })
    }

    /// Resolve every registration of `T`, in registration order.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.scope
            .engine
            .resolve_all_key(self.scope, ServiceKey::of::<T>(), self.ctx)?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// A detachable provider handle bound to the same scope.
    pub fn provider(&self) -> ScopedProvider {
        ScopedProvider::new(self.scope.clone())
    }
}

impl DynResolve for Resolver<'_> {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>> {
        self.scope.engine.resolve_key(self.scope, *key, self.ctx)
    }
}

/// A provider handle bound to one scope. Cheap to clone; scoped services
/// resolved through it cache in (and dispose with) that scope.
#[derive(Clone)]
pub struct ScopedProvider {
    scope: Arc<ScopeInner>,
}

impl ScopedProvider {
    pub(crate) fn new(scope: Arc<ScopeInner>) -> Self {
        Self { scope }
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        let ctx = ResolveContext::new();
        match self
            .scope
            .engine
            .resolve_key(&self.scope, ServiceKey::of::<T>(), &ctx)?
        {
            Some(value) => downcast::<T>(value).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>()?.ok_or_else(|| DiError::ServiceNotRegistered {
            service_type: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let ctx = ResolveContext::new();
        self.scope
            .engine
            .resolve_all_key(&self.scope, ServiceKey::of::<T>(), &ctx)?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// Create a child scope of this provider's scope.
    pub fn create_scope(&self) -> DiResult<ServiceScope> {
        Ok(ServiceScope::from_inner(ScopeInner::new_child(&self.scope)?))
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    /// Cache-or-produce seam for registry layers that key instances by a name
    /// on top of the contract type. `lifetime` picks the owning scope (root
    /// for singletons), exactly-once per (scope, type, name); transients skip
    /// the cache but still honor the disposal hook.
    pub fn resolve_keyed_with(
        &self,
        key: ServiceKey,
        name: &str,
        lifetime: Lifetime,
        disposal: &DisposalHook,
        produce: &dyn Fn(&Resolver<'_>) -> DiResult<AnyInstance>,
    ) -> DiResult<AnyInstance> {
        self.scope.ensure_active()?;
        let ctx = ResolveContext::new();
        let owner = match lifetime {
            Lifetime::Singleton => self.scope.root_arc(),
            Lifetime::Scoped | Lifetime::Transient => self.scope.clone(),
        };
        if lifetime == Lifetime::Transient {
            let resolver = Resolver::new(&owner, &ctx);
            let value = produce(&resolver)?;
            owner.track(disposal, key.type_name, &value);
            return Ok(value);
        }
        owner.ensure_active()?;
        let cell: Arc<OnceCell<AnyInstance>> = owner.named_cell(key.type_id, name);
        let value = cell.get_or_try_init(|| {
            let resolver = Resolver::new(&owner, &ctx);
            let produced = produce(&resolver)?;
            owner.track(disposal, key.type_name, &produced);
            Ok::<_, DiError>(produced)
        })?;
        Ok(value.clone())
    }
}

impl DynResolve for ScopedProvider {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>> {
        let ctx = ResolveContext::new();
        self.scope.engine.resolve_key(&self.scope, *key, &ctx)
    }
}

/// The root container: a frozen registration store plus the root scope.
///
/// Cloning shares the same engine and root scope. Disposing the provider
/// disposes the root scope and with it every tracked singleton.
#[derive(Clone)]
pub struct ServiceProvider {
    engine: Arc<Engine>,
    root: Arc<ScopeInner>,
}

impl ServiceProvider {
    pub(crate) fn from_descriptors(descriptors: Arc<[ServiceDescriptor]>) -> DiResult<Self> {
        let count = descriptors.len();
        let engine = Arc::new(Engine::new(descriptors));
        let root = ScopeInner::new_root(engine.clone());
        // owned pre-built instances join root teardown immediately, in
        // registration order
        for descriptor in engine.descriptors.iter() {
            if let ServiceSource::Instance(value) = &descriptor.source {
                root.track(&descriptor.disposal, descriptor.key.type_name, value);
            }
        }
        info!("Built service provider with {} registrations", count);
        Ok(Self { engine, root })
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        let ctx = ResolveContext::new();
        match self
            .engine
            .resolve_key(&self.root, ServiceKey::of::<T>(), &ctx)?
        {
            Some(value) => downcast::<T>(value).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>()?.ok_or_else(|| DiError::ServiceNotRegistered {
            service_type: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let ctx = ResolveContext::new();
        self.engine
            .resolve_all_key(&self.root, ServiceKey::of::<T>(), &ctx)?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// Open a new scope rooted at this provider.
    pub fn create_scope(&self) -> DiResult<ServiceScope> {
        Ok(ServiceScope::from_inner(ScopeInner::new_child(&self.root)?))
    }

    /// The root scope as a provider handle.
    pub fn root_provider(&self) -> ScopedProvider {
        ScopedProvider::new(self.root.clone())
    }

    /// Walk every registration's dependency graph without instantiating
    /// anything, surfacing missing, cyclic and captive wiring at startup.
    pub fn validate(&self) -> DiResult<()> {
        self.engine.validate()
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.engine.descriptors
    }

    /// Resolve the registration at a specific store index against the root
    /// scope, regardless of later overrides of the same contract.
    pub fn resolve_descriptor(&self, index: usize) -> DiResult<AnyInstance> {
        let ctx = ResolveContext::new();
        self.engine.resolve_slot(&self.root, index, &ctx)
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_disposed()
    }

    /// Tear down the root scope and every tracked singleton, LIFO.
    pub fn dispose(&self) -> DiResult<()> {
        self.root.dispose_sync()
    }

    /// As [`ServiceProvider::dispose`], preferring async capabilities.
    pub async fn dispose_async(&self) -> DiResult<()> {
        self.root.dispose_async_inner().await
    }
}

impl DynResolve for ServiceProvider {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>> {
        let ctx = ResolveContext::new();
        self.engine.resolve_key(&self.root, *key, &ctx)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.engine.descriptors.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn check<T: Send + Sync>() {}
    check::<ServiceProvider>();
    check::<ScopedProvider>();
}
