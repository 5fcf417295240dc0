//! Child registration stores layered over a parent provider.
//!
//! A child store starts from the parent's frozen descriptor list as a
//! read-only prefix and appends its own registrations. Building the child
//! provider rewrites parent registrations so that instance identity and
//! teardown ownership stay correct across the container boundary.

use std::any::TypeId;
use std::sync::Arc;

use tracing::{debug, info};

use wirebox_di::{
    ActivationArgs, AnyInstance, DiError, DiResult, DisposalHook, Dispose, DynResolve,
    GenericBinder, Lifetime, Resolver, ServiceCollection, ServiceDescriptor, ServiceKey,
    ServiceProvider, ServiceScope, ServiceSource,
};

use crate::reroute::ReRoutingProvider;

/// How parent singleton open-generic registrations compose into a child.
///
/// They cannot be pre-resolved (no closed type parameter has been requested
/// yet), so the caller picks one of four behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenGenericBehavior {
    /// Fail the build, naming every offending family.
    #[default]
    ThrowIfUnsupported,
    /// Drop the registrations from the child.
    Omit,
    /// Copy them: the child materializes its own independent singletons.
    DuplicateSingleton,
    /// Keep them in the parent and route closed requests back to it.
    Delegate,
}

/// A registration store composed of a read-only parent prefix and mutable
/// child registrations.
pub struct ChildServiceCollection {
    parent: Vec<ServiceDescriptor>,
    child: ServiceCollection,
    behavior: OpenGenericBehavior,
    /// Parent entries hidden from the merged view during auto-promote.
    mask: Vec<bool>,
}

impl ChildServiceCollection {
    /// Start a child store from the provider whose registrations form the
    /// read-only prefix. `build_child_provider` must later be called with
    /// that same provider.
    pub fn from_parent(parent: &ServiceProvider, behavior: OpenGenericBehavior) -> Self {
        Self::from_descriptors(parent.descriptors(), behavior)
    }

    pub fn from_descriptors(parent: &[ServiceDescriptor], behavior: OpenGenericBehavior) -> Self {
        debug!(
            "Child store over {} parent registrations ({:?})",
            parent.len(),
            behavior
        );
        Self {
            parent: parent.to_vec(),
            child: ServiceCollection::new(),
            behavior,
            mask: Vec::new(),
        }
    }

    pub fn parent_count(&self) -> usize {
        self.parent.len()
    }

    pub fn len(&self) -> usize {
        self.parent.len() + self.child.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_descriptor(&mut self, descriptor: ServiceDescriptor) {
        self.child.add_descriptor(descriptor);
    }

    pub fn add_singleton<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.child.add_singleton(factory);
    }

    pub fn add_scoped<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.child.add_scoped(factory);
    }

    pub fn add_transient<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.child.add_transient(factory);
    }

    pub fn add_factory<T, F>(&mut self, lifetime: Lifetime, factory: F, disposal: DisposalHook)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.child.add_factory(lifetime, factory, disposal);
    }

    pub fn add_instance<T: Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.child.add_instance(instance);
    }

    pub fn add_owned_instance<T: Dispose + 'static>(&mut self, instance: Arc<T>) {
        self.child.add_owned_instance(instance);
    }

    pub fn add_constructed<T, A, F>(&mut self, lifetime: Lifetime, construct: F)
    where
        T: Send + Sync + 'static,
        A: ActivationArgs + 'static,
        F: Fn(A) -> DiResult<T> + Send + Sync + 'static,
    {
        self.child.add_constructed(lifetime, construct);
    }

    pub fn add_open_generic(
        &mut self,
        family: &'static str,
        lifetime: Lifetime,
        binder: GenericBinder,
    ) {
        self.child.add_open_generic(family, lifetime, binder);
    }

    /// Presence check over the merged view: unmasked parent entries plus
    /// child entries.
    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_type(TypeId::of::<T>())
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        let in_parent = self
            .parent
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.mask.get(*index).copied().unwrap_or(false))
            .any(|(_, d)| descriptor_matches(d, type_id));
        in_parent || self.child.contains_type(type_id)
    }

    /// Add-if-absent against the merged view.
    pub fn try_add_singleton<T, F>(&mut self, factory: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        if self.contains::<T>() {
            return false;
        }
        self.child.add_singleton(factory);
        true
    }

    /// Auto-promote: hide parent entries matching `predicate` for the
    /// duration of `configure`, so add-if-absent calls made inside it do not
    /// see them and register child-owned replacements instead.
    pub fn hide_parent_where<P, F>(&mut self, predicate: P, configure: F) -> DiResult<()>
    where
        P: Fn(&ServiceDescriptor) -> bool,
        F: FnOnce(&mut Self) -> DiResult<()>,
    {
        self.mask = self.parent.iter().map(|d| predicate(d)).collect();
        let result = configure(self);
        self.mask.clear();
        result
    }

    /// Positional access over the merged view (parent prefix first).
    pub fn get(&self, index: usize) -> Option<&ServiceDescriptor> {
        if index < self.parent.len() {
            self.parent.get(index)
        } else {
            self.child.get(index - self.parent.len())
        }
    }

    /// Positional insertion. Indices inside the parent prefix are rejected.
    pub fn insert(&mut self, index: usize, descriptor: ServiceDescriptor) -> DiResult<()> {
        self.guard_index(index)?;
        self.child.insert(index - self.parent.len(), descriptor);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> DiResult<ServiceDescriptor> {
        self.guard_index(index)?;
        Ok(self.child.remove_at(index - self.parent.len()))
    }

    pub fn set(&mut self, index: usize, descriptor: ServiceDescriptor) -> DiResult<()> {
        self.guard_index(index)?;
        self.child.set(index - self.parent.len(), descriptor);
        Ok(())
    }

    /// Clearing a store that carries a parent prefix is an error, never a
    /// silent partial clear.
    pub fn clear(&mut self) -> DiResult<()> {
        if !self.parent.is_empty() {
            return Err(DiError::ImmutableParentDescriptor {
                index: 0,
                parent_count: self.parent.len(),
            });
        }
        self.child.clear();
        Ok(())
    }

    fn guard_index(&self, index: usize) -> DiResult<()> {
        if index < self.parent.len() {
            return Err(DiError::ImmutableParentDescriptor {
                index,
                parent_count: self.parent.len(),
            });
        }
        Ok(())
    }

    /// Build the child provider. `parent` must be the provider the prefix
    /// was taken from; parent singletons are pre-resolved from it so both
    /// containers observe the same instances, and the parent keeps their
    /// teardown.
    pub fn build_child_provider(self, parent: &ServiceProvider) -> DiResult<ChildProvider> {
        let mut rewritten = ServiceCollection::new();
        let mut unsupported: Vec<&'static str> = Vec::new();
        let mut delegated: Vec<GenericBinder> = Vec::new();

        for (index, descriptor) in self.parent.iter().enumerate() {
            match (descriptor.lifetime, &descriptor.source) {
                // the child constructs and owns these itself
                (Lifetime::Transient | Lifetime::Scoped, _) => {
                    rewritten.add_descriptor(descriptor.clone());
                }
                (Lifetime::Singleton, ServiceSource::Instance(_)) => {
                    let mut copy = descriptor.clone();
                    copy.disposal = DisposalHook::none();
                    rewritten.add_descriptor(copy);
                }
                (Lifetime::Singleton, ServiceSource::OpenGeneric { family, binder }) => {
                    match self.behavior {
                        OpenGenericBehavior::ThrowIfUnsupported => unsupported.push(*family),
                        OpenGenericBehavior::Omit => {}
                        OpenGenericBehavior::DuplicateSingleton => {
                            rewritten.add_descriptor(descriptor.clone());
                        }
                        OpenGenericBehavior::Delegate => delegated.push(binder.clone()),
                    }
                }
                (Lifetime::Singleton, _) => {
                    // shared identity: materialize in the parent, register
                    // the result as an externally-owned constant
                    let value = parent.resolve_descriptor(index)?;
                    rewritten.add_descriptor(ServiceDescriptor {
                        key: descriptor.key,
                        lifetime: Lifetime::Singleton,
                        source: ServiceSource::Instance(value),
                        disposal: DisposalHook::none(),
                    });
                }
            }
        }

        if !unsupported.is_empty() {
            return Err(DiError::UnsupportedParentSingleton {
                services: unsupported.join(", "),
            });
        }

        for descriptor in self.child.descriptors() {
            rewritten.add_descriptor(descriptor.clone());
        }

        let provider = rewritten.build()?;
        let mut router = ReRoutingProvider::new(Arc::new(provider.clone()));
        for binder in delegated {
            router.re_route_family(binder, Arc::new(parent.clone()));
        }
        info!(
            "Built child provider over {} parent registrations",
            self.parent.len()
        );
        Ok(ChildProvider { provider, router })
    }
}

/// A built child container: its own provider plus the routing shim that
/// delegates open-generic requests back to the parent when configured.
pub struct ChildProvider {
    provider: ServiceProvider,
    router: ReRoutingProvider,
}

impl ChildProvider {
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        self.router.resolve::<T>()
    }

    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.router.resolve_required::<T>()
    }

    /// Enumeration over the child's own store, parent prefix first.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.provider.resolve_all::<T>()
    }

    pub fn create_scope(&self) -> DiResult<ServiceScope> {
        self.provider.create_scope()
    }

    /// The underlying provider, for layering further children.
    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    pub fn is_disposed(&self) -> bool {
        self.provider.is_disposed()
    }

    /// Dispose child-owned services only; pre-resolved parent singletons
    /// stay alive in the parent.
    pub fn dispose(&self) -> DiResult<()> {
        self.provider.dispose()
    }

    pub async fn dispose_async(&self) -> DiResult<()> {
        self.provider.dispose_async().await
    }
}

impl DynResolve for ChildProvider {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>> {
        self.router.resolve_any(key)
    }
}

fn descriptor_matches(descriptor: &ServiceDescriptor, type_id: TypeId) -> bool {
    match &descriptor.source {
        ServiceSource::OpenGeneric { binder, .. } => {
            binder.keys().iter().any(|k| k.type_id == type_id)
        }
        _ => descriptor.key.type_id == type_id,
    }
}
