//! The ordered registration store.

use std::any::TypeId;
use std::sync::Arc;

use tracing::debug;

use crate::activation::ActivationArgs;
use crate::descriptor::{
    erase, AnyInstance, ConstructFn, GenericBinder, Lifetime, ServiceDescriptor, ServiceKey,
    ServiceSource,
};
use crate::dispose::{Dispose, DisposalHook};
use crate::error::DiResult;
use crate::provider::{Resolver, ServiceProvider};

/// An ordered collection of service registrations.
///
/// Mutation is a setup-phase activity; [`ServiceCollection::build`] freezes
/// the registrations into an immutable store shared by the provider. For a
/// contract type registered more than once, the last registration wins for
/// single-target resolution while `resolve_all` observes registration order.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-assembled descriptor.
    pub fn add_descriptor(&mut self, descriptor: ServiceDescriptor) {
        debug!(
            "Registered {} as {:?} ({:?})",
            descriptor.key.type_name, descriptor.lifetime, descriptor.source
        );
        self.descriptors.push(descriptor);
    }

    /// Register a factory with full control over lifetime and disposal.
    pub fn add_factory<T, F>(&mut self, lifetime: Lifetime, factory: F, disposal: DisposalHook)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_descriptor(ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime,
            source: ServiceSource::Factory(erase(factory)),
            disposal,
        });
    }

    /// Register a singleton factory.
    pub fn add_singleton<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Singleton, factory, DisposalHook::none());
    }

    /// Register a scoped factory.
    pub fn add_scoped<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Scoped, factory, DisposalHook::none());
    }

    /// Register a transient factory.
    pub fn add_transient<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(Lifetime::Transient, factory, DisposalHook::none());
    }

    /// Register a pre-built instance. The engine never takes disposal
    /// ownership of it.
    pub fn add_instance<T: Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.add_descriptor(ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime: Lifetime::Singleton,
            source: ServiceSource::Instance(instance as AnyInstance),
            disposal: DisposalHook::none(),
        });
    }

    /// Register a pre-built instance that the provider disposes on teardown.
    pub fn add_owned_instance<T: Dispose + 'static>(&mut self, instance: Arc<T>) {
        self.add_descriptor(ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime: Lifetime::Singleton,
            source: ServiceSource::Instance(instance as AnyInstance),
            disposal: DisposalHook::sync::<T>(),
        });
    }

    /// Register a constructor with statically declared dependencies.
    pub fn add_constructed<T, A, F>(&mut self, lifetime: Lifetime, construct: F)
    where
        T: Send + Sync + 'static,
        A: ActivationArgs + 'static,
        F: Fn(A) -> DiResult<T> + Send + Sync + 'static,
    {
        self.add_constructed_with::<T, A, F>(lifetime, construct, DisposalHook::none());
    }

    /// Constructor registration with a disposal hook.
    pub fn add_constructed_with<T, A, F>(
        &mut self,
        lifetime: Lifetime,
        construct: F,
        disposal: DisposalHook,
    ) where
        T: Send + Sync + 'static,
        A: ActivationArgs + 'static,
        F: Fn(A) -> DiResult<T> + Send + Sync + 'static,
    {
        let body: ConstructFn = Arc::new(move |instances| {
            let args = A::from_instances(instances)?;
            construct(args).map(|v| Arc::new(v) as AnyInstance)
        });
        self.add_descriptor(ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime,
            source: ServiceSource::Constructor {
                params: A::keys(),
                construct: body,
            },
            disposal,
        });
    }

    /// Register an open-generic family through its binder.
    pub fn add_open_generic(
        &mut self,
        family: &'static str,
        lifetime: Lifetime,
        binder: GenericBinder,
    ) {
        self.add_descriptor(ServiceDescriptor {
            key: ServiceKey {
                type_id: TypeId::of::<OpenGenericContract>(),
                type_name: family,
            },
            lifetime,
            source: ServiceSource::OpenGeneric { family, binder },
            disposal: DisposalHook::none(),
        });
    }

    /// Is any registration present for contract type `T`?
    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_type(TypeId::of::<T>())
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.descriptors.iter().any(|d| match &d.source {
            ServiceSource::OpenGeneric { binder, .. } => binder
                .keys()
                .iter()
                .any(|k| k.type_id == type_id),
            _ => d.key.type_id == type_id,
        })
    }

    /// Add a singleton factory only when `T` has no registration yet.
    /// Returns whether the registration was added.
    pub fn try_add_singleton<T, F>(&mut self, factory: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        if self.contains::<T>() {
            return false;
        }
        self.add_singleton(factory);
        true
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Positional mutation used by layered stores during setup.
    pub fn insert(&mut self, index: usize, descriptor: ServiceDescriptor) {
        self.descriptors.insert(index, descriptor);
    }

    pub fn remove_at(&mut self, index: usize) -> ServiceDescriptor {
        self.descriptors.remove(index)
    }

    pub fn set(&mut self, index: usize, descriptor: ServiceDescriptor) {
        self.descriptors[index] = descriptor;
    }

    pub fn clear(&mut self) {
        self.descriptors.clear();
    }

    pub fn get(&self, index: usize) -> Option<&ServiceDescriptor> {
        self.descriptors.get(index)
    }

    /// Freeze the registrations and return a resolver over them.
    pub fn build(self) -> DiResult<ServiceProvider> {
        ServiceProvider::from_descriptors(self.descriptors.into())
    }
}

/// Private marker keying open-generic descriptors; never resolvable itself.
struct OpenGenericContract;
