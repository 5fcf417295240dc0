//! Registration records: keys, lifetimes, implementation sources.

use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::dispose::DisposalHook;
use crate::error::{DiError, DiResult};
use crate::provider::Resolver;

/// A type-erased service instance.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// A type-erased factory invoked with a resolver bound to the ambient scope.
pub type ServiceFactory = Arc<dyn Fn(&Resolver<'_>) -> DiResult<AnyInstance> + Send + Sync>;

/// A type-erased constructor body invoked with its already-resolved arguments.
pub type ConstructFn = Arc<dyn Fn(Vec<AnyInstance>) -> DiResult<AnyInstance> + Send + Sync>;

/// Identifies a contract type. Equality and hashing use the `TypeId` only;
/// the name is carried for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct ServiceKey {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ServiceKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

/// Service lifetime management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the provider's entire life.
    Singleton,
    /// One instance per scope.
    Scoped,
    /// A fresh instance on every resolution.
    Transient,
}

/// How a registration produces its value.
#[derive(Clone)]
pub enum ServiceSource {
    /// Opaque factory closure.
    Factory(ServiceFactory),
    /// Pre-built constant. Never disposal-owned unless a hook was attached
    /// through the owned-instance registration path.
    Instance(AnyInstance),
    /// Constructor with an explicitly declared dependency list, enabling
    /// build-time graph walking (cycle, missing and captive checks).
    Constructor {
        params: Vec<ServiceKey>,
        construct: ConstructFn,
    },
    /// Open-generic family: a binder recognizes closed keys and supplies
    /// their factories. Consulted only after exact lookup misses.
    OpenGeneric {
        family: &'static str,
        binder: GenericBinder,
    },
}

impl std::fmt::Debug for ServiceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Factory"),
            Self::Instance(_) => f.write_str("Instance"),
            Self::Constructor { params, .. } => {
                f.debug_struct("Constructor").field("params", params).finish()
            }
            Self::OpenGeneric { family, .. } => {
                f.debug_struct("OpenGeneric").field("family", family).finish()
            }
        }
    }
}

/// One immutable registration record.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub key: ServiceKey,
    pub lifetime: Lifetime,
    pub source: ServiceSource,
    pub disposal: DisposalHook,
}

#[derive(Clone)]
pub(crate) struct BinderEntry {
    pub(crate) key: ServiceKey,
    pub(crate) factory: ServiceFactory,
    pub(crate) disposal: DisposalHook,
}

/// Maps closed contract keys of one generic family to their factories.
///
/// Rust has no runtime type substitution, so each closed parameterization is
/// bound at compile time through a monomorphized [`GenericBinder::bind`]
/// call. Exact registrations still shadow binder hits during resolution.
#[derive(Clone, Default)]
pub struct GenericBinder {
    entries: Vec<BinderEntry>,
}

impl GenericBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one closed parameterization to its factory.
    pub fn bind<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.entries.push(BinderEntry {
            key: ServiceKey::of::<T>(),
            factory: erase(factory),
            disposal: DisposalHook::none(),
        });
        self
    }

    /// Bind one closed parameterization whose instances are disposal-tracked.
    pub fn bind_with_dispose<T, F>(mut self, factory: F, disposal: DisposalHook) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.entries.push(BinderEntry {
            key: ServiceKey::of::<T>(),
            factory: erase(factory),
            disposal,
        });
        self
    }

    /// Does this family contain a binding for `key`?
    pub fn matches(&self, key: &ServiceKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// All closed keys this binder can produce.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub(crate) fn entry(&self, key: &ServiceKey) -> Option<&BinderEntry> {
        self.entries.iter().find(|e| e.key == *key)
    }
}

impl std::fmt::Debug for GenericBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.key.type_name))
            .finish()
    }
}

/// Erase a typed factory into the engine's shape.
pub(crate) fn erase<T, F>(factory: F) -> ServiceFactory
where
    T: Send + Sync + 'static,
    F: Fn(&Resolver<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
{
    Arc::new(move |resolver| factory(resolver).map(|v| v as AnyInstance))
}

/// Downcast a type-erased instance back to its concrete type.
pub(crate) fn downcast<T: Send + Sync + 'static>(value: AnyInstance) -> DiResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| DiError::InvalidServiceType {
        message: format!(
            "service instance does not downcast to {}",
            std::any::type_name::<T>()
        ),
    })
}
