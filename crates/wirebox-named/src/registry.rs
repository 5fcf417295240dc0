//! The named registry: one contract type, many named registrations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use wirebox_di::{
    AnyInstance, DiError, DiResult, DisposalHook, Dispose, Lifetime, ScopedProvider,
    ServiceCollection, ServiceKey,
};

use crate::dynamic::{DynamicFallback, DynamicNamed, NamedFactory};

/// Upper bound on forward hops before a chain is reported as cyclic.
const MAX_FORWARD_HOPS: usize = 32;

enum Produce<T> {
    Instance(Arc<T>),
    Factory(NamedFactory<T>),
}

impl<T> Clone for Produce<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(value) => Self::Instance(value.clone()),
            Self::Factory(factory) => Self::Factory(factory.clone()),
        }
    }
}

struct NamedEntry<T> {
    lifetime: Lifetime,
    produce: Produce<T>,
    /// The registry tears this entry's value down in `dispose_owned`.
    owned: bool,
    /// Exactly-once singleton materialization, shared with promoted default
    /// registrations.
    cell: Arc<OnceCell<Arc<T>>>,
}

impl<T> Clone for NamedEntry<T> {
    fn clone(&self) -> Self {
        Self {
            lifetime: self.lifetime,
            produce: self.produce.clone(),
            owned: self.owned,
            cell: self.cell.clone(),
        }
    }
}

enum Slot<T> {
    Entry(NamedEntry<T>),
    Forward(String),
    /// A recorded dynamic-lookup miss; the fallback is never asked again.
    Missing,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Entry(entry) => Self::Entry(entry.clone()),
            Self::Forward(to) => Self::Forward(to.clone()),
            Self::Missing => Self::Missing,
        }
    }
}

/// A registry of named registrations for one contract type.
///
/// Names are case-sensitive. The empty name is the reserved default:
/// [`NamedRegistry::attach`] promotes it into a [`ServiceCollection`] as an
/// ordinary nameless registration sharing the same materialization cell, so
/// both lookup paths observe the same singleton.
pub struct NamedRegistry<T: Send + Sync + 'static> {
    entries: RwLock<HashMap<String, Slot<T>>>,
    fallback: RwLock<Option<DynamicFallback<T>>>,
    disposed: AtomicBool,
    attached: AtomicBool,
}

impl<T: Send + Sync + 'static> Default for NamedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> NamedRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
            disposed: AtomicBool::new(false),
            attached: AtomicBool::new(false),
        }
    }

    /// Register a pre-built value under `name`. `owned` hands its teardown
    /// to [`NamedRegistry::dispose_owned`].
    pub fn add_instance(&self, name: &str, value: Arc<T>, owned: bool) -> DiResult<()> {
        self.add_slot(
            name,
            Slot::Entry(NamedEntry {
                lifetime: Lifetime::Singleton,
                produce: Produce::Instance(value),
                owned,
                cell: Arc::new(OnceCell::new()),
            }),
        )
    }

    /// Register a singleton factory under `name`. The registry owns the
    /// materialized value's teardown.
    pub fn add_singleton<F>(&self, name: &str, factory: F) -> DiResult<()>
    where
        F: Fn(&ScopedProvider) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(name, Lifetime::Singleton, Arc::new(factory), true)
    }

    /// Register a scoped factory under `name`; values cache per resolving
    /// scope.
    pub fn add_scoped<F>(&self, name: &str, factory: F) -> DiResult<()>
    where
        F: Fn(&ScopedProvider) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(name, Lifetime::Scoped, Arc::new(factory), false)
    }

    /// Register a transient factory under `name`; every resolution invokes
    /// it afresh.
    pub fn add_transient<F>(&self, name: &str, factory: F) -> DiResult<()>
    where
        F: Fn(&ScopedProvider) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.add_factory(name, Lifetime::Transient, Arc::new(factory), false)
    }

    fn add_factory(
        &self,
        name: &str,
        lifetime: Lifetime,
        factory: NamedFactory<T>,
        owned: bool,
    ) -> DiResult<()> {
        self.add_slot(
            name,
            Slot::Entry(NamedEntry {
                lifetime,
                produce: Produce::Factory(factory),
                owned,
                cell: Arc::new(OnceCell::new()),
            }),
        )
    }

    /// Alias `from` onto `to`. The target need not exist yet.
    pub fn forward_name(&self, from: &str, to: &str) -> DiResult<()> {
        self.add_slot(from, Slot::Forward(to.to_string()))
    }

    fn add_slot(&self, name: &str, slot: Slot<T>) -> DiResult<()> {
        // promotion happens once, at attach; a late default entry would be
        // invisible to the container and is rejected instead
        if name.is_empty() && self.attached.load(Ordering::SeqCst) {
            return Err(DiError::ResolutionFailed {
                message: format!(
                    "default-name registration for {} must precede attach",
                    std::any::type_name::<T>()
                ),
            });
        }
        let mut entries = self.entries.write().unwrap();
        // a recorded dynamic miss is not a registration; it may be replaced
        if matches!(entries.get(name), Some(Slot::Entry(_)) | Some(Slot::Forward(_))) {
            return Err(DiError::DuplicateName {
                name: name.to_string(),
            });
        }
        debug!("Named registration '{}' for {}", name, std::any::type_name::<T>());
        entries.insert(name.to_string(), slot);
        Ok(())
    }

    /// Install the fallback consulted for missing names. It runs at most
    /// once per distinct name, under the registry's write lock.
    pub fn enable_dynamic_lookup<F>(&self, fallback: F)
    where
        F: Fn(&str) -> Option<DynamicNamed<T>> + Send + Sync + 'static,
    {
        *self.fallback.write().unwrap() = Some(Arc::new(fallback));
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(
            self.entries.read().unwrap().get(name),
            Some(Slot::Entry(_)) | Some(Slot::Forward(_))
        )
    }

    /// All registered names, forwards included, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|(_, slot)| !matches!(slot, Slot::Missing))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resolve the registration under `name` against `provider`'s scope.
    pub fn resolve(&self, provider: &ScopedProvider, name: &str) -> DiResult<Arc<T>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(DiError::AlreadyDisposed {
                context: format!("named registry for {}", std::any::type_name::<T>()),
            });
        }
        let mut current = name.to_string();
        let mut chain: Vec<String> = Vec::new();
        loop {
            if chain.contains(&current) || chain.len() > MAX_FORWARD_HOPS {
                chain.push(current);
                return Err(DiError::ForwardingCycle {
                    chain: chain.join(" -> "),
                });
            }
            chain.push(current.clone());

            let slot = self.entries.read().unwrap().get(&current).cloned();
            match slot {
                Some(Slot::Forward(to)) => current = to,
                Some(Slot::Entry(entry)) => return self.produce(provider, &current, entry),
                Some(Slot::Missing) => return Err(self.miss(&current)),
                None => {
                    if !self.run_fallback(&current) {
                        return Err(self.miss(&current));
                    }
                    // re-read the freshly recorded slot
                    chain.pop();
                }
            }
        }
    }

    fn miss(&self, name: &str) -> DiError {
        DiError::ServiceNotRegistered {
            service_type: format!("{} named '{}'", std::any::type_name::<T>(), name),
        }
    }

    /// Consult the dynamic fallback for `name`. Returns whether a slot for
    /// `name` now exists (recorded by this call or a racing one).
    fn run_fallback(&self, name: &str) -> bool {
        let fallback = match self.fallback.read().unwrap().clone() {
            Some(fallback) => fallback,
            None => return false,
        };
        let mut entries = self.entries.write().unwrap();
        // single writer wins: a racing resolver may have recorded it already
        if entries.contains_key(name) {
            return true;
        }
        let slot = match fallback(name) {
            None => Slot::Missing,
            Some(DynamicNamed::Instance(value)) => Slot::Entry(NamedEntry {
                lifetime: Lifetime::Singleton,
                produce: Produce::Instance(value),
                owned: false,
                cell: Arc::new(OnceCell::new()),
            }),
            Some(DynamicNamed::Registration { lifetime, factory }) => Slot::Entry(NamedEntry {
                lifetime,
                produce: Produce::Factory(factory),
                owned: lifetime == Lifetime::Singleton,
                cell: Arc::new(OnceCell::new()),
            }),
            Some(DynamicNamed::Forward(to)) => Slot::Forward(to),
        };
        let found = !matches!(slot, Slot::Missing);
        debug!(
            "Dynamic lookup for '{}': {}",
            name,
            if found { "recorded" } else { "miss recorded" }
        );
        entries.insert(name.to_string(), slot);
        found
    }

    fn produce(
        &self,
        provider: &ScopedProvider,
        terminal_name: &str,
        entry: NamedEntry<T>,
    ) -> DiResult<Arc<T>> {
        let factory = match entry.produce {
            Produce::Instance(value) => return Ok(value),
            Produce::Factory(factory) => factory,
        };
        match entry.lifetime {
            Lifetime::Transient => factory(provider),
            Lifetime::Singleton => entry
                .cell
                .get_or_try_init(|| factory(provider))
                .map(|value| value.clone()),
            Lifetime::Scoped => {
                let produced = provider.resolve_keyed_with(
                    ServiceKey::of::<T>(),
                    terminal_name,
                    Lifetime::Scoped,
                    &DisposalHook::none(),
                    &|resolver| factory(&resolver.provider()).map(|v| v as AnyInstance),
                )?;
                produced
                    .downcast::<T>()
                    .map_err(|_| DiError::InvalidServiceType {
                        message: format!(
                            "named scoped instance does not downcast to {}",
                            std::any::type_name::<T>()
                        ),
                    })
            }
        }
    }

    /// Register this registry (and its default-name entry, if any) into a
    /// general-purpose collection. The promoted registration resolves through
    /// the registry, so singleton identity is shared between the typed and
    /// the named lookup path. The default entry must exist before this call;
    /// adding one afterwards fails.
    pub fn attach(self: &Arc<Self>, services: &mut ServiceCollection) {
        self.attached.store(true, Ordering::SeqCst);
        services.add_instance(self.clone());
        let default = match self.entries.read().unwrap().get("") {
            Some(Slot::Entry(entry)) => Some(entry.lifetime),
            Some(Slot::Forward(_)) => Some(Lifetime::Transient),
            _ => None,
        };
        if let Some(lifetime) = default {
            let registry = self.clone();
            services.add_factory(
                lifetime,
                move |resolver| registry.resolve(&resolver.provider(), ""),
                DisposalHook::none(),
            );
        }
    }
}

impl<T: Dispose + 'static> NamedRegistry<T> {
    /// Tear down owned instances and owned materialized singletons, then
    /// reject further resolution. A second call is a no-op.
    pub fn dispose_owned(&self) -> DiResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let entries = self.entries.write().unwrap();
        let mut first_err = None;
        for (name, slot) in entries.iter() {
            let entry = match slot {
                Slot::Entry(entry) if entry.owned => entry,
                _ => continue,
            };
            let value = match &entry.produce {
                Produce::Instance(value) => Some(value.clone()),
                Produce::Factory(_) => entry.cell.get().cloned(),
            };
            if let Some(value) = value {
                if let Err(err) = value.dispose() {
                    warn!("Disposal of named entry '{}' failed: {}", name, err);
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
