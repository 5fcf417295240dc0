//! Call-site graph building.
//!
//! A call-site is a typed plan describing how to produce a value for one
//! contract type. Sites are built once per (contract, slot) against the
//! frozen descriptor list and are pure functions of it, so duplicate
//! concurrent builds are tolerated (last write wins).

use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{
    AnyInstance, ConstructFn, ServiceDescriptor, ServiceFactory, ServiceKey, ServiceSource,
};
use crate::descriptor::Lifetime;
use crate::dispose::DisposalHook;
use crate::error::{DiError, DiResult};
use crate::provider::ScopedProvider;
use crate::scope::ScopeFactory;

/// Where the engine caches a produced value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLocation {
    /// Root-scope cache, one instance for the provider's life.
    Root,
    /// Per-scope cache.
    Scope,
    /// Not cached, but tracked for teardown in the resolving scope.
    Dispose,
    /// Neither cached nor tracked.
    None,
}

/// Slot constants for the synthetic sites that have no descriptor.
pub(crate) const PROVIDER_SLOT: usize = usize::MAX;
pub(crate) const SCOPE_FACTORY_SLOT: usize = usize::MAX - 1;
pub(crate) const ENUMERABLE_SLOT: usize = usize::MAX - 2;

/// A resolved production plan for one contract type.
pub struct CallSite {
    pub key: ServiceKey,
    pub slot: usize,
    pub lifetime: Lifetime,
    pub cache: CacheLocation,
    pub kind: CallSiteKind,
    pub disposal: DisposalHook,
}

pub enum CallSiteKind {
    Constructor {
        params: Vec<Arc<CallSite>>,
        construct: ConstructFn,
    },
    Factory(ServiceFactory),
    Constant(AnyInstance),
    Enumerable(Vec<Arc<CallSite>>),
    /// Yields the ambient scope's provider handle; never disposal-captured.
    Provider,
    /// Yields a root-bound scope factory; never disposal-captured.
    ScopeFactory,
}

fn cache_location(lifetime: Lifetime, disposal: &DisposalHook) -> CacheLocation {
    match lifetime {
        Lifetime::Singleton => CacheLocation::Root,
        Lifetime::Scoped => CacheLocation::Scope,
        Lifetime::Transient if !disposal.is_none() => CacheLocation::Dispose,
        Lifetime::Transient => CacheLocation::None,
    }
}

/// Last-wins winning descriptor index for a contract key: exact registrations
/// first (scanned in reverse), open-generic binder hits only after every
/// exact lookup missed.
pub(crate) fn winning_slot(descriptors: &[ServiceDescriptor], key: &ServiceKey) -> Option<usize> {
    for (index, descriptor) in descriptors.iter().enumerate().rev() {
        if !matches!(descriptor.source, ServiceSource::OpenGeneric { .. })
            && descriptor.key.type_id == key.type_id
        {
            return Some(index);
        }
    }
    for (index, descriptor) in descriptors.iter().enumerate().rev() {
        if let ServiceSource::OpenGeneric { binder, .. } = &descriptor.source {
            if binder.matches(key) {
                return Some(index);
            }
        }
    }
    None
}

/// All matching descriptor indices in registration order, exact and binder.
pub(crate) fn enumerable_slots(
    descriptors: &[ServiceDescriptor],
    key: &ServiceKey,
) -> Vec<usize> {
    descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| match &d.source {
            ServiceSource::OpenGeneric { binder, .. } => binder.matches(key),
            _ => d.key.type_id == key.type_id,
        })
        .map(|(index, _)| index)
        .collect()
}

fn format_chain(chain: &[ServiceKey], tail: &ServiceKey) -> String {
    let mut parts: Vec<&str> = chain.iter().map(|k| k.type_name).collect();
    parts.push(tail.type_name);
    parts.join(" -> ")
}

pub(crate) struct CallSiteBuilder<'a> {
    descriptors: &'a [ServiceDescriptor],
}

impl<'a> CallSiteBuilder<'a> {
    pub(crate) fn new(descriptors: &'a [ServiceDescriptor]) -> Self {
        Self { descriptors }
    }

    /// Build the site for a specific descriptor slot, as requested under
    /// `key` (the two differ only for open-generic slots).
    pub(crate) fn site_for_slot(
        &self,
        slot: usize,
        key: ServiceKey,
        chain: &mut Vec<ServiceKey>,
    ) -> DiResult<Arc<CallSite>> {
        let descriptor = &self.descriptors[slot];
        let site = match &descriptor.source {
            ServiceSource::Instance(value) => CallSite {
                key,
                slot,
                lifetime: descriptor.lifetime,
                cache: CacheLocation::None,
                kind: CallSiteKind::Constant(value.clone()),
                // owned constants are swept into the root scope at build time
                disposal: DisposalHook::none(),
            },
            ServiceSource::Factory(factory) => CallSite {
                key,
                slot,
                lifetime: descriptor.lifetime,
                cache: cache_location(descriptor.lifetime, &descriptor.disposal),
                kind: CallSiteKind::Factory(factory.clone()),
                disposal: descriptor.disposal.clone(),
            },
            ServiceSource::Constructor { params, construct } => {
                if chain.iter().any(|k| k.type_id == key.type_id) {
                    return Err(DiError::CyclicDependency {
                        chain: format_chain(chain, &key),
                    });
                }
                chain.push(key);
                let built: DiResult<Vec<Arc<CallSite>>> =
                    params.iter().map(|p| self.require(p, chain)).collect();
                let params = built?;
                chain.pop();
                if descriptor.lifetime == Lifetime::Singleton {
                    if let Some(inner) = params.iter().find_map(|p| find_scoped(p)) {
                        return Err(DiError::CaptiveDependency {
                            outer: key.type_name.to_string(),
                            inner: inner.type_name.to_string(),
                        });
                    }
                }
                CallSite {
                    key,
                    slot,
                    lifetime: descriptor.lifetime,
                    cache: cache_location(descriptor.lifetime, &descriptor.disposal),
                    kind: CallSiteKind::Constructor {
                        params,
                        construct: construct.clone(),
                    },
                    disposal: descriptor.disposal.clone(),
                }
            }
            ServiceSource::OpenGeneric { family, binder } => {
                let entry = binder.entry(&key).ok_or_else(|| DiError::ResolutionFailed {
                    message: format!(
                        "open-generic family '{}' has no binding for {}",
                        family, key.type_name
                    ),
                })?;
                CallSite {
                    key,
                    slot,
                    lifetime: descriptor.lifetime,
                    cache: cache_location(descriptor.lifetime, &entry.disposal),
                    kind: CallSiteKind::Factory(entry.factory.clone()),
                    disposal: entry.disposal.clone(),
                }
            }
        };
        debug!(
            "Built call-site for {} (slot {}, cache {:?})",
            key.type_name, slot, site.cache
        );
        Ok(Arc::new(site))
    }

    /// Enumerable site covering every registration of `key`, in registration
    /// order. An empty member list is valid.
    pub(crate) fn enumerable(
        &self,
        key: ServiceKey,
        chain: &mut Vec<ServiceKey>,
    ) -> DiResult<Arc<CallSite>> {
        let members: DiResult<Vec<Arc<CallSite>>> = enumerable_slots(self.descriptors, &key)
            .into_iter()
            .map(|slot| self.site_for_slot(slot, key, chain))
            .collect();
        Ok(Arc::new(CallSite {
            key,
            slot: ENUMERABLE_SLOT,
            lifetime: Lifetime::Transient,
            cache: CacheLocation::None,
            kind: CallSiteKind::Enumerable(members?),
            disposal: DisposalHook::none(),
        }))
    }

    /// Strict constructor-parameter resolution: a miss is an error here.
    fn require(
        &self,
        key: &ServiceKey,
        chain: &mut Vec<ServiceKey>,
    ) -> DiResult<Arc<CallSite>> {
        if key.is::<ScopedProvider>() {
            return Ok(Arc::new(synthetic_site(*key, PROVIDER_SLOT, CallSiteKind::Provider)));
        }
        if key.is::<ScopeFactory>() {
            return Ok(Arc::new(synthetic_site(
                *key,
                SCOPE_FACTORY_SLOT,
                CallSiteKind::ScopeFactory,
            )));
        }
        if chain.iter().any(|k| k.type_id == key.type_id) {
            return Err(DiError::CyclicDependency {
                chain: format_chain(chain, key),
            });
        }
        match winning_slot(self.descriptors, key) {
            Some(slot) => self.site_for_slot(slot, *key, chain),
            None => Err(DiError::ServiceNotRegistered {
                service_type: format!(
                    "{} (required by {})",
                    key.type_name,
                    chain.last().map(|k| k.type_name).unwrap_or("<root>")
                ),
            }),
        }
    }
}

pub(crate) fn synthetic_site(key: ServiceKey, slot: usize, kind: CallSiteKind) -> CallSite {
    CallSite {
        key,
        slot,
        lifetime: Lifetime::Transient,
        cache: CacheLocation::None,
        kind,
        disposal: DisposalHook::none(),
    }
}

/// First scoped site inside a constructor graph, if any. Opaque factories
/// cannot be inspected and are exempt.
fn find_scoped(site: &Arc<CallSite>) -> Option<ServiceKey> {
    if site.lifetime == Lifetime::Scoped {
        return Some(site.key);
    }
    match &site.kind {
        CallSiteKind::Constructor { params, .. } => params.iter().find_map(find_scoped),
        CallSiteKind::Enumerable(members) => members.iter().find_map(find_scoped),
        _ => None,
    }
}
