//! The resolution engine: memoized producers, caching and execution.

use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

use dashmap::DashMap;

use crate::callsite::{
    winning_slot, CallSite, CallSiteBuilder, CallSiteKind, CacheLocation, ENUMERABLE_SLOT,
};
use crate::descriptor::{AnyInstance, ServiceDescriptor, ServiceKey, ServiceSource};
use crate::error::{DiError, DiResult};
use crate::provider::{Resolver, ScopedProvider};
use crate::scope::{ScopeFactory, ScopeInner};

/// A reusable, invokable producer compiled from one call-site.
pub type Producer =
    Arc<dyn Fn(&Arc<ScopeInner>, &ResolveContext) -> DiResult<AnyInstance> + Send + Sync>;

/// Strategy seam between call-site trees and executable producers.
///
/// The shipped realizer interprets the tree directly; a compiled fast path
/// can be slotted in behind this trait without touching the graph builder.
pub trait CallSiteRealizer: Send + Sync {
    fn realize(&self, site: &Arc<CallSite>) -> Producer;
}

/// Direct interpretation of the call-site tree.
pub struct InterpretedRealizer;

impl CallSiteRealizer for InterpretedRealizer {
    fn realize(&self, site: &Arc<CallSite>) -> Producer {
        let site = site.clone();
        Arc::new(move |scope, ctx| execute_site(&site, scope, ctx))
    }
}

/// Per-top-level-resolution state: the traversal chain used to report cycles
/// through opaque factories at runtime.
pub struct ResolveContext {
    chain: RefCell<Vec<ServiceKey>>,
}

impl ResolveContext {
    pub(crate) fn new() -> Self {
        Self {
            chain: RefCell::new(Vec::new()),
        }
    }

    fn enter(&self, key: ServiceKey) -> DiResult<()> {
        let mut chain = self.chain.borrow_mut();
        if chain.iter().any(|k| k.type_id == key.type_id) {
            let mut parts: Vec<&str> = chain.iter().map(|k| k.type_name).collect();
            parts.push(key.type_name);
            return Err(DiError::CyclicDependency {
                chain: parts.join(" -> "),
            });
        }
        chain.push(key);
        Ok(())
    }

    fn exit(&self) {
        self.chain.borrow_mut().pop();
    }
}

pub(crate) struct Engine {
    pub(crate) descriptors: Arc<[ServiceDescriptor]>,
    producers: DashMap<(TypeId, usize), Producer>,
    winners: DashMap<TypeId, Option<usize>>,
    realizer: Box<dyn CallSiteRealizer>,
}

impl Engine {
    pub(crate) fn new(descriptors: Arc<[ServiceDescriptor]>) -> Self {
        Self {
            descriptors,
            producers: DashMap::new(),
            winners: DashMap::new(),
            realizer: Box::new(InterpretedRealizer),
        }
    }

    fn winning(&self, key: &ServiceKey) -> Option<usize> {
        if let Some(found) = self.winners.get(&key.type_id) {
            return *found;
        }
        let found = winning_slot(&self.descriptors, key);
        self.winners.insert(key.type_id, found);
        found
    }

    fn producer_for_slot(&self, key: ServiceKey, slot: usize) -> DiResult<Producer> {
        if let Some(producer) = self.producers.get(&(key.type_id, slot)) {
            return Ok(producer.clone());
        }
        let builder = CallSiteBuilder::new(&self.descriptors);
        let site = builder.site_for_slot(slot, key, &mut Vec::new())?;
        let producer = self.realizer.realize(&site);
        // duplicate concurrent builds are idempotent, last write wins
        self.producers.insert((key.type_id, slot), producer.clone());
        Ok(producer)
    }

    fn enumerable_producer(&self, key: ServiceKey) -> DiResult<Producer> {
        if let Some(producer) = self.producers.get(&(key.type_id, ENUMERABLE_SLOT)) {
            return Ok(producer.clone());
        }
        let builder = CallSiteBuilder::new(&self.descriptors);
        let site = builder.enumerable(key, &mut Vec::new())?;
        let producer = self.realizer.realize(&site);
        self.producers
            .insert((key.type_id, ENUMERABLE_SLOT), producer.clone());
        Ok(producer)
    }

    /// Permissive single-target resolution against `scope`.
    pub(crate) fn resolve_key(
        &self,
        scope: &Arc<ScopeInner>,
        key: ServiceKey,
        ctx: &ResolveContext,
    ) -> DiResult<Option<AnyInstance>> {
        scope.ensure_active()?;
        if key.is::<ScopedProvider>() {
            return Ok(Some(Arc::new(ScopedProvider::new(scope.clone())) as AnyInstance));
        }
        if key.is::<ScopeFactory>() {
            return Ok(Some(Arc::new(ScopeFactory::new(scope.root_arc())) as AnyInstance));
        }
        let Some(slot) = self.winning(&key) else {
            return Ok(None);
        };
        let producer = self.producer_for_slot(key, slot)?;
        producer(scope, ctx).map(Some)
    }

    /// Resolve every registration of `key`, in registration order.
    pub(crate) fn resolve_all_key(
        &self,
        scope: &Arc<ScopeInner>,
        key: ServiceKey,
        ctx: &ResolveContext,
    ) -> DiResult<Vec<AnyInstance>> {
        scope.ensure_active()?;
        let producer = self.enumerable_producer(key)?;
        let value = producer(scope, ctx)?;
        let items = value
            .downcast::<Vec<AnyInstance>>()
            .map_err(|_| DiError::InvalidServiceType {
                message: "enumerable site produced a non-sequence value".to_string(),
            })?;
        Ok(items.as_ref().clone())
    }

    /// Resolve the specific descriptor at `index` (used for per-slot eager
    /// singleton materialization during child composition).
    pub(crate) fn resolve_slot(
        &self,
        scope: &Arc<ScopeInner>,
        index: usize,
        ctx: &ResolveContext,
    ) -> DiResult<AnyInstance> {
        scope.ensure_active()?;
        let descriptor = self
            .descriptors
            .get(index)
            .ok_or_else(|| DiError::ResolutionFailed {
                message: format!("descriptor index {index} out of range"),
            })?;
        let producer = self.producer_for_slot(descriptor.key, index)?;
        producer(scope, ctx)
    }

    /// Eagerly walk every registration's call-site without instantiating,
    /// surfacing wiring errors at startup instead of first use.
    pub(crate) fn validate(&self) -> DiResult<()> {
        let builder = CallSiteBuilder::new(&self.descriptors);
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            match &descriptor.source {
                ServiceSource::OpenGeneric { binder, .. } => {
                    for key in binder.keys() {
                        builder.site_for_slot(index, key, &mut Vec::new())?;
                    }
                }
                _ => {
                    builder.site_for_slot(index, descriptor.key, &mut Vec::new())?;
                }
            }
        }
        tracing::info!("Validated {} registrations", self.descriptors.len());
        Ok(())
    }
}

fn execute_site(
    site: &Arc<CallSite>,
    scope: &Arc<ScopeInner>,
    ctx: &ResolveContext,
) -> DiResult<AnyInstance> {
    match site.cache {
        CacheLocation::Root => {
            let root = scope.root_arc();
            cached(site, &root, ctx)
        }
        CacheLocation::Scope => cached(site, scope, ctx),
        CacheLocation::Dispose => {
            let value = produce(site, scope, ctx)?;
            scope.track(&site.disposal, site.key.type_name, &value);
            Ok(value)
        }
        CacheLocation::None => produce(site, scope, ctx),
    }
}

/// Cache-or-produce with exactly-once materialization per (scope, slot).
/// Dependencies of a cached value resolve against the owning scope, so a
/// singleton's transient disposables land in the root scope.
///
/// The chain guard runs before the cell is entered: a factory that
/// re-resolves its own contract would otherwise re-enter the same `OnceCell`
/// on this thread and block forever instead of reporting the cycle.
fn cached(
    site: &Arc<CallSite>,
    scope: &Arc<ScopeInner>,
    ctx: &ResolveContext,
) -> DiResult<AnyInstance> {
    scope.ensure_active()?;
    let cell = scope.cache_cell(site.key.type_id, site.slot);
    if let Some(value) = cell.get() {
        return Ok(value.clone());
    }
    ctx.enter(site.key)?;
    let result = cell.get_or_try_init(|| {
        let produced = produce_value(site, scope, ctx)?;
        scope.track(&site.disposal, site.key.type_name, &produced);
        Ok::<_, DiError>(produced)
    });
    ctx.exit();
    Ok(result?.clone())
}

/// Chain-guarded production for the uncached paths; [`cached`] guards the
/// cell itself and calls [`produce_value`] directly.
fn produce(
    site: &Arc<CallSite>,
    scope: &Arc<ScopeInner>,
    ctx: &ResolveContext,
) -> DiResult<AnyInstance> {
    match &site.kind {
        CallSiteKind::Factory(_) | CallSiteKind::Constructor { .. } => {
            ctx.enter(site.key)?;
            let result = produce_value(site, scope, ctx);
            ctx.exit();
            result
        }
        _ => produce_value(site, scope, ctx),
    }
}

fn produce_value(
    site: &Arc<CallSite>,
    scope: &Arc<ScopeInner>,
    ctx: &ResolveContext,
) -> DiResult<AnyInstance> {
    match &site.kind {
        CallSiteKind::Constant(value) => Ok(value.clone()),
        CallSiteKind::Factory(factory) => {
            let resolver = Resolver::new(scope, ctx);
            factory(&resolver)
        }
        CallSiteKind::Constructor { params, construct } => {
            let args: DiResult<Vec<AnyInstance>> =
                params.iter().map(|p| execute_site(p, scope, ctx)).collect();
            construct(args?)
        }
        CallSiteKind::Enumerable(members) => {
            let items: DiResult<Vec<AnyInstance>> =
                members.iter().map(|m| execute_site(m, scope, ctx)).collect();
            Ok(Arc::new(items?) as AnyInstance)
        }
        CallSiteKind::Provider => {
            Ok(Arc::new(ScopedProvider::new(scope.clone())) as AnyInstance)
        }
        CallSiteKind::ScopeFactory => {
            Ok(Arc::new(ScopeFactory::new(scope.root_arc())) as AnyInstance)
        }
    }
}
