//! Request re-routing across provider boundaries.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use wirebox_di::{AnyInstance, DiError, DiResult, DynResolve, GenericBinder, ServiceKey};

/// A provider that answers resolution requests through per-type routes.
///
/// Exact routes are consulted first, then the wrapped default provider, then
/// family routes (binder-matched keys of delegated open-generic families).
/// Routes can be overwritten; the last route registered for a type wins.
pub struct ReRoutingProvider {
    default: Arc<dyn DynResolve + Send + Sync>,
    routes: HashMap<TypeId, Arc<dyn DynResolve + Send + Sync>>,
    family_routes: Vec<(GenericBinder, Arc<dyn DynResolve + Send + Sync>)>,
}

impl ReRoutingProvider {
    pub fn new(default: Arc<dyn DynResolve + Send + Sync>) -> Self {
        Self {
            default,
            routes: HashMap::new(),
            family_routes: Vec::new(),
        }
    }

    /// Route the given contract keys to `provider`, overwriting earlier
    /// routes for the same keys.
    pub fn re_route(
        &mut self,
        provider: Arc<dyn DynResolve + Send + Sync>,
        keys: impl IntoIterator<Item = ServiceKey>,
    ) {
        for key in keys {
            debug!("Re-routing {} to alternate provider", key.type_name);
            self.routes.insert(key.type_id, provider.clone());
        }
    }

    /// Route every closed key of a delegated open-generic family to
    /// `provider`, consulted only after the default provider misses.
    pub fn re_route_family(
        &mut self,
        binder: GenericBinder,
        provider: Arc<dyn DynResolve + Send + Sync>,
    ) {
        self.family_routes.push((binder, provider));
    }

    /// Typed convenience over [`DynResolve::resolve_any`].
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.resolve_any(&ServiceKey::of::<T>())? {
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::InvalidServiceType {
                    message: format!(
                        "routed instance does not downcast to {}",
                        std::any::type_name::<T>()
                    ),
                }),
            None => Ok(None),
        }
    }

    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>()?.ok_or_else(|| DiError::ServiceNotRegistered {
            service_type: std::any::type_name::<T>().to_string(),
        })
    }
}

impl DynResolve for ReRoutingProvider {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<Option<AnyInstance>> {
        if let Some(routed) = self.routes.get(&key.type_id) {
            return routed.resolve_any(key);
        }
        if let Some(value) = self.default.resolve_any(key)? {
            return Ok(Some(value));
        }
        for (binder, provider) in &self.family_routes {
            if binder.matches(key) {
                return provider.resolve_any(key);
            }
        }
        Ok(None)
    }
}
