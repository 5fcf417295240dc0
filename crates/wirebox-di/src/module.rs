//! Auto-discovery module registration using the inventory crate.
//!
//! Feature crates submit [`ModuleRegistration`] entries with
//! `inventory::submit!`; [`register_discovered_modules`] collects them at
//! startup and applies them to a [`ServiceCollection`] in priority order.

use tracing::{debug, info};

use crate::collection::ServiceCollection;
use crate::error::{DiError, DiResult};

/// A module registration entry collected via inventory.
pub struct ModuleRegistration {
    /// Name of the module (e.g. "storage", "http").
    pub name: &'static str,

    /// Registration function applied to the shared collection.
    pub register_fn: fn(&mut ServiceCollection) -> DiResult<()>,

    /// Registration order (lower = earlier, default = 100).
    pub priority: u32,

    /// Names of modules that must be registered before this one.
    pub dependencies: &'static [&'static str],
}

impl ModuleRegistration {
    pub const fn new(
        name: &'static str,
        register_fn: fn(&mut ServiceCollection) -> DiResult<()>,
    ) -> Self {
        Self {
            name,
            register_fn,
            priority: 100,
            dependencies: &[],
        }
    }

    pub const fn with_priority(
        name: &'static str,
        register_fn: fn(&mut ServiceCollection) -> DiResult<()>,
        priority: u32,
    ) -> Self {
        Self {
            name,
            register_fn,
            priority,
            dependencies: &[],
        }
    }

    pub const fn with_dependencies(
        name: &'static str,
        register_fn: fn(&mut ServiceCollection) -> DiResult<()>,
        priority: u32,
        dependencies: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            register_fn,
            priority,
            dependencies,
        }
    }
}

inventory::collect!(ModuleRegistration);

/// Apply every submitted module to `services`, sorted by priority (stable, so
/// equal priorities keep link order). A module whose declared dependency has
/// not run yet fails the whole pass.
pub fn register_discovered_modules(services: &mut ServiceCollection) -> DiResult<()> {
    let mut modules: Vec<&ModuleRegistration> = inventory::iter::<ModuleRegistration>().collect();
    modules.sort_by_key(|m| m.priority);

    info!("Discovered {} module registrations", modules.len());

    let mut applied: Vec<&'static str> = Vec::with_capacity(modules.len());
    for module in modules {
        if let Some(missing) = module
            .dependencies
            .iter()
            .find(|dep| !applied.contains(dep))
        {
            return Err(DiError::ResolutionFailed {
                message: format!(
                    "module '{}' requires module '{}' to be registered first",
                    module.name, missing
                ),
            });
        }
        debug!(
            "Registering module '{}' (priority: {})",
            module.name, module.priority
        );
        (module.register_fn)(services)?;
        applied.push(module.name);
    }

    info!("All discovered modules registered");
    Ok(())
}

/// Number of submitted module registrations. Useful in diagnostics and tests.
pub fn discovered_module_count() -> usize {
    inventory::iter::<ModuleRegistration>().count()
}

/// Names of all submitted modules, in link order.
pub fn discovered_module_names() -> Vec<&'static str> {
    inventory::iter::<ModuleRegistration>().map(|m| m.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Marker;

    fn register_marker(services: &mut ServiceCollection) -> DiResult<()> {
        services.add_instance(Arc::new(Marker));
        Ok(())
    }

    inventory::submit! {
        ModuleRegistration::new("marker", register_marker)
    }

    #[test]
    fn submitted_module_is_discovered() {
        assert!(discovered_module_count() >= 1);
        assert!(discovered_module_names().contains(&"marker"));
    }

    #[test]
    fn discovered_modules_apply_to_collection() {
        let mut services = ServiceCollection::new();
        register_discovered_modules(&mut services).unwrap();
        assert!(services.contains::<Marker>());
    }
}
