//! Dependency injection runtime for wirebox.
//!
//! This crate provides the registration store, the call-site graph builder
//! and the lifetime-aware resolution engine. Registrations are collected in
//! a [`ServiceCollection`], frozen into a [`ServiceProvider`], and resolved
//! against scopes that own per-scope caches and deterministic teardown.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use wirebox_di::{Lifetime, ServiceCollection};
//!
//! struct Config { url: String }
//! struct Client { config: Arc<Config> }
//!
//! let mut services = ServiceCollection::new();
//! services.add_instance(Arc::new(Config { url: "localhost".into() }));
//! services.add_constructed(Lifetime::Singleton, |(config,): (Arc<Config>,)| {
//!     Ok(Client { config })
//! });
//!
//! let provider = services.build().unwrap();
//! let client = provider.resolve_required::<Client>().unwrap();
//! assert_eq!(client.config.url, "localhost");
//! ```
//!
//! Resolution is lifetime-correct: singletons cache at the root, scoped
//! services cache per [`ServiceScope`], transients are fresh each time, and
//! disposable transients are tracked by the resolving scope. Wiring errors
//! (missing, cyclic and captive dependencies) surface when the dependency
//! graph is built, not at first use.

pub mod activation;
pub mod collection;
pub mod descriptor;
pub mod dispose;
pub mod error;
pub mod module;
pub mod provider;
pub mod scope;

mod callsite;
mod engine;

pub use activation::ActivationArgs;
pub use collection::ServiceCollection;
pub use descriptor::{
    AnyInstance, ConstructFn, GenericBinder, Lifetime, ServiceDescriptor, ServiceFactory,
    ServiceKey, ServiceSource,
};
pub use dispose::{AsyncDispose, DisposalHook, Dispose};
pub use error::{DiError, DiResult};
pub use module::{
    discovered_module_count, discovered_module_names, register_discovered_modules,
    ModuleRegistration,
};
pub use provider::{DynResolve, Resolver, ScopedProvider, ServiceProvider};
pub use scope::{ScopeFactory, ServiceScope};

// re-exported so feature crates can `inventory::submit!` without adding the
// dependency themselves
pub use inventory;
