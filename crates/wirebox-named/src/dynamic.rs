//! Dynamic lookup: a fallback consulted when a name has no registration.

use std::sync::Arc;

use wirebox_di::{DiResult, Lifetime, ScopedProvider};

/// A named factory closure, invoked with a provider bound to the resolving
/// scope.
pub type NamedFactory<T> = Arc<dyn Fn(&ScopedProvider) -> DiResult<Arc<T>> + Send + Sync>;

/// What a dynamic-lookup fallback may supply for a missing name.
pub enum DynamicNamed<T> {
    /// A pre-built value; the registry does not own its teardown.
    Instance(Arc<T>),
    /// A factory registration with the given per-name lifetime.
    Registration {
        lifetime: Lifetime,
        factory: NamedFactory<T>,
    },
    /// An alias onto another name.
    Forward(String),
}

/// The fallback itself. Invoked at most once per distinct missing name; its
/// answer (including a miss) is recorded permanently.
pub type DynamicFallback<T> = Arc<dyn Fn(&str) -> Option<DynamicNamed<T>> + Send + Sync>;
