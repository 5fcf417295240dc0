//! Error types shared by every wirebox crate.

/// Errors that can occur during registration, resolution or disposal.
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    #[error("Service not registered: {service_type}")]
    ServiceNotRegistered { service_type: String },

    #[error("Cyclic dependency detected: {chain}")]
    CyclicDependency { chain: String },

    #[error("Captive dependency: singleton {outer} transitively depends on scoped {inner}")]
    CaptiveDependency { outer: String, inner: String },

    #[error("Named registration already exists: {name}")]
    DuplicateName { name: String },

    #[error("Parent singleton registrations cannot be rewritten for a child provider: {services}")]
    UnsupportedParentSingleton { services: String },

    #[error("Already disposed: {context}")]
    AlreadyDisposed { context: String },

    #[error("{service_type} only supports asynchronous disposal but synchronous disposal was requested")]
    AsyncDisposableOnSyncPath { service_type: String },

    #[error("Name forwarding cycled or exceeded the hop bound: {chain}")]
    ForwardingCycle { chain: String },

    #[error("Descriptor index {index} lies in the read-only parent range 0..{parent_count}")]
    ImmutableParentDescriptor { index: usize, parent_count: usize },

    #[error("Invalid service type: {message}")]
    InvalidServiceType { message: String },

    #[error("Dependency resolution failed: {message}")]
    ResolutionFailed { message: String },
}

/// Result alias used across the workspace.
pub type DiResult<T> = Result<T, DiError>;
