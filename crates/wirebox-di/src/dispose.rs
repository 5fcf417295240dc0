//! Disposal capabilities and the registration-time hooks that capture them.
//!
//! There is no runtime reflection: whether a service participates in scope
//! teardown is decided when it is registered, by attaching a [`DisposalHook`]
//! that knows how to downcast the type-erased instance back to its disposable
//! trait object.

use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptor::AnyInstance;
use crate::error::DiResult;

/// Synchronous teardown capability.
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> DiResult<()>;
}

/// Asynchronous teardown capability.
#[async_trait]
pub trait AsyncDispose: Send + Sync {
    async fn dispose_async(&self) -> DiResult<()>;
}

type SyncHook = Arc<dyn Fn(&AnyInstance) -> Option<Arc<dyn Dispose>> + Send + Sync>;
type AsyncHook = Arc<dyn Fn(&AnyInstance) -> Option<Arc<dyn AsyncDispose>> + Send + Sync>;

/// Downcast-and-coerce hooks captured at registration time for a concrete
/// service type. An empty hook means the engine never tracks the instance.
#[derive(Clone, Default)]
pub struct DisposalHook {
    pub(crate) sync: Option<SyncHook>,
    pub(crate) async_: Option<AsyncHook>,
}

impl DisposalHook {
    /// No tracking: the instance is externally owned.
    pub fn none() -> Self {
        Self::default()
    }

    /// Track instances of `T` for synchronous teardown.
    pub fn sync<T: Dispose + 'static>() -> Self {
        Self {
            sync: Some(Arc::new(|any| {
                any.clone().downcast::<T>().ok().map(|v| v as Arc<dyn Dispose>)
            })),
            async_: None,
        }
    }

    /// Track instances of `T` that only support asynchronous teardown.
    pub fn async_only<T: AsyncDispose + 'static>() -> Self {
        Self {
            sync: None,
            async_: Some(Arc::new(|any| {
                any.clone().downcast::<T>().ok().map(|v| v as Arc<dyn AsyncDispose>)
            })),
        }
    }

    /// Track instances of `T` on both teardown paths.
    pub fn sync_and_async<T: Dispose + AsyncDispose + 'static>() -> Self {
        Self {
            sync: Self::sync::<T>().sync,
            async_: Self::async_only::<T>().async_,
        }
    }

    pub fn is_none(&self) -> bool {
        self.sync.is_none() && self.async_.is_none()
    }

    /// Build a scope-tracked entry for a produced instance, if any hook bites.
    pub(crate) fn capture(&self, type_name: &'static str, value: &AnyInstance) -> Option<DisposeEntry> {
        let sync = self.sync.as_ref().and_then(|h| h(value));
        let async_ = self.async_.as_ref().and_then(|h| h(value));
        if sync.is_none() && async_.is_none() {
            return None;
        }
        Some(DisposeEntry { type_name, sync, async_ })
    }
}

impl std::fmt::Debug for DisposalHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalHook")
            .field("sync", &self.sync.is_some())
            .field("async", &self.async_.is_some())
            .finish()
    }
}

/// One captured disposable held by a scope until teardown.
pub(crate) struct DisposeEntry {
    pub(crate) type_name: &'static str,
    pub(crate) sync: Option<Arc<dyn Dispose>>,
    pub(crate) async_: Option<Arc<dyn AsyncDispose>>,
}
