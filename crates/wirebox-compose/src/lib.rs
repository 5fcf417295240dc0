//! Parent/child container composition for wirebox.
//!
//! A [`ChildServiceCollection`] layers new registrations over a parent
//! [`wirebox_di::ServiceProvider`]'s frozen store. Building the child
//! rewrites parent registrations per lifetime: transients and scoped
//! services are copied (the child constructs and owns them), closed
//! singletons are pre-resolved from the parent and shared by identity (the
//! parent keeps their teardown), and singleton open-generic families follow
//! the configured [`OpenGenericBehavior`]. The [`ReRoutingProvider`] is the
//! request-forwarding shim behind the `Delegate` behavior, and is usable on
//! its own for per-type request re-routing.

pub mod child;
pub mod reroute;

pub use child::{ChildProvider, ChildServiceCollection, OpenGenericBehavior};
pub use reroute::ReRoutingProvider;
