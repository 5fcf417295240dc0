//! Named service registries for wirebox.
//!
//! A [`NamedRegistry`] holds many registrations of a single contract type,
//! keyed by case-sensitive names, each with its own lifetime. Names can
//! forward to other names, missing names can be answered by a dynamic
//! fallback (consulted at most once per name), and the empty name is the
//! reserved default that [`NamedRegistry::attach`] promotes into an ordinary
//! typed registration.

pub mod dynamic;
pub mod registry;

pub use dynamic::{DynamicFallback, DynamicNamed, NamedFactory};
pub use registry::NamedRegistry;
