//! Static constructor binding.
//!
//! Instead of inspecting constructors at runtime, a registration declares its
//! dependencies as a tuple of `Arc<T>` arguments. The tuple contributes the
//! declared dependency keys for graph building and reassembles the resolved
//! instances before the constructor body runs.

use std::sync::Arc;

use crate::descriptor::{downcast, AnyInstance, ServiceKey};
use crate::error::{DiError, DiResult};

/// A tuple of constructor arguments with statically known dependency keys.
pub trait ActivationArgs: Sized {
    /// Dependency keys, in argument order.
    fn keys() -> Vec<ServiceKey>;

    /// Reassemble the tuple from resolved instances (same order as `keys`).
    fn from_instances(instances: Vec<AnyInstance>) -> DiResult<Self>;
}

fn next_arg<T: Send + Sync + 'static>(
    iter: &mut std::vec::IntoIter<AnyInstance>,
) -> DiResult<Arc<T>> {
    let value = iter.next().ok_or_else(|| DiError::ResolutionFailed {
        message: format!(
            "constructor argument list ended before {}",
            std::any::type_name::<T>()
        ),
    })?;
    downcast::<T>(value)
}

macro_rules! impl_activation_args {
    ($($ty:ident),*) => {
        impl<$($ty: Send + Sync + 'static),*> ActivationArgs for ($(Arc<$ty>,)*) {
            fn keys() -> Vec<ServiceKey> {
                vec![$(ServiceKey::of::<$ty>()),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn from_instances(instances: Vec<AnyInstance>) -> DiResult<Self> {
                let mut iter = instances.into_iter();
                Ok(($(next_arg::<$ty>(&mut iter)?,)*))
            }
        }
    };
}

impl_activation_args!();
impl_activation_args!(A);
impl_activation_args!(A, B);
impl_activation_args!(A, B, C);
impl_activation_args!(A, B, C, D);
impl_activation_args!(A, B, C, D, E);
impl_activation_args!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;

    struct Left(u32);
    struct Right(&'static str);

    #[test]
    fn tuple_keys_are_ordered() {
        let keys = <(Arc<Left>, Arc<Right>)>::keys();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].is::<Left>());
        assert!(keys[1].is::<Right>());
    }

    #[test]
    fn tuple_reassembles_instances() {
        let instances: Vec<AnyInstance> =
            vec![Arc::new(Left(7)), Arc::new(Right("r"))];
        let (left, right) =
            <(Arc<Left>, Arc<Right>)>::from_instances(instances).unwrap();
        assert_eq!(left.0, 7);
        assert_eq!(right.0, "r");
    }

    #[test]
    fn mismatched_instance_fails_downcast() {
        let instances: Vec<AnyInstance> = vec![Arc::new(Right("r"))];
        let result = <(Arc<Left>,)>::from_instances(instances);
        assert!(matches!(result, Err(DiError::InvalidServiceType { .. })));
    }
}
