//! Long-lived services and the registry that drives them.
//!
//! A service is a lifecycle object the host registers once and keeps for
//! the whole run. Services that also implement [`Updatable`] are ticked by
//! [`ServiceRegistry::update_services`] in registration order.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use crate::error::{HookError, HookResult};
use crate::key::TypeKey;
use crate::object::{DynObject, Erased, Lifecycle, Shared};

mod error_handler;
mod registry;

pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use registry::ServiceRegistry;

/// A service ticked once per frame while Activated.
pub trait Updatable: Lifecycle {
    fn update(&mut self, elapsed: Duration) -> HookResult;
}

/// Update entry point of a concrete updatable type.
pub type UpdateFn = fn(&mut dyn Any, Duration) -> HookResult;

fn update_as<T: Updatable>(object: &mut dyn Any, elapsed: Duration) -> HookResult {
    match object.downcast_mut::<T>() {
        Some(service) => service.update(elapsed),
        None => Err(HookError::from(format!(
            "update target is not a {}",
            std::any::type_name::<T>()
        ))),
    }
}

/// Capability tag of a service.
#[derive(Clone, Copy)]
pub enum ServiceKind {
    Plain,
    Updatable(UpdateFn),
}

impl ServiceKind {
    pub fn is_updatable(&self) -> bool {
        matches!(self, ServiceKind::Updatable(_))
    }

    pub(crate) fn update_fn(&self) -> Option<UpdateFn> {
        match self {
            ServiceKind::Plain => None,
            ServiceKind::Updatable(update) => Some(*update),
        }
    }
}

impl fmt::Debug for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Plain => f.write_str("Plain"),
            ServiceKind::Updatable(_) => f.write_str("Updatable"),
        }
    }
}

/// A service instance on its way into the registry.
///
/// ```rust
/// use std::time::Duration;
/// use ferrous_lifecycle::{shared, HookResult, Lifecycle, ServiceInstance, Updatable};
///
/// #[derive(Default)]
/// struct Physics {
///     steps: u32,
/// }
///
/// impl Lifecycle for Physics {}
///
/// impl Updatable for Physics {
///     fn update(&mut self, _elapsed: Duration) -> HookResult {
///         self.steps += 1;
///         Ok(())
///     }
/// }
///
/// let instance = ServiceInstance::updatable(shared(Physics::default()));
/// assert!(instance.is_updatable());
/// assert_eq!(instance.type_key().short_name(), "Physics");
/// ```
#[derive(Clone)]
pub struct ServiceInstance {
    pub(crate) erased: Erased,
    kind: ServiceKind,
}

impl ServiceInstance {
    pub fn plain<T: Lifecycle>(object: Shared<T>) -> Self {
        Self {
            erased: Erased::new(object),
            kind: ServiceKind::Plain,
        }
    }

    pub fn updatable<T: Updatable>(object: Shared<T>) -> Self {
        Self {
            erased: Erased::new(object),
            kind: ServiceKind::Updatable(update_as::<T>),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.erased.key
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn is_updatable(&self) -> bool {
        self.kind.is_updatable()
    }

    /// Type-erased handle to the instance.
    pub fn object(&self) -> DynObject {
        self.erased.object.clone()
    }

    /// Typed handle, if the instance is a `T`.
    pub fn downcast<T: Lifecycle>(&self) -> Option<Shared<T>> {
        self.erased
            .value
            .clone()
            .downcast::<std::cell::RefCell<T>>()
            .ok()
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("type", &self.erased.key)
            .field("kind", &self.kind)
            .finish()
    }
}
