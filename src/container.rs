//! Type registration container.
//!
//! The container maps a concrete service type to one instance, either given
//! up front or built lazily by a factory on first [`Container::resolve`].
//! Interceptors subscribed with [`Container::add_interceptor`] hear about
//! every registration, unregistration and constructed instance; the service
//! registry uses exactly that to learn about new services.
//!
//! The container is a cheap cloneable handle so factories (and hooks) can
//! hold on to it.

use std::fmt;
use std::rc::Rc;
use std::cell::RefCell;

use crate::error::{LifecycleError, LifecycleResult};
use crate::internal::FastMap;
use crate::key::TypeKey;
use crate::object::{shared, Lifecycle, Shared};
use crate::services::{ServiceInstance, Updatable};

/// Subscriber to container notifications.
///
/// Notifications fire after the container state is updated and with no
/// internal borrow held, so interceptors may call back into the container.
pub trait ContainerInterceptor {
    /// A service type was registered.
    fn on_registered(&self, _key: TypeKey) {}

    /// A service type was unregistered.
    fn on_unregistered(&self, _key: TypeKey) {}

    /// An instance became available: registered directly, or just built by
    /// a factory. Fires once per instance.
    fn on_instanced(&self, _instance: &ServiceInstance) {}
}

type MakeFn = Rc<dyn Fn(&Container) -> LifecycleResult<ServiceInstance>>;

enum Registration {
    Instance(ServiceInstance),
    Factory {
        make: MakeFn,
        instance: Option<ServiceInstance>,
        constructing: bool,
    },
}

#[derive(Default)]
struct Registrations {
    by_type: FastMap<TypeKey, Registration>,
    order: Vec<TypeKey>,
}

#[derive(Default)]
struct ContainerInner {
    registrations: RefCell<Registrations>,
    interceptors: RefCell<Vec<Rc<dyn ContainerInterceptor>>>,
}

/// Registration container for lifecycle services.
///
/// # Examples
///
/// ```rust
/// use ferrous_lifecycle::{Container, Lifecycle};
///
/// struct Audio {
///     volume: u8,
/// }
/// impl Lifecycle for Audio {}
///
/// struct Mixer {
///     channels: usize,
/// }
/// impl Lifecycle for Mixer {}
///
/// let container = Container::new();
/// container.register_instance(Audio { volume: 7 })?;
/// container.register_type(|c: &Container| {
///     let audio = c.resolve::<Audio>()?;
///     let channels = audio.borrow().volume as usize;
///     Ok(Mixer { channels })
/// })?;
///
/// assert_eq!(container.resolve::<Mixer>()?.borrow().channels, 7);
/// assert!(container.register_instance(Audio { volume: 1 }).is_err());
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
#[derive(Clone, Default)]
pub struct Container {
    inner: Rc<ContainerInner>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `interceptor` to later notifications.
    pub fn add_interceptor(&self, interceptor: Rc<dyn ContainerInterceptor>) {
        self.inner.interceptors.borrow_mut().push(interceptor);
    }

    /// Registers `value` as the instance of `T`.
    pub fn register_instance<T: Lifecycle>(&self, value: T) -> LifecycleResult<Shared<T>> {
        self.register_shared(shared(value))
    }

    /// Registers an instance the caller keeps a handle to.
    pub fn register_shared<T: Lifecycle>(&self, object: Shared<T>) -> LifecycleResult<Shared<T>> {
        self.add_instance(ServiceInstance::plain(object.clone()))?;
        Ok(object)
    }

    pub fn register_updatable_instance<T: Updatable>(&self, value: T) -> LifecycleResult<Shared<T>> {
        self.register_updatable_shared(shared(value))
    }

    pub fn register_updatable_shared<T: Updatable>(
        &self,
        object: Shared<T>,
    ) -> LifecycleResult<Shared<T>> {
        self.add_instance(ServiceInstance::updatable(object.clone()))?;
        Ok(object)
    }

    /// Registers a factory for `T`, run on the first [`resolve`](Self::resolve).
    pub fn register_type<T, F>(&self, factory: F) -> LifecycleResult<()>
    where
        T: Lifecycle,
        F: Fn(&Container) -> LifecycleResult<T> + 'static,
    {
        let make: MakeFn =
            Rc::new(move |container| Ok(ServiceInstance::plain(shared(factory(container)?))));
        self.add_factory(TypeKey::of::<T>(), make)
    }

    pub fn register_updatable_type<T, F>(&self, factory: F) -> LifecycleResult<()>
    where
        T: Updatable,
        F: Fn(&Container) -> LifecycleResult<T> + 'static,
    {
        let make: MakeFn =
            Rc::new(move |container| Ok(ServiceInstance::updatable(shared(factory(container)?))));
        self.add_factory(TypeKey::of::<T>(), make)
    }

    fn add_instance(&self, instance: ServiceInstance) -> LifecycleResult<()> {
        let key = instance.type_key();
        self.insert(key, Registration::Instance(instance.clone()))?;
        self.notify(|interceptor| {
            interceptor.on_registered(key);
            interceptor.on_instanced(&instance);
        });
        Ok(())
    }

    fn add_factory(&self, key: TypeKey, make: MakeFn) -> LifecycleResult<()> {
        self.insert(
            key,
            Registration::Factory {
                make,
                instance: None,
                constructing: false,
            },
        )?;
        self.notify(|interceptor| interceptor.on_registered(key));
        Ok(())
    }

    fn insert(&self, key: TypeKey, registration: Registration) -> LifecycleResult<()> {
        let mut registrations = self.inner.registrations.borrow_mut();
        if registrations.by_type.contains_key(&key) {
            return Err(LifecycleError::DuplicateRegistration(key.name()));
        }
        registrations.by_type.insert(key, registration);
        registrations.order.push(key);
        tracing::debug!(ty = key.name(), "type registered");
        Ok(())
    }

    /// The instance of `T`, built by its factory on first use.
    ///
    /// A factory that resolves its own type fails with
    /// [`LifecycleError::ResolutionCycle`]; a failed construction leaves the
    /// registration ready for another attempt.
    pub fn resolve<T: Lifecycle>(&self) -> LifecycleResult<Shared<T>> {
        let key = TypeKey::of::<T>();
        let make = {
            let mut registrations = self.inner.registrations.borrow_mut();
            match registrations.by_type.get_mut(&key) {
                None => return Err(LifecycleError::NotRegistered(key.name())),
                Some(Registration::Instance(instance))
                | Some(Registration::Factory {
                    instance: Some(instance),
                    ..
                }) => return typed(instance, key),
                Some(Registration::Factory {
                    constructing: true, ..
                }) => return Err(LifecycleError::ResolutionCycle(key.name())),
                Some(Registration::Factory {
                    make, constructing, ..
                }) => {
                    *constructing = true;
                    make.clone()
                }
            }
        };

        let built = make(self);

        let stored = {
            let mut registrations = self.inner.registrations.borrow_mut();
            match registrations.by_type.get_mut(&key) {
                Some(Registration::Factory {
                    instance,
                    constructing,
                    ..
                }) => {
                    *constructing = false;
                    if let Ok(built) = &built {
                        *instance = Some(built.clone());
                    }
                    true
                }
                _ => false,
            }
        };

        let instance = built?;
        if stored {
            tracing::debug!(ty = key.name(), "instance constructed");
            self.notify(|interceptor| interceptor.on_instanced(&instance));
        }
        typed(&instance, key)
    }

    /// Like [`resolve`](Self::resolve), but `None` on any failure.
    pub fn try_resolve<T: Lifecycle>(&self) -> Option<Shared<T>> {
        self.resolve().ok()
    }

    pub fn is_registered<T: Lifecycle>(&self) -> bool {
        self.is_registered_key(TypeKey::of::<T>())
    }

    pub fn is_registered_key(&self, key: TypeKey) -> bool {
        self.inner.registrations.borrow().by_type.contains_key(&key)
    }

    /// Removes the registration of `T`. Returns false if there was none.
    pub fn unregister<T: Lifecycle>(&self) -> bool {
        self.unregister_key(TypeKey::of::<T>())
    }

    pub fn unregister_key(&self, key: TypeKey) -> bool {
        let removed = {
            let mut registrations = self.inner.registrations.borrow_mut();
            let removed = registrations.by_type.remove(&key).is_some();
            if removed {
                registrations.order.retain(|registered| *registered != key);
            }
            removed
        };
        if removed {
            tracing::debug!(ty = key.name(), "type unregistered");
            self.notify(|interceptor| interceptor.on_unregistered(key));
        }
        removed
    }

    /// Registered types, oldest first.
    pub fn registered_types(&self) -> Vec<TypeKey> {
        self.inner.registrations.borrow().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.registrations.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregisters every type, newest first.
    pub fn clear(&self) {
        for key in self.registered_types().into_iter().rev() {
            self.unregister_key(key);
        }
    }

    fn notify(&self, event: impl Fn(&dyn ContainerInterceptor)) {
        let interceptors: Vec<Rc<dyn ContainerInterceptor>> =
            self.inner.interceptors.borrow().clone();
        for interceptor in &interceptors {
            event(interceptor.as_ref());
        }
    }
}

fn typed<T: Lifecycle>(instance: &ServiceInstance, key: TypeKey) -> LifecycleResult<Shared<T>> {
    instance
        .downcast::<T>()
        .ok_or(LifecycleError::NotRegistered(key.name()))
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registered_types())
            .field("interceptors", &self.inner.interceptors.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe;
    impl Lifecycle for Probe {}

    #[derive(Debug)]
    struct Looping;
    impl Lifecycle for Looping {}

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl ContainerInterceptor for Recorder {
        fn on_registered(&self, key: TypeKey) {
            self.events.borrow_mut().push(format!("registered {}", key.short_name()));
        }

        fn on_unregistered(&self, key: TypeKey) {
            self.events.borrow_mut().push(format!("unregistered {}", key.short_name()));
        }

        fn on_instanced(&self, instance: &ServiceInstance) {
            self.events
                .borrow_mut()
                .push(format!("instanced {}", instance.type_key().short_name()));
        }
    }

    #[test]
    fn factory_runs_once_and_fires_instanced_once() {
        let container = Container::new();
        let recorder = Rc::new(Recorder::default());
        container.add_interceptor(recorder.clone());

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        container
            .register_type(move |_: &Container| {
                counter.set(counter.get() + 1);
                Ok(Probe)
            })
            .unwrap();

        let first = container.resolve::<Probe>().unwrap();
        let second = container.resolve::<Probe>().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);
        assert_eq!(
            *recorder.events.borrow(),
            vec!["registered Probe", "instanced Probe"]
        );
    }

    #[test]
    fn self_resolving_factory_reports_cycle_and_can_retry() {
        let container = Container::new();
        container
            .register_type(|c: &Container| {
                c.resolve::<Looping>()?;
                Ok(Looping)
            })
            .unwrap();

        let err = container.resolve::<Looping>().unwrap_err();
        assert!(matches!(err, LifecycleError::ResolutionCycle(name) if name.ends_with("Looping")));
        assert!(container.resolve::<Looping>().is_err());
    }

    #[test]
    fn duplicates_are_rejected_and_unknown_types_reported() {
        let container = Container::new();
        container.register_instance(Probe).unwrap();
        assert!(matches!(
            container.register_type(|_: &Container| Ok(Probe)),
            Err(LifecycleError::DuplicateRegistration(_))
        ));
        assert!(matches!(
            container.resolve::<Looping>(),
            Err(LifecycleError::NotRegistered(_))
        ));
        assert!(container.try_resolve::<Looping>().is_none());
    }

    #[test]
    fn clear_unregisters_newest_first() {
        let container = Container::new();
        let recorder = Rc::new(Recorder::default());
        container.register_instance(Probe).unwrap();
        container.register_instance(Looping).unwrap();
        container.add_interceptor(recorder.clone());

        container.clear();
        assert!(container.is_empty());
        assert_eq!(
            *recorder.events.borrow(),
            vec!["unregistered Looping", "unregistered Probe"]
        );
        assert!(!container.unregister::<Probe>());
    }
}
