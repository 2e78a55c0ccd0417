//! The host surface.
//!
//! An [`Application`] owns the container, the object graph and the service
//! registry, and exposes the calls a game loop or service host makes:
//! register services, initialize once, update every frame, and forward
//! activation, suspension and shutdown.

use std::rc::Rc;
use std::time::Duration;

use crate::config::RuntimeOptions;
use crate::container::Container;
use crate::error::{LifecycleError, LifecycleResult};
use crate::object::{Lifecycle, ObjectGraph, ObjectId, Shared};
use crate::services::{DefaultErrorHandler, ErrorHandler, ServiceRegistry, Updatable};

/// Explicit application context.
///
/// Every registration helper applies the resulting container notifications
/// before returning, so a service registered after
/// [`initialize`](Self::initialize) is already running when the call returns.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use ferrous_lifecycle::{Application, HookResult, Lifecycle, Updatable};
///
/// #[derive(Default)]
/// struct Clock {
///     total: Duration,
/// }
///
/// impl Lifecycle for Clock {}
///
/// impl Updatable for Clock {
///     fn update(&mut self, elapsed: Duration) -> HookResult {
///         self.total += elapsed;
///         Ok(())
///     }
/// }
///
/// let mut app = Application::new();
/// let clock = app.register_updatable_instance(Clock::default())?;
/// app.initialize()?;
///
/// app.update_frame(Duration::from_millis(16))?;
/// app.update_frame(Duration::from_millis(16))?;
/// assert_eq!(clock.borrow().total, Duration::from_millis(32));
///
/// app.on_deactivated()?;
/// app.update_frame(Duration::from_millis(16))?;
/// assert_eq!(clock.borrow().total, Duration::from_millis(32));
///
/// app.shutdown()?;
/// assert!(app.graph().is_empty());
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
pub struct Application {
    container: Container,
    graph: ObjectGraph,
    services: ServiceRegistry,
    error_handler: Rc<dyn ErrorHandler>,
    options: RuntimeOptions,
    active: bool,
}

impl Application {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Application with a [`DefaultErrorHandler`] configured from `options`.
    pub fn with_options(options: RuntimeOptions) -> Self {
        let handler = Rc::new(DefaultErrorHandler::with_rethrow(options.rethrow_errors));
        Self::with_error_handler(options, handler)
    }

    pub fn with_error_handler(options: RuntimeOptions, error_handler: Rc<dyn ErrorHandler>) -> Self {
        let container = Container::new();
        let mut services = ServiceRegistry::new(error_handler.clone());
        services.set_start_late_services(options.start_late_services);
        container.add_interceptor(services.interceptor());
        tracing::debug!(?options, "application created");

        Self {
            container,
            graph: ObjectGraph::new(),
            services,
            error_handler,
            options,
            active: true,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn error_handler(&self) -> Rc<dyn ErrorHandler> {
        self.error_handler.clone()
    }

    /// False between [`on_deactivated`](Self::on_deactivated) and the next
    /// [`on_activated`](Self::on_activated).
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn register_instance<T: Lifecycle>(&mut self, value: T) -> LifecycleResult<Shared<T>> {
        let object = self.container.register_instance(value)?;
        self.pump()?;
        Ok(object)
    }

    pub fn register_shared<T: Lifecycle>(&mut self, object: Shared<T>) -> LifecycleResult<Shared<T>> {
        let object = self.container.register_shared(object)?;
        self.pump()?;
        Ok(object)
    }

    pub fn register_updatable_instance<T: Updatable>(&mut self, value: T) -> LifecycleResult<Shared<T>> {
        let object = self.container.register_updatable_instance(value)?;
        self.pump()?;
        Ok(object)
    }

    pub fn register_updatable_shared<T: Updatable>(
        &mut self,
        object: Shared<T>,
    ) -> LifecycleResult<Shared<T>> {
        let object = self.container.register_updatable_shared(object)?;
        self.pump()?;
        Ok(object)
    }

    /// Registers a lazy factory; the service joins the registry when it is
    /// first resolved.
    pub fn register_type<T, F>(&mut self, factory: F) -> LifecycleResult<()>
    where
        T: Lifecycle,
        F: Fn(&Container) -> LifecycleResult<T> + 'static,
    {
        self.container.register_type(factory)?;
        self.pump()
    }

    pub fn register_updatable_type<T, F>(&mut self, factory: F) -> LifecycleResult<()>
    where
        T: Updatable,
        F: Fn(&Container) -> LifecycleResult<T> + 'static,
    {
        self.container.register_updatable_type(factory)?;
        self.pump()
    }

    /// Resolves `T` from the container, constructing it if needed.
    pub fn resolve<T: Lifecycle>(&mut self) -> LifecycleResult<Shared<T>> {
        let object = self.container.resolve::<T>()?;
        self.pump()?;
        Ok(object)
    }

    /// Unregisters `T`; its service is destroyed and leaves the graph.
    pub fn unregister<T: Lifecycle>(&mut self) -> LifecycleResult<bool> {
        let removed = self.container.unregister::<T>();
        self.pump()?;
        Ok(removed)
    }

    pub fn service_id<T: Lifecycle>(&self) -> Option<ObjectId> {
        self.services.service_id::<T>()
    }

    /// Applies container notifications raised outside the helpers above,
    /// e.g. by a hook holding a [`Container`] clone.
    pub fn pump(&mut self) -> LifecycleResult<()> {
        self.services.pump(&mut self.graph)
    }

    /// Runs the registry's bulk bootstrap. Later calls do nothing.
    pub fn initialize(&mut self) -> LifecycleResult<()> {
        self.services.initialize_services(&mut self.graph)
    }

    /// Ticks the updatable services while the application is active.
    ///
    /// A failure that escapes the registry is wrapped in
    /// [`LifecycleError::UpdateFrame`] and offered to the error handler once
    /// more; it is returned only if the handler asks for it.
    ///
    /// A failing update hook therefore reaches the handler twice when it is
    /// rethrown: first as a [`LifecycleError::Service`] from the registry,
    /// then inside the frame wrapper. Listeners fire for both.
    pub fn update_frame(&mut self, elapsed: Duration) -> LifecycleResult<()> {
        if !self.active {
            return Ok(());
        }
        let step = self.options.clamp_step(elapsed);
        match self.services.update_services(&mut self.graph, step) {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = LifecycleError::UpdateFrame(Box::new(err));
                if self.error_handler.capture_error(&err) {
                    Err(err)
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn on_activated(&mut self) -> LifecycleResult<()> {
        self.active = true;
        self.services.on_activated(&mut self.graph)
    }

    /// Deactivates every service and suspends updates. The application is
    /// suspended even if a service fails to deactivate.
    pub fn on_deactivated(&mut self) -> LifecycleResult<()> {
        let outcome = self.services.on_deactivated(&mut self.graph);
        self.active = false;
        outcome
    }

    /// Destroys every service, then empties the container.
    pub fn shutdown(&mut self) -> LifecycleResult<()> {
        tracing::info!(services = self.services.active_services_count(), "application shutting down");
        self.services.on_destroy(&mut self.graph)?;
        self.container.clear();
        self.pump()?;
        self.active = false;
        Ok(())
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("container", &self.container)
            .field("services", &self.services)
            .field("options", &self.options)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
