use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::container::ContainerInterceptor;
use crate::error::{LifecycleError, LifecycleResult, ServiceError};
use crate::internal::{FastMap, FastSet};
use crate::key::TypeKey;
use crate::object::{Lifecycle, ObjectGraph, ObjectId};
use crate::state::{LifecycleState, Operation};

use super::{ErrorHandler, ServiceInstance, UpdateFn};

#[derive(Clone, Copy)]
struct Member {
    id: ObjectId,
    key: TypeKey,
    update: Option<UpdateFn>,
}

enum ContainerEvent {
    Registered(TypeKey),
    Unregistered(TypeKey),
    Instanced(ServiceInstance),
}

/// Container notifications waiting for the registry.
///
/// The container may fire from inside a running hook, where the graph is
/// unavailable; events are queued and applied by [`ServiceRegistry::pump`].
#[derive(Default)]
struct ServiceInbox {
    events: RefCell<VecDeque<ContainerEvent>>,
}

impl ServiceInbox {
    fn pop(&self) -> Option<ContainerEvent> {
        self.events.borrow_mut().pop_front()
    }
}

impl ContainerInterceptor for ServiceInbox {
    fn on_registered(&self, key: TypeKey) {
        self.events.borrow_mut().push_back(ContainerEvent::Registered(key));
    }

    fn on_unregistered(&self, key: TypeKey) {
        self.events.borrow_mut().push_back(ContainerEvent::Unregistered(key));
    }

    fn on_instanced(&self, instance: &ServiceInstance) {
        self.events
            .borrow_mut()
            .push_back(ContainerEvent::Instanced(instance.clone()));
    }
}

/// Ordered roster of services, driven in bulk passes.
///
/// Services enter the roster when the container constructs them. The
/// first [`initialize_services`](Self::initialize_services) attaches every
/// service, then activates every service, then starts every service, so all
/// cross-service bindings are wired before any `on_activated` hook runs.
/// Services arriving later are driven as far as the registry's own state
/// allows right away.
///
/// Each per-service call is guarded: a failing hook is wrapped in a
/// [`ServiceError`] naming the service and handed to the [`ErrorHandler`],
/// whose verdict either aborts the pass (the error is returned) or lets it
/// continue with the next service. Every other error propagates as is.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
/// use ferrous_lifecycle::{
///     shared, DefaultErrorHandler, Lifecycle, LifecycleState, ObjectGraph, ServiceInstance,
///     ServiceRegistry,
/// };
///
/// struct Audio;
/// impl Lifecycle for Audio {}
///
/// let mut graph = ObjectGraph::new();
/// let mut registry = ServiceRegistry::new(Rc::new(DefaultErrorHandler::new()));
///
/// let audio = registry.add_service(&mut graph, ServiceInstance::plain(shared(Audio)))?;
/// assert_eq!(graph.state(audio)?, LifecycleState::Detached);
///
/// registry.initialize_services(&mut graph)?;
/// assert!(registry.is_initialized());
/// assert!(graph.status(audio)?.is_started);
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
pub struct ServiceRegistry {
    services: FastMap<TypeKey, ObjectId>,
    roster: Vec<Member>,
    updatable: Vec<Member>,
    retiring: Vec<Member>,
    initialized: bool,
    state: LifecycleState,
    inbox: Rc<ServiceInbox>,
    handler: Rc<dyn ErrorHandler>,
    start_late_services: bool,
}

impl ServiceRegistry {
    pub fn new(handler: Rc<dyn ErrorHandler>) -> Self {
        Self {
            services: FastMap::default(),
            roster: Vec::new(),
            updatable: Vec::new(),
            retiring: Vec::new(),
            initialized: false,
            state: LifecycleState::Detached,
            inbox: Rc::new(ServiceInbox::default()),
            handler,
            start_late_services: true,
        }
    }

    /// Whether late services are started, not only activated.
    pub fn set_start_late_services(&mut self, start: bool) {
        self.start_late_services = start;
    }

    /// Interceptor to subscribe to a [`Container`](crate::Container).
    pub fn interceptor(&self) -> Rc<dyn ContainerInterceptor> {
        self.inbox.clone()
    }

    pub fn error_handler(&self) -> Rc<dyn ErrorHandler> {
        self.handler.clone()
    }

    /// Applies queued container notifications, oldest first.
    pub fn pump(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        while let Some(event) = self.inbox.pop() {
            match event {
                ContainerEvent::Registered(key) => {
                    tracing::trace!(ty = key.name(), "service type registered");
                }
                ContainerEvent::Unregistered(key) => {
                    self.remove_service(graph, key)?;
                }
                ContainerEvent::Instanced(instance) => {
                    self.add_service(graph, instance)?;
                }
            }
        }
        Ok(())
    }

    /// Adds an instance to the roster and loads it.
    ///
    /// Once the registry is initialized, the instance is also attached and,
    /// when the registry is Activated and the instance enabled, activated and
    /// started.
    pub fn add_service(
        &mut self,
        graph: &mut ObjectGraph,
        instance: ServiceInstance,
    ) -> LifecycleResult<ObjectId> {
        let key = instance.type_key();
        if self.services.contains_key(&key) {
            tracing::warn!(ty = key.name(), "a service of this type is already registered");
            return Err(LifecycleError::DuplicateService(key.name()));
        }
        if let Some(existing) = graph.find_value(&instance.erased.value) {
            match graph.state(existing)? {
                LifecycleState::Destroyed => return Err(LifecycleError::ServiceDestroyed(key.name())),
                state if state.is_attached() => {
                    return Err(LifecycleError::ServiceAttached(key.name()))
                }
                _ => {}
            }
        }

        let id = graph.insert_erased(instance.erased.clone());
        let member = Member {
            id,
            key,
            update: instance.kind().update_fn(),
        };
        self.services.insert(key, id);
        self.roster.push(member);
        if member.update.is_some() {
            self.updatable.push(member);
        }
        tracing::debug!(object = %id, ty = key.name(), updatable = member.update.is_some(), "service added");

        self.guard(graph, key, |graph| graph.load(id))?;

        if self.initialized && self.state.is_attached() {
            let activate = self.state == LifecycleState::Activated;
            let start = self.start_late_services;
            self.guard(graph, key, |graph| {
                if graph.attach(id)? && activate && graph.is_enabled(id)? {
                    graph.activate(id)?;
                    if start && graph.state(id)? == LifecycleState::Activated {
                        graph.start(id)?;
                    }
                }
                Ok(())
            })?;
        }
        Ok(id)
    }

    /// Drops the service of type `key` from the roster, destroys it and
    /// frees its graph slot. Returns false when no such service is registered.
    ///
    /// A service whose teardown fails stays pending until a later
    /// [`on_destroy`](Self::on_destroy) finishes it.
    pub fn remove_service(&mut self, graph: &mut ObjectGraph, key: TypeKey) -> LifecycleResult<bool> {
        let Some(id) = self.services.remove(&key) else {
            return Ok(false);
        };
        self.roster.retain(|member| member.id != id);
        self.updatable.retain(|member| member.id != id);
        tracing::debug!(object = %id, ty = key.name(), "service removed");

        let member = Member { id, key, update: None };
        self.retiring.push(member);
        self.retire(graph, member)?;
        Ok(true)
    }

    /// Destroys a removed service and frees its slot once it is Destroyed.
    fn retire(&mut self, graph: &mut ObjectGraph, member: Member) -> LifecycleResult<()> {
        let id = member.id;
        if graph.contains(id) {
            self.guard(graph, member.key, |graph| {
                graph.force_state(id, LifecycleState::Destroyed, false).map(drop)
            })?;
            if graph.state(id)? != LifecycleState::Destroyed {
                tracing::warn!(object = %id, ty = member.key.name(), "service removal left pending");
                return Ok(());
            }
            graph.remove(id)?;
        }
        self.retiring.retain(|pending| pending.id != id);
        Ok(())
    }

    /// Bulk bootstrap: attach all, then activate all, then start all.
    ///
    /// Runs once; later calls only apply pending notifications.
    pub fn initialize_services(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        self.pump(graph)?;
        if self.initialized {
            return Ok(());
        }

        self.bulk_pass(graph, Operation::Attach)?;
        self.state = LifecycleState::Deactivated;

        self.bulk_pass(graph, Operation::Activate)?;
        self.state = LifecycleState::Activated;

        self.bulk_pass(graph, Operation::Start)?;
        self.initialized = true;
        tracing::info!(services = self.roster.len(), "services initialized");
        Ok(())
    }

    /// Runs one stage over the roster in order, including members that
    /// join while the pass runs.
    fn bulk_pass(&mut self, graph: &mut ObjectGraph, stage: Operation) -> LifecycleResult<()> {
        let mut visited = FastSet::default();
        loop {
            let Some(member) = self
                .roster
                .iter()
                .copied()
                .find(|member| !visited.contains(&member.id))
            else {
                return Ok(());
            };
            visited.insert(member.id);

            let id = member.id;
            let state = graph.state(id)?;
            match stage {
                Operation::Attach if state == LifecycleState::Detached => {
                    self.guard(graph, member.key, |graph| graph.attach(id).map(drop))?;
                }
                Operation::Activate if state == LifecycleState::Deactivated => {
                    self.guard(graph, member.key, |graph| graph.activate(id))?;
                }
                Operation::Start if state == LifecycleState::Activated => {
                    self.guard(graph, member.key, |graph| graph.start(id))?;
                }
                _ => {}
            }
            self.pump(graph)?;
        }
    }

    /// Ticks every Activated updatable service, in registration order.
    ///
    /// The pass walks the updatable list as it stood when the pass began;
    /// services registered by an update are first ticked on the next call.
    pub fn update_services(&mut self, graph: &mut ObjectGraph, elapsed: Duration) -> LifecycleResult<()> {
        self.pump(graph)?;
        let snapshot = self.updatable.clone();
        for member in snapshot {
            let Some(update) = member.update else {
                continue;
            };
            if !graph.contains(member.id) || graph.state(member.id)? != LifecycleState::Activated {
                continue;
            }
            self.guard(graph, member.key, |graph| graph.update_with(member.id, elapsed, update))?;
            self.pump(graph)?;
        }
        Ok(())
    }

    /// The host became active: activate attached services, and start them
    /// once the registry is initialized.
    pub fn on_activated(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        self.pump(graph)?;
        self.state = LifecycleState::Activated;
        let start = self.initialized;
        for member in self.roster.clone() {
            let id = member.id;
            if !graph.contains(id) || graph.state(id)? != LifecycleState::Deactivated {
                continue;
            }
            self.guard(graph, member.key, |graph| {
                graph.activate(id)?;
                if start && graph.state(id)? == LifecycleState::Activated {
                    graph.start(id)?;
                }
                Ok(())
            })?;
            self.pump(graph)?;
        }
        Ok(())
    }

    /// The host was suspended: every service goes to Deactivated.
    pub fn on_deactivated(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        self.force_all(graph, LifecycleState::Deactivated)
    }

    pub fn on_detach(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        self.force_all(graph, LifecycleState::Detached)
    }

    /// Destroys every service, then retries removals whose teardown failed.
    /// The roster keeps its entries until the container unregisters them.
    pub fn on_destroy(&mut self, graph: &mut ObjectGraph) -> LifecycleResult<()> {
        self.force_all(graph, LifecycleState::Destroyed)?;
        for member in self.retiring.clone() {
            self.retire(graph, member)?;
            self.pump(graph)?;
        }
        Ok(())
    }

    fn force_all(&mut self, graph: &mut ObjectGraph, target: LifecycleState) -> LifecycleResult<()> {
        self.pump(graph)?;
        self.state = target;
        for member in self.roster.clone() {
            if !graph.contains(member.id) {
                continue;
            }
            self.guard(graph, member.key, |graph| {
                graph.force_state(member.id, target, false).map(drop)
            })?;
            self.pump(graph)?;
        }
        Ok(())
    }

    /// Routes hook failures through the error handler.
    fn guard(
        &self,
        graph: &mut ObjectGraph,
        key: TypeKey,
        call: impl FnOnce(&mut ObjectGraph) -> LifecycleResult<()>,
    ) -> LifecycleResult<()> {
        match call(graph) {
            Err(err @ LifecycleError::Hook(_)) => {
                let err = LifecycleError::from(ServiceError::new(key.name(), err));
                if self.handler.capture_error(&err) {
                    Err(err)
                } else {
                    tracing::debug!(ty = key.name(), "service failure swallowed");
                    Ok(())
                }
            }
            outcome => outcome,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The registry's own position in the lifecycle.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn active_services_count(&self) -> usize {
        self.services.len()
    }

    pub fn service_id<T: Lifecycle>(&self) -> Option<ObjectId> {
        self.service_id_of(TypeKey::of::<T>())
    }

    pub fn service_id_of(&self, key: TypeKey) -> Option<ObjectId> {
        self.services.get(&key).copied()
    }

    /// Services in registration order.
    pub fn roster(&self) -> Vec<ObjectId> {
        self.roster.iter().map(|member| member.id).collect()
    }

    /// Removed services still waiting to reach Destroyed.
    pub fn pending_removals(&self) -> Vec<ObjectId> {
        self.retiring.iter().map(|member| member.id).collect()
    }

    /// Updatable services in registration order.
    pub fn updatable(&self) -> Vec<ObjectId> {
        self.updatable.iter().map(|member| member.id).collect()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.roster.len())
            .field("updatable", &self.updatable.len())
            .field("retiring", &self.retiring.len())
            .field("initialized", &self.initialized)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookResult;
    use crate::object::shared;
    use crate::services::{DefaultErrorHandler, Updatable};

    struct Quiet;
    impl Lifecycle for Quiet {}

    struct Faulty;
    impl Lifecycle for Faulty {
        fn on_activated(&mut self) -> HookResult {
            Err("activation refused".into())
        }
    }

    #[derive(Default)]
    struct Tick(u32);
    impl Lifecycle for Tick {}
    impl Updatable for Tick {
        fn update(&mut self, _elapsed: Duration) -> HookResult {
            self.0 += 1;
            Ok(())
        }
    }

    fn registry(rethrow: bool) -> ServiceRegistry {
        ServiceRegistry::new(Rc::new(DefaultErrorHandler::with_rethrow(rethrow)))
    }

    #[test]
    fn inbox_events_are_applied_by_pump() {
        let mut graph = ObjectGraph::new();
        let mut registry = registry(true);
        let inbox = registry.interceptor();

        inbox.on_registered(TypeKey::of::<Quiet>());
        inbox.on_instanced(&ServiceInstance::plain(shared(Quiet)));
        assert_eq!(registry.active_services_count(), 0);

        registry.pump(&mut graph).unwrap();
        assert_eq!(registry.active_services_count(), 1);

        inbox.on_unregistered(TypeKey::of::<Quiet>());
        registry.pump(&mut graph).unwrap();
        assert_eq!(registry.active_services_count(), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn swallowed_failure_lets_the_pass_continue() {
        let mut graph = ObjectGraph::new();
        let mut registry = registry(false);
        let faulty = registry
            .add_service(&mut graph, ServiceInstance::plain(shared(Faulty)))
            .unwrap();
        let quiet = registry
            .add_service(&mut graph, ServiceInstance::plain(shared(Quiet)))
            .unwrap();

        registry.initialize_services(&mut graph).unwrap();
        assert_eq!(graph.state(faulty).unwrap(), LifecycleState::Deactivated);
        assert!(graph.status(quiet).unwrap().is_started);
        assert!(registry.is_initialized());
    }

    #[test]
    fn rethrown_failure_aborts_with_service_identity() {
        let mut graph = ObjectGraph::new();
        let mut registry = registry(true);
        registry
            .add_service(&mut graph, ServiceInstance::plain(shared(Faulty)))
            .unwrap();
        let quiet = registry
            .add_service(&mut graph, ServiceInstance::plain(shared(Quiet)))
            .unwrap();

        let err = registry.initialize_services(&mut graph).unwrap_err();
        match &err {
            LifecycleError::Service(service) => assert!(service.service.ends_with("Faulty")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.hook_failure().unwrap().operation, Operation::Activate);
        assert_eq!(graph.state(quiet).unwrap(), LifecycleState::Deactivated);
        assert!(!registry.is_initialized());
    }

    #[test]
    fn updates_follow_registration_order_and_skip_inactive() {
        let mut graph = ObjectGraph::new();
        let mut registry = registry(true);
        let tick = shared(Tick::default());
        let id = registry
            .add_service(&mut graph, ServiceInstance::updatable(tick.clone()))
            .unwrap();
        registry
            .add_service(&mut graph, ServiceInstance::plain(shared(Quiet)))
            .unwrap();
        assert_eq!(registry.updatable(), vec![id]);

        registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
        assert_eq!(tick.borrow().0, 0);

        registry.initialize_services(&mut graph).unwrap();
        registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
        assert_eq!(tick.borrow().0, 1);

        graph.deactivate(id).unwrap();
        registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
        assert_eq!(tick.borrow().0, 1);
        assert_eq!(registry.updatable(), vec![id]);
    }

    #[test]
    fn registry_state_follows_passes_and_signals() {
        let mut graph = ObjectGraph::new();
        let mut registry = registry(true);
        assert_eq!(registry.state(), LifecycleState::Detached);
        registry.initialize_services(&mut graph).unwrap();
        assert_eq!(registry.state(), LifecycleState::Activated);
        registry.on_deactivated(&mut graph).unwrap();
        assert_eq!(registry.state(), LifecycleState::Deactivated);
        registry.on_destroy(&mut graph).unwrap();
        assert_eq!(registry.state(), LifecycleState::Destroyed);
    }
}
