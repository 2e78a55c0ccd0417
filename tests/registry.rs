/// Service registry tests
///
/// Bulk initialization order, late registration, update scheduling,
/// unregistration and error routing through the container notifications.

use ferrous_lifecycle::{
    shared, BindTable, Container, DefaultErrorHandler, HookResult, Lifecycle, LifecycleError,
    LifecycleState, ObjectGraph, Operation, ServiceBinding, ServiceInstance, ServiceRegistry,
    Shared, Updatable,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

type Journal = Rc<RefCell<Vec<String>>>;

fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// Records its hooks under a name.
struct Named {
    name: &'static str,
    journal: Journal,
}

impl Named {
    fn log(&self, hook: &str) {
        self.journal.borrow_mut().push(format!("{hook}({})", self.name));
    }
}

macro_rules! named_service {
    ($ty:ident) => {
        struct $ty(Named);

        impl $ty {
            fn new(journal: &Journal) -> Self {
                Self(Named {
                    name: stringify!($ty),
                    journal: journal.clone(),
                })
            }
        }

        impl Lifecycle for $ty {
            fn on_loaded(&mut self) -> HookResult {
                self.0.log("Load");
                Ok(())
            }

            fn on_attached(&mut self) -> HookResult<bool> {
                self.0.log("Attach");
                Ok(true)
            }

            fn on_activated(&mut self) -> HookResult {
                self.0.log("Activate");
                Ok(())
            }

            fn start(&mut self) -> HookResult {
                self.0.log("Start");
                Ok(())
            }

            fn on_destroy(&mut self) -> HookResult {
                self.0.log("Destroy");
                Ok(())
            }
        }
    };
}

named_service!(A);
named_service!(B);
named_service!(C);

struct D {
    journal: Journal,
    updates: u32,
}

impl Lifecycle for D {
    fn on_loaded(&mut self) -> HookResult {
        self.journal.borrow_mut().push("Load(D)".into());
        Ok(())
    }

    fn on_attached(&mut self) -> HookResult<bool> {
        self.journal.borrow_mut().push("Attach(D)".into());
        Ok(true)
    }

    fn on_activated(&mut self) -> HookResult {
        self.journal.borrow_mut().push("Activate(D)".into());
        Ok(())
    }

    fn start(&mut self) -> HookResult {
        self.journal.borrow_mut().push("Start(D)".into());
        Ok(())
    }
}

impl Updatable for D {
    fn update(&mut self, _elapsed: Duration) -> HookResult {
        self.updates += 1;
        self.journal.borrow_mut().push("Update(D)".into());
        Ok(())
    }
}

/// Container wired to a fresh registry.
fn setup(rethrow: bool) -> (Container, ObjectGraph, ServiceRegistry) {
    let container = Container::new();
    let registry = ServiceRegistry::new(Rc::new(DefaultErrorHandler::with_rethrow(rethrow)));
    container.add_interceptor(registry.interceptor());
    (container, ObjectGraph::new(), registry)
}

#[test]
fn test_initialize_runs_three_full_passes_in_registration_order() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    container.register_instance(B::new(&log)).unwrap();
    container.register_instance(C::new(&log)).unwrap();
    registry.pump(&mut graph).unwrap();
    log.borrow_mut().clear();

    registry.initialize_services(&mut graph).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "Attach(A)", "Attach(B)", "Attach(C)",
            "Activate(A)", "Activate(B)", "Activate(C)",
            "Start(A)", "Start(B)", "Start(C)",
        ]
    );
    assert!(registry.is_initialized());
    assert_eq!(registry.state(), LifecycleState::Activated);
}

#[test]
fn test_registration_loads_immediately() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    registry.pump(&mut graph).unwrap();

    assert_eq!(*log.borrow(), vec!["Load(A)"]);
    let id = registry.service_id::<A>().unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Detached);
    assert!(graph.core(id).unwrap().is_loaded());
}

#[test]
fn test_initialize_is_idempotent() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();

    registry.initialize_services(&mut graph).unwrap();
    let after_first = log.borrow().len();
    registry.initialize_services(&mut graph).unwrap();
    assert_eq!(log.borrow().len(), after_first);
}

#[test]
fn test_late_updatable_is_driven_immediately_and_updated_next_tick() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    registry.initialize_services(&mut graph).unwrap();
    log.borrow_mut().clear();

    let d = container
        .register_updatable_instance(D {
            journal: log.clone(),
            updates: 0,
        })
        .unwrap();
    registry.pump(&mut graph).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["Load(D)", "Attach(D)", "Activate(D)", "Start(D)"]
    );
    let id = registry.service_id::<D>().unwrap();
    assert!(graph.status(id).unwrap().is_started);

    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    assert_eq!(d.borrow().updates, 1);
}

#[test]
fn test_late_service_waits_for_bulk_pass_before_initialize() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    registry.pump(&mut graph).unwrap();

    let id = registry.service_id::<A>().unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Detached);
    registry.initialize_services(&mut graph).unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Activated);
}

#[test]
fn test_late_service_is_only_attached_while_registry_is_suspended() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    registry.initialize_services(&mut graph).unwrap();
    registry.on_deactivated(&mut graph).unwrap();

    container.register_instance(B::new(&log)).unwrap();
    registry.pump(&mut graph).unwrap();
    let id = registry.service_id::<B>().unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Deactivated);

    registry.on_activated(&mut graph).unwrap();
    assert!(graph.status(id).unwrap().is_started);
}

#[test]
fn test_deactivated_service_is_skipped_then_resumed() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    let d = container
        .register_updatable_instance(D {
            journal: log.clone(),
            updates: 0,
        })
        .unwrap();
    registry.initialize_services(&mut graph).unwrap();
    let id = registry.service_id::<D>().unwrap();

    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    graph.deactivate(id).unwrap();
    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    assert_eq!(d.borrow().updates, 1);
    assert_eq!(registry.updatable(), vec![id]);

    graph.activate(id).unwrap();
    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    assert_eq!(d.borrow().updates, 2);
}

#[test]
fn test_unregister_destroys_and_removes_from_roster() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    container
        .register_updatable_instance(D {
            journal: log.clone(),
            updates: 0,
        })
        .unwrap();
    registry.initialize_services(&mut graph).unwrap();
    let a = registry.service_id::<A>().unwrap();
    let d = registry.service_id::<D>().unwrap();

    assert!(container.unregister::<A>());
    container.unregister::<D>();
    registry.pump(&mut graph).unwrap();

    assert!(log.borrow().contains(&"Destroy(A)".to_string()));
    assert!(registry.service_id::<A>().is_none());
    assert!(registry.roster().is_empty());
    assert!(registry.updatable().is_empty());
    assert_eq!(registry.active_services_count(), 0);
    assert!(!graph.contains(a));
    assert!(!graph.contains(d));
}

#[test]
fn test_duplicate_service_type_is_rejected_and_roster_unchanged() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let mut registry = ServiceRegistry::new(Rc::new(DefaultErrorHandler::new()));

    let first = registry
        .add_service(&mut graph, ServiceInstance::plain(shared(A::new(&log))))
        .unwrap();
    let second = shared(A::new(&log));
    let err = registry
        .add_service(&mut graph, ServiceInstance::plain(second.clone()))
        .unwrap_err();

    assert!(matches!(err, LifecycleError::DuplicateService(name) if name.ends_with("A")));
    assert_eq!(registry.roster(), vec![first]);
    assert_eq!(registry.service_id::<A>(), Some(first));
    assert_eq!(graph.len(), 1);
    assert!(graph.find_object(&second).is_none());
}

#[test]
fn test_attached_or_destroyed_instances_are_refused() {
    struct Lamp;
    impl Lifecycle for Lamp {}
    struct Torch;
    impl Lifecycle for Torch {}

    let mut graph = ObjectGraph::new();
    let mut registry = ServiceRegistry::new(Rc::new(DefaultErrorHandler::new()));

    let lamp = shared(Lamp);
    let id = graph.insert_shared(lamp.clone());
    graph.attach(id).unwrap();
    assert!(matches!(
        registry.add_service(&mut graph, ServiceInstance::plain(lamp)),
        Err(LifecycleError::ServiceAttached(_))
    ));

    let torch = shared(Torch);
    let id = graph.insert_shared(torch.clone());
    graph.destroy(id).unwrap();
    assert!(matches!(
        registry.add_service(&mut graph, ServiceInstance::plain(torch)),
        Err(LifecycleError::ServiceDestroyed(_))
    ));
    assert_eq!(registry.active_services_count(), 0);
}

#[test]
fn test_cross_service_bindings_are_wired_before_activation() {
    struct Store;
    impl Lifecycle for Store {}

    #[derive(Default)]
    struct Checkout {
        store: Option<Shared<Store>>,
        saw_store_on_activate: bool,
    }

    impl Lifecycle for Checkout {
        fn declare_bindings(table: &mut BindTable<Self>) {
            table.service("store", ServiceBinding, |c: &mut Checkout| &mut c.store);
        }

        fn on_activated(&mut self) -> HookResult {
            self.saw_store_on_activate = self.store.is_some();
            Ok(())
        }
    }

    let (container, mut graph, mut registry) = setup(true);
    // Registered before its dependency on purpose.
    let checkout = container.register_instance(Checkout::default()).unwrap();
    container.register_instance(Store).unwrap();
    registry.initialize_services(&mut graph).unwrap();

    assert!(checkout.borrow().saw_store_on_activate);
}

#[test]
fn test_failed_update_is_reported_with_service_identity() {
    struct Flaky;
    impl Lifecycle for Flaky {}
    impl Updatable for Flaky {
        fn update(&mut self, _elapsed: Duration) -> HookResult {
            Err("lost frame".into())
        }
    }

    let log = journal();
    let handler = Rc::new(DefaultErrorHandler::with_rethrow(false));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    handler.on_error(move |err| sink.borrow_mut().push(err.to_string()));

    let container = Container::new();
    let mut graph = ObjectGraph::new();
    let mut registry = ServiceRegistry::new(handler.clone());
    container.add_interceptor(registry.interceptor());
    container.register_updatable_instance(Flaky).unwrap();
    let d = container
        .register_updatable_instance(D {
            journal: log.clone(),
            updates: 0,
        })
        .unwrap();
    registry.initialize_services(&mut graph).unwrap();

    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    assert_eq!(d.borrow().updates, 1);
    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].starts_with("service exception"));
    assert!(seen.borrow()[0].contains("lost frame"));

    handler.set_rethrow(true);
    let err = registry
        .update_services(&mut graph, Duration::from_millis(16))
        .unwrap_err();
    assert_eq!(err.hook_failure().unwrap().operation, Operation::Update);
    // The tick stopped at the failing service.
    assert_eq!(d.borrow().updates, 1);
}

#[test]
fn test_service_registered_mid_update_joins_next_tick() {
    struct Spawner {
        container: Container,
        journal: Journal,
        spawned: bool,
    }

    impl Lifecycle for Spawner {}

    impl Updatable for Spawner {
        fn update(&mut self, _elapsed: Duration) -> HookResult {
            if !self.spawned {
                self.spawned = true;
                self.container.register_updatable_instance(D {
                    journal: self.journal.clone(),
                    updates: 0,
                })?;
            }
            Ok(())
        }
    }

    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container
        .register_updatable_instance(Spawner {
            container: container.clone(),
            journal: log.clone(),
            spawned: false,
        })
        .unwrap();
    registry.initialize_services(&mut graph).unwrap();

    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    let d = registry.service_id::<D>().unwrap();
    assert!(graph.status(d).unwrap().is_started);
    assert!(!log.borrow().contains(&"Update(D)".to_string()));

    registry.update_services(&mut graph, Duration::from_millis(16)).unwrap();
    assert_eq!(
        log.borrow().iter().filter(|event| *event == "Update(D)").count(),
        1
    );
}

#[test]
fn test_lazy_factory_joins_registry_on_first_resolve() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    let factory_log = log.clone();
    container
        .register_type(move |_: &Container| Ok(C::new(&factory_log)))
        .unwrap();
    registry.pump(&mut graph).unwrap();
    assert_eq!(registry.active_services_count(), 0);

    container.resolve::<C>().unwrap();
    registry.initialize_services(&mut graph).unwrap();
    assert_eq!(registry.active_services_count(), 1);
    assert!(log.borrow().contains(&"Start(C)".to_string()));
}

#[test]
fn test_destroy_signal_reaches_every_service_in_roster_order() {
    let log = journal();
    let (container, mut graph, mut registry) = setup(true);
    container.register_instance(A::new(&log)).unwrap();
    container.register_instance(B::new(&log)).unwrap();
    registry.initialize_services(&mut graph).unwrap();
    log.borrow_mut().clear();

    registry.on_destroy(&mut graph).unwrap();

    assert_eq!(*log.borrow(), vec!["Destroy(A)", "Destroy(B)"]);
    for id in registry.roster() {
        assert_eq!(graph.state(id).unwrap(), LifecycleState::Destroyed);
    }
}

struct Audio {
    refuse_deactivation: bool,
}

impl Lifecycle for Audio {
    fn on_deactivated(&mut self) -> HookResult {
        if std::mem::take(&mut self.refuse_deactivation) {
            return Err("audio device stuck".into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct Mixer {
    audio: Option<Shared<Audio>>,
}

impl Lifecycle for Mixer {
    fn declare_bindings(table: &mut BindTable<Self>) {
        table.service("audio", ServiceBinding, |m: &mut Mixer| &mut m.audio);
    }
}

#[test]
fn test_failed_teardown_keeps_removal_pending_until_destroy() {
    for rethrow in [true, false] {
        let (container, mut graph, mut registry) = setup(rethrow);
        container
            .register_instance(Audio {
                refuse_deactivation: true,
            })
            .unwrap();
        container.register_instance(Mixer::default()).unwrap();
        registry.initialize_services(&mut graph).unwrap();
        let audio = registry.service_id::<Audio>().unwrap();
        let mixer = registry.service_id::<Mixer>().unwrap();

        assert!(container.unregister::<Audio>());
        let outcome = registry.pump(&mut graph);
        if rethrow {
            let err = outcome.unwrap_err();
            assert_eq!(err.hook_failure().unwrap().operation, Operation::Deactivate);
        } else {
            outcome.unwrap();
        }

        assert_eq!(registry.roster(), vec![mixer]);
        assert_eq!(registry.pending_removals(), vec![audio]);
        assert_eq!(graph.state(audio).unwrap(), LifecycleState::Activated);

        registry.on_destroy(&mut graph).unwrap();

        assert!(registry.pending_removals().is_empty());
        assert!(!graph.contains(audio));
        assert_eq!(graph.state(mixer).unwrap(), LifecycleState::Destroyed);
        assert_eq!(graph.link_count(), 0);
    }
}
