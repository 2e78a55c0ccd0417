/// State machine tests for individual lifecycle objects
///
/// These drive the ObjectGraph primitives directly and check hook order,
/// preconditions and the flags derived from them.

use ferrous_lifecycle::{
    shared, HookResult, Lifecycle, LifecycleError, LifecycleState, ObjectGraph, Operation,
};
use std::cell::RefCell;
use std::rc::Rc;

type Journal = Rc<RefCell<Vec<&'static str>>>;

struct Recorded {
    journal: Journal,
    veto_attach: bool,
    gate: bool,
}

impl Recorded {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            veto_attach: false,
            gate: true,
        }
    }

    fn log(&self, event: &'static str) {
        self.journal.borrow_mut().push(event);
    }
}

impl Lifecycle for Recorded {
    fn on_loaded(&mut self) -> HookResult {
        self.log("loaded");
        Ok(())
    }

    fn on_attached(&mut self) -> HookResult<bool> {
        self.log("attached");
        Ok(!self.veto_attach)
    }

    fn on_activated(&mut self) -> HookResult {
        self.log("activated");
        Ok(())
    }

    fn start(&mut self) -> HookResult {
        self.log("start");
        Ok(())
    }

    fn on_deactivated(&mut self) -> HookResult {
        self.log("deactivated");
        Ok(())
    }

    fn on_detach(&mut self) -> HookResult {
        self.log("detach");
        Ok(())
    }

    fn on_destroy(&mut self) -> HookResult {
        self.log("destroy");
        Ok(())
    }

    fn should_be_activated(&self, is_enabled: bool) -> bool {
        is_enabled && self.gate
    }
}

fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_full_cycle_runs_hooks_in_order() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    graph.load(id).unwrap();
    assert!(graph.force_state(id, LifecycleState::Activated, true).unwrap());
    assert!(graph.force_state(id, LifecycleState::Destroyed, false).unwrap());

    assert_eq!(
        *log.borrow(),
        vec!["loaded", "attached", "activated", "start", "deactivated", "detach", "destroy"]
    );
}

#[test]
fn test_on_loaded_runs_once_across_attach_cycles() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    for _ in 0..3 {
        graph.load(id).unwrap();
        assert!(graph.attach(id).unwrap());
        graph.detach(id).unwrap();
    }
    graph.load(id).unwrap();

    let loads = log.borrow().iter().filter(|event| **event == "loaded").count();
    assert_eq!(loads, 1);
    assert!(graph.core(id).unwrap().is_loaded());
}

#[test]
fn test_primitives_reject_wrong_state() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    for (result, operation) in [
        (graph.activate(id), Operation::Activate),
        (graph.start(id), Operation::Start),
        (graph.deactivate(id), Operation::Deactivate),
        (graph.detach(id), Operation::Detach),
    ] {
        match result {
            Err(LifecycleError::InvalidState {
                operation: failed,
                state,
                ..
            }) => {
                assert_eq!(failed, operation);
                assert_eq!(state, LifecycleState::Detached);
            }
            other => panic!("{operation}: expected InvalidState, got {other:?}"),
        }
    }
    assert!(log.borrow().is_empty());
}

#[test]
fn test_destroyed_is_terminal_and_force_state_is_a_no_op() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    graph.force_state(id, LifecycleState::Activated, false).unwrap();
    graph.force_state(id, LifecycleState::Destroyed, false).unwrap();
    let before = log.borrow().len();

    for target in [
        LifecycleState::Detached,
        LifecycleState::Deactivated,
        LifecycleState::Activated,
        LifecycleState::Destroyed,
    ] {
        let reached = graph.force_state(id, target, true).unwrap();
        assert_eq!(reached, target == LifecycleState::Destroyed);
        assert_eq!(graph.state(id).unwrap(), LifecycleState::Destroyed);
    }
    assert_eq!(log.borrow().len(), before);
    assert!(graph.load(id).unwrap_err().is_invalid_state());
}

#[test]
fn test_destroy_skips_hook_for_never_loaded_object() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    graph.destroy(id).unwrap();
    assert!(log.borrow().is_empty());
    assert!(graph.status(id).unwrap().is_destroyed);
}

#[test]
fn test_attach_veto_keeps_object_detached() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let mut object = Recorded::new(&log);
    object.veto_attach = true;
    let id = graph.insert(object);

    assert!(!graph.attach(id).unwrap());
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Detached);
    assert!(!graph.force_state(id, LifecycleState::Activated, true).unwrap());
    assert_eq!(*log.borrow(), vec!["attached", "attached"]);
}

#[test]
fn test_activation_gate_leaves_object_deactivated() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let mut object = Recorded::new(&log);
    object.gate = false;
    let id = graph.insert(object);

    assert!(!graph.force_state(id, LifecycleState::Activated, true).unwrap());
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Deactivated);
    assert!(!log.borrow().contains(&"activated"));
}

#[test]
fn test_set_enabled_toggles_activation_of_attached_objects() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    graph.set_enabled(id, false).unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Detached);

    assert!(graph.attach(id).unwrap());
    graph.activate(id).unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Deactivated);

    graph.set_enabled(id, true).unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Activated);

    graph.set_enabled(id, false).unwrap();
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Deactivated);
    assert!(!graph.is_enabled(id).unwrap());

    // Same value: nothing happens.
    graph.set_enabled(id, false).unwrap();
    assert_eq!(
        log.borrow().iter().filter(|event| **event == "deactivated").count(),
        1
    );
}

#[test]
fn test_started_flag_requires_activation() {
    let log = journal();
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Recorded::new(&log));

    graph.force_state(id, LifecycleState::Activated, true).unwrap();
    assert!(graph.status(id).unwrap().is_started);

    graph.deactivate(id).unwrap();
    let status = graph.status(id).unwrap();
    assert!(!status.is_started);
    assert!(status.is_attached);

    // Start does not run again until the object has been detached.
    graph.activate(id).unwrap();
    graph.start(id).unwrap();
    assert_eq!(log.borrow().iter().filter(|event| **event == "start").count(), 1);
}

#[test]
fn test_failing_hook_leaves_state_unchanged() {
    struct Stubborn;
    impl Lifecycle for Stubborn {
        fn on_detach(&mut self) -> HookResult {
            Err("still in use".into())
        }
    }

    let mut graph = ObjectGraph::new();
    let id = graph.insert(Stubborn);
    graph.force_state(id, LifecycleState::Activated, false).unwrap();

    let err = graph
        .force_state(id, LifecycleState::Detached, false)
        .unwrap_err();
    let failure = err.hook_failure().unwrap();
    assert_eq!(failure.operation, Operation::Detach);
    assert_eq!(failure.source.to_string(), "still in use");
    assert_eq!(graph.state(id).unwrap(), LifecycleState::Deactivated);
}

#[test]
fn test_typed_handles_share_the_graph_allocation() {
    struct Other;
    impl Lifecycle for Other {}

    let log = journal();
    let mut graph = ObjectGraph::new();
    let object = shared(Recorded::new(&log));
    let id = graph.insert_shared(object.clone());

    let typed = graph.get::<Recorded>(id).unwrap();
    assert!(Rc::ptr_eq(&typed, &object));
    assert!(graph.get::<Other>(id).is_none());
    assert_eq!(graph.type_key(id).unwrap().short_name(), "Recorded");
}
