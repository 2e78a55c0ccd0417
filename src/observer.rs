//! Observers for lifecycle traceability.
//!
//! The object graph reports every state transition, every dependency link
//! created or removed, every broken required dependency and every failing
//! hook to its registered observers. Observers run synchronously inside the
//! operation that triggered them and must not assume any particular
//! ordering relative to `tracing` output.

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use crate::key::TypeKey;
use crate::object::ObjectId;
use crate::state::{LifecycleState, Operation};

/// Observer of lifecycle events.
///
/// Every method has a no-op default, so implementations only override the
/// events they care about.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ferrous_lifecycle::{
///     Lifecycle, LifecycleObserver, LifecycleState, ObjectGraph, ObjectId, Operation, TypeKey,
/// };
///
/// #[derive(Default)]
/// struct Journal(RefCell<Vec<String>>);
///
/// impl LifecycleObserver for Journal {
///     fn transitioned(
///         &self,
///         _object: ObjectId,
///         ty: TypeKey,
///         operation: Operation,
///         _from: LifecycleState,
///         to: LifecycleState,
///     ) {
///         self.0.borrow_mut().push(format!("{} {} -> {}", ty.short_name(), operation, to));
///     }
/// }
///
/// struct Lamp;
/// impl Lifecycle for Lamp {}
///
/// let journal = Rc::new(Journal::default());
/// let mut graph = ObjectGraph::new();
/// graph.add_observer(journal.clone());
///
/// let lamp = graph.insert(Lamp);
/// graph.force_state(lamp, LifecycleState::Activated, false)?;
///
/// assert_eq!(
///     *journal.0.borrow(),
///     vec!["Lamp attach -> Deactivated", "Lamp activate -> Activated"]
/// );
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
pub trait LifecycleObserver {
    /// A primitive completed. `load` and `start` report `from == to`.
    fn transitioned(
        &self,
        _object: ObjectId,
        _ty: TypeKey,
        _operation: Operation,
        _from: LifecycleState,
        _to: LifecycleState,
    ) {
    }

    /// `source` now references `target` through `member`.
    fn dependency_linked(&self, _source: ObjectId, _target: ObjectId, _member: &'static str) {}

    /// The link from `source` to `target` through `member` was removed.
    fn dependency_removed(&self, _source: ObjectId, _target: ObjectId, _member: &'static str) {}

    /// A required link of `object` lost its target; the object is about to
    /// be forced back to Detached.
    fn dependency_broken(&self, _object: ObjectId, _member: &'static str) {}

    /// A user hook returned an error.
    fn hook_failed(
        &self,
        _object: ObjectId,
        _ty: TypeKey,
        _operation: Operation,
        _error: &(dyn Error + 'static),
    ) {
    }
}

/// Registered observers.
///
/// Designed to cost a length check when nothing is registered.
#[derive(Default)]
pub(crate) struct Observers {
    observers: Vec<Rc<dyn LifecycleObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Rc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn transitioned(
        &self,
        object: ObjectId,
        ty: TypeKey,
        operation: Operation,
        from: LifecycleState,
        to: LifecycleState,
    ) {
        for observer in &self.observers {
            observer.transitioned(object, ty, operation, from, to);
        }
    }

    #[inline]
    pub(crate) fn dependency_linked(&self, source: ObjectId, target: ObjectId, member: &'static str) {
        for observer in &self.observers {
            observer.dependency_linked(source, target, member);
        }
    }

    #[inline]
    pub(crate) fn dependency_removed(&self, source: ObjectId, target: ObjectId, member: &'static str) {
        for observer in &self.observers {
            observer.dependency_removed(source, target, member);
        }
    }

    #[inline]
    pub(crate) fn dependency_broken(&self, object: ObjectId, member: &'static str) {
        for observer in &self.observers {
            observer.dependency_broken(object, member);
        }
    }

    #[inline]
    pub(crate) fn hook_failed(
        &self,
        object: ObjectId,
        ty: TypeKey,
        operation: Operation,
        error: &(dyn Error + 'static),
    ) {
        for observer in &self.observers {
            observer.hook_failed(object, ty, operation, error);
        }
    }
}

/// Built-in observer that re-emits events as `info`-level `tracing` events.
///
/// The graph already logs at `debug`; this observer is for hosts that want
/// lifecycle traffic in their regular logs without lowering the level.
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "[ferrous-lifecycle]".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for LoggingObserver {
    fn transitioned(
        &self,
        object: ObjectId,
        ty: TypeKey,
        operation: Operation,
        from: LifecycleState,
        to: LifecycleState,
    ) {
        tracing::info!("{} {} {} ({}): {} -> {}", self.prefix, operation, ty.short_name(), object, from, to);
    }

    fn dependency_broken(&self, object: ObjectId, member: &'static str) {
        tracing::info!("{} dependency '{}' of {} broken", self.prefix, member, object);
    }

    fn hook_failed(
        &self,
        object: ObjectId,
        ty: TypeKey,
        operation: Operation,
        error: &(dyn Error + 'static),
    ) {
        tracing::info!("{} {} hook of {} ({}) failed: {}", self.prefix, operation, ty.short_name(), object, error);
    }
}

/// Built-in observer that counts events.
///
/// ```
/// use std::rc::Rc;
/// use ferrous_lifecycle::{Lifecycle, LifecycleState, MetricsObserver, ObjectGraph, Operation};
///
/// struct Lamp;
/// impl Lifecycle for Lamp {}
///
/// let metrics = Rc::new(MetricsObserver::new());
/// let mut graph = ObjectGraph::new();
/// graph.add_observer(metrics.clone());
///
/// let lamp = graph.insert(Lamp);
/// graph.force_state(lamp, LifecycleState::Destroyed, false)?;
/// assert_eq!(metrics.transitions(Operation::Destroy), 1);
/// assert_eq!(metrics.total_transitions(), 1);
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
#[derive(Default)]
pub struct MetricsObserver {
    transitions: [Cell<u64>; 8],
    links_created: Cell<u64>,
    links_removed: Cell<u64>,
    broken: Cell<u64>,
    hook_failures: Cell<u64>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed primitives of one kind.
    pub fn transitions(&self, operation: Operation) -> u64 {
        self.transitions[operation.index()].get()
    }

    pub fn total_transitions(&self) -> u64 {
        self.transitions.iter().map(Cell::get).sum()
    }

    pub fn links_created(&self) -> u64 {
        self.links_created.get()
    }

    pub fn links_removed(&self) -> u64 {
        self.links_removed.get()
    }

    /// Links currently alive according to the counters.
    pub fn live_links(&self) -> u64 {
        self.links_created.get() - self.links_removed.get()
    }

    pub fn broken_dependencies(&self) -> u64 {
        self.broken.get()
    }

    pub fn hook_failures(&self) -> u64 {
        self.hook_failures.get()
    }

    pub fn reset(&self) {
        for counter in &self.transitions {
            counter.set(0);
        }
        self.links_created.set(0);
        self.links_removed.set(0);
        self.broken.set(0);
        self.hook_failures.set(0);
    }
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl LifecycleObserver for MetricsObserver {
    fn transitioned(
        &self,
        _object: ObjectId,
        _ty: TypeKey,
        operation: Operation,
        _from: LifecycleState,
        _to: LifecycleState,
    ) {
        bump(&self.transitions[operation.index()]);
    }

    fn dependency_linked(&self, _source: ObjectId, _target: ObjectId, _member: &'static str) {
        bump(&self.links_created);
    }

    fn dependency_removed(&self, _source: ObjectId, _target: ObjectId, _member: &'static str) {
        bump(&self.links_removed);
    }

    fn dependency_broken(&self, _object: ObjectId, _member: &'static str) {
        bump(&self.broken);
    }

    fn hook_failed(
        &self,
        _object: ObjectId,
        _ty: TypeKey,
        _operation: Operation,
        _error: &(dyn Error + 'static),
    ) {
        bump(&self.hook_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Lifecycle, ObjectGraph};

    struct Plain;
    impl Lifecycle for Plain {}

    #[test]
    fn metrics_count_each_primitive() {
        let metrics = Rc::new(MetricsObserver::new());
        let mut graph = ObjectGraph::new();
        graph.add_observer(metrics.clone());

        let id = graph.insert(Plain);
        graph.load(id).unwrap();
        graph.force_state(id, LifecycleState::Activated, true).unwrap();
        graph.force_state(id, LifecycleState::Destroyed, false).unwrap();

        for operation in [
            Operation::Load,
            Operation::Attach,
            Operation::Activate,
            Operation::Start,
            Operation::Deactivate,
            Operation::Detach,
            Operation::Destroy,
        ] {
            assert_eq!(metrics.transitions(operation), 1, "{operation}");
        }
        assert_eq!(metrics.transitions(Operation::Update), 0);

        metrics.reset();
        assert_eq!(metrics.total_transitions(), 0);
    }

    #[test]
    fn observers_without_overrides_accept_every_event() {
        struct Silent;
        impl LifecycleObserver for Silent {}

        let mut observers = Observers::default();
        observers.add(Rc::new(Silent));
        let mut graph = ObjectGraph::new();
        let id = graph.insert(Plain);
        observers.dependency_broken(id, "member");
        observers.transitioned(
            id,
            TypeKey::of::<Plain>(),
            Operation::Load,
            LifecycleState::Detached,
            LifecycleState::Detached,
        );
    }
}
