use std::any::Any;
use std::rc::Rc;
use std::time::Duration;

use crate::dependency::{DescriptorCache, LinkTable, TypeBindings};
use crate::error::{HookFailure, HookResult, LifecycleError, LifecycleResult};
use crate::internal::{Arena, LinkList};
use crate::key::TypeKey;
use crate::observer::{LifecycleObserver, Observers};
use crate::services::UpdateFn;
use crate::state::{LifecycleState, LinkKind, Operation};

use super::{DynObject, Lifecycle, LifecycleCore, ObjectId, ObjectStatus, Shared};

/// A lifecycle object with its concrete type erased.
///
/// `value` is the same allocation as `object`, kept as `dyn Any` so typed
/// handles can be recovered by downcasting.
#[derive(Clone)]
pub(crate) struct Erased {
    pub(crate) key: TypeKey,
    pub(crate) object: DynObject,
    pub(crate) value: Rc<dyn Any>,
    pub(crate) describe: fn() -> TypeBindings,
}

impl Erased {
    pub(crate) fn new<T: Lifecycle>(object: Shared<T>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            value: object.clone(),
            object,
            describe: TypeBindings::describe::<T>,
        }
    }
}

pub(crate) struct Entry {
    pub(crate) key: TypeKey,
    pub(crate) core: LifecycleCore,
    pub(crate) object: DynObject,
    pub(crate) value: Rc<dyn Any>,
    pub(crate) describe: fn() -> TypeBindings,
    pub(crate) links: LinkList,
}

/// Arena of lifecycle objects and the links between them.
///
/// The graph owns every object's lifecycle bookkeeping and runs the
/// state-machine primitives. Primitives check their precondition and fail
/// with [`LifecycleError::InvalidState`] when it does not hold.
///
/// # Examples
///
/// ```rust
/// use ferrous_lifecycle::{Lifecycle, LifecycleState, ObjectGraph};
///
/// struct Probe;
/// impl Lifecycle for Probe {}
///
/// let mut graph = ObjectGraph::new();
/// let id = graph.insert(Probe);
///
/// graph.load(id)?;
/// assert!(graph.attach(id)?);
/// graph.activate(id)?;
/// graph.start(id)?;
/// assert_eq!(graph.state(id)?, LifecycleState::Activated);
///
/// assert!(graph.force_state(id, LifecycleState::Destroyed, false)?);
/// assert!(graph.status(id)?.is_destroyed);
/// # Ok::<(), ferrous_lifecycle::LifecycleError>(())
/// ```
#[derive(Default)]
pub struct ObjectGraph {
    pub(crate) objects: Arena<Entry>,
    pub(crate) links: LinkTable,
    pub(crate) descriptors: DescriptorCache,
    pub(crate) observers: Observers,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for transitions, link events and hook failures.
    pub fn add_observer(&mut self, observer: Rc<dyn LifecycleObserver>) {
        self.observers.add(observer);
    }

    /// Moves `value` into the graph. The object starts Detached and enabled.
    pub fn insert<T: Lifecycle>(&mut self, value: T) -> ObjectId {
        self.insert_erased(Erased::new(super::shared(value)))
    }

    /// Adds an object the caller keeps a handle to.
    ///
    /// Inserting the same allocation twice returns the existing id.
    pub fn insert_shared<T: Lifecycle>(&mut self, object: Shared<T>) -> ObjectId {
        self.insert_erased(Erased::new(object))
    }

    pub(crate) fn insert_erased(&mut self, erased: Erased) -> ObjectId {
        if let Some(id) = self.find_value(&erased.value) {
            return id;
        }
        let id = ObjectId(self.objects.insert(Entry {
            key: erased.key,
            core: LifecycleCore::default(),
            object: erased.object,
            value: erased.value,
            describe: erased.describe,
            links: LinkList::new(),
        }));
        tracing::trace!(object = %id, ty = erased.key.name(), "object inserted");
        id
    }

    /// Frees the slot of a Destroyed object and returns its handle.
    pub fn remove(&mut self, id: ObjectId) -> LifecycleResult<DynObject> {
        let entry = self.entry(id)?;
        if !entry.core.is_destroyed() {
            return Err(LifecycleError::NotDestroyed {
                type_name: entry.key.name(),
                state: entry.core.state,
            });
        }
        let entry = self
            .objects
            .remove(id.0)
            .ok_or(LifecycleError::UnknownObject(id))?;
        tracing::trace!(object = %id, ty = entry.key.name(), "object removed");
        Ok(entry.object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains(id.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.len() == 0
    }

    /// Live object ids in slot order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|(handle, _)| ObjectId(handle)).collect()
    }

    /// Live objects of exactly the type `key`, in slot order.
    pub fn objects_of_type(&self, key: TypeKey) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, entry)| entry.key == key)
            .map(|(handle, _)| ObjectId(handle))
            .collect()
    }

    /// Typed handle to the object, if it is a `T`.
    pub fn get<T: Lifecycle>(&self, id: ObjectId) -> Option<Shared<T>> {
        let entry = self.objects.get(id.0)?;
        entry.value.clone().downcast::<std::cell::RefCell<T>>().ok()
    }

    /// Type-erased handle to the object.
    pub fn object(&self, id: ObjectId) -> LifecycleResult<DynObject> {
        Ok(self.entry(id)?.object.clone())
    }

    /// Id of a shared object previously inserted into this graph.
    pub fn find_object<T: Lifecycle>(&self, object: &Shared<T>) -> Option<ObjectId> {
        let value: Rc<dyn Any> = object.clone();
        self.find_value(&value)
    }

    pub(crate) fn find_value(&self, value: &Rc<dyn Any>) -> Option<ObjectId> {
        let wanted = Rc::as_ptr(value) as *const ();
        self.objects
            .iter()
            .find(|(_, entry)| Rc::as_ptr(&entry.value) as *const () == wanted)
            .map(|(handle, _)| ObjectId(handle))
    }

    pub fn type_key(&self, id: ObjectId) -> LifecycleResult<TypeKey> {
        Ok(self.entry(id)?.key)
    }

    pub fn state(&self, id: ObjectId) -> LifecycleResult<LifecycleState> {
        Ok(self.entry(id)?.core.state)
    }

    pub fn core(&self, id: ObjectId) -> LifecycleResult<LifecycleCore> {
        Ok(self.entry(id)?.core)
    }

    pub fn status(&self, id: ObjectId) -> LifecycleResult<ObjectStatus> {
        Ok(self.entry(id)?.core.status())
    }

    pub fn is_enabled(&self, id: ObjectId) -> LifecycleResult<bool> {
        Ok(self.entry(id)?.core.is_enabled)
    }

    /// Number of binding descriptors built so far. Each type is described once.
    pub fn descriptor_builds(&self) -> usize {
        self.descriptors.builds()
    }

    pub(crate) fn entry(&self, id: ObjectId) -> LifecycleResult<&Entry> {
        self.objects.get(id.0).ok_or(LifecycleError::UnknownObject(id))
    }

    pub(crate) fn entry_mut(&mut self, id: ObjectId) -> LifecycleResult<&mut Entry> {
        self.objects
            .get_mut(id.0)
            .ok_or(LifecycleError::UnknownObject(id))
    }

    /// Runs `f` against the object, failing if its cell is already borrowed.
    pub(crate) fn with_object<R>(
        &self,
        id: ObjectId,
        f: impl FnOnce(&mut dyn Lifecycle) -> R,
    ) -> LifecycleResult<R> {
        let entry = self.entry(id)?;
        let mut object = entry
            .object
            .try_borrow_mut()
            .map_err(|_| LifecycleError::ObjectBusy {
                type_name: entry.key.name(),
            })?;
        Ok(f(&mut *object))
    }

    fn run_hook<R>(
        &self,
        id: ObjectId,
        operation: Operation,
        hook: impl FnOnce(&mut dyn Lifecycle) -> HookResult<R>,
    ) -> LifecycleResult<R> {
        match self.with_object(id, hook)? {
            Ok(value) => Ok(value),
            Err(source) => {
                let key = self.entry(id)?.key;
                tracing::debug!(object = %id, ty = key.name(), %operation, error = %source, "hook failed");
                self.observers.hook_failed(id, key, operation, source.as_ref());
                Err(HookFailure::new(operation, key.name(), source).into())
            }
        }
    }

    fn expect_state(
        &self,
        id: ObjectId,
        operation: Operation,
        expected: LifecycleState,
    ) -> LifecycleResult<()> {
        let entry = self.entry(id)?;
        if entry.core.state != expected {
            return Err(LifecycleError::InvalidState {
                operation,
                type_name: entry.key.name(),
                state: entry.core.state,
            });
        }
        Ok(())
    }

    fn transition(
        &mut self,
        id: ObjectId,
        operation: Operation,
        to: LifecycleState,
    ) -> LifecycleResult<()> {
        let entry = self.entry_mut(id)?;
        let from = entry.core.state;
        entry.core.state = to;
        let key = entry.key;
        tracing::debug!(object = %id, ty = key.name(), %from, %to, "{}", operation);
        self.observers.transitioned(id, key, operation, from, to);
        Ok(())
    }

    /// Runs `on_loaded` the first time the object is loaded.
    ///
    /// Requires Detached. Later calls are no-ops, across any number of
    /// attach/detach cycles.
    pub fn load(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Load, LifecycleState::Detached)?;
        if self.entry(id)?.core.is_loaded {
            return Ok(());
        }
        self.run_hook(id, Operation::Load, |object| object.on_loaded())?;
        self.entry_mut(id)?.core.is_loaded = true;
        self.transition(id, Operation::Load, LifecycleState::Detached)
    }

    /// Resolves the object's bind points and runs `on_attached`.
    ///
    /// Returns `Ok(false)` and leaves the object Detached when a required
    /// bind point has no candidate or the hook vetoes. Bind points resolved
    /// before a failing one keep their links.
    pub fn attach(&mut self, id: ObjectId) -> LifecycleResult<bool> {
        self.expect_state(id, Operation::Attach, LifecycleState::Detached)?;
        if !self.resolve_dependencies(id)? {
            tracing::debug!(object = %id, "attach failed: unresolved required binding");
            return Ok(false);
        }
        if !self.run_hook(id, Operation::Attach, |object| object.on_attached())? {
            tracing::debug!(object = %id, "attach vetoed by on_attached");
            return Ok(false);
        }
        self.transition(id, Operation::Attach, LifecycleState::Deactivated)?;
        Ok(true)
    }

    /// Activates a Deactivated object unless `should_be_activated` declines.
    pub fn activate(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Activate, LifecycleState::Deactivated)?;
        let enabled = self.entry(id)?.core.is_enabled;
        if !self.with_object(id, |object| object.should_be_activated(enabled))? {
            return Ok(());
        }
        self.run_hook(id, Operation::Activate, |object| object.on_activated())?;
        self.transition(id, Operation::Activate, LifecycleState::Activated)
    }

    /// Runs `start` once per activation. Requires Activated.
    pub fn start(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Start, LifecycleState::Activated)?;
        if self.entry(id)?.core.is_started {
            return Ok(());
        }
        self.run_hook(id, Operation::Start, |object| object.start())?;
        self.entry_mut(id)?.core.is_started = true;
        self.transition(id, Operation::Start, LifecycleState::Activated)
    }

    pub fn deactivate(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Deactivate, LifecycleState::Activated)?;
        self.run_hook(id, Operation::Deactivate, |object| object.on_deactivated())?;
        self.transition(id, Operation::Deactivate, LifecycleState::Deactivated)
    }

    /// Runs `on_detach`, releases lifecycle links and clears the started flag.
    ///
    /// The transition completes even when a dependent's cascade fails; that
    /// error is returned afterwards.
    pub fn detach(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Detach, LifecycleState::Deactivated)?;
        self.run_hook(id, Operation::Detach, |object| object.on_detach())?;
        let released = self.release_links(id, LinkKind::LIFECYCLE);
        self.entry_mut(id)?.core.is_started = false;
        self.transition(id, Operation::Detach, LifecycleState::Detached)?;
        released
    }

    /// Runs `on_destroy` if the object was ever loaded, releases every link
    /// and makes the object Destroyed for good.
    pub fn destroy(&mut self, id: ObjectId) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Destroy, LifecycleState::Detached)?;
        if self.entry(id)?.core.is_loaded {
            self.run_hook(id, Operation::Destroy, |object| object.on_destroy())?;
        }
        let released = self.release_links(id, LinkKind::ALL);
        self.transition(id, Operation::Destroy, LifecycleState::Destroyed)?;
        released
    }

    /// Deletes the object's links of `kinds` with the object marked as
    /// releasing, so a cycle of required links cannot re-enter it.
    fn release_links(&mut self, id: ObjectId, kinds: LinkKind) -> LifecycleResult<()> {
        self.entry_mut(id)?.core.is_releasing = true;
        let released = self.delete_dependencies(id, kinds);
        self.entry_mut(id)?.core.is_releasing = false;
        released
    }

    /// Walks the primitive sequence from the current state to `target`.
    ///
    /// With `started`, an object ending Activated is also started. A
    /// Destroyed object stays Destroyed. Returns whether the object ended in
    /// `target`; an attach failure or an activation gate yields `Ok(false)`.
    pub fn force_state(
        &mut self,
        id: ObjectId,
        target: LifecycleState,
        started: bool,
    ) -> LifecycleResult<bool> {
        use LifecycleState::*;

        match (self.state(id)?, target) {
            (Destroyed, _) => {}
            (Detached, Deactivated) => {
                self.attach(id)?;
            }
            (Detached, Activated) => {
                if self.attach(id)? {
                    self.activate_and_start(id, started)?;
                }
            }
            (Detached, Destroyed) => self.destroy(id)?,
            (Deactivated, Detached) => self.detach(id)?,
            (Deactivated, Activated) => self.activate_and_start(id, started)?,
            (Deactivated, Destroyed) => {
                self.detach(id)?;
                self.destroy(id)?;
            }
            (Activated, Activated) => {
                if started {
                    self.start(id)?;
                }
            }
            (Activated, Deactivated) => self.deactivate(id)?,
            (Activated, Detached) => {
                self.deactivate(id)?;
                self.detach(id)?;
            }
            (Activated, Destroyed) => {
                self.deactivate(id)?;
                self.detach(id)?;
                self.destroy(id)?;
            }
            (Detached, Detached) | (Deactivated, Deactivated) => {}
        }
        Ok(self.state(id)? == target)
    }

    fn activate_and_start(&mut self, id: ObjectId, started: bool) -> LifecycleResult<()> {
        self.activate(id)?;
        if started && self.state(id)? == LifecycleState::Activated {
            self.start(id)?;
        }
        Ok(())
    }

    /// Runs one update of an Activated object.
    pub(crate) fn update_with(
        &mut self,
        id: ObjectId,
        elapsed: Duration,
        update: UpdateFn,
    ) -> LifecycleResult<()> {
        self.expect_state(id, Operation::Update, LifecycleState::Activated)?;
        self.run_hook(id, Operation::Update, |object| update(object.as_any_mut(), elapsed))?;
        let key = self.entry(id)?.key;
        tracing::trace!(object = %id, ty = key.name(), ?elapsed, "update");
        self.observers.transitioned(
            id,
            key,
            Operation::Update,
            LifecycleState::Activated,
            LifecycleState::Activated,
        );
        Ok(())
    }

    /// Sets the enabled flag. When the value changes on an attached object,
    /// the object is activated or deactivated to match.
    pub fn set_enabled(&mut self, id: ObjectId, enabled: bool) -> LifecycleResult<()> {
        let entry = self.entry_mut(id)?;
        if entry.core.is_enabled == enabled {
            return Ok(());
        }
        entry.core.is_enabled = enabled;
        self.refresh_is_enabled(id)
    }

    fn refresh_is_enabled(&mut self, id: ObjectId) -> LifecycleResult<()> {
        let core = self.entry(id)?.core;
        if !core.is_attached() {
            return Ok(());
        }
        if core.is_enabled && !core.is_activated() {
            self.activate(id)
        } else if !core.is_enabled && core.is_activated() {
            self.deactivate(id)
        } else {
            Ok(())
        }
    }

    /// Reaction to a required incoming link disappearing.
    pub(crate) fn dependency_broken(
        &mut self,
        id: ObjectId,
        member: &'static str,
    ) -> LifecycleResult<()> {
        let entry = self.entry(id)?;
        let key = entry.key;
        if entry.core.is_releasing {
            tracing::trace!(object = %id, ty = key.name(), member, "dependency broken while releasing");
            return Ok(());
        }
        tracing::warn!(object = %id, ty = key.name(), member, "required dependency broken");
        self.observers.dependency_broken(id, member);
        self.force_state(id, LifecycleState::Detached, false)?;
        Ok(())
    }
}
