//! Lifecycle objects and the arena that drives them.
//!
//! User types implement [`Lifecycle`]; every hook has a no-op default, so a
//! plain service only overrides what it needs. The runtime keeps the
//! bookkeeping (state, loaded/started/enabled flags, dependency links) in the
//! [`ObjectGraph`] and only hands hooks `&mut self`. A hook never sees the
//! graph, which keeps cascades from re-entering a running hook.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dependency::BindTable;
use crate::error::HookResult;
use crate::internal::RawHandle;

mod status;
mod graph;

pub use self::status::{LifecycleCore, ObjectStatus};
pub use self::graph::ObjectGraph;
pub(crate) use self::graph::Erased;

/// A lifecycle object shared between the runtime and the host.
pub type Shared<T> = Rc<RefCell<T>>;

/// Type-erased handle to a lifecycle object.
pub type DynObject = Rc<RefCell<dyn Lifecycle>>;

/// Wraps `value` into a [`Shared`] cell.
#[inline]
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Upcast helper implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Hooks of an object moving through the Detached / Deactivated / Activated /
/// Destroyed life-cycle.
///
/// The runtime calls the hooks; user code drives transitions through the
/// [`ObjectGraph`] primitives (or through the service registry).
///
/// | Hook | Runs during | Notes |
/// |---|---|---|
/// | `on_loaded` | `load` | at most once per object |
/// | `on_attached` | `attach` | after bindings resolved; `Ok(false)` vetoes |
/// | `on_activated` | `activate` | skipped when `should_be_activated` is false |
/// | `start` | `start` | once per activation, reset by `detach` |
/// | `on_deactivated` | `deactivate` | |
/// | `on_detach` | `detach` | before lifecycle links are released |
/// | `on_destroy` | `destroy` | only if the object was ever loaded |
///
/// # Examples
///
/// ```rust
/// use ferrous_lifecycle::{BindTable, HookResult, Lifecycle, ServiceBinding, Shared};
///
/// #[derive(Default)]
/// struct Clock {
///     ticks: u64,
/// }
///
/// impl Lifecycle for Clock {}
///
/// #[derive(Default)]
/// struct Scheduler {
///     clock: Option<Shared<Clock>>,
///     started: bool,
/// }
///
/// impl Lifecycle for Scheduler {
///     fn declare_bindings(table: &mut BindTable<Self>) {
///         table.service("clock", ServiceBinding, |s: &mut Scheduler| &mut s.clock);
///     }
///
///     fn start(&mut self) -> HookResult {
///         self.started = true;
///         Ok(())
///     }
/// }
/// ```
pub trait Lifecycle: AsAny {
    /// Declares the bind points of this type. Called once per type.
    fn declare_bindings(_table: &mut BindTable<Self>)
    where
        Self: Sized,
    {
    }

    fn on_loaded(&mut self) -> HookResult {
        Ok(())
    }

    /// Returning `Ok(false)` keeps the object Detached.
    fn on_attached(&mut self) -> HookResult<bool> {
        Ok(true)
    }

    fn on_activated(&mut self) -> HookResult {
        Ok(())
    }

    fn start(&mut self) -> HookResult {
        Ok(())
    }

    fn on_deactivated(&mut self) -> HookResult {
        Ok(())
    }

    fn on_detach(&mut self) -> HookResult {
        Ok(())
    }

    fn on_destroy(&mut self) -> HookResult {
        Ok(())
    }

    /// Gate consulted by `activate`. Defaults to the enabled flag.
    fn should_be_activated(&self, is_enabled: bool) -> bool {
        is_enabled
    }

    /// A link declared by this object through `member` was removed.
    fn on_dependency_removed(&mut self, _member: &'static str) {}
}

/// Generational handle of an object in an [`ObjectGraph`].
///
/// Handles of removed objects never alias a later object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) RawHandle);

impl ObjectId {
    /// Slot index, stable for the object's lifetime.
    pub fn index(&self) -> u32 {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}v{})", self.0.index, self.0.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.0.index, self.0.generation)
    }
}
