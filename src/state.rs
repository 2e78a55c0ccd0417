//! Lifecycle states, primitive operations and link categories.

use std::fmt;

/// Position of an object in its life-cycle.
///
/// States are ordered: an object only advances `Detached -> Deactivated ->
/// Activated` or retreats the reverse way. `Destroyed` is reachable only from
/// `Detached` and is terminal.
///
/// ```rust
/// use ferrous_lifecycle::LifecycleState;
///
/// assert!(LifecycleState::Activated > LifecycleState::Deactivated);
/// assert!(LifecycleState::Deactivated > LifecycleState::Detached);
/// assert!(LifecycleState::Destroyed.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "graph-export", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleState {
    /// Terminal. Orders below every other state.
    Destroyed,
    /// Initial state and the state reached after `detach`.
    #[default]
    Detached,
    /// Attached: bindings resolved, not running.
    Deactivated,
    /// Attached and running.
    Activated,
}

impl LifecycleState {
    /// True for [`LifecycleState::Destroyed`].
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Destroyed
    }

    /// True for `Deactivated` and `Activated`.
    #[inline]
    pub fn is_attached(self) -> bool {
        matches!(self, LifecycleState::Deactivated | LifecycleState::Activated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Destroyed => "Destroyed",
            LifecycleState::Detached => "Detached",
            LifecycleState::Deactivated => "Deactivated",
            LifecycleState::Activated => "Activated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive lifecycle operation.
///
/// Used to name the failing step in errors and to tag observer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "graph-export", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    Load,
    Attach,
    Activate,
    Start,
    Deactivate,
    Detach,
    Destroy,
    Update,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 8] = [
        Operation::Load,
        Operation::Attach,
        Operation::Activate,
        Operation::Start,
        Operation::Deactivate,
        Operation::Detach,
        Operation::Destroy,
        Operation::Update,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Load => "load",
            Operation::Attach => "attach",
            Operation::Activate => "activate",
            Operation::Start => "start",
            Operation::Deactivate => "deactivate",
            Operation::Detach => "detach",
            Operation::Destroy => "destroy",
            Operation::Update => "update",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Teardown category of a dependency link.
    ///
    /// `detach` releases links matching [`LinkKind::LIFECYCLE`]; `destroy`
    /// releases every remaining link ([`LinkKind::ALL`]). A link tagged
    /// [`LinkKind::LOADABLE`] therefore survives detach/attach cycles.
    ///
    /// ```rust
    /// use ferrous_lifecycle::LinkKind;
    ///
    /// assert!(LinkKind::ALL.intersects(LinkKind::LOADABLE));
    /// assert!(!LinkKind::LIFECYCLE.intersects(LinkKind::LOADABLE));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LinkKind: u32 {
        const LIFECYCLE = 0x01;
        const LOADABLE = 0x02;
        const ALL = !0;
    }
}

impl Default for LinkKind {
    fn default() -> Self {
        LinkKind::LIFECYCLE
    }
}
