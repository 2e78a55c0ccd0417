use crate::state::LifecycleState;

/// Lifecycle bookkeeping of one object.
///
/// `is_loaded` is sticky; `is_started` is cleared by every detach.
/// `is_releasing` is set while detach or destroy unwinds the object's links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleCore {
    pub(crate) state: LifecycleState,
    pub(crate) is_loaded: bool,
    pub(crate) is_started: bool,
    pub(crate) is_enabled: bool,
    pub(crate) is_releasing: bool,
}

impl Default for LifecycleCore {
    fn default() -> Self {
        Self {
            state: LifecycleState::Detached,
            is_loaded: false,
            is_started: false,
            is_enabled: true,
            is_releasing: false,
        }
    }
}

impl LifecycleCore {
    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.state.is_attached()
    }

    #[inline]
    pub fn is_activated(&self) -> bool {
        self.state == LifecycleState::Activated
    }

    /// Started and still Activated.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.is_started && self.is_activated()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.state == LifecycleState::Destroyed
    }

    pub fn status(&self) -> ObjectStatus {
        ObjectStatus {
            state: self.state,
            is_loaded: self.is_loaded,
            is_started: self.is_started(),
            is_enabled: self.is_enabled,
            is_attached: self.is_attached(),
            is_activated: self.is_activated(),
            is_destroyed: self.is_destroyed(),
        }
    }
}

/// Snapshot of an object's flags, derived ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectStatus {
    pub state: LifecycleState,
    pub is_loaded: bool,
    pub is_started: bool,
    pub is_enabled: bool,
    pub is_attached: bool,
    pub is_activated: bool,
    pub is_destroyed: bool,
}
