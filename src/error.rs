//! Error types for the lifecycle runtime.

use std::error::Error;
use std::fmt;

use thiserror::Error;

use crate::object::ObjectId;
use crate::state::{LifecycleState, Operation};

/// Error returned by user hooks.
///
/// Hooks may fail with any error type; the runtime boxes it and attaches the
/// operation and the concrete type before routing it further.
pub type HookError = Box<dyn Error + 'static>;

/// Result type returned by user hooks.
pub type HookResult<T = ()> = Result<T, HookError>;

/// Lifecycle runtime errors.
///
/// Precondition violations ([`LifecycleError::InvalidState`]) are programmer
/// errors and are never swallowed. Hook failures ([`LifecycleError::Hook`])
/// are the only errors the service registry routes through its
/// [`ErrorHandler`](crate::ErrorHandler); every other variant propagates
/// immediately.
///
/// # Examples
///
/// ```rust
/// use ferrous_lifecycle::{LifecycleError, LifecycleState, Operation};
///
/// let err = LifecycleError::InvalidState {
///     operation: Operation::Activate,
///     type_name: "game::Renderer",
///     state: LifecycleState::Detached,
/// };
/// assert_eq!(
///     err.to_string(),
///     "cannot activate game::Renderer: object is Detached"
/// );
/// ```
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A primitive was called in the wrong state.
    #[error("cannot {operation} {type_name}: object is {state}")]
    InvalidState {
        operation: Operation,
        type_name: &'static str,
        state: LifecycleState,
    },
    /// The handle does not name a live graph entry.
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    /// The object's cell is borrowed by the caller while one of its hooks must run.
    #[error("object {type_name} is borrowed while the runtime needs it")]
    ObjectBusy { type_name: &'static str },
    /// A Destroyed entry is required to free a graph slot.
    #[error("cannot remove {type_name} while it is {state}")]
    NotDestroyed {
        type_name: &'static str,
        state: LifecycleState,
    },
    /// A user hook failed.
    #[error(transparent)]
    Hook(#[from] HookFailure),
    /// A hook failure re-raised by the registry on behalf of a service.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The roster already holds a service of this concrete type.
    #[error("service {0} is already registered")]
    DuplicateService(&'static str),
    /// The service was added while already attached to the graph.
    #[error("service {0} is already attached")]
    ServiceAttached(&'static str),
    /// The service was added after being destroyed.
    #[error("service {0} is destroyed")]
    ServiceDestroyed(&'static str),
    /// The container already holds a registration for this type.
    #[error("type {0} is already registered with the container")]
    DuplicateRegistration(&'static str),
    /// The container has no registration for this type.
    #[error("type {0} is not registered with the container")]
    NotRegistered(&'static str),
    /// A factory asked the container for the type it is constructing.
    #[error("type {0} depends on itself during construction")]
    ResolutionCycle(&'static str),
    /// The host's per-frame guard wrapped a failing update.
    #[error("update frame failed: {0}")]
    UpdateFrame(#[source] Box<LifecycleError>),
    /// Runtime options could not be parsed.
    #[error("invalid runtime options: {0}")]
    Config(String),
}

impl LifecycleError {
    /// The hook failure carried by this error, looking through service and
    /// frame wrappers.
    pub fn hook_failure(&self) -> Option<&HookFailure> {
        match self {
            LifecycleError::Hook(failure) => Some(failure),
            LifecycleError::Service(service) => service.source.hook_failure(),
            LifecycleError::UpdateFrame(inner) => inner.hook_failure(),
            _ => None,
        }
    }

    /// True when this is a precondition violation.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, LifecycleError::InvalidState { .. })
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A user hook returned an error.
#[derive(Debug)]
pub struct HookFailure {
    pub operation: Operation,
    pub type_name: &'static str,
    pub source: HookError,
}

impl HookFailure {
    pub fn new(operation: Operation, type_name: &'static str, source: HookError) -> Self {
        Self {
            operation,
            type_name,
            source,
        }
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hook of {} failed: {}",
            self.operation, self.type_name, self.source
        )
    }
}

impl Error for HookFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// A failure packaged with the identity of the service being processed.
#[derive(Debug, Error)]
#[error("service exception \"{service}\": {source}")]
pub struct ServiceError {
    pub service: &'static str,
    #[source]
    pub source: Box<LifecycleError>,
}

impl ServiceError {
    pub fn new(service: &'static str, source: LifecycleError) -> Self {
        Self {
            service,
            source: Box::new(source),
        }
    }
}
