use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::LifecycleError;

/// Decides what happens to a failure captured on behalf of a service.
///
/// Returning `true` re-raises the failure and aborts the current pass or
/// tick; `false` records it and lets the caller continue.
pub trait ErrorHandler {
    fn capture_error(&self, error: &LifecycleError) -> bool;
}

type Listener = Rc<dyn Fn(&LifecycleError)>;

/// Error handler with a rethrow switch and "error fired" listeners.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ferrous_lifecycle::{DefaultErrorHandler, ErrorHandler, LifecycleError};
///
/// let handler = DefaultErrorHandler::new();
/// let seen = Rc::new(Cell::new(0));
/// let counter = seen.clone();
/// handler.on_error(move |_| counter.set(counter.get() + 1));
///
/// handler.set_rethrow(false);
/// assert!(!handler.capture_error(&LifecycleError::Config("bad".into())));
/// assert_eq!(seen.get(), 1);
/// assert_eq!(handler.captured_count(), 1);
/// ```
pub struct DefaultErrorHandler {
    rethrow: Cell<bool>,
    listeners: RefCell<Vec<Listener>>,
    captured: Cell<u64>,
}

impl DefaultErrorHandler {
    /// A handler that re-raises every captured error.
    pub fn new() -> Self {
        Self::with_rethrow(true)
    }

    pub fn with_rethrow(rethrow: bool) -> Self {
        Self {
            rethrow: Cell::new(rethrow),
            listeners: RefCell::new(Vec::new()),
            captured: Cell::new(0),
        }
    }

    pub fn set_rethrow(&self, rethrow: bool) {
        self.rethrow.set(rethrow);
    }

    pub fn rethrow(&self) -> bool {
        self.rethrow.get()
    }

    /// Calls `listener` for every captured error, in registration order.
    pub fn on_error(&self, listener: impl Fn(&LifecycleError) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    pub fn captured_count(&self) -> u64 {
        self.captured.get()
    }
}

impl Default for DefaultErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefaultErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultErrorHandler")
            .field("rethrow", &self.rethrow.get())
            .field("listeners", &format!("{} listeners", self.listeners.borrow().len()))
            .field("captured", &self.captured.get())
            .finish()
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn capture_error(&self, error: &LifecycleError) -> bool {
        self.captured.set(self.captured.get() + 1);
        let rethrow = self.rethrow.get();
        tracing::error!(error = %error, rethrow, "lifecycle error captured");

        // Listeners may register further listeners.
        let listeners: Vec<Listener> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(error);
        }
        rethrow
    }
}
