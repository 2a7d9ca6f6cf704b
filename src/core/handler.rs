//! Handler and router capabilities, and registration handles.
//!
//! The engine dispatches through a small closed set of capability traits:
//! state handlers (entry/exit), transition handlers, sequence handlers, and
//! routers. Each has a blanket implementation for plain closures, so most
//! callers never name the traits at all.

use crate::core::state::StateName;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Error type handlers may fail with. A returned
/// [`MachineError`](crate::engine::MachineError) propagates to the caller
/// unchanged; any other error is wrapped as a handler failure.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for all user-supplied handler code.
pub type HandlerResult = Result<(), HandlerError>;

/// Callback invoked when a state is entered or exited.
pub trait StateHandler: Send + Sync {
    fn on_state(&self, state: &StateName) -> HandlerResult;
}

impl<F> StateHandler for F
where
    F: Fn(&StateName) -> HandlerResult + Send + Sync,
{
    fn on_state(&self, state: &StateName) -> HandlerResult {
        self(state)
    }
}

/// Callback invoked while a transition is occurring, between the exit and
/// entry phases.
pub trait TransitionHandler: Send + Sync {
    fn on_transition(&self, from: &StateName, to: &StateName) -> HandlerResult;
}

impl<F> TransitionHandler for F
where
    F: Fn(&StateName, &StateName) -> HandlerResult + Send + Sync,
{
    fn on_transition(&self, from: &StateName, to: &StateName) -> HandlerResult {
        self(from, to)
    }
}

/// Callback invoked when a registered pattern matches the most recently
/// entered states. Receives the concrete matched subsequence, oldest first;
/// wildcard positions are resolved to the states they actually matched.
pub trait SequenceHandler: Send + Sync {
    fn on_match(&self, matched: &[StateName]) -> HandlerResult;
}

impl<F> SequenceHandler for F
where
    F: Fn(&[StateName]) -> HandlerResult + Send + Sync,
{
    fn on_match(&self, matched: &[StateName]) -> HandlerResult {
        self(matched)
    }
}

/// Decision function that may redirect a requested transition before it is
/// validated.
///
/// Every router in a chain sees the current state and the originally
/// requested target. Returning `None` expresses no preference; returning
/// `Some(target)` redirects. When several routers in a chain return a
/// decision, the last one wins.
pub trait StateRouter: Send + Sync {
    fn route(&self, current: &StateName, requested: &StateName) -> Option<StateName>;
}

impl<F> StateRouter for F
where
    F: Fn(&StateName, &StateName) -> Option<StateName> + Send + Sync,
{
    fn route(&self, current: &StateName, requested: &StateName) -> Option<StateName> {
        self(current, requested)
    }
}

/// Opaque handle returned by every registration call.
///
/// `unregister` removes exactly the registration that produced the handle.
/// It is idempotent: the second and later calls do nothing. Dropping the
/// handle does *not* unregister.
///
/// ```rust
/// use turnstile::StringMachine;
///
/// let machine = StringMachine::with_initial("on".to_string());
/// machine.add_transition("on".to_string(), "off".to_string());
///
/// let reg = machine.on_any_entering(|_state| Ok(()));
/// reg.unregister();
/// reg.unregister(); // no effect
/// ```
pub struct Registration {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Registration {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Registration {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Remove the registered callback, handler, router, or pattern.
    pub fn unregister(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.cancel.lock().is_some();
        f.debug_struct("Registration").field("live", &live).finish()
    }
}

/// Ordered set of registered handlers, keyed by registration id.
///
/// Iteration follows registration order. Snapshots are taken before each
/// dispatch phase so no lock is ever held while user code runs.
pub(crate) struct HandlerSet<T: ?Sized> {
    entries: Vec<(u64, Arc<T>)>,
}

impl<T: ?Sized> HandlerSet<T> {
    pub(crate) fn insert(&mut self, id: u64, handler: Arc<T>) {
        self.entries.push((id, handler));
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

impl<T: ?Sized> Default for HandlerSet<T> {
    fn default() -> Self {
        HandlerSet {
            entries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_implement_the_capability_traits() {
        let state_handler = |_: &StateName| -> HandlerResult { Ok(()) };
        state_handler.on_state(&StateName::new("A")).unwrap();

        let transition_handler = |_: &StateName, _: &StateName| -> HandlerResult { Ok(()) };
        transition_handler
            .on_transition(&StateName::new("A"), &StateName::null())
            .unwrap();

        let router = |_: &StateName, requested: &StateName| Some(requested.clone());
        assert_eq!(
            router.route(&StateName::new("A"), &StateName::new("B")),
            Some(StateName::new("B"))
        );
    }

    #[test]
    fn unregister_runs_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let reg = {
            let count = Arc::clone(&count);
            Registration::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        reg.unregister();
        reg.unregister();
        reg.unregister();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_registration_does_not_unregister() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            let _reg = Registration::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
