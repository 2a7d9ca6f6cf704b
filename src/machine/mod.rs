//! Typed state machines over arbitrary state values.
//!
//! [`Machine<S>`] adapts any [`State`] type onto the identity-keyed
//! [`Engine`]: every value entering the machine is mapped to its canonical
//! identity exactly once and cached, so handlers and routers can be handed
//! typed values back. The null state is expressed as `Option<S>`; parameters
//! accept `impl Into<Option<S>>`, so `machine.transition(Running)` and
//! `machine.transition(None)` both read naturally.

mod macros;
mod pattern;

pub use pattern::PatternBuilder;

use crate::core::grammar::{self, ParseError};
use crate::core::handler::{HandlerResult, Registration};
use crate::core::state::{State, StateName};
use crate::engine::{Engine, MachineError, TransitionHandle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type IdentityCache<S> = Arc<RwLock<HashMap<StateName, S>>>;

fn intern_value<S: State>(cache: &IdentityCache<S>, value: Option<S>) -> StateName {
    match value {
        None => StateName::null(),
        Some(value) => {
            let name = StateName::of(&value);
            cache.write().entry(name.clone()).or_insert(value);
            name
        }
    }
}

fn resolve_value<S: State>(cache: &IdentityCache<S>, name: &StateName) -> Option<S> {
    if name.is_null() {
        None
    } else {
        cache.read().get(name).cloned()
    }
}

/// A state machine over values of `S`.
///
/// Cloning a `Machine` clones a handle to the same machine. All transition
/// bodies run on the machine's private worker, one at a time, in submission
/// order; see [`transition`](Self::transition) and
/// [`transition_async`](Self::transition_async).
///
/// # Example
///
/// ```rust
/// use turnstile::{state_enum, Machine};
///
/// state_enum! {
///     enum Thread {
///         Ready,
///         Running,
///         Finished,
///     }
/// }
///
/// let machine = Machine::with_initial(Thread::Ready);
/// machine.add_transitions(Thread::Ready, [Thread::Running, Thread::Finished]);
/// machine.add_transition(Thread::Running, Thread::Finished);
/// machine.add_transition(Thread::Finished, None);
///
/// assert!(machine.transition(Thread::Running).unwrap());
/// assert!(machine.transition(Thread::Finished).unwrap());
/// assert!(machine.transition(None).unwrap());
/// assert_eq!(machine.current_state(), None);
/// assert_eq!(machine.transition_count(), 3);
/// ```
pub struct Machine<S: State> {
    engine: Engine,
    cache: IdentityCache<S>,
}

/// A machine whose states are plain strings. Names are trimmed, so
/// `"ready "` and `"ready"` are the same state.
pub type StringMachine = Machine<String>;

impl<S: State> Clone for Machine<S> {
    fn clone(&self) -> Self {
        Machine {
            engine: self.engine.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: State> Default for Machine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> Machine<S> {
    /// A machine whose initial state is null.
    pub fn new() -> Self {
        Self::with_initial(None)
    }

    /// A machine starting, and resetting to, the given state.
    pub fn with_initial(initial: impl Into<Option<S>>) -> Self {
        let cache: IdentityCache<S> = Arc::new(RwLock::new(HashMap::new()));
        let name = intern_value(&cache, initial.into());
        Machine {
            engine: Engine::with_initial(name),
            cache,
        }
    }

    /// Build a machine from a textual description, resolving each state name
    /// to a value through `resolver`. The literal token `null` denotes the
    /// null state and is never passed to the resolver.
    pub fn from_description<R>(text: &str, resolver: R) -> Result<Self, MachineError>
    where
        R: Fn(&str) -> Option<S>,
    {
        let description = grammar::parse(text)?;

        let mut values: HashMap<String, S> = HashMap::new();
        for name in description.names() {
            let value = resolver(name)
                .ok_or_else(|| ParseError::UnknownState(name.to_string()))?;
            values.insert(name.to_string(), value);
        }

        let initial = description
            .initial
            .as_ref()
            .and_then(|name| name.as_str())
            .and_then(|name| values.get(name).cloned());

        let machine = Machine::with_initial(initial);
        for value in values.into_values() {
            machine.intern(Some(value));
        }
        machine.engine.apply_parsed(description);
        Ok(machine)
    }

    fn intern(&self, value: Option<S>) -> StateName {
        intern_value(&self.cache, value)
    }

    fn resolve(&self, name: &StateName) -> Option<S> {
        resolve_value(&self.cache, name)
    }

    //==================== observation ====================//

    /// The current state; `None` is the null state.
    pub fn current_state(&self) -> Option<S> {
        self.resolve(&self.engine.current_state())
    }

    /// The state the machine resets to.
    pub fn initial_state(&self) -> Option<S> {
        self.resolve(&self.engine.initial_state())
    }

    /// Transitions committed since construction or the last reset.
    pub fn transition_count(&self) -> u64 {
        self.engine.transition_count()
    }

    /// The most recently entered states, oldest first.
    pub fn recent_states(&self) -> Vec<Option<S>> {
        self.engine
            .recent_states()
            .iter()
            .map(|name| self.resolve(name))
            .collect()
    }

    //==================== configuration ====================//

    /// Set the state used by the *next* reset. Does not itself reset.
    pub fn set_initial_state(&self, state: impl Into<Option<S>>) {
        let name = self.intern(state.into());
        self.engine.set_initial_state(name);
    }

    /// Restore current state to initial, zero the counter, reseed the window,
    /// and discard any still-queued transitions.
    pub fn reset(&self) {
        self.engine.reset();
    }

    /// Add one edge. Returns true if the graph changed, which also resets the
    /// machine.
    pub fn add_transition(&self, from: impl Into<Option<S>>, to: impl Into<Option<S>>) -> bool {
        let from = self.intern(from.into());
        let to = self.intern(to.into());
        self.engine.add_transition(from, to)
    }

    /// Add one edge carrying a handler fired only when this edge does.
    pub fn add_transition_with<F>(
        &self,
        from: impl Into<Option<S>>,
        to: impl Into<Option<S>>,
        handler: F,
    ) -> bool
    where
        F: Fn(Option<&S>, Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let from = self.intern(from.into());
        let to = self.intern(to.into());
        self.engine
            .add_transition_with(from, to, self.wrap_transition_handler(handler))
    }

    /// Add edges from one state to each listed target.
    pub fn add_transitions<I>(&self, from: impl Into<Option<S>>, targets: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
    {
        let from = self.intern(from.into());
        let targets: Vec<StateName> = targets
            .into_iter()
            .map(|target| self.intern(target.into()))
            .collect();
        self.engine.add_transitions(from, targets)
    }

    /// Add edges from one state to each listed target, attaching the handler
    /// to every one of them.
    pub fn add_transitions_with<I, F>(
        &self,
        from: impl Into<Option<S>>,
        targets: I,
        handler: F,
    ) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
        F: Fn(Option<&S>, Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let from = self.intern(from.into());
        let targets: Vec<StateName> = targets
            .into_iter()
            .map(|target| self.intern(target.into()))
            .collect();
        self.engine
            .add_transitions_with(from, targets, self.wrap_transition_handler(handler))
    }

    /// Add edges between every pair of the listed states, optionally
    /// including self-loops.
    pub fn add_all_transitions<I>(&self, states: I, include_self: bool) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
    {
        let states: Vec<StateName> = states
            .into_iter()
            .map(|state| self.intern(state.into()))
            .collect();
        self.engine.add_all_transitions(states, include_self)
    }

    /// Remove matching edges. Returns true (and resets) if any existed.
    pub fn remove_transitions<I>(&self, from: impl Into<Option<S>>, targets: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
    {
        let from = self.intern(from.into());
        let targets: Vec<StateName> = targets
            .into_iter()
            .map(|target| self.intern(target.into()))
            .collect();
        self.engine.remove_transitions(from, targets)
    }

    /// Replace a state's outgoing edges with exactly the listed targets.
    pub fn set_transitions<I>(&self, from: impl Into<Option<S>>, targets: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
    {
        let from = self.intern(from.into());
        let targets: Vec<StateName> = targets
            .into_iter()
            .map(|target| self.intern(target.into()))
            .collect();
        self.engine.set_transitions(from, targets)
    }

    //==================== handler registration ====================//

    /// Run a handler whenever any state is entered.
    pub fn on_any_entering<F>(&self, handler: F) -> Registration
    where
        F: Fn(Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        self.engine.on_any_entering(self.wrap_state_handler(handler))
    }

    /// Run a handler whenever any state is exited.
    pub fn on_any_exiting<F>(&self, handler: F) -> Registration
    where
        F: Fn(Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        self.engine.on_any_exiting(self.wrap_state_handler(handler))
    }

    /// Run a handler during every transition, between the exit and entry
    /// phases.
    pub fn on_any_transition<F>(&self, handler: F) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        self.engine
            .on_any_transition(self.wrap_transition_handler(handler))
    }

    /// Run a handler whenever the given state is entered, via any edge.
    pub fn on_entering<F>(&self, state: impl Into<Option<S>>, handler: F) -> Registration
    where
        F: Fn(Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let name = self.intern(state.into());
        self.engine.on_entering(name, self.wrap_state_handler(handler))
    }

    /// Run a handler whenever the given state is exited, via any edge.
    pub fn on_exiting<F>(&self, state: impl Into<Option<S>>, handler: F) -> Registration
    where
        F: Fn(Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let name = self.intern(state.into());
        self.engine.on_exiting(name, self.wrap_state_handler(handler))
    }

    /// Attach a handler to one existing edge. Does nothing if the edge has
    /// not been added; the edge is never created here.
    pub fn on_transition<F>(
        &self,
        from: impl Into<Option<S>>,
        to: impl Into<Option<S>>,
        handler: F,
    ) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let from = self.intern(from.into());
        let to = self.intern(to.into());
        self.engine
            .on_transition(from, to, self.wrap_transition_handler(handler))
    }

    //==================== routing ====================//

    /// Add a router consulted on every transition attempt.
    ///
    /// The router returns `None` for no preference, `Some(Some(state))` to
    /// redirect, or `Some(None)` to redirect to the null state. All routers
    /// run on every attempt, each seeing the originally requested target;
    /// when several return a decision, the last one wins. Validation then
    /// runs against the resolved target.
    pub fn route_on_transition<F>(&self, router: F) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> Option<Option<S>> + Send + Sync + 'static,
    {
        self.engine.route_on_transition(self.wrap_router(router))
    }

    /// Add a router that only fires on one exact (from, to) request.
    pub fn route_on_transition_between<F>(
        &self,
        from: impl Into<Option<S>>,
        to: impl Into<Option<S>>,
        router: F,
    ) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> Option<Option<S>> + Send + Sync + 'static,
    {
        let from = self.intern(from.into());
        let to = self.intern(to.into());
        self.engine
            .route_on_transition_between(from, to, self.wrap_router(router))
    }

    /// Add a router that only fires when the given state is about to be
    /// entered.
    pub fn route_before_entering<F>(&self, to: impl Into<Option<S>>, router: F) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> Option<Option<S>> + Send + Sync + 'static,
    {
        let to = self.intern(to.into());
        self.engine.route_before_entering(to, self.wrap_router(router))
    }

    /// Add a router that only fires when the given state is being exited.
    pub fn route_after_exiting<F>(&self, from: impl Into<Option<S>>, router: F) -> Registration
    where
        F: Fn(Option<&S>, Option<&S>) -> Option<Option<S>> + Send + Sync + 'static,
    {
        let from = self.intern(from.into());
        self.engine.route_after_exiting(from, self.wrap_router(router))
    }

    //==================== sequences ====================//

    /// Register a pattern over recently entered states. On a match the
    /// handler receives the concrete matched subsequence, oldest first, with
    /// wildcards resolved to the states they matched.
    pub fn on_sequence<F>(&self, pattern: PatternBuilder<S>, handler: F) -> Registration
    where
        F: Fn(&[Option<S>]) -> HandlerResult + Send + Sync + 'static,
    {
        let pattern = pattern.into_pattern(|state| self.intern(Some(state)));
        let cache = Arc::clone(&self.cache);
        self.engine.on_sequence(pattern, move |matched: &[StateName]| -> HandlerResult {
            let values: Vec<Option<S>> = matched
                .iter()
                .map(|name| resolve_value(&cache, name))
                .collect();
            handler(&values)
        })
    }

    /// Register a concrete sequence of states, without wildcards.
    pub fn on_state_sequence<I, F>(&self, states: I, handler: F) -> Registration
    where
        I: IntoIterator,
        I::Item: Into<Option<S>>,
        F: Fn(&[Option<S>]) -> HandlerResult + Send + Sync + 'static,
    {
        let mut pattern = PatternBuilder::new();
        for state in states {
            pattern = match state.into() {
                Some(state) => pattern.state(state),
                None => pattern.null(),
            };
        }
        self.on_sequence(pattern, handler)
    }

    //==================== transitions ====================//

    /// Move to the next state, blocking until this request's own outcome is
    /// known. Returns `Ok(true)` if the state changed, `Ok(false)` for a
    /// committed self-loop.
    ///
    /// Fails with [`MachineError::Reentrant`] when called from inside a
    /// handler of the same machine; use
    /// [`transition_async`](Self::transition_async) there.
    pub fn transition(&self, next: impl Into<Option<S>>) -> Result<bool, MachineError> {
        let name = self.intern(next.into());
        self.engine.transition(name)
    }

    /// Submit a transition without waiting. The returned handle reports the
    /// outcome later; requests run in submission order.
    pub fn transition_async(&self, next: impl Into<Option<S>>) -> TransitionHandle {
        let name = self.intern(next.into());
        self.engine.transition_async(name)
    }

    //==================== description ====================//

    /// Render the transition table in the textual grammar.
    pub fn to_description(&self) -> String {
        self.engine.to_description()
    }

    /// Merge a textual description into this machine, resolving names through
    /// `resolver`. Existing states and edges are preserved; the machine is
    /// reset afterward.
    pub fn apply_description<R>(&self, text: &str, resolver: R) -> Result<(), MachineError>
    where
        R: Fn(&str) -> Option<S>,
    {
        let description = grammar::parse(text)?;

        for name in description.names() {
            let value = resolver(name)
                .ok_or_else(|| ParseError::UnknownState(name.to_string()))?;
            self.intern(Some(value));
        }

        self.engine.apply_parsed(description);
        Ok(())
    }

    //==================== wrappers ====================//

    fn wrap_state_handler<F>(
        &self,
        handler: F,
    ) -> impl Fn(&StateName) -> HandlerResult + Send + Sync + 'static
    where
        F: Fn(Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let cache = Arc::clone(&self.cache);
        move |state: &StateName| {
            let value = resolve_value(&cache, state);
            handler(value.as_ref())
        }
    }

    fn wrap_transition_handler<F>(
        &self,
        handler: F,
    ) -> impl Fn(&StateName, &StateName) -> HandlerResult + Send + Sync + 'static
    where
        F: Fn(Option<&S>, Option<&S>) -> HandlerResult + Send + Sync + 'static,
    {
        let cache = Arc::clone(&self.cache);
        move |from: &StateName, to: &StateName| {
            let from = resolve_value(&cache, from);
            let to = resolve_value(&cache, to);
            handler(from.as_ref(), to.as_ref())
        }
    }

    fn wrap_router<F>(
        &self,
        router: F,
    ) -> impl Fn(&StateName, &StateName) -> Option<StateName> + Send + Sync + 'static
    where
        F: Fn(Option<&S>, Option<&S>) -> Option<Option<S>> + Send + Sync + 'static,
    {
        let cache = Arc::clone(&self.cache);
        move |current: &StateName, requested: &StateName| {
            let current = resolve_value(&cache, current);
            let requested = resolve_value(&cache, requested);
            router(current.as_ref(), requested.as_ref())
                .map(|redirect| intern_value(&cache, redirect))
        }
    }
}

/// Two machines are equal when they have the same states and the same edges;
/// handlers are not compared.
impl<S: State> PartialEq for Machine<S> {
    fn eq(&self, other: &Self) -> bool {
        self.engine == other.engine
    }
}

impl<S: State> fmt::Display for Machine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.engine, f)
    }
}

impl<S: State> fmt::Debug for Machine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("current", &self.current_state())
            .field("transitions", &self.transition_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_enum;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    state_enum! {
        enum Lifecycle {
            Ready,
            Running,
            Paused,
            Stopping,
            Stopped,
            Finished,
        }
    }

    state_enum! {
        enum Color {
            Red,
            Blue,
            Green,
            Orange,
        }
    }

    fn thread_like() -> Machine<Lifecycle> {
        let machine = Machine::with_initial(Lifecycle::Ready);
        machine.add_transitions(Lifecycle::Ready, [Lifecycle::Running, Lifecycle::Finished]);
        machine.add_transitions(Lifecycle::Running, [Lifecycle::Paused, Lifecycle::Stopping]);
        machine.add_transitions(Lifecycle::Paused, [Lifecycle::Running, Lifecycle::Stopping]);
        machine.add_transitions(Lifecycle::Stopping, [Lifecycle::Stopped]);
        machine.add_transitions(Lifecycle::Stopped, [Lifecycle::Finished]);
        machine.add_transitions(Lifecycle::Finished, [Some(Lifecycle::Ready), None]);
        machine
    }

    #[test]
    fn walks_the_lifecycle_down_to_null() {
        let machine = thread_like();
        machine.transition(Lifecycle::Running).unwrap();
        machine.transition(Lifecycle::Stopping).unwrap();
        machine.transition(Lifecycle::Stopped).unwrap();
        machine.transition(Lifecycle::Finished).unwrap();

        assert!(machine.transition(None).unwrap());
        assert_eq!(machine.current_state(), None);
        assert_eq!(machine.transition_count(), 5);
    }

    #[test]
    fn pausing_twice_is_rejected() {
        let machine = thread_like();
        machine.transition(Lifecycle::Running).unwrap();
        machine.transition(Lifecycle::Paused).unwrap();

        let err = machine.transition(Lifecycle::Paused).unwrap_err();
        assert!(matches!(err, MachineError::InvalidTransition { .. }));
        assert_eq!(machine.current_state(), Some(Lifecycle::Paused));
    }

    #[test]
    fn edge_handlers_count_per_edge_and_entry_handlers_per_entry() {
        let machine = Machine::with_initial(Lifecycle::Ready);
        machine.add_transition(Lifecycle::Ready, Lifecycle::Running);
        machine.add_transition(Lifecycle::Running, Lifecycle::Stopped);

        let transitions = Arc::new(AtomicUsize::new(0));
        for (from, to) in [
            (Lifecycle::Ready, Lifecycle::Running),
            (Lifecycle::Running, Lifecycle::Stopped),
        ] {
            let count = Arc::clone(&transitions);
            machine.on_transition(from, to, move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let entered = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&entered);
        machine.on_entering(Lifecycle::Running, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        machine.transition(Lifecycle::Running).unwrap();
        machine.transition(Lifecycle::Stopped).unwrap();

        assert_eq!(transitions.load(Ordering::SeqCst), 2);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn the_last_registered_router_decision_wins() {
        let machine = Machine::with_initial(Lifecycle::Ready);
        machine.add_all_transitions(
            [
                Lifecycle::Ready,
                Lifecycle::Running,
                Lifecycle::Paused,
                Lifecycle::Stopped,
            ],
            false,
        );

        machine.route_before_entering(Lifecycle::Stopped, |_current, _requested| {
            Some(Some(Lifecycle::Running))
        });
        machine.route_before_entering(Lifecycle::Stopped, |_current, _requested| {
            Some(Some(Lifecycle::Paused))
        });

        assert!(machine.transition(Lifecycle::Stopped).unwrap());
        assert_eq!(machine.current_state(), Some(Lifecycle::Paused));
    }

    #[test]
    fn redirects_reroute_entry_handlers() {
        let machine = Machine::with_initial(Color::Red);
        machine.add_all_transitions(
            [Color::Red, Color::Blue, Color::Green],
            true,
        );

        let blue = Arc::new(AtomicUsize::new(0));
        let green = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&blue);
        machine.on_entering(Color::Blue, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let count = Arc::clone(&green);
        machine.on_entering(Color::Green, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        machine.route_before_entering(Color::Green, |_current, requested| {
            assert_eq!(requested, Some(&Color::Green));
            Some(Some(Color::Blue))
        });

        machine.transition(Color::Blue).unwrap();
        machine.transition(Color::Green).unwrap();

        assert_eq!(blue.load(Ordering::SeqCst), 2);
        assert_eq!(green.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_failing_transition_cancels_queued_work_and_keeps_state() {
        let machine = Machine::with_initial(Lifecycle::Ready);
        machine.add_transition(Lifecycle::Ready, Lifecycle::Running);
        machine.add_transition(Lifecycle::Running, Lifecycle::Paused);

        // Hold the first transition open until both are queued.
        let both_queued = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicUsize::new(0));
        let gate = Arc::clone(&both_queued);
        let count = Arc::clone(&fired);
        machine.on_any_transition(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Err("handler always fails".into())
        });

        let first = machine.transition_async(Lifecycle::Running);
        let second = machine.transition_async(Lifecycle::Paused);
        both_queued.store(true, Ordering::SeqCst);

        assert!(matches!(first.await, Err(MachineError::Handler(_))));
        assert!(matches!(second.await, Err(MachineError::Cancelled)));
        assert_eq!(machine.current_state(), Some(Lifecycle::Ready));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concrete_sequences_fire_with_the_matched_states() {
        let machine = Machine::with_initial(Color::Red);
        machine.add_transition(Color::Red, Color::Blue);
        machine.add_transition(Color::Blue, Color::Green);
        machine.add_transition(Color::Green, Color::Orange);
        machine.add_transition(Color::Orange, Color::Red);

        let matches = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&matches);
        machine.on_state_sequence(
            [Color::Blue, Color::Green, Color::Orange],
            move |matched| {
                assert_eq!(
                    matched,
                    &[
                        Some(Color::Blue),
                        Some(Color::Green),
                        Some(Color::Orange)
                    ]
                );
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        machine.transition(Color::Blue).unwrap();
        machine.transition(Color::Green).unwrap();
        machine.transition(Color::Orange).unwrap();
        machine.transition(Color::Red).unwrap();

        assert_eq!(matches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_patterns_resolve_to_the_states_they_matched() {
        let machine = Machine::with_initial(Color::Red);
        machine.add_all_transitions(
            [Color::Red, Color::Blue, Color::Green, Color::Orange],
            false,
        );

        let seen: Arc<parking_lot::Mutex<Vec<Vec<Option<Color>>>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        machine.on_sequence(
            PatternBuilder::new().state(Color::Green).wildcard(),
            move |matched| {
                log.lock().push(matched.to_vec());
                Ok(())
            },
        );

        for color in [Color::Blue, Color::Green, Color::Orange, Color::Red] {
            machine.transition(color).unwrap();
        }

        assert_eq!(
            *seen.lock(),
            vec![vec![Some(Color::Green), Some(Color::Orange)]]
        );
    }

    #[test]
    fn unregistered_handlers_stop_firing() {
        let machine = Machine::with_initial(Lifecycle::Ready);
        machine.add_transition(Lifecycle::Ready, Lifecycle::Running);
        machine.add_transition(Lifecycle::Running, Lifecycle::Ready);

        let entered = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&entered);
        let registration = machine.on_entering(Lifecycle::Running, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        machine.transition(Lifecycle::Running).unwrap();
        registration.unregister();

        machine.transition(Lifecycle::Ready).unwrap();
        machine.transition(Lifecycle::Running).unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn string_machines_trim_state_names() {
        let machine = StringMachine::new();
        machine.add_transition(None, Some("hello".to_string()));
        machine.add_transition("hello".to_string(), "world".to_string());
        machine.add_transition("world".to_string(), "goodbye ".to_string());
        machine.add_transition("goodbye".to_string(), None);

        machine.transition("hello".to_string()).unwrap();
        machine.transition("world".to_string()).unwrap();
        machine.transition("goodbye".to_string()).unwrap();
        assert!(machine.transition(None).unwrap());
        assert_eq!(machine.current_state(), None);
        assert_eq!(machine.transition_count(), 4);
    }

    #[test]
    fn typed_descriptions_round_trip() {
        let machine = thread_like();
        let text = machine.to_description();

        let resolver = |name: &str| match name {
            "Ready" => Some(Lifecycle::Ready),
            "Running" => Some(Lifecycle::Running),
            "Paused" => Some(Lifecycle::Paused),
            "Stopping" => Some(Lifecycle::Stopping),
            "Stopped" => Some(Lifecycle::Stopped),
            "Finished" => Some(Lifecycle::Finished),
            _ => None,
        };
        let rebuilt = Machine::from_description(&text, resolver).unwrap();

        assert_eq!(machine, rebuilt);
        assert_eq!(rebuilt.initial_state(), Some(Lifecycle::Ready));
        assert!(rebuilt.transition(Lifecycle::Running).unwrap());
    }

    #[test]
    fn unresolvable_names_are_a_parse_error() {
        let err = Machine::<Lifecycle>::from_description("Ready | Ready : {Bogus}", |name| {
            match name {
                "Ready" => Some(Lifecycle::Ready),
                _ => None,
            }
        })
        .unwrap_err();

        assert!(matches!(
            err,
            MachineError::Parse(ParseError::UnknownState(_))
        ));
    }

    #[test]
    fn reset_reseeds_the_recent_state_window() {
        let machine = thread_like();
        machine.transition(Lifecycle::Running).unwrap();
        machine.transition(Lifecycle::Paused).unwrap();

        machine.reset();
        assert_eq!(machine.current_state(), Some(Lifecycle::Ready));
        assert_eq!(machine.transition_count(), 0);
        assert_eq!(machine.recent_states(), vec![Some(Lifecycle::Ready)]);
    }
}
