//! The execution engine: aggregate root, dispatch protocol, and the
//! serialized worker that runs transitions one at a time.
//!
//! An [`Engine`] works entirely on canonical [`StateName`] identities. The
//! typed facade in [`crate::machine`] maps external values onto it.

mod error;
mod executor;

pub use error::MachineError;
pub use executor::TransitionHandle;

use crate::core::grammar::{self, Description, ParseError};
use crate::core::handler::{
    HandlerSet, Registration, SequenceHandler, StateHandler, StateRouter, TransitionHandler,
};
use crate::core::router::{self, RouterChain};
use crate::core::sequence::{Pattern, SequenceMatcher};
use crate::core::state::StateName;
use crate::core::table::TransitionTable;
use executor::JobQueue;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, warn};

/// The commit domain: the transition table, the current state, and the
/// committed-transition counter move together under one lock.
struct CoreState {
    table: TransitionTable,
    current: usize,
    transitions: u64,
}

#[derive(Default)]
struct GlobalHandlers {
    entry: HandlerSet<dyn StateHandler>,
    exit: HandlerSet<dyn StateHandler>,
    transition: HandlerSet<dyn TransitionHandler>,
}

struct EngineShared {
    core: Mutex<CoreState>,
    routers: RwLock<RouterChain>,
    globals: RwLock<GlobalHandlers>,
    sequences: Mutex<SequenceMatcher>,
    queue: Arc<JobQueue>,
    next_id: AtomicU64,
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// A state machine over canonical state identities.
///
/// The engine owns the transition table, router chain, handler sets, sequence
/// matcher, and a private serialized worker. All transition bodies for one
/// engine run on that worker, one at a time, in submission order.
///
/// Cloning an `Engine` clones a handle to the *same* machine, so handlers can
/// capture their own machine and submit follow-up work:
///
/// ```rust
/// use turnstile::{Engine, StateName};
///
/// let engine = Engine::with_initial(StateName::new("Ready"));
/// engine.add_transition(StateName::new("Ready"), StateName::new("Running"));
///
/// let changed = engine.transition(StateName::new("Running")).unwrap();
/// assert!(changed);
/// assert_eq!(engine.current_state(), StateName::new("Running"));
/// ```
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Engine {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine whose initial state is null.
    pub fn new() -> Self {
        Self::with_initial(StateName::null())
    }

    /// An engine starting, and resetting to, the given state.
    pub fn with_initial(initial: StateName) -> Self {
        let table = TransitionTable::new(initial.clone());
        let current = table.initial();

        let shared = Arc::new(EngineShared {
            core: Mutex::new(CoreState {
                table,
                current,
                transitions: 0,
            }),
            routers: RwLock::new(RouterChain::default()),
            globals: RwLock::new(GlobalHandlers::default()),
            sequences: Mutex::new(SequenceMatcher::new(initial)),
            queue: Arc::new(JobQueue::new()),
            next_id: AtomicU64::new(1),
        });

        let queue = Arc::clone(&shared.queue);
        let weak = Arc::downgrade(&shared);
        thread::spawn(move || worker_loop(queue, weak));

        Engine { shared }
    }

    /// Build an engine from a textual description. The description's initial
    /// state (when present) becomes the engine's initial state.
    pub fn from_description(text: &str) -> Result<Self, ParseError> {
        let description = grammar::parse(text)?;
        let engine = Engine::with_initial(description.initial.clone().unwrap_or_default());
        engine.apply_parsed(description);
        Ok(engine)
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn weak(&self) -> Weak<EngineShared> {
        Arc::downgrade(&self.shared)
    }

    //==================== observation ====================//

    /// The current state's identity.
    pub fn current_state(&self) -> StateName {
        let core = self.shared.core.lock();
        core.table.name_of(core.current).clone()
    }

    /// The state the machine resets to.
    pub fn initial_state(&self) -> StateName {
        let core = self.shared.core.lock();
        core.table.name_of(core.table.initial()).clone()
    }

    /// Transitions committed since construction or the last reset. A
    /// transition counts once its exit, transition, and entry phases have all
    /// completed.
    pub fn transition_count(&self) -> u64 {
        self.shared.core.lock().transitions
    }

    /// The most recently entered states, oldest first, as tracked for
    /// sequence matching.
    pub fn recent_states(&self) -> Vec<StateName> {
        self.shared.sequences.lock().window()
    }

    //==================== configuration ====================//

    /// Set the state used by the *next* reset. Does not itself reset.
    pub fn set_initial_state(&self, state: StateName) {
        self.shared.core.lock().table.set_initial(&state);
    }

    /// Restore the machine: current state back to initial, counter to zero,
    /// the sequence window reseeded, and any still-queued transitions
    /// discarded (their handles report cancellation).
    pub fn reset(&self) {
        let dropped = self.shared.queue.cancel_pending();
        if dropped > 0 {
            debug!(dropped, "reset discarded queued transitions");
        }

        let initial = {
            let mut core = self.shared.core.lock();
            core.current = core.table.initial();
            core.transitions = 0;
            core.table.name_of(core.current).clone()
        };

        self.shared.sequences.lock().reset(initial);
    }

    /// Add one edge. Returns true if the graph changed (which also resets the
    /// machine); re-adding an existing edge changes nothing.
    pub fn add_transition(&self, from: StateName, to: StateName) -> bool {
        self.add_edges(&from, &[to], None)
    }

    /// Add one edge carrying a handler fired only when this edge does.
    pub fn add_transition_with(
        &self,
        from: StateName,
        to: StateName,
        handler: impl TransitionHandler + 'static,
    ) -> bool {
        self.add_edges(&from, &[to], Some(Arc::new(handler)))
    }

    /// Add edges from one state to each listed target.
    pub fn add_transitions(
        &self,
        from: StateName,
        targets: impl IntoIterator<Item = StateName>,
    ) -> bool {
        let targets: Vec<StateName> = targets.into_iter().collect();
        self.add_edges(&from, &targets, None)
    }

    /// Add edges from one state to each listed target, attaching the handler
    /// to every one of them.
    pub fn add_transitions_with(
        &self,
        from: StateName,
        targets: impl IntoIterator<Item = StateName>,
        handler: impl TransitionHandler + 'static,
    ) -> bool {
        let targets: Vec<StateName> = targets.into_iter().collect();
        self.add_edges(&from, &targets, Some(Arc::new(handler)))
    }

    /// Add edges between every pair of the listed states, optionally
    /// including self-loops.
    pub fn add_all_transitions(
        &self,
        states: impl IntoIterator<Item = StateName>,
        include_self: bool,
    ) -> bool {
        let states: Vec<StateName> = states.into_iter().collect();
        let mut modified = false;

        {
            let mut core = self.shared.core.lock();
            for from in &states {
                let targets: Vec<StateName> = states
                    .iter()
                    .filter(|target| include_self || *target != from)
                    .cloned()
                    .collect();
                modified |= core.table.add_edges(from, &targets, None, true);
            }
        }

        if modified {
            self.reset();
        }
        modified
    }

    /// Remove matching edges. Returns true (and resets) if any existed.
    pub fn remove_transitions(
        &self,
        from: StateName,
        targets: impl IntoIterator<Item = StateName>,
    ) -> bool {
        let targets: Vec<StateName> = targets.into_iter().collect();
        let modified = self.shared.core.lock().table.remove_edges(&from, &targets);
        if modified {
            debug!(from = %from, "transition graph modified; machine reset");
            self.reset();
        }
        modified
    }

    /// Replace a state's outgoing edges with exactly the listed targets.
    pub fn set_transitions(&self, from: StateName, targets: impl IntoIterator<Item = StateName>) {
        let targets: Vec<StateName> = targets.into_iter().collect();
        let modified = self.shared.core.lock().table.set_edges(&from, &targets);
        if modified {
            debug!(from = %from, "transition graph modified; machine reset");
            self.reset();
        }
    }

    fn add_edges(
        &self,
        from: &StateName,
        targets: &[StateName],
        handler: Option<Arc<dyn TransitionHandler>>,
    ) -> bool {
        let callback = handler.map(|h| (self.next_id(), h));
        let modified = self
            .shared
            .core
            .lock()
            .table
            .add_edges(from, targets, callback, true);

        if modified {
            debug!(from = %from, "transition graph modified; machine reset");
            self.reset();
        }
        modified
    }

    //==================== handler registration ====================//

    /// Run a handler whenever any state is entered.
    pub fn on_any_entering(&self, handler: impl StateHandler + 'static) -> Registration {
        let id = self.next_id();
        self.shared.globals.write().entry.insert(id, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.globals.write().entry.remove(id);
            }
        })
    }

    /// Run a handler whenever any state is exited.
    pub fn on_any_exiting(&self, handler: impl StateHandler + 'static) -> Registration {
        let id = self.next_id();
        self.shared.globals.write().exit.insert(id, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.globals.write().exit.remove(id);
            }
        })
    }

    /// Run a handler during every transition, between the exit and entry
    /// phases.
    pub fn on_any_transition(&self, handler: impl TransitionHandler + 'static) -> Registration {
        let id = self.next_id();
        self.shared
            .globals
            .write()
            .transition
            .insert(id, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.globals.write().transition.remove(id);
            }
        })
    }

    /// Run a handler whenever the given state is entered, via any edge.
    pub fn on_entering(&self, state: StateName, handler: impl StateHandler + 'static) -> Registration {
        let id = self.next_id();
        self.shared
            .core
            .lock()
            .table
            .add_entry_handler(&state, id, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.core.lock().table.remove_entry_handler(&state, id);
            }
        })
    }

    /// Run a handler whenever the given state is exited, via any edge.
    pub fn on_exiting(&self, state: StateName, handler: impl StateHandler + 'static) -> Registration {
        let id = self.next_id();
        self.shared
            .core
            .lock()
            .table
            .add_exit_handler(&state, id, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.core.lock().table.remove_exit_handler(&state, id);
            }
        })
    }

    /// Attach a handler to one existing edge. Does nothing if the edge has
    /// not been added; the edge is never created here.
    pub fn on_transition(
        &self,
        from: StateName,
        to: StateName,
        handler: impl TransitionHandler + 'static,
    ) -> Registration {
        let id = self.next_id();
        let handler: Arc<dyn TransitionHandler> = Arc::new(handler);
        self.shared.core.lock().table.add_edges(
            &from,
            std::slice::from_ref(&to),
            Some((id, handler)),
            false,
        );

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.core.lock().table.remove_edge_callback(&from, &to, id);
            }
        })
    }

    //==================== routing ====================//

    /// Add a router consulted on every transition attempt. All routers run on
    /// every attempt, each seeing the originally requested target; when
    /// several return a decision, the last one wins.
    pub fn route_on_transition(&self, router: impl StateRouter + 'static) -> Registration {
        self.register_router(Arc::new(router))
    }

    /// Add a router that only fires on one exact (from, to) request.
    pub fn route_on_transition_between(
        &self,
        from: StateName,
        to: StateName,
        router: impl StateRouter + 'static,
    ) -> Registration {
        self.register_router(Arc::new(router::gate_between(from, to, Arc::new(router))))
    }

    /// Add a router that only fires when the given state is about to be
    /// entered.
    pub fn route_before_entering(
        &self,
        to: StateName,
        router: impl StateRouter + 'static,
    ) -> Registration {
        self.register_router(Arc::new(router::gate_entering(to, Arc::new(router))))
    }

    /// Add a router that only fires when the given state is being exited.
    pub fn route_after_exiting(
        &self,
        from: StateName,
        router: impl StateRouter + 'static,
    ) -> Registration {
        self.register_router(Arc::new(router::gate_exiting(from, Arc::new(router))))
    }

    fn register_router(&self, router: Arc<dyn StateRouter>) -> Registration {
        let id = self.next_id();
        self.shared.routers.write().add(id, router);

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.routers.write().remove(id);
            }
        })
    }

    //==================== sequences ====================//

    /// Register a pattern over recently entered states. After every committed
    /// transition the pattern is checked against the last states entered; on
    /// a match the handler receives the concrete matched subsequence.
    pub fn on_sequence(
        &self,
        pattern: Pattern,
        handler: impl SequenceHandler + 'static,
    ) -> Registration {
        let id = self.next_id();
        self.shared
            .sequences
            .lock()
            .register(id, pattern, Arc::new(handler));

        let weak = self.weak();
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.sequences.lock().unregister(id);
            }
        })
    }

    //==================== transitions ====================//

    /// Move to the next state, blocking until this request's own outcome is
    /// known. Returns `Ok(true)` if the state changed, `Ok(false)` for a
    /// committed self-loop.
    ///
    /// Must not be called from inside a handler of the same machine (fails
    /// with [`MachineError::Reentrant`]); use [`transition_async`] there.
    /// There is no timeout: a handler that never returns stalls this
    /// machine's worker permanently.
    ///
    /// [`transition_async`]: Self::transition_async
    pub fn transition(&self, next: StateName) -> Result<bool, MachineError> {
        if self.shared.queue.on_worker_thread() {
            return Err(MachineError::Reentrant);
        }

        self.shared
            .queue
            .submit(next)
            .blocking_recv()
            .unwrap_or(Err(MachineError::Cancelled))
    }

    /// Submit a transition without waiting. The returned handle reports the
    /// outcome later; requests run in submission order. Allowed from inside
    /// handlers: the request queues up behind the transition in progress.
    pub fn transition_async(&self, next: StateName) -> TransitionHandle {
        TransitionHandle::new(self.shared.queue.submit(next))
    }

    //==================== description ====================//

    /// Render the transition table in the textual grammar, initial state
    /// first. `Display` produces the same text.
    pub fn to_description(&self) -> String {
        let core = self.shared.core.lock();
        let initial = core.table.name_of(core.table.initial()).clone();
        grammar::serialize(&initial, &core.table.blocks())
    }

    /// Merge a textual description into this machine. Existing states and
    /// edges are preserved; the machine is reset afterward.
    pub fn apply_description(&self, text: &str) -> Result<(), ParseError> {
        let description = grammar::parse(text)?;
        self.apply_parsed(description);
        Ok(())
    }

    pub(crate) fn apply_parsed(&self, description: Description) {
        {
            let mut core = self.shared.core.lock();
            if let Some(initial) = &description.initial {
                core.table.set_initial(initial);
            }
            for (state, targets) in &description.blocks {
                core.table.ensure(state);
                core.table.add_edges(state, targets, None, true);
            }
        }

        self.reset();
    }
}

/// Two engines are equal when they have the same states and the same edges.
/// Handlers, routers, patterns, and the initial pointer are not compared.
impl PartialEq for Engine {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return true;
        }

        // Lock in address order so concurrent opposite-direction comparisons
        // cannot deadlock.
        let (first, second) = if Arc::as_ptr(&self.shared) < Arc::as_ptr(&other.shared) {
            (self, other)
        } else {
            (other, self)
        };
        let a = first.shared.core.lock();
        let b = second.shared.core.lock();
        a.table.same_shape(&b.table)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_description())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("current", &self.current_state())
            .field("transitions", &self.transition_count())
            .finish()
    }
}

//==================== worker ====================//

fn worker_loop(queue: Arc<JobQueue>, shared: Weak<EngineShared>) {
    queue.bind_worker();

    while let Some(job) = queue.next() {
        let Some(shared) = shared.upgrade() else {
            let _ = job.reply.send(Err(MachineError::Cancelled));
            continue;
        };

        // Handler panics are contained so one bad callback cannot take the
        // worker down with queued work still waiting.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(&shared, &job.target)))
            .unwrap_or_else(|payload| Err(MachineError::from_panic(payload)));

        if let Err(err) = &outcome {
            let dropped = queue.cancel_pending();
            warn!(error = %err, dropped, "transition failed; queued transitions cancelled");
        }

        let _ = job.reply.send(outcome);
    }
}

/// Run one transition to completion on the worker thread.
///
/// Locks are taken in short scopes and never held across user code: handler
/// lists are snapshotted per phase, so handlers are free to register, route,
/// and mutate the table (which is how the original's reentrant monitor
/// behaved for same-thread calls, without the hazards).
fn execute(shared: &EngineShared, requested: &StateName) -> Result<bool, MachineError> {
    // One consistent view of "where we are" for the whole attempt.
    let (current_idx, current) = {
        let mut core = shared.core.lock();
        // The requested state exists from the moment it is referenced, even
        // if routing then picks a different target.
        core.table.ensure(requested);
        (core.current, core.table.name_of(core.current).clone())
    };

    // Routing happens before validation; validation then runs against the
    // resolved target, not the requested one.
    let routers = shared.routers.read().snapshot();
    let resolved = router::resolve(&routers, &current, requested);
    if resolved != *requested {
        debug!(current = %current, requested = %requested, resolved = %resolved, "router redirected transition");
    }

    let (next_idx, next, exit_local, edge_handlers, entry_local) = {
        let mut core = shared.core.lock();
        let next_idx = core.table.ensure(&resolved);

        if !core.table.has_edge(current_idx, next_idx) {
            return Err(MachineError::InvalidTransition {
                from: current,
                to: resolved,
            });
        }

        (
            next_idx,
            core.table.name_of(next_idx).clone(),
            core.table.exit_snapshot(current_idx),
            core.table.edge_callback_snapshot(current_idx, next_idx),
            core.table.entry_snapshot(next_idx),
        )
    };

    let (exit_global, transition_global, entry_global) = {
        let globals = shared.globals.read();
        (
            globals.exit.snapshot(),
            globals.transition.snapshot(),
            globals.entry.snapshot(),
        )
    };

    // The three dispatch phases, globals before locals in each.
    run_state_phase(&exit_global, &current)?;
    run_state_phase(&exit_local, &current)?;
    run_transition_phase(&transition_global, &current, &next)?;
    run_transition_phase(&edge_handlers, &current, &next)?;
    run_state_phase(&entry_global, &next)?;
    run_state_phase(&entry_local, &next)?;

    // All phases completed: the transition officially counts.
    shared.core.lock().transitions += 1;

    let fired = shared.sequences.lock().record(next.clone());
    for (handler, matched) in fired {
        handler.on_match(&matched).map_err(MachineError::from_handler)?;
    }

    shared.core.lock().current = next_idx;

    let changed = current != next;
    debug!(from = %current, to = %next, changed, "transition committed");
    Ok(changed)
}

fn run_state_phase(
    handlers: &[Arc<dyn StateHandler>],
    state: &StateName,
) -> Result<(), MachineError> {
    for handler in handlers {
        handler.on_state(state).map_err(MachineError::from_handler)?;
    }
    Ok(())
}

fn run_transition_phase(
    handlers: &[Arc<dyn TransitionHandler>],
    from: &StateName,
    to: &StateName,
) -> Result<(), MachineError> {
    for handler in handlers {
        handler
            .on_transition(from, to)
            .map_err(MachineError::from_handler)?;
    }
    Ok(())
}
