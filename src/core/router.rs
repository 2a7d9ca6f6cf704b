//! The router chain: ordered decision functions that may redirect a
//! transition before it is validated.

use crate::core::handler::{HandlerSet, StateRouter};
use crate::core::state::StateName;
use parking_lot::Mutex;
use std::sync::Arc;

/// Routers in registration order.
#[derive(Default)]
pub(crate) struct RouterChain {
    routers: HandlerSet<dyn StateRouter>,
}

impl RouterChain {
    pub(crate) fn add(&mut self, id: u64, router: Arc<dyn StateRouter>) {
        self.routers.insert(id, router);
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.routers.remove(id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn StateRouter>> {
        self.routers.snapshot()
    }
}

/// Run the full chain and return the authoritative target.
///
/// Every router sees the originally requested target, regardless of earlier
/// decisions. The last router to return a decision wins; with no decisions
/// the requested target stands.
pub(crate) fn resolve(
    routers: &[Arc<dyn StateRouter>],
    current: &StateName,
    requested: &StateName,
) -> StateName {
    let mut resolved = requested.clone();

    for router in routers {
        if let Some(decision) = router.route(current, requested) {
            resolved = decision;
        }
    }

    resolved
}

/// Gate a router so it only fires on one exact (from, to) pair.
pub(crate) fn gate_between(
    from: StateName,
    to: StateName,
    inner: Arc<dyn StateRouter>,
) -> impl StateRouter + 'static {
    move |current: &StateName, requested: &StateName| {
        if *current == from && *requested == to {
            inner.route(current, requested)
        } else {
            None
        }
    }
}

/// Gate a router so it only fires when a given state is about to be entered.
pub(crate) fn gate_entering(to: StateName, inner: Arc<dyn StateRouter>) -> impl StateRouter + 'static {
    move |current: &StateName, requested: &StateName| {
        if *requested == to {
            inner.route(current, requested)
        } else {
            None
        }
    }
}

/// Gate a router so it only fires when a given state is being exited.
pub(crate) fn gate_exiting(from: StateName, inner: Arc<dyn StateRouter>) -> impl StateRouter + 'static {
    move |current: &StateName, requested: &StateName| {
        if *current == from {
            inner.route(current, requested)
        } else {
            None
        }
    }
}

/// Router that redirects to a fixed list of targets in turn, advancing one
/// position per routed attempt.
///
/// Useful behind [`route_before_entering`](crate::Engine::route_before_entering)
/// to spread requests for one state across several others.
pub struct RoundRobinRouter {
    targets: Vec<StateName>,
    position: Mutex<usize>,
}

impl RoundRobinRouter {
    pub fn new(targets: impl IntoIterator<Item = StateName>) -> Self {
        RoundRobinRouter {
            targets: targets.into_iter().collect(),
            position: Mutex::new(0),
        }
    }
}

impl StateRouter for RoundRobinRouter {
    fn route(&self, _current: &StateName, _requested: &StateName) -> Option<StateName> {
        if self.targets.is_empty() {
            return None;
        }

        let mut position = self.position.lock();
        let target = self.targets[*position % self.targets.len()].clone();
        *position += 1;
        Some(target)
    }
}
