//! The transition table: state containers, edges, and per-state handlers.
//!
//! Containers live in an arena indexed by canonical identity, so edges are
//! plain index links and containers can reference each other freely without
//! ownership cycles. Containers are created lazily on first reference and
//! live as long as the table.

use crate::core::handler::{HandlerSet, StateHandler, TransitionHandler};
use crate::core::state::StateName;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One container per distinct state identity.
pub(crate) struct StateContainer {
    name: StateName,
    /// Outgoing edges, keyed by target container index. A `BTreeMap` keeps
    /// iteration deterministic for serialization.
    edges: BTreeMap<usize, Edge>,
    entry: HandlerSet<dyn StateHandler>,
    exit: HandlerSet<dyn StateHandler>,
}

impl StateContainer {
    fn new(name: StateName) -> Self {
        StateContainer {
            name,
            edges: BTreeMap::new(),
            entry: HandlerSet::default(),
            exit: HandlerSet::default(),
        }
    }
}

/// A directed edge. Owned by its source container; carries the handlers that
/// fire only when this exact edge does.
#[derive(Default)]
struct Edge {
    callbacks: HandlerSet<dyn TransitionHandler>,
}

/// Map from state identity to containers, plus the initial-state pointer.
///
/// Purely structural: the table reports whether a mutation modified the
/// graph, and the owning engine decides what to do about it (an implicit
/// reset, per the engine's contract).
pub(crate) struct TransitionTable {
    containers: Vec<StateContainer>,
    index: HashMap<StateName, usize>,
    initial: usize,
}

impl TransitionTable {
    pub(crate) fn new(initial: StateName) -> Self {
        let mut table = TransitionTable {
            containers: Vec::new(),
            index: HashMap::new(),
            initial: 0,
        };
        table.initial = table.ensure(&initial);
        table
    }

    /// Get or create the container for an identity. Total: never fails, for
    /// any identity including null.
    pub(crate) fn ensure(&mut self, name: &StateName) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.containers.len();
        self.containers.push(StateContainer::new(name.clone()));
        self.index.insert(name.clone(), idx);
        idx
    }

    pub(crate) fn name_of(&self, idx: usize) -> &StateName {
        &self.containers[idx].name
    }

    pub(crate) fn initial(&self) -> usize {
        self.initial
    }

    /// Only moves the pointer used by the next reset.
    pub(crate) fn set_initial(&mut self, name: &StateName) {
        self.initial = self.ensure(name);
    }

    pub(crate) fn has_edge(&self, from: usize, to: usize) -> bool {
        self.containers[from].edges.contains_key(&to)
    }

    /// Add edges from one state to each target, deduplicating targets.
    ///
    /// Missing edges are created only when `create` is set; existing edges
    /// merge. The callback, when given, is appended to every affected edge.
    /// Returns whether the graph was structurally modified; callback-only
    /// additions never count.
    pub(crate) fn add_edges(
        &mut self,
        from: &StateName,
        targets: &[StateName],
        callback: Option<(u64, Arc<dyn TransitionHandler>)>,
        create: bool,
    ) -> bool {
        let from_idx = self.ensure(from);
        let mut seen = HashSet::new();
        let mut modified = false;

        for target in targets {
            let to_idx = self.ensure(target);
            if !seen.insert(to_idx) {
                continue;
            }

            let exists = self.containers[from_idx].edges.contains_key(&to_idx);
            if !exists && !create {
                continue;
            }
            if !exists {
                self.containers[from_idx].edges.insert(to_idx, Edge::default());
                modified = true;
            }
            if let Some((id, handler)) = &callback {
                if let Some(edge) = self.containers[from_idx].edges.get_mut(&to_idx) {
                    edge.callbacks.insert(*id, Arc::clone(handler));
                }
            }
        }

        modified
    }

    /// Remove matching edges, reporting whether any existed.
    pub(crate) fn remove_edges(&mut self, from: &StateName, targets: &[StateName]) -> bool {
        let from_idx = self.ensure(from);
        let mut modified = false;

        for target in targets {
            let to_idx = self.ensure(target);
            if self.containers[from_idx].edges.remove(&to_idx).is_some() {
                modified = true;
            }
        }

        modified
    }

    /// Replace a state's outgoing edge set. Returns whether anything changed.
    pub(crate) fn set_edges(&mut self, from: &StateName, targets: &[StateName]) -> bool {
        let from_idx = self.ensure(from);
        let old: Vec<usize> = self.containers[from_idx].edges.keys().copied().collect();
        let old_names: Vec<StateName> = old.iter().map(|&i| self.name_of(i).clone()).collect();

        let removed = self.remove_edges(from, &old_names);
        let added = self.add_edges(from, targets, None, true);
        removed || added
    }

    /// Remove one callback registration from one edge, if both still exist.
    pub(crate) fn remove_edge_callback(&mut self, from: &StateName, to: &StateName, id: u64) {
        let (Some(&from_idx), Some(&to_idx)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        if let Some(edge) = self.containers[from_idx].edges.get_mut(&to_idx) {
            edge.callbacks.remove(id);
        }
    }

    pub(crate) fn add_entry_handler(&mut self, state: &StateName, id: u64, h: Arc<dyn StateHandler>) {
        let idx = self.ensure(state);
        self.containers[idx].entry.insert(id, h);
    }

    pub(crate) fn remove_entry_handler(&mut self, state: &StateName, id: u64) {
        if let Some(&idx) = self.index.get(state) {
            self.containers[idx].entry.remove(id);
        }
    }

    pub(crate) fn add_exit_handler(&mut self, state: &StateName, id: u64, h: Arc<dyn StateHandler>) {
        let idx = self.ensure(state);
        self.containers[idx].exit.insert(id, h);
    }

    pub(crate) fn remove_exit_handler(&mut self, state: &StateName, id: u64) {
        if let Some(&idx) = self.index.get(state) {
            self.containers[idx].exit.remove(id);
        }
    }

    pub(crate) fn entry_snapshot(&self, idx: usize) -> Vec<Arc<dyn StateHandler>> {
        self.containers[idx].entry.snapshot()
    }

    pub(crate) fn exit_snapshot(&self, idx: usize) -> Vec<Arc<dyn StateHandler>> {
        self.containers[idx].exit.snapshot()
    }

    pub(crate) fn edge_callback_snapshot(
        &self,
        from: usize,
        to: usize,
    ) -> Vec<Arc<dyn TransitionHandler>> {
        self.containers[from]
            .edges
            .get(&to)
            .map(|edge| edge.callbacks.snapshot())
            .unwrap_or_default()
    }

    /// Every container with its outgoing targets, in creation order.
    pub(crate) fn blocks(&self) -> Vec<(StateName, Vec<StateName>)> {
        self.containers
            .iter()
            .map(|container| {
                let targets = container
                    .edges
                    .keys()
                    .map(|&to| self.name_of(to).clone())
                    .collect();
                (container.name.clone(), targets)
            })
            .collect()
    }

    /// Structural equality: same state set and same edge set, by identity.
    /// Handlers and the initial pointer are not compared.
    pub(crate) fn same_shape(&self, other: &TransitionTable) -> bool {
        if self.containers.len() != other.containers.len() {
            return false;
        }

        for container in &self.containers {
            let Some(&other_idx) = other.index.get(&container.name) else {
                return false;
            };

            let ours: HashSet<&StateName> =
                container.edges.keys().map(|&to| self.name_of(to)).collect();
            let theirs: HashSet<&StateName> = other.containers[other_idx]
                .edges
                .keys()
                .map(|&to| other.name_of(to))
                .collect();

            if ours != theirs {
                return false;
            }
        }

        true
    }
}
