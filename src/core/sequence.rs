//! Sequence recognition over recently entered states.
//!
//! The matcher keeps a sliding window of the most recently entered states,
//! bounded by the longest registered pattern, and evaluates every pattern
//! against the window's tail after each committed transition.

use crate::core::handler::SequenceHandler;
use crate::core::state::StateName;
use std::collections::VecDeque;
use std::sync::Arc;

/// One position in a pattern: a concrete identity (null included) or a
/// wildcard that matches any single state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternStep {
    State(StateName),
    Wildcard,
}

impl PatternStep {
    fn matches(&self, state: &StateName) -> bool {
        match self {
            PatternStep::State(expected) => expected == state,
            PatternStep::Wildcard => true,
        }
    }
}

/// An ordered sequence of state matchers.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Pattern {
    steps: Vec<PatternStep>,
}

impl Pattern {
    pub fn new(steps: Vec<PatternStep>) -> Self {
        Pattern { steps }
    }

    /// A pattern of concrete identities only.
    pub fn of_states(states: impl IntoIterator<Item = StateName>) -> Self {
        Pattern {
            steps: states.into_iter().map(PatternStep::State).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PatternStep] {
        &self.steps
    }
}

struct RegisteredPattern {
    id: u64,
    pattern: Pattern,
    handler: Arc<dyn SequenceHandler>,
}

/// Sliding window plus the registry of live patterns.
pub(crate) struct SequenceMatcher {
    window: VecDeque<StateName>,
    patterns: Vec<RegisteredPattern>,
    max_len: usize,
}

impl SequenceMatcher {
    pub(crate) fn new(initial: StateName) -> Self {
        let mut window = VecDeque::new();
        window.push_back(initial);
        SequenceMatcher {
            window,
            patterns: Vec::new(),
            max_len: 0,
        }
    }

    /// Restore the window to just the initial state. Patterns stay live.
    pub(crate) fn reset(&mut self, initial: StateName) {
        self.window.clear();
        self.window.push_back(initial);
    }

    /// Register a pattern; the window bound only ever grows here.
    pub(crate) fn register(&mut self, id: u64, pattern: Pattern, handler: Arc<dyn SequenceHandler>) {
        self.max_len = self.max_len.max(pattern.len());
        self.patterns.push(RegisteredPattern {
            id,
            pattern,
            handler,
        });
    }

    /// Unregister a pattern and recompute the bound from what remains. The
    /// window itself shrinks lazily, on the next recorded state.
    pub(crate) fn unregister(&mut self, id: u64) {
        self.patterns.retain(|registered| registered.id != id);
        self.max_len = self
            .patterns
            .iter()
            .map(|registered| registered.pattern.len())
            .max()
            .unwrap_or(0);
    }

    /// Record a newly entered state and collect the handlers whose patterns
    /// now match, with their concrete matched subsequences. Handlers are
    /// returned rather than invoked so the caller can drop its lock first.
    pub(crate) fn record(
        &mut self,
        entered: StateName,
    ) -> Vec<(Arc<dyn SequenceHandler>, Vec<StateName>)> {
        self.window.push_back(entered);

        // The window always retains at least the last entered state, so reset
        // seeding and trimming compose even with no patterns registered.
        let bound = self.max_len.max(1);
        while self.window.len() > bound {
            self.window.pop_front();
        }

        let mut fired = Vec::new();

        for registered in &self.patterns {
            let len = registered.pattern.len();
            if self.window.len() < len {
                continue;
            }

            // Match the pattern against the window's tail: the last N entered
            // states, oldest to newest.
            let offset = self.window.len() - len;
            let tail = self.window.iter().skip(offset);
            let matches = registered
                .pattern
                .steps()
                .iter()
                .zip(tail)
                .all(|(step, state)| step.matches(state));

            if matches {
                let matched: Vec<StateName> =
                    self.window.iter().skip(offset).cloned().collect();
                fired.push((Arc::clone(&registered.handler), matched));
            }
        }

        fired
    }

    pub(crate) fn window(&self) -> Vec<StateName> {
        self.window.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HandlerResult;

    fn n(name: &str) -> StateName {
        StateName::new(name)
    }

    fn noop() -> Arc<dyn SequenceHandler> {
        Arc::new(|_: &[StateName]| -> HandlerResult { Ok(()) })
    }

    fn record_all(matcher: &mut SequenceMatcher, names: &[&str]) -> Vec<Vec<StateName>> {
        let mut matched = Vec::new();
        for name in names {
            for (_, states) in matcher.record(n(name)) {
                matched.push(states);
            }
        }
        matched
    }

    #[test]
    fn window_starts_seeded_with_the_initial_state() {
        let matcher = SequenceMatcher::new(n("Ready"));
        assert_eq!(matcher.window(), vec![n("Ready")]);
    }

    #[test]
    fn window_never_exceeds_the_longest_pattern() {
        let mut matcher = SequenceMatcher::new(n("Ready"));
        matcher.register(1, Pattern::of_states([n("A"), n("B"), n("C")]), noop());

        for name in ["A", "B", "C", "D", "E"] {
            matcher.record(n(name));
        }
        assert_eq!(matcher.window(), vec![n("C"), n("D"), n("E")]);
    }

    #[test]
    fn a_full_match_fires_once() {
        let mut matcher = SequenceMatcher::new(n("Red"));
        matcher.register(
            1,
            Pattern::of_states([n("Blue"), n("Green"), n("Orange")]),
            noop(),
        );

        let matched = record_all(&mut matcher, &["Blue", "Green", "Orange", "Red"]);
        assert_eq!(matched, vec![vec![n("Blue"), n("Green"), n("Orange")]]);
    }

    #[test]
    fn shorter_patterns_match_the_most_recent_states() {
        let mut matcher = SequenceMatcher::new(n("Start"));
        matcher.register(1, Pattern::of_states([n("A"), n("B"), n("C")]), noop());
        matcher.register(2, Pattern::of_states([n("B"), n("C")]), noop());

        let matched = record_all(&mut matcher, &["A", "B", "C"]);
        // Both fire on the final record: the long pattern on [A, B, C] and
        // the short one on the tail [B, C].
        assert_eq!(
            matched,
            vec![vec![n("A"), n("B"), n("C")], vec![n("B"), n("C")]]
        );
    }

    #[test]
    fn wildcards_match_any_state_and_resolve_concretely() {
        let mut matcher = SequenceMatcher::new(n("Start"));
        matcher.register(
            1,
            Pattern::new(vec![
                PatternStep::State(n("A")),
                PatternStep::Wildcard,
                PatternStep::State(n("C")),
            ]),
            noop(),
        );

        let matched = record_all(&mut matcher, &["A", "B", "C"]);
        assert_eq!(matched, vec![vec![n("A"), n("B"), n("C")]]);

        let matched = record_all(&mut matcher, &["A", "Z", "C"]);
        assert_eq!(matched, vec![vec![n("A"), n("Z"), n("C")]]);
    }

    #[test]
    fn null_matches_null_in_patterns() {
        let mut matcher = SequenceMatcher::new(StateName::null());
        matcher.register(
            1,
            Pattern::of_states([n("A"), StateName::null()]),
            noop(),
        );

        matcher.record(n("A"));
        let fired = matcher.record(StateName::null());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, vec![n("A"), StateName::null()]);
    }

    #[test]
    fn too_short_a_window_never_matches() {
        let mut matcher = SequenceMatcher::new(n("Start"));
        matcher.register(1, Pattern::of_states([n("Start"), n("A"), n("B")]), noop());

        assert!(matcher.record(n("A")).is_empty());
        assert_eq!(matcher.record(n("B")).len(), 1);
    }

    #[test]
    fn unregistering_recomputes_the_bound() {
        let mut matcher = SequenceMatcher::new(n("Start"));
        matcher.register(1, Pattern::of_states([n("A"), n("B"), n("C")]), noop());
        matcher.register(2, Pattern::of_states([n("A"), n("B")]), noop());

        matcher.unregister(1);
        // The bound shrank to 2; the window trims on the next record.
        record_all(&mut matcher, &["A", "B", "C"]);
        assert_eq!(matcher.window(), vec![n("B"), n("C")]);

        matcher.unregister(2);
        matcher.record(n("D"));
        assert_eq!(matcher.window(), vec![n("D")]);
    }

    #[test]
    fn reset_restores_the_seeded_window_but_keeps_patterns() {
        let mut matcher = SequenceMatcher::new(n("Start"));
        matcher.register(1, Pattern::of_states([n("A"), n("B")]), noop());
        record_all(&mut matcher, &["A", "B"]);

        matcher.reset(n("Start"));
        assert_eq!(matcher.window(), vec![n("Start")]);

        let matched = record_all(&mut matcher, &["A", "B"]);
        assert_eq!(matched.len(), 1);
    }
}
