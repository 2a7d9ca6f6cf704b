//! Typed builder for sequence patterns.

use crate::core::sequence::{Pattern, PatternStep};
use crate::core::state::{State, StateName};

enum Step<S> {
    State(S),
    Null,
    Wildcard,
}

/// Fluent builder for the patterns accepted by
/// [`Machine::on_sequence`](crate::machine::Machine::on_sequence).
///
/// Each position is a concrete state, the null state, or a wildcard matching
/// any single state:
///
/// ```rust
/// use turnstile::PatternBuilder;
///
/// let pattern = PatternBuilder::new()
///     .state("blue")
///     .wildcard()
///     .state("green")
///     .null();
/// ```
pub struct PatternBuilder<S: State> {
    steps: Vec<Step<S>>,
}

impl<S: State> PatternBuilder<S> {
    pub fn new() -> Self {
        PatternBuilder { steps: Vec::new() }
    }

    /// Append a concrete state.
    pub fn state(mut self, state: S) -> Self {
        self.steps.push(Step::State(state));
        self
    }

    /// Append several concrete states.
    pub fn states(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.steps.extend(states.into_iter().map(Step::State));
        self
    }

    /// Append the null state.
    pub fn null(mut self) -> Self {
        self.steps.push(Step::Null);
        self
    }

    /// Append a wildcard matching any single state.
    pub fn wildcard(mut self) -> Self {
        self.steps.push(Step::Wildcard);
        self
    }

    pub(crate) fn into_pattern(self, mut intern: impl FnMut(S) -> StateName) -> Pattern {
        let steps = self
            .steps
            .into_iter()
            .map(|step| match step {
                Step::State(state) => PatternStep::State(intern(state)),
                Step::Null => PatternStep::State(StateName::null()),
                Step::Wildcard => PatternStep::Wildcard,
            })
            .collect();
        Pattern::new(steps)
    }
}

impl<S: State> Default for PatternBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_steps_in_order() {
        let pattern = PatternBuilder::new()
            .state("a")
            .wildcard()
            .null()
            .states(["b", "c"])
            .into_pattern(|s| StateName::of(&s));

        assert_eq!(
            pattern.steps(),
            &[
                PatternStep::State(StateName::new("a")),
                PatternStep::Wildcard,
                PatternStep::State(StateName::null()),
                PatternStep::State(StateName::new("b")),
                PatternStep::State(StateName::new("c")),
            ]
        );
    }

    #[test]
    fn an_empty_builder_yields_an_empty_pattern() {
        let pattern = PatternBuilder::<&'static str>::new().into_pattern(|s| StateName::of(&s));
        assert!(pattern.is_empty());
    }
}
