//! State values and their canonical identities.
//!
//! External state types implement the `State` trait, which asks for nothing
//! beyond a stable name. The engine itself never stores external values; it
//! works on `StateName`, the canonical identity derived from that name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Contract for external state types.
///
/// Any type with a stable, deterministic name can act as a state. Enums are
/// the common case; `String` and `&'static str` implementations are provided
/// for ad-hoc machines.
///
/// # Required Traits
///
/// - `Clone`: values are cached by the machine and handed back to handlers
/// - `Debug`: states appear in logs and error output
/// - `Send + Sync`: handlers run on the machine's worker thread
///
/// # Example
///
/// ```rust
/// use turnstile::State;
///
/// #[derive(Clone, PartialEq, Debug)]
/// enum TaskState {
///     Pending,
///     Running,
///     Complete,
/// }
///
/// impl State for TaskState {
///     fn name(&self) -> &str {
///         match self {
///             Self::Pending => "Pending",
///             Self::Running => "Running",
///             Self::Complete => "Complete",
///         }
///     }
/// }
/// ```
pub trait State: Clone + fmt::Debug + Send + Sync + 'static {
    /// The state's name. Two values with the same trimmed name are the same
    /// state as far as the engine is concerned.
    fn name(&self) -> &str;
}

impl State for String {
    fn name(&self) -> &str {
        self
    }
}

impl State for &'static str {
    fn name(&self) -> &str {
        self
    }
}

/// Canonical, comparable identity of a state.
///
/// A `StateName` is an opaque handle built from a state's trimmed name. The
/// distinguished null state is a first-class, valid identity: it can carry
/// transitions, handlers, and appear in patterns like any other state.
///
/// Equality and hashing use the trimmed name only, so two identities built
/// from different values with the same name are equal. Cloning is cheap (the
/// name is reference counted).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateName(Option<Arc<str>>);

impl StateName {
    /// Identity for a named state. The name is trimmed; leading and trailing
    /// whitespace never distinguishes two states.
    pub fn new(name: impl AsRef<str>) -> Self {
        StateName(Some(Arc::from(name.as_ref().trim())))
    }

    /// The null state's identity.
    pub fn null() -> Self {
        StateName(None)
    }

    /// Identity of an external state value, via [`State::name`].
    pub fn of<S: State>(state: &S) -> Self {
        Self::new(state.name())
    }

    /// Identity of an optional external value, mapping `None` to null.
    pub fn of_opt<S: State>(state: Option<&S>) -> Self {
        match state {
            Some(s) => Self::of(s),
            None => Self::null(),
        }
    }

    /// True for the null identity.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The trimmed name, or `None` for the null identity.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl Default for StateName {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(name),
            None => f.write_str("null"),
        }
    }
}

impl fmt::Debug for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateName({self})")
    }
}

impl<S: State> From<Option<S>> for StateName {
    fn from(value: Option<S>) -> Self {
        StateName::of_opt(value.as_ref())
    }
}
