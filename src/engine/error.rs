//! Errors surfaced by transition execution.

use crate::core::grammar::ParseError;
use crate::core::handler::HandlerError;
use crate::core::state::StateName;
use std::any::Any;
use thiserror::Error;

/// Errors that can come out of a transition attempt or machine construction.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The resolved target has no edge from the current state. The machine's
    /// observable state (current, counter, window) is untouched.
    #[error("no transition exists between {from} and {to}")]
    InvalidTransition { from: StateName, to: StateName },

    /// A synchronous transition was requested from inside a running
    /// transition's handler code. Rejected before enqueueing; asynchronous
    /// requests from the same position are allowed.
    #[error("synchronous transition requested from inside a running transition")]
    Reentrant,

    /// The transition was discarded before running because an earlier
    /// transition on the same machine failed, or the machine was reset or
    /// dropped while the request was still queued.
    #[error("transition cancelled before it could run")]
    Cancelled,

    /// User-supplied handler code failed. Side effects performed before the
    /// failure stand; the current state does not advance.
    #[error("transition handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// A machine description could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl MachineError {
    /// A handler error that already is a `MachineError` propagates unchanged;
    /// anything else is wrapped as a handler failure.
    pub(crate) fn from_handler(err: HandlerError) -> Self {
        match err.downcast::<MachineError>() {
            Ok(domain) => *domain,
            Err(other) => MachineError::Handler(other),
        }
    }

    /// Convert a caught handler panic into a handler failure.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "transition handler panicked".to_string());
        MachineError::Handler(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_pass_through_unwrapped() {
        let inner: HandlerError = Box::new(MachineError::Reentrant);
        let err = MachineError::from_handler(inner);
        assert!(matches!(err, MachineError::Reentrant));
    }

    #[test]
    fn foreign_errors_are_wrapped() {
        let inner: HandlerError = "disk on fire".into();
        let err = MachineError::from_handler(inner);
        match err {
            MachineError::Handler(source) => {
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("expected a handler failure, got {other:?}"),
        }
    }

    #[test]
    fn panics_become_handler_failures() {
        let err = MachineError::from_panic(Box::new("boom"));
        assert!(matches!(err, MachineError::Handler(_)));
        assert!(err.to_string().contains("boom"));
    }
}
