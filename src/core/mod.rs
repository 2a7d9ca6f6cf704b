//! Core state machine building blocks.
//!
//! This module contains the leaf pieces the engine is assembled from:
//! - State identities via `StateName` and the `State` trait
//! - Handler and router capability traits with closure support
//! - The transition table, router chain, and sequence matcher
//! - The textual description grammar
//!
//! Everything here is passive data and registries; execution order, locking,
//! and the serialized worker live in [`crate::engine`].

pub(crate) mod grammar;
pub(crate) mod handler;
pub(crate) mod router;
pub(crate) mod sequence;
pub(crate) mod state;
pub(crate) mod table;

pub use grammar::ParseError;
pub use handler::{
    HandlerError, HandlerResult, Registration, SequenceHandler, StateHandler, StateRouter,
    TransitionHandler,
};
pub use router::RoundRobinRouter;
pub use sequence::{Pattern, PatternStep};
pub use state::{State, StateName};
