//! Turnstile: a generic state machine engine.
//!
//! Turnstile tracks a current state over an arbitrary set of discrete state
//! values, validates every requested move against a declared transition
//! graph, runs entry/exit/transition handlers and routing hooks around each
//! move, and recognizes temporal sequences of past states. Each machine owns
//! a private serialized worker, so transitions can be requested from any
//! thread, synchronously or asynchronously, and always execute one at a time
//! in submission order.
//!
//! # Core Concepts
//!
//! - **State**: any type with a stable name, via the [`State`] trait; the
//!   null state (`None`) is a first-class, valid state
//! - **Transitions**: a declared graph of permitted moves; requesting an
//!   undeclared move is an error, not a change
//! - **Handlers**: entry, exit, and transition callbacks, global or scoped,
//!   each removable through its [`Registration`]
//! - **Routers**: decision functions that may redirect a request before it is
//!   validated; the last router to decide wins
//! - **Sequences**: patterns (with wildcards) matched against the most
//!   recently entered states after every committed transition
//!
//! # Example
//!
//! ```rust
//! use turnstile::{state_enum, Machine, PatternBuilder};
//!
//! state_enum! {
//!     enum Player {
//!         Stopped,
//!         Playing,
//!         Paused,
//!     }
//! }
//!
//! let machine = Machine::with_initial(Player::Stopped);
//! machine.add_transitions(Player::Stopped, [Player::Playing]);
//! machine.add_transitions(Player::Playing, [Player::Paused, Player::Stopped]);
//! machine.add_transitions(Player::Paused, [Player::Playing, Player::Stopped]);
//!
//! machine.on_entering(Player::Playing, |_state| {
//!     // spin up the audio pipeline
//!     Ok(())
//! });
//!
//! machine.on_sequence(
//!     PatternBuilder::new()
//!         .state(Player::Playing)
//!         .state(Player::Paused)
//!         .state(Player::Playing),
//!     |_matched| {
//!         // listener resumed playback
//!         Ok(())
//!     },
//! );
//!
//! assert!(machine.transition(Player::Playing).unwrap());
//! assert!(machine.transition(Player::Paused).unwrap());
//! assert!(machine.transition(Player::Playing).unwrap());
//! assert_eq!(machine.transition_count(), 3);
//! ```

pub mod core;
pub mod engine;
pub mod machine;

// Re-export the common surface.
pub use crate::core::{
    HandlerError, HandlerResult, ParseError, Pattern, PatternStep, Registration, RoundRobinRouter,
    SequenceHandler, State, StateHandler, StateName, StateRouter, TransitionHandler,
};
pub use crate::engine::{Engine, MachineError, TransitionHandle};
pub use crate::machine::{Machine, PatternBuilder, StringMachine};
