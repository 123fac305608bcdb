//! Lockstep Domain Types
//!
//! The replicated workflow is a perpetual finite state machine. Every
//! replica holds the same closed set of rounds and consumes the same
//! ordered stream of events, so applying the same pure transition
//! function keeps all replicas in lock-step without negotiating.
//!
//! # Key Concepts
//!
//! - **Round**: a unit of work gated by majority agreement; the state.
//! - **Event**: the single outcome symbol a round concludes with; the
//!   only transition trigger.
//! - **transition**: the canonical `(Round, Event) -> Round` function,
//!   undefined pairs being protocol violations.
//! - **FsmSpecification**: the declarative, loadable form of the graph
//!   together with its structural validation.
//! - **TimeoutConfig / RetryConfig**: per-round budgets and retry caps,
//!   kept outside the graph.

#![deny(unsafe_code)]

mod errors;
mod event;
mod policy;
mod round;
mod specification;
mod transition;

pub use errors::*;
pub use event::*;
pub use policy::*;
pub use round::*;
pub use specification::*;
pub use transition::*;
