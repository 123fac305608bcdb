//! Lockstep Round Engine
//!
//! Each replica runs its own engine against the same ordered event
//! stream. Because the transition function is pure, replicas that apply
//! the same events end up in the same round without talking to each
//! other.
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] composes specialized components:
//!
//! - [`TransitionTable`]: the validated, immutable round graph
//! - [`TimeoutSupervisor`]: per-round budgets, timeout symbols and retry caps
//! - [`BehaviourRegistry`]: the pluggable work behind each round
//! - [`SynchronizedDb`]: cross-round state shared by behaviours
//! - [`RoundHistory`]: bounded record of the most recent transitions
//!
//! # Example
//!
//! ```rust
//! use lockstep_engine::{EngineConfig, TransitionTable, WorkflowEngine};
//! use lockstep_types::{Event, Round};
//! use std::sync::Arc;
//!
//! let table = Arc::new(TransitionTable::canonical().unwrap());
//! let mut engine = WorkflowEngine::new(table, EngineConfig::default()).unwrap();
//!
//! assert_eq!(engine.current_round(), Round::RegistrationStartupRound);
//! assert_eq!(engine.step(Event::Done).unwrap(), Round::LoadDatabaseRound);
//! assert!(engine.step(Event::Settle).is_err());
//! assert!(engine.is_frozen());
//! ```

#![deny(unsafe_code)]

pub mod behaviour;
pub mod engine;
pub mod round_history;
pub mod synchronized_db;
pub mod timeout_supervisor;
pub mod transition_table;

// Re-export main types
pub use behaviour::{BehaviourRegistry, RoundBehaviour, RoundContext, ScriptedBehaviour};
pub use engine::{EngineConfig, WorkflowEngine};
pub use round_history::{RoundChange, RoundHistory, RoundRecord, DEFAULT_HISTORY_CAPACITY};
pub use synchronized_db::SynchronizedDb;
pub use timeout_supervisor::{Deadline, RoundOutcome, TimeoutSupervisor, MAX_BUDGET};
pub use transition_table::TransitionTable;
