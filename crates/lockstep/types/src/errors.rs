//! Error types for the lockstep layer

use crate::{Event, Round};

/// Errors that can occur while loading or driving the round graph
#[derive(Debug, thiserror::Error)]
pub enum LockstepError {
    #[error("Protocol violation: {event} is not accepted by {round}")]
    ProtocolViolation { round: Round, event: Event },

    #[error("Replica frozen at {round} after a fatal error")]
    Frozen { round: Round },

    #[error("Unknown round: {0}")]
    UnknownRound(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed transition key: {0}")]
    MalformedTransitionKey(String),

    #[error("Duplicate transition for ({round}, {event}): {first} and {second}")]
    DuplicateTransition {
        round: Round,
        event: Event,
        first: Round,
        second: Round,
    },

    #[error("Round has no outgoing transition: {0}")]
    DeadEndState(Round),

    #[error("Round is unreachable from every start state: {0}")]
    UnreachableState(Round),

    #[error("Not a start state: {0}")]
    NotAStartState(Round),

    #[error("Invalid specification: {0}")]
    Specification(String),

    #[error("No behaviour registered for round: {0}")]
    MissingBehaviour(Round),

    #[error("Round already concluded: {0}")]
    AlreadyConcluded(Round),

    #[error("Round finished without concluding an event: {0}")]
    NoOutcome(Round),

    #[error("Behaviour for {round} failed: {reason}")]
    BehaviourFailed { round: Round, reason: String },

    #[error("Synchronized database error: {0}")]
    Database(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LockstepError {
    /// Whether this error freezes a running replica
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LockstepError::ProtocolViolation { .. }
                | LockstepError::Frozen { .. }
                | LockstepError::MissingBehaviour(_)
                | LockstepError::NoOutcome(_)
                | LockstepError::BehaviourFailed { .. }
        )
    }
}

/// Result type alias for lockstep operations
pub type LockstepResult<T> = Result<T, LockstepError>;
