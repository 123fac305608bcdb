//! Events: the outcome symbols a round can conclude with

use crate::LockstepError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The outcome of one round execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    CheckHistory,
    CheckLateArrivingMessage,
    CheckTimeout,
    Done,
    Error,
    FinalizationFailed,
    FinalizeTimeout,
    IncorrectSerialization,
    InsufficientFunds,
    Negative,
    None,
    NoFunds,
    NoMajority,
    ResetAndPauseTimeout,
    ResetTimeout,
    RoundTimeout,
    Settle,
    SuspiciousActivity,
    ValidateTimeout,
    Wait,
}

impl Event {
    /// The full alphabet
    pub const ALL: [Event; 20] = [
        Event::CheckHistory,
        Event::CheckLateArrivingMessage,
        Event::CheckTimeout,
        Event::Done,
        Event::Error,
        Event::FinalizationFailed,
        Event::FinalizeTimeout,
        Event::IncorrectSerialization,
        Event::InsufficientFunds,
        Event::Negative,
        Event::None,
        Event::NoFunds,
        Event::NoMajority,
        Event::ResetAndPauseTimeout,
        Event::ResetTimeout,
        Event::RoundTimeout,
        Event::Settle,
        Event::SuspiciousActivity,
        Event::ValidateTimeout,
        Event::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CheckHistory => "CHECK_HISTORY",
            Event::CheckLateArrivingMessage => "CHECK_LATE_ARRIVING_MESSAGE",
            Event::CheckTimeout => "CHECK_TIMEOUT",
            Event::Done => "DONE",
            Event::Error => "ERROR",
            Event::FinalizationFailed => "FINALIZATION_FAILED",
            Event::FinalizeTimeout => "FINALIZE_TIMEOUT",
            Event::IncorrectSerialization => "INCORRECT_SERIALIZATION",
            Event::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Event::Negative => "NEGATIVE",
            Event::None => "NONE",
            Event::NoFunds => "NO_FUNDS",
            Event::NoMajority => "NO_MAJORITY",
            Event::ResetAndPauseTimeout => "RESET_AND_PAUSE_TIMEOUT",
            Event::ResetTimeout => "RESET_TIMEOUT",
            Event::RoundTimeout => "ROUND_TIMEOUT",
            Event::Settle => "SETTLE",
            Event::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Event::ValidateTimeout => "VALIDATE_TIMEOUT",
            Event::Wait => "WAIT",
        }
    }

    /// Which failure family this symbol belongs to
    pub fn class(&self) -> EventClass {
        match self {
            Event::Done => EventClass::Success,
            Event::NoMajority => EventClass::Disagreement,
            Event::CheckTimeout
            | Event::FinalizeTimeout
            | Event::ResetAndPauseTimeout
            | Event::ResetTimeout
            | Event::RoundTimeout
            | Event::ValidateTimeout => EventClass::Timeout,
            Event::NoFunds
            | Event::InsufficientFunds
            | Event::Negative
            | Event::FinalizationFailed
            | Event::SuspiciousActivity
            | Event::IncorrectSerialization => EventClass::DomainFailure,
            Event::Error => EventClass::Error,
            Event::CheckHistory
            | Event::CheckLateArrivingMessage
            | Event::None
            | Event::Settle
            | Event::Wait => EventClass::Routing,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.class() == EventClass::Timeout
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Event {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim();
        Event::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(symbol))
            .ok_or_else(|| LockstepError::UnknownEvent(symbol.to_string()))
    }
}

/// Failure taxonomy of the event alphabet.
///
/// The engine routes every class the same way (table lookup); the class
/// only matters for logging and for operators reading round history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// The round reached agreement on a result
    Success,
    /// Replicas could not agree within the round
    Disagreement,
    /// The round exceeded its budget
    Timeout,
    /// A business-level failure with a table-defined fallback
    DomainFailure,
    /// Generic round-internal failure
    Error,
    /// A branch selector that is neither success nor failure
    Routing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_size() {
        let symbols: std::collections::HashSet<&str> =
            Event::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(symbols.len(), 20);
    }

    #[test]
    fn test_parse_event() {
        assert_eq!("DONE".parse::<Event>().unwrap(), Event::Done);
        assert_eq!(
            " finalize_timeout ".parse::<Event>().unwrap(),
            Event::FinalizeTimeout
        );
        assert!(matches!(
            "MAYBE".parse::<Event>(),
            Err(LockstepError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_serde_matches_symbol() {
        for event in Event::ALL {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn test_event_classes() {
        assert_eq!(Event::Done.class(), EventClass::Success);
        assert_eq!(Event::NoMajority.class(), EventClass::Disagreement);
        assert!(Event::ResetAndPauseTimeout.is_timeout());
        assert!(!Event::FinalizationFailed.is_timeout());
        assert_eq!(
            Event::SuspiciousActivity.class(),
            EventClass::DomainFailure
        );
        assert_eq!(Event::Error.class(), EventClass::Error);
        assert_eq!(Event::Wait.class(), EventClass::Routing);

        let timeouts = Event::ALL.iter().filter(|e| e.is_timeout()).count();
        assert_eq!(timeouts, 6);
    }
}
