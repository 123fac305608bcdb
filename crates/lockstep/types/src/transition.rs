//! Transitions: the edges of the round graph
//!
//! The canonical table is expressed as a match over every round so that
//! adding a round without deciding its exits is a compile error. Pairs
//! that fall through the inner match are undefined; stepping with one is
//! a protocol violation, never a silent default.

use crate::{Event, LockstepError, Round};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// The canonical transition function.
///
/// Returns `None` when `event` is not an exit of `round`.
pub fn transition(round: Round, event: Event) -> Option<Round> {
    use Round::*;

    let next = match round {
        // ── Registration ────────────────────────────────────────────
        RegistrationStartupRound => match event {
            Event::Done => LoadDatabaseRound,
            _ => return None,
        },
        RegistrationRound => match event {
            Event::Done => LoadDatabaseRound,
            Event::NoMajority => RegistrationRound,
            _ => return None,
        },

        // ── Content cycle ───────────────────────────────────────────
        LoadDatabaseRound => match event {
            Event::Done => PullMemesRound,
            Event::NoMajority | Event::RoundTimeout => LoadDatabaseRound,
            _ => return None,
        },
        PullMemesRound => match event {
            Event::Done => CollectFeedbackRound,
            Event::NoMajority | Event::RoundTimeout => PullMemesRound,
            _ => return None,
        },
        CollectFeedbackRound => match event {
            Event::Done => EngageTwitterRound,
            Event::Error | Event::NoMajority | Event::RoundTimeout => CollectFeedbackRound,
            _ => return None,
        },
        EngageTwitterRound => match event {
            Event::Done => ActionDecisionRound,
            Event::Error | Event::NoMajority | Event::RoundTimeout => EngageTwitterRound,
            _ => return None,
        },
        ActionDecisionRound => match event {
            Event::Done => ActionPreparationRound,
            Event::Wait => ResetAndPauseRound,
            Event::NoMajority | Event::RoundTimeout => ActionDecisionRound,
            _ => return None,
        },
        ActionPreparationRound => match event {
            Event::Done => ActionTweetRound,
            Event::Settle => CheckFundsRound,
            Event::Error => ResetAndPauseRound,
            Event::NoMajority | Event::RoundTimeout => ActionPreparationRound,
            _ => return None,
        },
        CheckFundsRound => match event {
            Event::Done => RandomnessTransactionSubmissionRound,
            Event::NoFunds | Event::NoMajority | Event::RoundTimeout => CheckFundsRound,
            _ => return None,
        },
        ActionTweetRound => match event {
            Event::Done => ResetAndPauseRound,
            Event::Error | Event::NoMajority | Event::RoundTimeout => ActionTweetRound,
            _ => return None,
        },

        // ── Transaction settlement ──────────────────────────────────
        RandomnessTransactionSubmissionRound => match event {
            Event::Done => SelectKeeperTransactionSubmissionARound,
            Event::NoMajority | Event::RoundTimeout => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        SelectKeeperTransactionSubmissionARound => match event {
            Event::Done => CollectSignatureRound,
            Event::NoMajority => ResetRound,
            Event::RoundTimeout => SelectKeeperTransactionSubmissionARound,
            Event::IncorrectSerialization => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        CollectSignatureRound => match event {
            Event::Done => FinalizationRound,
            Event::NoMajority => ResetRound,
            Event::RoundTimeout => CollectSignatureRound,
            _ => return None,
        },
        FinalizationRound => match event {
            Event::Done => ValidateTransactionRound,
            Event::CheckHistory => CheckTransactionHistoryRound,
            Event::CheckLateArrivingMessage => SynchronizeLateMessagesRound,
            Event::FinalizationFailed | Event::InsufficientFunds => {
                SelectKeeperTransactionSubmissionBRound
            }
            Event::FinalizeTimeout => SelectKeeperTransactionSubmissionBAfterTimeoutRound,
            _ => return None,
        },
        SelectKeeperTransactionSubmissionBRound => match event {
            Event::Done => FinalizationRound,
            Event::NoMajority | Event::RoundTimeout => SelectKeeperTransactionSubmissionBRound,
            Event::IncorrectSerialization => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        SelectKeeperTransactionSubmissionBAfterTimeoutRound => match event {
            Event::Done => FinalizationRound,
            Event::CheckHistory => CheckTransactionHistoryRound,
            Event::CheckLateArrivingMessage => SynchronizeLateMessagesRound,
            Event::NoMajority | Event::RoundTimeout => {
                SelectKeeperTransactionSubmissionBAfterTimeoutRound
            }
            Event::IncorrectSerialization => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        ValidateTransactionRound => match event {
            Event::Done => ActionPreparationRound,
            Event::Negative | Event::ValidateTimeout => CheckTransactionHistoryRound,
            Event::None => SelectKeeperTransactionSubmissionBRound,
            Event::NoMajority => ValidateTransactionRound,
            _ => return None,
        },
        CheckTransactionHistoryRound => match event {
            Event::Done => ActionPreparationRound,
            Event::Negative => SelectKeeperTransactionSubmissionBRound,
            Event::CheckLateArrivingMessage => SynchronizeLateMessagesRound,
            Event::CheckTimeout | Event::NoMajority => CheckTransactionHistoryRound,
            Event::None => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        SynchronizeLateMessagesRound => match event {
            Event::Done => CheckLateTxHashesRound,
            Event::None => SelectKeeperTransactionSubmissionBRound,
            Event::RoundTimeout => SynchronizeLateMessagesRound,
            Event::SuspiciousActivity => RandomnessTransactionSubmissionRound,
            _ => return None,
        },
        CheckLateTxHashesRound => match event {
            Event::Done => ActionPreparationRound,
            Event::CheckLateArrivingMessage => SynchronizeLateMessagesRound,
            Event::CheckTimeout => CheckLateTxHashesRound,
            Event::Negative | Event::None | Event::NoMajority => {
                RandomnessTransactionSubmissionRound
            }
            _ => return None,
        },
        ResetRound => match event {
            Event::Done | Event::NoMajority | Event::ResetTimeout => {
                RandomnessTransactionSubmissionRound
            }
            _ => return None,
        },

        // ── Reset and pause ─────────────────────────────────────────
        ResetAndPauseRound => match event {
            Event::Done => PullMemesRound,
            Event::NoMajority | Event::ResetAndPauseTimeout => RegistrationRound,
            _ => return None,
        },
    };

    Some(next)
}

/// Every edge of the canonical table, ordered by round then event
pub fn canonical_edges() -> Vec<TransitionEdge> {
    let mut edges = Vec::new();
    for round in Round::ALL {
        for event in Event::ALL {
            if let Some(to) = transition(round, event) {
                edges.push(TransitionEdge::new(round, event, to));
            }
        }
    }
    edges
}

/// One `(Round, Event) -> Round` edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub from: Round,
    pub event: Event,
    pub to: Round,
}

impl TransitionEdge {
    pub fn new(from: Round, event: Event, to: Round) -> Self {
        Self { from, event, to }
    }

    pub fn key(&self) -> TransitionKey {
        TransitionKey::new(self.from, self.event)
    }

    /// Whether the edge re-enters the round it leaves (retry in place)
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl std::fmt::Display for TransitionEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} --{}--> {}", self.from, self.event, self.to)
    }
}

/// The domain side of a transition, written `(Round, EVENT)` in
/// structured specifications
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionKey {
    pub round: Round,
    pub event: Event,
}

impl TransitionKey {
    pub fn new(round: Round, event: Event) -> Self {
        Self { round, event }
    }
}

impl std::fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.round, self.event)
    }
}

impl FromStr for TransitionKey {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| LockstepError::MalformedTransitionKey(s.to_string()))?;

        let (round, event) = inner
            .split_once(',')
            .ok_or_else(|| LockstepError::MalformedTransitionKey(s.to_string()))?;

        Ok(Self {
            round: round.parse()?,
            event: event.parse()?,
        })
    }
}

impl Serialize for TransitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransitionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_canonical_edge_count() {
        assert_eq!(canonical_edges().len(), 87);
    }

    #[test]
    fn test_every_round_has_an_exit() {
        for round in Round::ALL {
            assert!(
                Event::ALL.iter().any(|e| transition(round, *e).is_some()),
                "{} has no exits",
                round
            );
        }
    }

    #[test]
    fn test_every_symbol_used() {
        let used: HashSet<Event> = canonical_edges().iter().map(|e| e.event).collect();
        assert_eq!(used.len(), Event::ALL.len());
    }

    #[test]
    fn test_timeout_symbol_routed_for_every_round() {
        for round in Round::ALL {
            if let Some(symbol) = round.timeout_event() {
                assert!(
                    transition(round, symbol).is_some(),
                    "{} does not route {}",
                    round,
                    symbol
                );
            }
        }
    }

    #[test]
    fn test_registration_startup_rejects_no_majority() {
        assert_eq!(
            transition(Round::RegistrationStartupRound, Event::NoMajority),
            None
        );
    }

    #[test]
    fn test_keeper_a_falls_back_to_reset() {
        assert_eq!(
            transition(
                Round::SelectKeeperTransactionSubmissionARound,
                Event::NoMajority
            ),
            Some(Round::ResetRound)
        );
        assert_eq!(
            transition(
                Round::SelectKeeperTransactionSubmissionBRound,
                Event::NoMajority
            ),
            Some(Round::SelectKeeperTransactionSubmissionBRound)
        );
    }

    #[test]
    fn test_parse_transition_key() {
        let key: TransitionKey = "(FinalizationRound, FINALIZE_TIMEOUT)".parse().unwrap();
        assert_eq!(key.round, Round::FinalizationRound);
        assert_eq!(key.event, Event::FinalizeTimeout);
        assert_eq!(key.to_string(), "(FinalizationRound, FINALIZE_TIMEOUT)");

        assert!(matches!(
            "FinalizationRound, DONE".parse::<TransitionKey>(),
            Err(LockstepError::MalformedTransitionKey(_))
        ));
        assert!(matches!(
            "(FinalizationRound DONE)".parse::<TransitionKey>(),
            Err(LockstepError::MalformedTransitionKey(_))
        ));
        assert!(matches!(
            "(Nowhere, DONE)".parse::<TransitionKey>(),
            Err(LockstepError::UnknownRound(_))
        ));
    }

    #[test]
    fn test_edge_display_and_self_loop() {
        let edge = TransitionEdge::new(
            Round::CollectSignatureRound,
            Event::RoundTimeout,
            Round::CollectSignatureRound,
        );
        assert!(edge.is_self_loop());
        assert_eq!(
            edge.to_string(),
            "CollectSignatureRound --ROUND_TIMEOUT--> CollectSignatureRound"
        );
    }

    // ---- Golden table ----

    fn golden_edges() -> Vec<(Round, Event, Round)> {
        use Event as E;
        use Round::*;

        vec![
            // Registration
            (RegistrationStartupRound, E::Done, LoadDatabaseRound),
            (RegistrationRound, E::Done, LoadDatabaseRound),
            (RegistrationRound, E::NoMajority, RegistrationRound),
            // Content cycle
            (LoadDatabaseRound, E::Done, PullMemesRound),
            (LoadDatabaseRound, E::NoMajority, LoadDatabaseRound),
            (LoadDatabaseRound, E::RoundTimeout, LoadDatabaseRound),
            (PullMemesRound, E::Done, CollectFeedbackRound),
            (PullMemesRound, E::NoMajority, PullMemesRound),
            (PullMemesRound, E::RoundTimeout, PullMemesRound),
            (CollectFeedbackRound, E::Done, EngageTwitterRound),
            (CollectFeedbackRound, E::Error, CollectFeedbackRound),
            (CollectFeedbackRound, E::NoMajority, CollectFeedbackRound),
            (CollectFeedbackRound, E::RoundTimeout, CollectFeedbackRound),
            (EngageTwitterRound, E::Done, ActionDecisionRound),
            (EngageTwitterRound, E::Error, EngageTwitterRound),
            (EngageTwitterRound, E::NoMajority, EngageTwitterRound),
            (EngageTwitterRound, E::RoundTimeout, EngageTwitterRound),
            (ActionDecisionRound, E::Done, ActionPreparationRound),
            (ActionDecisionRound, E::Wait, ResetAndPauseRound),
            (ActionDecisionRound, E::NoMajority, ActionDecisionRound),
            (ActionDecisionRound, E::RoundTimeout, ActionDecisionRound),
            (ActionPreparationRound, E::Done, ActionTweetRound),
            (ActionPreparationRound, E::Settle, CheckFundsRound),
            (ActionPreparationRound, E::Error, ResetAndPauseRound),
            (ActionPreparationRound, E::NoMajority, ActionPreparationRound),
            (ActionPreparationRound, E::RoundTimeout, ActionPreparationRound),
            (CheckFundsRound, E::Done, RandomnessTransactionSubmissionRound),
            (CheckFundsRound, E::NoFunds, CheckFundsRound),
            (CheckFundsRound, E::NoMajority, CheckFundsRound),
            (CheckFundsRound, E::RoundTimeout, CheckFundsRound),
            (ActionTweetRound, E::Done, ResetAndPauseRound),
            (ActionTweetRound, E::Error, ActionTweetRound),
            (ActionTweetRound, E::NoMajority, ActionTweetRound),
            (ActionTweetRound, E::RoundTimeout, ActionTweetRound),
            // Transaction settlement
            (
                RandomnessTransactionSubmissionRound,
                E::Done,
                SelectKeeperTransactionSubmissionARound,
            ),
            (
                RandomnessTransactionSubmissionRound,
                E::NoMajority,
                RandomnessTransactionSubmissionRound,
            ),
            (
                RandomnessTransactionSubmissionRound,
                E::RoundTimeout,
                RandomnessTransactionSubmissionRound,
            ),
            (
                SelectKeeperTransactionSubmissionARound,
                E::Done,
                CollectSignatureRound,
            ),
            (
                SelectKeeperTransactionSubmissionARound,
                E::NoMajority,
                ResetRound,
            ),
            (
                SelectKeeperTransactionSubmissionARound,
                E::RoundTimeout,
                SelectKeeperTransactionSubmissionARound,
            ),
            (
                SelectKeeperTransactionSubmissionARound,
                E::IncorrectSerialization,
                RandomnessTransactionSubmissionRound,
            ),
            (CollectSignatureRound, E::Done, FinalizationRound),
            (CollectSignatureRound, E::NoMajority, ResetRound),
            (CollectSignatureRound, E::RoundTimeout, CollectSignatureRound),
            (FinalizationRound, E::Done, ValidateTransactionRound),
            (FinalizationRound, E::CheckHistory, CheckTransactionHistoryRound),
            (
                FinalizationRound,
                E::CheckLateArrivingMessage,
                SynchronizeLateMessagesRound,
            ),
            (
                FinalizationRound,
                E::FinalizationFailed,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                FinalizationRound,
                E::InsufficientFunds,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                FinalizationRound,
                E::FinalizeTimeout,
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
            ),
            (
                SelectKeeperTransactionSubmissionBRound,
                E::Done,
                FinalizationRound,
            ),
            (
                SelectKeeperTransactionSubmissionBRound,
                E::NoMajority,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                SelectKeeperTransactionSubmissionBRound,
                E::RoundTimeout,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                SelectKeeperTransactionSubmissionBRound,
                E::IncorrectSerialization,
                RandomnessTransactionSubmissionRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::Done,
                FinalizationRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::CheckHistory,
                CheckTransactionHistoryRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::CheckLateArrivingMessage,
                SynchronizeLateMessagesRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::NoMajority,
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::RoundTimeout,
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
            ),
            (
                SelectKeeperTransactionSubmissionBAfterTimeoutRound,
                E::IncorrectSerialization,
                RandomnessTransactionSubmissionRound,
            ),
            (ValidateTransactionRound, E::Done, ActionPreparationRound),
            (
                ValidateTransactionRound,
                E::Negative,
                CheckTransactionHistoryRound,
            ),
            (
                ValidateTransactionRound,
                E::ValidateTimeout,
                CheckTransactionHistoryRound,
            ),
            (
                ValidateTransactionRound,
                E::None,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (ValidateTransactionRound, E::NoMajority, ValidateTransactionRound),
            (CheckTransactionHistoryRound, E::Done, ActionPreparationRound),
            (
                CheckTransactionHistoryRound,
                E::Negative,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                CheckTransactionHistoryRound,
                E::CheckLateArrivingMessage,
                SynchronizeLateMessagesRound,
            ),
            (
                CheckTransactionHistoryRound,
                E::CheckTimeout,
                CheckTransactionHistoryRound,
            ),
            (
                CheckTransactionHistoryRound,
                E::NoMajority,
                CheckTransactionHistoryRound,
            ),
            (
                CheckTransactionHistoryRound,
                E::None,
                RandomnessTransactionSubmissionRound,
            ),
            (SynchronizeLateMessagesRound, E::Done, CheckLateTxHashesRound),
            (
                SynchronizeLateMessagesRound,
                E::None,
                SelectKeeperTransactionSubmissionBRound,
            ),
            (
                SynchronizeLateMessagesRound,
                E::RoundTimeout,
                SynchronizeLateMessagesRound,
            ),
            (
                SynchronizeLateMessagesRound,
                E::SuspiciousActivity,
                RandomnessTransactionSubmissionRound,
            ),
            (CheckLateTxHashesRound, E::Done, ActionPreparationRound),
            (
                CheckLateTxHashesRound,
                E::CheckLateArrivingMessage,
                SynchronizeLateMessagesRound,
            ),
            (CheckLateTxHashesRound, E::CheckTimeout, CheckLateTxHashesRound),
            (
                CheckLateTxHashesRound,
                E::Negative,
                RandomnessTransactionSubmissionRound,
            ),
            (
                CheckLateTxHashesRound,
                E::None,
                RandomnessTransactionSubmissionRound,
            ),
            (
                CheckLateTxHashesRound,
                E::NoMajority,
                RandomnessTransactionSubmissionRound,
            ),
            (ResetRound, E::Done, RandomnessTransactionSubmissionRound),
            (ResetRound, E::NoMajority, RandomnessTransactionSubmissionRound),
            (ResetRound, E::ResetTimeout, RandomnessTransactionSubmissionRound),
            // Reset and pause
            (ResetAndPauseRound, E::Done, PullMemesRound),
            (ResetAndPauseRound, E::NoMajority, RegistrationRound),
            (ResetAndPauseRound, E::ResetAndPauseTimeout, RegistrationRound),
        ]
    }

    #[test]
    fn test_canonical_table_matches_golden() {
        let golden = golden_edges();
        assert_eq!(golden.len(), 87);

        let golden_set: HashSet<(Round, Event, Round)> = golden.iter().copied().collect();
        assert_eq!(golden_set.len(), golden.len(), "golden list repeats an edge");

        let canonical: HashSet<(Round, Event, Round)> = canonical_edges()
            .iter()
            .map(|e| (e.from, e.event, e.to))
            .collect();

        let missing: Vec<_> = golden_set.difference(&canonical).collect();
        let extra: Vec<_> = canonical.difference(&golden_set).collect();
        assert!(missing.is_empty(), "missing edges: {:?}", missing);
        assert!(extra.is_empty(), "unexpected edges: {:?}", extra);
        assert_eq!(canonical_edges().len(), golden.len());

        for (from, event, to) in golden {
            assert_eq!(transition(from, event), Some(to), "({}, {})", from, event);
        }
    }

    #[test]
    fn test_pairs_outside_golden_are_undefined() {
        let defined: HashSet<(Round, Event)> =
            golden_edges().iter().map(|(r, e, _)| (*r, *e)).collect();
        for round in Round::ALL {
            for event in Event::ALL {
                if !defined.contains(&(round, event)) {
                    assert_eq!(transition(round, event), None, "({}, {})", round, event);
                }
            }
        }
    }
}
