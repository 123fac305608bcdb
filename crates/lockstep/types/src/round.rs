//! Rounds: the states of the replicated workflow
//!
//! A round is a unit of work gated by majority agreement. The set of
//! rounds is closed; every replica shares the same enumeration so that
//! round names can be compared and serialized without ambiguity.

use crate::{Event, LockstepError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A named round of the workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Round {
    ActionDecisionRound,
    ActionPreparationRound,
    ActionTweetRound,
    CheckFundsRound,
    CheckLateTxHashesRound,
    CheckTransactionHistoryRound,
    CollectFeedbackRound,
    CollectSignatureRound,
    EngageTwitterRound,
    FinalizationRound,
    LoadDatabaseRound,
    PullMemesRound,
    RandomnessTransactionSubmissionRound,
    RegistrationRound,
    RegistrationStartupRound,
    ResetAndPauseRound,
    ResetRound,
    SelectKeeperTransactionSubmissionARound,
    SelectKeeperTransactionSubmissionBAfterTimeoutRound,
    SelectKeeperTransactionSubmissionBRound,
    SynchronizeLateMessagesRound,
    ValidateTransactionRound,
}

impl Round {
    /// Every round, in name order
    pub const ALL: [Round; 22] = [
        Round::ActionDecisionRound,
        Round::ActionPreparationRound,
        Round::ActionTweetRound,
        Round::CheckFundsRound,
        Round::CheckLateTxHashesRound,
        Round::CheckTransactionHistoryRound,
        Round::CollectFeedbackRound,
        Round::CollectSignatureRound,
        Round::EngageTwitterRound,
        Round::FinalizationRound,
        Round::LoadDatabaseRound,
        Round::PullMemesRound,
        Round::RandomnessTransactionSubmissionRound,
        Round::RegistrationRound,
        Round::RegistrationStartupRound,
        Round::ResetAndPauseRound,
        Round::ResetRound,
        Round::SelectKeeperTransactionSubmissionARound,
        Round::SelectKeeperTransactionSubmissionBAfterTimeoutRound,
        Round::SelectKeeperTransactionSubmissionBRound,
        Round::SynchronizeLateMessagesRound,
        Round::ValidateTransactionRound,
    ];

    /// The round every replica enters on a fresh start
    pub const DEFAULT_START: Round = Round::RegistrationStartupRound;

    /// Rounds a replica may be configured to start from
    pub const START_STATES: [Round; 2] = [Round::RegistrationRound, Round::RegistrationStartupRound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Round::ActionDecisionRound => "ActionDecisionRound",
            Round::ActionPreparationRound => "ActionPreparationRound",
            Round::ActionTweetRound => "ActionTweetRound",
            Round::CheckFundsRound => "CheckFundsRound",
            Round::CheckLateTxHashesRound => "CheckLateTxHashesRound",
            Round::CheckTransactionHistoryRound => "CheckTransactionHistoryRound",
            Round::CollectFeedbackRound => "CollectFeedbackRound",
            Round::CollectSignatureRound => "CollectSignatureRound",
            Round::EngageTwitterRound => "EngageTwitterRound",
            Round::FinalizationRound => "FinalizationRound",
            Round::LoadDatabaseRound => "LoadDatabaseRound",
            Round::PullMemesRound => "PullMemesRound",
            Round::RandomnessTransactionSubmissionRound => "RandomnessTransactionSubmissionRound",
            Round::RegistrationRound => "RegistrationRound",
            Round::RegistrationStartupRound => "RegistrationStartupRound",
            Round::ResetAndPauseRound => "ResetAndPauseRound",
            Round::ResetRound => "ResetRound",
            Round::SelectKeeperTransactionSubmissionARound => {
                "SelectKeeperTransactionSubmissionARound"
            }
            Round::SelectKeeperTransactionSubmissionBAfterTimeoutRound => {
                "SelectKeeperTransactionSubmissionBAfterTimeoutRound"
            }
            Round::SelectKeeperTransactionSubmissionBRound => {
                "SelectKeeperTransactionSubmissionBRound"
            }
            Round::SynchronizeLateMessagesRound => "SynchronizeLateMessagesRound",
            Round::ValidateTransactionRound => "ValidateTransactionRound",
        }
    }

    /// The synthetic event injected when this round exceeds its budget.
    ///
    /// Registration rounds wait for the whole replica set and never time out.
    pub fn timeout_event(&self) -> Option<Event> {
        match self {
            Round::RegistrationRound | Round::RegistrationStartupRound => None,
            Round::CheckLateTxHashesRound | Round::CheckTransactionHistoryRound => {
                Some(Event::CheckTimeout)
            }
            Round::FinalizationRound => Some(Event::FinalizeTimeout),
            Round::ValidateTransactionRound => Some(Event::ValidateTimeout),
            Round::ResetRound => Some(Event::ResetTimeout),
            Round::ResetAndPauseRound => Some(Event::ResetAndPauseTimeout),
            _ => Some(Event::RoundTimeout),
        }
    }

    /// Whether this is one of the designated start rounds
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Round::RegistrationRound | Round::RegistrationStartupRound
        )
    }

    /// Whether this round belongs to keeper selection and transaction submission
    pub fn is_transaction_settlement(&self) -> bool {
        matches!(
            self,
            Round::RandomnessTransactionSubmissionRound
                | Round::SelectKeeperTransactionSubmissionARound
                | Round::SelectKeeperTransactionSubmissionBRound
                | Round::SelectKeeperTransactionSubmissionBAfterTimeoutRound
                | Round::CollectSignatureRound
                | Round::FinalizationRound
                | Round::ValidateTransactionRound
                | Round::CheckTransactionHistoryRound
                | Round::SynchronizeLateMessagesRound
                | Round::CheckLateTxHashesRound
                | Round::ResetRound
        )
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Round {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Round::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == name)
            .ok_or_else(|| LockstepError::UnknownRound(name.to_string()))
    }
}
