//! Timeout supervisor: races round behaviours against their budgets
//!
//! Each round has a fixed timeout symbol and a configurable budget. When
//! a behaviour does not conclude within budget the supervisor yields the
//! round's own symbol, never a generic one, because different rounds route
//! their timeouts to different recovery rounds.
//!
//! The supervisor does NOT route anything itself. It reports outcomes and
//! the engine feeds them through the transition table.

use lockstep_types::{
    Event, LockstepError, LockstepResult, RetryConfig, RetryPolicy, Round, TimeoutConfig,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A registered deadline for the round currently running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    pub round: Round,
    /// Symbol injected when the deadline passes
    pub event: Event,
    pub at: Instant,
}

impl Deadline {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// How a supervised round ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundOutcome<T> {
    /// The behaviour finished within budget
    Concluded(T),
    /// The budget ran out; carries the round's timeout symbol
    TimedOut(Event),
}

/// Per-round budgets, timeout symbols and retry caps
#[derive(Clone, Debug)]
pub struct TimeoutSupervisor {
    budgets: BTreeMap<Round, Duration>,
    retry_policies: BTreeMap<Round, RetryPolicy>,
}

/// Longest budget a round may be given
pub const MAX_BUDGET: Duration = Duration::from_secs(365 * 24 * 3600);

impl TimeoutSupervisor {
    /// Resolve budgets for every round from configuration.
    ///
    /// Fails on unknown override keys and on budgets above [`MAX_BUDGET`].
    pub fn new(config: &TimeoutConfig) -> LockstepResult<Self> {
        let mut supervisor = Self::from_class_budgets(config);
        for (round, secs) in config.resolved_overrides()? {
            supervisor = supervisor.with_budget(round, Duration::from_secs(secs));
        }

        if let Some((round, budget)) = supervisor
            .budgets
            .iter()
            .find(|(_, budget)| **budget > MAX_BUDGET)
        {
            return Err(LockstepError::Config(format!(
                "timeout budget for {} is {}s, above the {}s limit",
                round,
                budget.as_secs(),
                MAX_BUDGET.as_secs()
            )));
        }
        Ok(supervisor)
    }

    /// Class budgets only, with unbounded retries everywhere
    fn from_class_budgets(config: &TimeoutConfig) -> Self {
        let budgets = Round::ALL
            .into_iter()
            .filter_map(|round| {
                config
                    .class_budget_secs(round)
                    .map(|secs| (round, Duration::from_secs(secs)))
            })
            .collect();
        Self {
            budgets,
            retry_policies: BTreeMap::new(),
        }
    }

    /// Attach retry caps
    pub fn with_retry_config(mut self, config: &RetryConfig) -> LockstepResult<Self> {
        self.retry_policies = config.resolve()?;
        Ok(self)
    }

    /// Override one round's budget
    pub fn with_budget(mut self, round: Round, budget: Duration) -> Self {
        if round.timeout_event().is_some() {
            self.budgets.insert(round, budget);
        }
        self
    }

    /// The symbol injected when `round` times out
    pub fn timeout_event(&self, round: Round) -> Option<Event> {
        round.timeout_event()
    }

    pub fn budget(&self, round: Round) -> Option<Duration> {
        self.budgets.get(&round).copied()
    }

    pub fn retry_policy(&self, round: Round) -> RetryPolicy {
        self.retry_policies.get(&round).copied().unwrap_or_default()
    }

    /// Register the deadline of a round starting now.
    ///
    /// `None` for rounds that wait indefinitely.
    pub fn register_deadline(&self, round: Round) -> Option<Deadline> {
        let event = self.timeout_event(round)?;
        let budget = self.budget(round)?;
        let Some(at) = Instant::now().checked_add(budget) else {
            tracing::warn!(
                %round,
                budget_secs = budget.as_secs(),
                "Budget past the clock range, waiting indefinitely"
            );
            return None;
        };
        let deadline = Deadline { round, event, at };
        tracing::debug!(%round, %event, budget_ms = budget.as_millis() as u64, "Deadline registered");
        Some(deadline)
    }

    /// Run `work` until it finishes or the round's deadline passes.
    ///
    /// A timed-out behaviour is dropped, so nothing it started outlives
    /// the round.
    pub async fn supervise<F, T>(&self, round: Round, work: F) -> RoundOutcome<T>
    where
        F: Future<Output = T>,
    {
        let deadline = match self.register_deadline(round) {
            Some(deadline) => deadline,
            None => return RoundOutcome::Concluded(work.await),
        };

        match tokio::time::timeout_at(deadline.at, work).await {
            Ok(value) => RoundOutcome::Concluded(value),
            Err(_) => {
                tracing::warn!(%round, event = %deadline.event, "Round timed out");
                RoundOutcome::TimedOut(deadline.event)
            }
        }
    }
}

impl Default for TimeoutSupervisor {
    fn default() -> Self {
        Self::from_class_budgets(&TimeoutConfig::default())
    }
}
