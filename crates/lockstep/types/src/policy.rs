//! Timeout budgets and retry policy
//!
//! The transition table alone cannot tell "retry forever" from "retry with
//! an external cap". Both knobs live here as explicit per-round
//! configuration so that operators decide them, not the graph.

use crate::{Event, LockstepError, LockstepResult, Round};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Timeouts ────────────────────────────────────────────────────────

/// Per-round wait budgets, in seconds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for rounds timing out with `ROUND_TIMEOUT`
    #[serde(default = "default_round_timeout")]
    pub round_secs: u64,
    /// Budget for the history and late-hash checks (`CHECK_TIMEOUT`)
    #[serde(default = "default_check_timeout")]
    pub check_secs: u64,
    /// Budget for `FinalizationRound` (`FINALIZE_TIMEOUT`)
    #[serde(default = "default_finalize_timeout")]
    pub finalize_secs: u64,
    /// Budget for `ValidateTransactionRound` (`VALIDATE_TIMEOUT`)
    #[serde(default = "default_validate_timeout")]
    pub validate_secs: u64,
    /// Budget for `ResetRound` (`RESET_TIMEOUT`)
    #[serde(default = "default_reset_timeout")]
    pub reset_secs: u64,
    /// Budget for `ResetAndPauseRound` (`RESET_AND_PAUSE_TIMEOUT`)
    #[serde(default = "default_reset_and_pause_timeout")]
    pub reset_and_pause_secs: u64,
    /// Per-round overrides keyed by round name
    #[serde(default)]
    pub overrides: BTreeMap<String, u64>,
}

fn default_round_timeout() -> u64 {
    30
}

fn default_check_timeout() -> u64 {
    1205
}

fn default_finalize_timeout() -> u64 {
    60
}

fn default_validate_timeout() -> u64 {
    1205
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_reset_and_pause_timeout() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            round_secs: default_round_timeout(),
            check_secs: default_check_timeout(),
            finalize_secs: default_finalize_timeout(),
            validate_secs: default_validate_timeout(),
            reset_secs: default_reset_timeout(),
            reset_and_pause_secs: default_reset_and_pause_timeout(),
            overrides: BTreeMap::new(),
        }
    }
}

impl TimeoutConfig {
    pub fn with_override(mut self, round: Round, secs: u64) -> Self {
        self.overrides.insert(round.as_str().to_string(), secs);
        self
    }

    /// The budget in seconds for a round, `None` for rounds without a
    /// timeout symbol
    pub fn budget_secs(&self, round: Round) -> LockstepResult<Option<u64>> {
        if round.timeout_event().is_none() {
            return Ok(None);
        }
        let overrides = self.resolved_overrides()?;
        if let Some(secs) = overrides.get(&round) {
            return Ok(Some(*secs));
        }
        Ok(self.class_budget_secs(round))
    }

    /// The budget shared by a round's timeout class, ignoring overrides
    pub fn class_budget_secs(&self, round: Round) -> Option<u64> {
        let secs = match round.timeout_event()? {
            Event::CheckTimeout => self.check_secs,
            Event::FinalizeTimeout => self.finalize_secs,
            Event::ValidateTimeout => self.validate_secs,
            Event::ResetTimeout => self.reset_secs,
            Event::ResetAndPauseTimeout => self.reset_and_pause_secs,
            _ => self.round_secs,
        };
        Some(secs)
    }

    /// Parse the override keys into rounds.
    ///
    /// Keys match round names case-insensitively since layered configuration
    /// sources may fold case.
    pub fn resolved_overrides(&self) -> LockstepResult<BTreeMap<Round, u64>> {
        self.overrides
            .iter()
            .map(|(name, secs)| Ok((round_by_name(name)?, *secs)))
            .collect()
    }
}

// ── Retries ─────────────────────────────────────────────────────────

/// Cap on consecutive self-loop transitions of one round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// `None` retries in place without limit
    #[serde(default)]
    pub max_consecutive: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_consecutive: None,
        }
    }

    pub fn capped(max: u32) -> Self {
        Self {
            max_consecutive: Some(max),
        }
    }

    /// Whether a streak of `count` self-loops goes past the cap
    pub fn exceeded_by(&self, count: u32) -> bool {
        self.max_consecutive.is_some_and(|max| count > max)
    }
}

/// Retry policies for every round
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Applied to rounds without their own entry
    #[serde(default)]
    pub default: RetryPolicy,
    /// Per-round policies keyed by round name
    #[serde(default)]
    pub rounds: BTreeMap<String, RetryPolicy>,
}

impl RetryConfig {
    pub fn with_default(mut self, policy: RetryPolicy) -> Self {
        self.default = policy;
        self
    }

    pub fn with_round(mut self, round: Round, policy: RetryPolicy) -> Self {
        self.rounds.insert(round.as_str().to_string(), policy);
        self
    }

    /// Resolve the policy for each round of the graph
    pub fn resolve(&self) -> LockstepResult<BTreeMap<Round, RetryPolicy>> {
        let mut resolved: BTreeMap<Round, RetryPolicy> =
            Round::ALL.iter().map(|r| (*r, self.default)).collect();
        for (name, policy) in &self.rounds {
            resolved.insert(round_by_name(name)?, *policy);
        }
        Ok(resolved)
    }
}

/// Consecutive self-loop tracking for the current round
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Round whose streak is being counted
    pub round: Option<Round>,
    /// Consecutive self-loop transitions in `round`
    pub consecutive: u32,
    /// Whether the cap was already signalled for this streak
    pub signalled: bool,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transition. Returns `true` exactly once per streak, on the
    /// transition that first goes past the cap.
    pub fn record(&mut self, from: Round, to: Round, policy: &RetryPolicy) -> bool {
        if from != to {
            self.reset();
            return false;
        }

        if self.round != Some(from) {
            self.round = Some(from);
            self.consecutive = 0;
            self.signalled = false;
        }
        self.consecutive = self.consecutive.saturating_add(1);

        if !self.signalled && policy.exceeded_by(self.consecutive) {
            self.signalled = true;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.round = None;
        self.consecutive = 0;
        self.signalled = false;
    }
}

fn round_by_name(name: &str) -> LockstepResult<Round> {
    Round::ALL
        .iter()
        .copied()
        .find(|r| r.as_str().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| LockstepError::Config(format!("unknown round in configuration: {}", name)))
}
