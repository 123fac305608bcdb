//! Round behaviours: the pluggable work behind each round
//!
//! The engine treats behaviours opaquely. A behaviour reads and writes the
//! synchronized database through its [`RoundContext`] and concludes the
//! round with exactly one event.

use crate::synchronized_db::SynchronizedDb;
use crate::transition_table::TransitionTable;
use async_trait::async_trait;
use lockstep_types::{Event, LockstepError, LockstepResult, Round};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Work executed while a replica sits in one round
#[async_trait]
pub trait RoundBehaviour: Send + Sync {
    /// The round this behaviour runs in
    fn round(&self) -> Round;

    /// Do the round's work and conclude it through `ctx`
    async fn run(&self, ctx: &mut RoundContext) -> LockstepResult<()>;
}

/// Handle given to a behaviour for the duration of one round
#[derive(Debug)]
pub struct RoundContext {
    round: Round,
    period: u64,
    db: SynchronizedDb,
    outcome: Option<Event>,
}

impl RoundContext {
    pub fn new(round: Round, period: u64, db: SynchronizedDb) -> Self {
        Self {
            round,
            period,
            db,
            outcome: None,
        }
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn db(&self) -> &SynchronizedDb {
        &self.db
    }

    /// Conclude the round with `event`. Only the first call counts.
    pub fn conclude(&mut self, event: Event) -> LockstepResult<()> {
        if self.outcome.is_some() {
            return Err(LockstepError::AlreadyConcluded(self.round));
        }
        tracing::debug!(round = %self.round, %event, "Round concluded");
        self.outcome = Some(event);
        Ok(())
    }

    pub fn outcome(&self) -> Option<Event> {
        self.outcome
    }

    /// The concluded event, or `NoOutcome`
    pub fn into_outcome(self) -> LockstepResult<Event> {
        self.outcome.ok_or(LockstepError::NoOutcome(self.round))
    }
}

/// Behaviours keyed by the round they run in
#[derive(Clone, Default)]
pub struct BehaviourRegistry {
    behaviours: HashMap<Round, Arc<dyn RoundBehaviour>>,
}

impl BehaviourRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behaviour, replacing any previous one for its round
    pub fn register(&mut self, behaviour: impl RoundBehaviour + 'static) -> &mut Self {
        let round = behaviour.round();
        if self.behaviours.insert(round, Arc::new(behaviour)).is_some() {
            tracing::debug!(%round, "Behaviour replaced");
        }
        self
    }

    pub fn with(mut self, behaviour: impl RoundBehaviour + 'static) -> Self {
        self.register(behaviour);
        self
    }

    pub fn get(&self, round: Round) -> LockstepResult<Arc<dyn RoundBehaviour>> {
        self.behaviours
            .get(&round)
            .cloned()
            .ok_or(LockstepError::MissingBehaviour(round))
    }

    pub fn contains(&self, round: Round) -> bool {
        self.behaviours.contains_key(&round)
    }

    /// Fail on the first round of the table without a behaviour
    pub fn ensure_complete(&self, table: &TransitionTable) -> LockstepResult<()> {
        match table.states().iter().find(|r| !self.contains(**r)) {
            Some(round) => Err(LockstepError::MissingBehaviour(*round)),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.behaviours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviours.is_empty()
    }
}

impl std::fmt::Debug for BehaviourRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rounds: Vec<&Round> = self.behaviours.keys().collect();
        rounds.sort();
        f.debug_struct("BehaviourRegistry")
            .field("rounds", &rounds)
            .finish()
    }
}

/// Concludes events from a fixed script, then `DONE` once it runs dry
#[derive(Debug)]
pub struct ScriptedBehaviour {
    round: Round,
    script: Mutex<VecDeque<Event>>,
}

impl ScriptedBehaviour {
    pub fn new(round: Round, script: impl IntoIterator<Item = Event>) -> Self {
        Self {
            round,
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Always concludes `DONE`
    pub fn done(round: Round) -> Self {
        Self::new(round, [])
    }

    /// One always-`DONE` behaviour per round of the table
    pub fn registry_for(table: &TransitionTable) -> BehaviourRegistry {
        let mut registry = BehaviourRegistry::new();
        for round in table.states() {
            registry.register(Self::done(*round));
        }
        registry
    }

    /// Events not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RoundBehaviour for ScriptedBehaviour {
    fn round(&self) -> Round {
        self.round
    }

    async fn run(&self, ctx: &mut RoundContext) -> LockstepResult<()> {
        let next = self
            .script
            .lock()
            .map_err(|_| LockstepError::BehaviourFailed {
                round: self.round,
                reason: "script lock poisoned".into(),
            })?
            .pop_front();
        ctx.conclude(next.unwrap_or(Event::Done))
    }
}
