//! Workflow engine: owns the current round and advances it
//!
//! The engine is the only writer of the current-round pointer. Each step
//! takes one event, looks it up in the transition table and moves on.
//! Rounds run strictly one at a time; the only suspension point is the
//! wait for the running behaviour, bounded by the timeout supervisor.
//!
//! A protocol violation, or a behaviour that fails to produce an event,
//! freezes the replica at its last valid round. A frozen engine refuses
//! further steps until it is rebuilt.

use crate::behaviour::{BehaviourRegistry, RoundContext};
use crate::round_history::{RoundChange, RoundHistory, DEFAULT_HISTORY_CAPACITY};
use crate::synchronized_db::SynchronizedDb;
use crate::timeout_supervisor::{RoundOutcome, TimeoutSupervisor};
use crate::transition_table::TransitionTable;
use lockstep_types::{Event, LockstepError, LockstepResult, RetryState, Round};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Start round; the table's default start when unset
    #[serde(default)]
    pub start_state: Option<Round>,
    /// Buffered round-changed notifications per subscriber
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Most recent transitions kept in the in-memory history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_notification_capacity() -> usize {
    1024
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_state: None,
            notification_capacity: default_notification_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn with_start_state(mut self, round: Round) -> Self {
        self.start_state = Some(round);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// The per-replica round state machine
#[derive(Debug)]
pub struct WorkflowEngine {
    table: Arc<TransitionTable>,
    supervisor: TimeoutSupervisor,
    current: Round,
    period: u64,
    frozen: bool,
    retry: RetryState,
    history: RoundHistory,
    notifier: broadcast::Sender<RoundChange>,
}

impl WorkflowEngine {
    /// Create an engine positioned at its start round
    pub fn new(table: Arc<TransitionTable>, config: EngineConfig) -> LockstepResult<Self> {
        let start = config.start_state.unwrap_or_else(|| table.default_start());
        if !table.is_start(start) {
            return Err(LockstepError::NotAStartState(start));
        }

        let (notifier, _) = broadcast::channel(config.notification_capacity.max(1));
        tracing::info!(start = %start, "Workflow engine created");

        Ok(Self {
            table,
            supervisor: TimeoutSupervisor::default(),
            current: start,
            period: 0,
            frozen: false,
            retry: RetryState::new(),
            history: RoundHistory::with_capacity(config.history_capacity),
            notifier,
        })
    }

    pub fn with_supervisor(mut self, supervisor: TimeoutSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    // ── Observation ─────────────────────────────────────────────────

    pub fn current_round(&self) -> Round {
        self.current
    }

    pub fn is_start(&self, round: Round) -> bool {
        self.table.is_start(round)
    }

    /// Completed `ResetAndPauseRound -> PullMemesRound` cycles
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Transitions applied so far, including those the history no longer
    /// retains
    pub fn steps(&self) -> u64 {
        self.history.total()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The most recent transitions, bounded by the configured capacity
    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.supervisor
    }

    /// Round-changed notifications. Slow subscribers lag instead of
    /// blocking the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundChange> {
        self.notifier.subscribe()
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Apply one event delivered by the ordering layer
    pub fn step(&mut self, event: Event) -> LockstepResult<Round> {
        self.apply(event, false)
    }

    /// Apply a sequence of events in order, stopping at the first error
    pub fn step_all(&mut self, events: impl IntoIterator<Item = Event>) -> LockstepResult<Round> {
        for event in events {
            self.step(event)?;
        }
        Ok(self.current)
    }

    fn apply(&mut self, event: Event, timed_out: bool) -> LockstepResult<Round> {
        self.ensure_running()?;

        let from = self.current;
        let to = match self.table.next_round(from, event) {
            Ok(to) => to,
            Err(e) => return Err(self.freeze(e)),
        };

        let policy = self.supervisor.retry_policy(from);
        let retry_limit_exceeded = self.retry.record(from, to, &policy);
        if retry_limit_exceeded {
            tracing::warn!(
                round = %from,
                %event,
                consecutive = self.retry.consecutive,
                max = ?policy.max_consecutive,
                "Retry limit exceeded"
            );
        }

        let record = self
            .history
            .record(from, event, to, self.period, timed_out)
            .clone();
        self.current = to;
        if from == Round::ResetAndPauseRound && to == Round::PullMemesRound {
            self.period += 1;
        }

        tracing::info!(
            from = %from,
            %event,
            to = %to,
            period = self.period,
            class = ?event.class(),
            "Round changed"
        );

        // Ignore send errors when nobody is subscribed
        let _ = self.notifier.send(RoundChange {
            record,
            retry_limit_exceeded,
            consecutive_retries: self.retry.consecutive,
        });

        Ok(to)
    }

    fn ensure_running(&self) -> LockstepResult<()> {
        if self.frozen {
            return Err(LockstepError::Frozen {
                round: self.current,
            });
        }
        Ok(())
    }

    fn freeze(&mut self, error: LockstepError) -> LockstepError {
        self.frozen = true;
        tracing::error!(round = %self.current, error = %error, "Replica frozen");
        error
    }

    // ── Execution ───────────────────────────────────────────────────

    /// Run the current round's behaviour under supervision, then step
    /// with its event or the injected timeout symbol
    pub async fn run_round(
        &mut self,
        behaviours: &BehaviourRegistry,
        db: &SynchronizedDb,
    ) -> LockstepResult<Round> {
        self.ensure_running()?;

        let round = self.current;
        let behaviour = match behaviours.get(round) {
            Ok(behaviour) => behaviour,
            Err(e) => return Err(self.freeze(e)),
        };

        let mut ctx = RoundContext::new(round, self.period, db.clone());
        let outcome = self
            .supervisor
            .supervise(round, behaviour.run(&mut ctx))
            .await;

        match outcome {
            RoundOutcome::Concluded(Ok(())) => match ctx.into_outcome() {
                Ok(event) => self.apply(event, false),
                Err(e) => Err(self.freeze(e)),
            },
            RoundOutcome::Concluded(Err(e)) => Err(self.freeze(LockstepError::BehaviourFailed {
                round,
                reason: e.to_string(),
            })),
            RoundOutcome::TimedOut(symbol) => self.apply(symbol, true),
        }
    }

    /// Run rounds back to back until `shutdown` reads `true`.
    ///
    /// Shutdown is observed between rounds only; a round in progress
    /// always completes. Returns the number of rounds executed.
    pub async fn run(
        &mut self,
        behaviours: &BehaviourRegistry,
        db: &SynchronizedDb,
        shutdown: watch::Receiver<bool>,
    ) -> LockstepResult<u64> {
        behaviours.ensure_complete(&self.table)?;
        tracing::info!(round = %self.current, period = self.period, "Workflow engine running");

        let mut executed = 0;
        while !*shutdown.borrow() {
            self.run_round(behaviours, db).await?;
            executed += 1;
            tokio::task::yield_now().await;
        }

        tracing::info!(
            round = %self.current,
            rounds = executed,
            "Workflow engine stopped"
        );
        Ok(executed)
    }

    /// Run exactly `rounds` rounds
    pub async fn run_for(
        &mut self,
        rounds: u64,
        behaviours: &BehaviourRegistry,
        db: &SynchronizedDb,
    ) -> LockstepResult<Round> {
        for _ in 0..rounds {
            self.run_round(behaviours, db).await?;
        }
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::ScriptedBehaviour;

    fn canonical() -> Arc<TransitionTable> {
        Arc::new(TransitionTable::canonical().unwrap())
    }

    #[test]
    fn test_default_start() {
        let engine = WorkflowEngine::new(canonical(), EngineConfig::default()).unwrap();
        assert_eq!(engine.current_round(), Round::RegistrationStartupRound);
        assert_eq!(engine.steps(), 0);
        assert_eq!(engine.period(), 0);
        assert!(engine.is_start(Round::RegistrationRound));
    }

    #[test]
    fn test_configured_start() {
        let config = EngineConfig::default().with_start_state(Round::RegistrationRound);
        let engine = WorkflowEngine::new(canonical(), config).unwrap();
        assert_eq!(engine.current_round(), Round::RegistrationRound);

        let config = EngineConfig::default().with_start_state(Round::PullMemesRound);
        assert!(matches!(
            WorkflowEngine::new(canonical(), config),
            Err(LockstepError::NotAStartState(Round::PullMemesRound))
        ));
    }

    #[test]
    fn test_step_and_history() {
        let mut engine = WorkflowEngine::new(canonical(), EngineConfig::default()).unwrap();
        assert_eq!(engine.step(Event::Done).unwrap(), Round::LoadDatabaseRound);
        assert_eq!(engine.step(Event::NoMajority).unwrap(), Round::LoadDatabaseRound);
        assert_eq!(engine.steps(), 2);

        let last = engine.history().get(1).unwrap();
        assert_eq!(last.from, Round::LoadDatabaseRound);
        assert!(last.is_self_loop());
        assert!(!last.timed_out);
    }

    #[test]
    fn test_violation_freezes() {
        let mut engine = WorkflowEngine::new(canonical(), EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.step(Event::NoMajority),
            Err(LockstepError::ProtocolViolation { .. })
        ));
        assert!(engine.is_frozen());
        assert_eq!(engine.current_round(), Round::RegistrationStartupRound);
        assert!(matches!(
            engine.step(Event::Done),
            Err(LockstepError::Frozen {
                round: Round::RegistrationStartupRound
            })
        ));
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_period_counts_pause_cycles() {
        let mut engine = WorkflowEngine::new(canonical(), EngineConfig::default()).unwrap();
        engine
            .step_all([Event::Done, Event::Done, Event::Done, Event::Done, Event::Done])
            .unwrap();
        assert_eq!(engine.current_round(), Round::ActionDecisionRound);
        engine.step(Event::Wait).unwrap();
        assert_eq!(engine.current_round(), Round::ResetAndPauseRound);
        assert_eq!(engine.period(), 0);
        engine.step(Event::Done).unwrap();
        assert_eq!(engine.current_round(), Round::PullMemesRound);
        assert_eq!(engine.period(), 1);
    }

    #[tokio::test]
    async fn test_run_round_uses_behaviour_event() {
        let table = canonical();
        let registry = ScriptedBehaviour::registry_for(&table);
        let mut engine = WorkflowEngine::new(table, EngineConfig::default()).unwrap();
        let db = SynchronizedDb::new();

        let round = engine.run_round(&registry, &db).await.unwrap();
        assert_eq!(round, Round::LoadDatabaseRound);
        let round = engine.run_for(2, &registry, &db).await.unwrap();
        assert_eq!(round, Round::CollectFeedbackRound);
    }

    #[tokio::test]
    async fn test_missing_behaviour_freezes() {
        let mut engine = WorkflowEngine::new(canonical(), EngineConfig::default()).unwrap();
        let registry = BehaviourRegistry::new();
        assert!(matches!(
            engine.run_round(&registry, &SynchronizedDb::new()).await,
            Err(LockstepError::MissingBehaviour(Round::RegistrationStartupRound))
        ));
        assert!(engine.is_frozen());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = EngineConfig::default().with_history_capacity(16);
        let mut engine = WorkflowEngine::new(canonical(), config).unwrap();
        engine.step(Event::Done).unwrap();
        for _ in 0..5_000 {
            engine.step(Event::NoMajority).unwrap();
        }

        assert_eq!(engine.steps(), 5_001);
        assert_eq!(engine.history().len(), 16);
        assert_eq!(engine.history().capacity(), 16);
        assert_eq!(engine.history().last().unwrap().step, 5_000);
        assert_eq!(engine.history().iter().next().unwrap().step, 4_985);
        assert!(engine.history().iter().all(|r| r.is_self_loop()));
        assert_eq!(engine.current_round(), Round::LoadDatabaseRound);
    }
}
