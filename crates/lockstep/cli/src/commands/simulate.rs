//! Simulation command: drive the real engine with seeded random behaviours

use super::load_table;
use crate::commands::trace::TraceRow;
use crate::config::LockstepConfig;
use crate::error::CliResult;
use crate::output::{print_info, print_output, print_warning, OutputFormat};
use async_trait::async_trait;
use lockstep_engine::{
    BehaviourRegistry, RoundBehaviour, RoundContext, SynchronizedDb, TransitionTable,
    WorkflowEngine,
};
use lockstep_types::{Event, LockstepError, LockstepResult, Round};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Probability that a simulated round succeeds
const DONE_PROBABILITY: f64 = 0.8;

/// Concludes `DONE` most of the time, otherwise a random non-timeout
/// event the round accepts. Settlement is modelled through the database:
/// validation records a final tx hash that action preparation consumes.
struct RandomBehaviour {
    round: Round,
    choices: Vec<Event>,
    rng: Arc<Mutex<StdRng>>,
}

impl RandomBehaviour {
    fn pick(&self) -> LockstepResult<Event> {
        let mut rng = self.rng.lock().map_err(|_| LockstepError::BehaviourFailed {
            round: self.round,
            reason: "random source poisoned".into(),
        })?;
        let done = self.choices.contains(&Event::Done);
        if self.choices.is_empty() || (done && rng.gen_bool(DONE_PROBABILITY)) {
            return Ok(Event::Done);
        }
        Ok(self.choices[rng.gen_range(0..self.choices.len())])
    }
}

#[async_trait]
impl RoundBehaviour for RandomBehaviour {
    fn round(&self) -> Round {
        self.round
    }

    async fn run(&self, ctx: &mut RoundContext) -> LockstepResult<()> {
        if self.round == Round::ActionPreparationRound {
            if let Some(Value::String(hash)) = ctx.db().read("final_tx_hash").await {
                ctx.db().append("settled_tx_hashes", hash).await?;
                ctx.db().write("final_tx_hash", Value::Null).await?;
                return ctx.conclude(Event::Done);
            }
        }

        let event = self.pick()?;
        if self.round == Round::ValidateTransactionRound && event == Event::Done {
            ctx.db()
                .write("final_tx_hash", format!("0x{:064x}", ctx.period()))
                .await?;
        }
        if self.round == Round::ActionTweetRound && event == Event::Done {
            ctx.db().append("tweets", ctx.period()).await?;
        }
        ctx.conclude(event)
    }
}

/// Random behaviours for every round of the table, sharing one seeded source
fn random_registry(table: &TransitionTable, seed: u64) -> BehaviourRegistry {
    let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
    let mut registry = BehaviourRegistry::new();
    for round in table.states() {
        let choices = table
            .accepted_events(*round)
            .into_iter()
            .filter(|e| !e.is_timeout())
            .collect();
        registry.register(RandomBehaviour {
            round: *round,
            choices,
            rng: rng.clone(),
        });
    }
    registry
}

/// Result of a simulation run
#[derive(Debug)]
pub struct Simulation {
    pub rows: Vec<TraceRow>,
    pub final_round: Round,
    pub period: u64,
    pub retry_signals: usize,
    pub db: Value,
}

/// Run `steps` rounds of a seeded simulation
pub async fn simulate(config: &LockstepConfig, steps: u64, seed: u64) -> CliResult<Simulation> {
    let table = load_table(config.engine.specification.as_deref())?;
    let registry = random_registry(&table, seed);
    registry.ensure_complete(&table)?;

    let mut engine =
        WorkflowEngine::new(table, config.engine_config()?)?.with_supervisor(config.supervisor()?);
    let mut changes = engine.subscribe();
    let db = SynchronizedDb::new();

    tracing::info!(steps, seed, "Simulation started");
    let outcome = engine.run_for(steps, &registry, &db).await;

    let mut retry_signals = 0;
    while let Ok(change) = changes.try_recv() {
        if change.retry_limit_exceeded {
            retry_signals += 1;
        }
    }
    outcome?;

    Ok(Simulation {
        rows: engine.history().iter().map(TraceRow::from).collect(),
        final_round: engine.current_round(),
        period: engine.period(),
        retry_signals,
        db: db.snapshot().await,
    })
}

pub async fn execute(
    config: &LockstepConfig,
    steps: u64,
    seed: u64,
    format: OutputFormat,
) -> CliResult<()> {
    let simulation = simulate(config, steps, seed).await?;

    print_output(simulation.rows, format)?;
    if simulation.retry_signals > 0 {
        print_warning(&format!(
            "{} retry limit signal(s) raised",
            simulation.retry_signals
        ));
    }
    print_info(&format!(
        "Final round: {} (period {})",
        simulation.final_round, simulation.period
    ));
    Ok(())
}
