//! Event trace command: replay an event sequence through the table

use super::load_table;
use crate::error::CliResult;
use crate::output::{print_error, print_info, print_output, OutputFormat};
use lockstep_engine::{EngineConfig, RoundRecord, TransitionTable, WorkflowEngine};
use lockstep_types::{Event, LockstepError, Round};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

/// Table row for one replayed transition
#[derive(Debug, Serialize, Tabled)]
pub struct TraceRow {
    pub step: u64,
    pub period: u64,
    pub from: String,
    pub event: String,
    pub to: String,
}

impl From<&RoundRecord> for TraceRow {
    fn from(r: &RoundRecord) -> Self {
        Self {
            step: r.step,
            period: r.period,
            from: r.from.to_string(),
            event: r.event.to_string(),
            to: r.to.to_string(),
        }
    }
}

/// Outcome of a replay
#[derive(Debug)]
pub struct Replay {
    pub rows: Vec<TraceRow>,
    pub final_round: Round,
    /// Set when the replay stopped on a protocol violation
    pub violation: Option<LockstepError>,
}

/// Replay `events` from `start`, stopping at the first violation
pub fn replay(
    table: Arc<TransitionTable>,
    start: Option<Round>,
    events: &[Event],
) -> CliResult<Replay> {
    let config = EngineConfig {
        start_state: start,
        ..EngineConfig::default()
    };
    let mut engine = WorkflowEngine::new(table, config)?;
    let violation = engine.step_all(events.iter().copied()).err();

    Ok(Replay {
        rows: engine.history().iter().map(TraceRow::from).collect(),
        final_round: engine.current_round(),
        violation,
    })
}

pub fn execute(
    spec: Option<&str>,
    start: Option<Round>,
    events: &[Event],
    format: OutputFormat,
) -> CliResult<()> {
    let table = load_table(spec)?;
    let replay = replay(table, start, events)?;

    print_output(replay.rows, format)?;
    match replay.violation {
        Some(violation) => {
            print_error(&format!("Replica frozen at {}", replay.final_round));
            Err(violation.into())
        }
        None => {
            print_info(&format!("Final round: {}", replay.final_round));
            Ok(())
        }
    }
}
