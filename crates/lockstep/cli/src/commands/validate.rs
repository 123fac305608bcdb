//! Table validation command

use super::load_table;
use crate::error::{CliError, CliResult};
use crate::output::{print_output, print_success, print_warning, OutputFormat};
use lockstep_engine::TransitionTable;
use serde::Serialize;
use tabled::Tabled;

/// Per-round row of the validation report
#[derive(Debug, Serialize, Tabled)]
struct RoundRow {
    round: String,
    start: bool,
    exits: usize,
    timeout: String,
}

fn rows(table: &TransitionTable) -> Vec<RoundRow> {
    table
        .states()
        .iter()
        .map(|round| RoundRow {
            round: round.to_string(),
            start: table.is_start(*round),
            exits: table.outgoing(*round).len(),
            timeout: round
                .timeout_event()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".into()),
        })
        .collect()
}

/// Validate a table and report its shape.
///
/// With `strict`, warnings fail the command too.
pub fn execute(spec: Option<&str>, strict: bool, format: OutputFormat) -> CliResult<()> {
    let table = load_table(spec)?;

    print_output(rows(&table), format)?;
    for warning in table.warnings() {
        print_warning(&warning.to_string());
    }

    if strict && !table.warnings().is_empty() {
        return Err(CliError::InvalidInput(format!(
            "{} validation warning(s)",
            table.warnings().len()
        )));
    }

    print_success(&format!(
        "Valid: {} rounds, {} events, {} transitions, default start {}",
        table.states().len(),
        table.alphabet().len(),
        table.edge_count(),
        table.default_start()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::{Event, FsmSpecification};

    #[test]
    fn test_rows_cover_every_round() {
        let table = load_table(None).unwrap();
        let rows = rows(&table);
        assert_eq!(rows.len(), 22);
        let startup = rows
            .iter()
            .find(|r| r.round == "RegistrationStartupRound")
            .unwrap();
        assert!(startup.start);
        assert_eq!(startup.exits, 1);
        assert_eq!(startup.timeout, "-");
    }

    #[test]
    fn test_strict_rejects_warnings() {
        let mut spec = FsmSpecification::canonical();
        spec.transition_func
            .retain(|e| e.event != Event::ResetTimeout);
        let path = std::env::temp_dir().join(format!("lockstep-strict-{}.yaml", std::process::id()));
        std::fs::write(&path, spec.to_yaml_string().unwrap()).unwrap();

        let lenient = execute(path.to_str(), false, OutputFormat::Json);
        let strict = execute(path.to_str(), true, OutputFormat::Json);
        std::fs::remove_file(&path).unwrap();

        assert!(lenient.is_ok());
        assert!(matches!(strict, Err(CliError::InvalidInput(_))));
    }
}
