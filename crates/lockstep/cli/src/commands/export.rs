//! Table export command

use super::load_table;
use crate::error::CliResult;
use lockstep_engine::TransitionTable;

/// Export formats for the round graph
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ExportFormat {
    /// Structured specification as YAML
    #[default]
    Yaml,
    /// Structured specification as JSON
    Json,
    /// Graphviz dot
    Dot,
}

/// Render a table in the requested format
pub fn render(table: &TransitionTable, format: ExportFormat) -> CliResult<String> {
    let rendered = match format {
        ExportFormat::Yaml => table.to_specification().to_yaml_string()?,
        ExportFormat::Json => table.to_specification().to_json_string()?,
        ExportFormat::Dot => table.to_dot(),
    };
    Ok(rendered)
}

pub fn execute(spec: Option<&str>, format: ExportFormat, output: Option<&str>) -> CliResult<()> {
    let table = load_table(spec)?;
    let rendered = render(&table, format)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            tracing::info!(path, ?format, "Transition table exported");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
