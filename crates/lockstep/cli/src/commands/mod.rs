//! CLI command implementations

pub mod export;
pub mod show_config;
pub mod simulate;
pub mod trace;
pub mod validate;

use crate::error::CliResult;
use lockstep_engine::TransitionTable;
use std::path::Path;
use std::sync::Arc;

/// Load a table from a YAML or JSON file, or the canonical table
pub fn load_table(path: Option<&str>) -> CliResult<Arc<TransitionTable>> {
    let table = match path {
        None => TransitionTable::canonical()?,
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let is_json = Path::new(path)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json {
                TransitionTable::from_json_str(&raw)?
            } else {
                TransitionTable::from_yaml_str(&raw)?
            }
        }
    };
    Ok(Arc::new(table))
}
