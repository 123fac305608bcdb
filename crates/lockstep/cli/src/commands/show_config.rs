//! Effective configuration command

use crate::config::LockstepConfig;
use crate::error::CliResult;
use crate::output::{print_output, print_single, OutputFormat};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

/// One resolved setting, keyed by its dotted path
#[derive(Debug, Serialize, Tabled)]
pub struct SettingRow {
    pub setting: String,
    pub value: String,
}

/// Flatten the configuration into `section.key` rows
pub fn rows(config: &LockstepConfig) -> CliResult<Vec<SettingRow>> {
    let mut rows = Vec::new();
    flatten("", &serde_json::to_value(config)?, &mut rows);
    Ok(rows)
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<SettingRow>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, rows);
            }
        }
        Value::Object(_) => rows.push(SettingRow {
            setting: prefix.to_string(),
            value: "{}".into(),
        }),
        Value::Null => rows.push(SettingRow {
            setting: prefix.to_string(),
            value: "-".into(),
        }),
        Value::String(s) => rows.push(SettingRow {
            setting: prefix.to_string(),
            value: s.clone(),
        }),
        other => rows.push(SettingRow {
            setting: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}

pub fn execute(config: &LockstepConfig, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table => print_output(rows(config)?, format),
        OutputFormat::Json | OutputFormat::Yaml => print_single(config, format),
    }
}
