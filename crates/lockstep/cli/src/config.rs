//! Configuration for the lockstep CLI

use crate::error::{CliError, CliResult};
use lockstep_engine::{EngineConfig, TimeoutSupervisor, DEFAULT_HISTORY_CAPACITY};
use lockstep_types::{RetryConfig, Round, TimeoutConfig};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockstepConfig {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineSection,

    /// Per-round timeout budgets
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Per-round retry caps
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Start round name; the table's default start when unset
    #[serde(default)]
    pub start_state: Option<String>,

    /// Buffered round-changed notifications per subscriber
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Most recent transitions kept in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Transition table file (YAML or JSON); the canonical table when unset
    #[serde(default)]
    pub specification: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            start_state: None,
            notification_capacity: default_notification_capacity(),
            history_capacity: default_history_capacity(),
            specification: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_notification_capacity() -> usize {
    1024
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LockstepConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `LOCKSTEP_*` environment variables (`__` separates sections,
    /// e.g. `LOCKSTEP_ENGINE__START_STATE`)
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&LockstepConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with LOCKSTEP_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("LOCKSTEP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Resolve the engine section
    pub fn engine_config(&self) -> CliResult<EngineConfig> {
        let start_state = self
            .engine
            .start_state
            .as_deref()
            .map(str::parse::<Round>)
            .transpose()
            .map_err(|e| CliError::Config(e.to_string()))?;

        Ok(EngineConfig {
            start_state,
            notification_capacity: self.engine.notification_capacity,
            history_capacity: self.engine.history_capacity,
        })
    }

    /// Build the timeout supervisor from the timeout and retry sections
    pub fn supervisor(&self) -> CliResult<TimeoutSupervisor> {
        Ok(TimeoutSupervisor::new(&self.timeouts)?.with_retry_config(&self.retry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = LockstepConfig::default();
        assert!(config.engine.start_state.is_none());
        assert_eq!(config.engine.notification_capacity, 1024);
        assert_eq!(config.engine.history_capacity, 10_000);
        assert_eq!(config.timeouts.finalize_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = LockstepConfig::load(Some("/nonexistent/path/lockstep")).unwrap();
        assert_eq!(config.timeouts.round_secs, 30);
        assert_eq!(config.retry.default, RetryPolicy::unbounded());
    }

    #[test]
    fn test_load_yaml_file() {
        let path = std::env::temp_dir().join(format!("lockstep-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "engine:\n  start_state: RegistrationRound\ntimeouts:\n  finalize_secs: 90\n  overrides:\n    CollectSignatureRound: 12\nretry:\n  default:\n    max_consecutive: 5\n",
        )
        .unwrap();

        let config = LockstepConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.start_state, Some(Round::RegistrationRound));

        let supervisor = config.supervisor().unwrap();
        assert_eq!(
            supervisor.budget(Round::FinalizationRound),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            supervisor.budget(Round::CollectSignatureRound),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            supervisor.retry_policy(Round::ActionTweetRound),
            RetryPolicy::capped(5)
        );
    }

    #[test]
    fn test_invalid_start_state() {
        let mut config = LockstepConfig::default();
        config.engine.start_state = Some("Nowhere".into());
        assert!(matches!(config.engine_config(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_oversized_budget_is_a_config_error() {
        let mut config = LockstepConfig::default();
        config.timeouts.round_secs = u64::MAX;
        assert!(matches!(
            config.supervisor(),
            Err(CliError::Lockstep(lockstep_types::LockstepError::Config(_)))
        ));
    }
}
