//! Lockstep CLI - operator tooling for the round engine
//!
//! This CLI provides operators and developers with a terminal interface to:
//! - Validate a transition table before replicas load it
//! - Export the round graph as YAML, JSON or Graphviz
//! - Replay an ordered event sequence and see where a replica ends up
//! - Simulate the engine end to end with seeded random behaviours

use clap::{Parser, Subcommand};
use lockstep_types::{Event, Round};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{export, show_config, simulate, trace, validate};
pub use config::LockstepConfig;
pub use error::{CliError, CliResult};

/// Lockstep CLI application
#[derive(Parser)]
#[command(name = "lockstep")]
#[command(about = "Lockstep - deterministic round engine tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LOCKSTEP_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Log level
    #[arg(long, env = "LOCKSTEP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "LOCKSTEP_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Validate a transition table
    Validate {
        /// Table file (YAML or JSON); the canonical table when omitted
        #[arg(short, long)]
        spec: Option<String>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Export the transition table
    Export {
        /// Table file (YAML or JSON); the canonical table when omitted
        #[arg(short, long)]
        spec: Option<String>,

        /// Export format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: export::ExportFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        to: Option<String>,
    },

    /// Replay an event sequence
    Trace {
        /// Comma-separated events, e.g. DONE,DONE,NO_MAJORITY
        #[arg(short, long, value_delimiter = ',', required = true)]
        events: Vec<Event>,

        /// Start round
        #[arg(long)]
        start: Option<Round>,

        /// Table file (YAML or JSON); the canonical table when omitted
        #[arg(short, long)]
        spec: Option<String>,
    },

    /// Run the engine with seeded random behaviours
    Simulate {
        /// Number of rounds to run
        #[arg(short = 'n', long, default_value_t = 100)]
        steps: u64,

        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Show the effective configuration
    Config,
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Load config
    let config = LockstepConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&level, cli.json || config.logging.json);

    // Execute command
    match cli.command {
        Commands::Validate { spec, strict } => {
            let spec = spec.or_else(|| config.engine.specification.clone());
            validate::execute(spec.as_deref(), strict, cli.output)
        }
        Commands::Export { spec, format, to } => {
            let spec = spec.or_else(|| config.engine.specification.clone());
            export::execute(spec.as_deref(), format, to.as_deref())
        }
        Commands::Trace {
            events,
            start,
            spec,
        } => {
            let spec = spec.or_else(|| config.engine.specification.clone());
            let start = match start {
                Some(start) => Some(start),
                None => config.engine_config()?.start_state,
            };
            trace::execute(spec.as_deref(), start, &events, cli.output)
        }
        Commands::Simulate { steps, seed } => {
            simulate::execute(&config, steps, seed, cli.output).await
        }
        Commands::Config => show_config::execute(&config, cli.output),
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    // A subscriber may already be installed when embedded or under test
    let _ = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
