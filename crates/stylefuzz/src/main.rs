//! Stylefuzz command-line front end
//!
//! - **evolve**: replay recorded passes and write the next schema version
//! - **apply**: rebuild a schema from a saved modifier list
//! - **consolidate**: merge modifier lists from separate runs
//! - **inspect**: summarize a schema
//! - **init**: write a default configuration file

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use stylefuzz_logging::{init_logging, LogConfig};

mod cli;
mod config;

use config::{EvolutionConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "stylefuzz", about = "Evolve fuzzing input schemas from stylesheet accesses")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./stylefuzz.toml)
    #[arg(long, global = true, env = "STYLEFUZZ_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay recorded passes against a schema and write the next version
    Evolve {
        /// Current schema (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Recorded pass files (JSON), one per transformed document
        #[arg(long = "pass", required = true)]
        passes: Vec<PathBuf>,

        /// Where to write the next schema version
        #[arg(long)]
        out: PathBuf,

        /// Also write the consolidated modifiers
        #[arg(long)]
        modifiers_out: Option<PathBuf>,

        /// Worker threads (overrides the config file)
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Output summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply a modifier list to a schema
    Apply {
        /// Current schema (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Modifier list (JSON)
        #[arg(long)]
        modifiers: PathBuf,

        /// Where to write the next schema version
        #[arg(long)]
        out: PathBuf,

        /// Output summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge modifier lists for the same schema version
    Consolidate {
        /// Modifier lists (JSON)
        #[arg(long = "modifiers", required = true)]
        modifiers: Vec<PathBuf>,

        /// Where to write the consolidated list
        #[arg(long)]
        out: PathBuf,

        /// Output summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize a schema
    Inspect {
        /// Schema (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file with the defaults to the --config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn run_command(command: Commands, config_path: PathBuf, config: &EvolutionConfig) -> Result<()> {
    match command {
        Commands::Evolve {
            schema,
            passes,
            out,
            modifiers_out,
            workers,
            json,
        } => cli::evolve::run(
            cli::evolve::EvolveArgs {
                schema,
                passes,
                out,
                modifiers_out,
                workers,
                json,
            },
            config,
        ),
        Commands::Apply {
            schema,
            modifiers,
            out,
            json,
        } => cli::apply::run(cli::apply::ApplyArgs {
            schema,
            modifiers,
            out,
            json,
        }),
        Commands::Consolidate {
            modifiers,
            out,
            json,
        } => cli::consolidate::run(cli::consolidate::ConsolidateArgs {
            modifiers,
            out,
            json,
        }),
        Commands::Inspect { schema, json } => {
            cli::inspect::run(cli::inspect::InspectArgs { schema, json })
        }
        Commands::Init { force } => cli::init::run(cli::init::InitArgs {
            path: config_path,
            force,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = match EvolutionConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:?}", err);
            return ExitCode::from(2);
        }
    };

    if let Err(err) = init_logging(LogConfig {
        app_name: "stylefuzz",
        verbose: cli.verbose || config.verbose,
        log_file: config.log_file.as_deref(),
    }) {
        eprintln!("Warning: {:#}", err);
    }

    match run_command(cli.command, config_path, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
