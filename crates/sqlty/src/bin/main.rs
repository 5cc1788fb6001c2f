//! sqlty command-line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlty::cli::{analyze, check, output, Inputs};
use std::path::PathBuf;

/// Typed SQL for SQLite
#[derive(Parser)]
#[command(name = "sqlty")]
#[command(author, version, about = "Resolve SQL query result and parameter types against a schema", long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    /// Configuration file (default: ./sqlty.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report diagnostics for query files
    Check {
        /// Query files or directories
        files: Vec<PathBuf>,

        /// Schema files or directories
        #[arg(short, long)]
        schema: Vec<PathBuf>,

        /// Strict mode (warnings as errors)
        #[arg(long)]
        strict: bool,
    },

    /// Print the typed columns and parameters of every query
    Analyze {
        /// Query files or directories
        files: Vec<PathBuf>,

        /// Schema files or directories
        #[arg(short, long)]
        schema: Vec<PathBuf>,

        /// Output format (json, pretty, table)
        #[arg(short = 'f', long, default_value = "pretty")]
        format: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

fn run(cli: Cli) -> Result<bool> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    match cli.command {
        Commands::Check {
            files,
            schema,
            strict,
        } => {
            let inputs = Inputs {
                config: cli.config,
                files,
                schema,
                strict,
            };
            check::check(&inputs.resolve(&cwd)?)
        }

        Commands::Analyze {
            files,
            schema,
            format,
            output,
        } => {
            let inputs = Inputs {
                config: cli.config,
                files,
                schema,
                strict: false,
            };
            analyze::analyze(analyze::AnalyzeConfig {
                config: inputs.resolve(&cwd)?,
                format: output::OutputFormat::parse(&format),
                output_file: output,
            })
        }
    }
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    init_logging(cli.verbose);
    output::setup_colors(&cli.color);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", output::format_error(&e));
            std::process::exit(1);
        }
    }
}
