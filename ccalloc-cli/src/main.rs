// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! ccalloc CLI - cloud cost allocation from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Allocate a FOCUS export and write the allocated and product cost reports
//! ccalloc allocate --config ccalloc.toml --cost focus:focus.csv \
//!     --keys keys.csv --output allocated.csv --products products.csv
//!
//! # Per-product and per-service totals
//! ccalloc summary --config ccalloc.toml --cost generic:costs.csv --keys keys.csv
//!
//! # JSON output
//! ccalloc --format json --pretty summary --config ccalloc.toml --cost generic:costs.csv
//!
//! # Validate a configuration and its allocation keys
//! ccalloc check --config ccalloc.toml --keys keys.csv
//! ```

mod commands;
mod output;

use anyhow::Result;
use ccalloc_engine::AllocationError;
use ccalloc_io::DataError;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{allocate, check, inputs, summary};

// ============================================================================
// CLI Definition
// ============================================================================

/// ccalloc CLI - cloud cost allocation.
#[derive(Parser)]
#[command(name = "ccalloc")]
#[command(about = "Cloud cost allocation to services and products")]
#[command(long_about = r#"
ccalloc allocates cloud costs to the services consuming them and, finally,
to products. Cloud cost items are attributed to service instances by their
tags; cost allocation keys declare how each instance shares its cost with
its consumers.

Cost file kinds:
  • generic   Date, Tags, AmortizedCost, OnDemandCost, Currency
  • focus     FOCUS export with one-day charge periods

Exit codes:
  0  success
  1  error
  2  configuration error
  3  allocation failure (cycles, currencies)
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (errors only through the exit code).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Allocate cloud costs and write the reports.
    #[command(visible_alias = "a")]
    Allocate(allocate::AllocateArgs),

    /// Show per-product and per-service totals.
    #[command(visible_alias = "s")]
    Summary(inputs::InputArgs),

    /// Validate a configuration and cost allocation keys.
    Check(check::CheckArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Invalid configuration.
    ConfigError = 2,
    /// Allocation failed.
    AllocationFailed = 3,
}

impl ExitCode {
    /// Picks the exit code of an error from its cause chain.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(err) = cause.downcast_ref::<DataError>() {
                if err.is_config_error() {
                    return ExitCode::ConfigError;
                }
            }
            if let Some(err) = cause.downcast_ref::<AllocationError>() {
                return match err {
                    AllocationError::Core(core) if core.is_config_error() => ExitCode::ConfigError,
                    _ => ExitCode::AllocationFailed,
                };
            }
        }
        ExitCode::Error
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("ccalloc=debug")
    } else {
        EnvFilter::new("ccalloc=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Allocate(args) => allocate::run(args, &cli),
        Commands::Summary(args) => summary::run(args, &cli),
        Commands::Check(args) => check::run(args, &cli),
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use ccalloc_core::CoreError;

    #[test]
    fn test_cli_parses_allocate() {
        let cli = Cli::try_parse_from([
            "ccalloc",
            "--format",
            "json",
            "allocate",
            "--config",
            "ccalloc.toml",
            "--cost",
            "focus:focus.csv",
            "--cost",
            "generic:costs.csv",
            "--keys",
            "keys.csv",
            "--output",
            "out.csv",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Allocate(args) = cli.command else {
            panic!("expected allocate");
        };
        assert_eq!(args.inputs.cost.len(), 2);
        assert!(args.products.is_none());
    }

    #[test]
    fn test_cli_rejects_bad_cost_kind() {
        let result = Cli::try_parse_from([
            "ccalloc", "summary", "--config", "c.toml", "--cost", "azure:costs.csv",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_cost_files() {
        let result = Cli::try_parse_from(["ccalloc", "summary", "--config", "c.toml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["ccalloc", "-v", "-q", "check", "--config", "c.toml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        let err = anyhow::Error::new(AllocationError::CycleBreakLimitExceeded { max_breaks: 3 })
            .context("Cost allocation failed");
        assert_eq!(ExitCode::for_error(&err), ExitCode::AllocationFailed);

        let err: anyhow::Error = Err::<(), _>(DataError::Core(CoreError::InvalidConfig(
            "bad".to_string(),
        )))
        .context("Failed to load configuration")
        .unwrap_err();
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);

        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::for_error(&err), ExitCode::Error);
        assert_eq!(ExitCode::Success as i32, 0);
    }
}
