//! Check command - validate a configuration and allocation keys.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::inputs::read_declarations;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Configuration file.
    #[arg(long, short)]
    pub config: PathBuf,

    /// Cost allocation keys files whose selectors are checked.
    #[arg(long, short)]
    pub keys: Vec<PathBuf>,
}

/// Outcome of a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub config: PathBuf,
    pub dimensions: Vec<String>,
    pub keys_files: usize,
    pub declarations: usize,
    pub selectors: usize,
}

/// Runs the check command.
///
/// Loading the configuration validates it; reading the keys parses every
/// selector, so any malformed selector fails the check.
pub fn run(args: &CheckArgs, cli: &Cli) -> Result<()> {
    let report = check(args)?;
    info!(declarations = report.declarations, "Check passed");

    if cli.quiet {
        return Ok(());
    }
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_check(&report));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_check(&report)?);
        }
    }
    Ok(())
}

/// Validates the configuration and reads every keys file.
pub fn check(args: &CheckArgs) -> Result<CheckReport> {
    let config = ccalloc_io::load_config(&args.config)?;
    let declarations = read_declarations(&args.keys, &config)?;
    let selectors = declarations
        .iter()
        .map(|d| usize::from(d.provider_tag_selector.is_some()) + usize::from(d.cloud_tag_selector.is_some()))
        .sum();

    Ok(CheckReport {
        config: args.config.clone(),
        dimensions: config.general.dimensions.clone(),
        keys_files: args.keys.len(),
        declarations: declarations.len(),
        selectors,
    })
}
