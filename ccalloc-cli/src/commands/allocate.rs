//! Allocate command - allocate cloud costs and write the reports.

use anyhow::{Context, Result};
use ccalloc_core::{AllocatedCostWriter, AllocatedCosts, AllocationConfig};
use ccalloc_io::{AllocatedCostCsvWriter, ProductCostCsvWriter};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

use super::inputs::InputArgs;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Tolerance of the balance check reported after allocation.
pub(crate) const BALANCE_TOLERANCE: f64 = 1e-6;

/// Arguments for the allocate command.
#[derive(Args, Debug)]
pub struct AllocateArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Allocated cost CSV to write.
    #[arg(long, short)]
    pub output: PathBuf,

    /// Product cost CSV to write.
    #[arg(long)]
    pub products: Option<PathBuf>,
}

/// Runs the allocate command.
pub fn run(args: &AllocateArgs, cli: &Cli) -> Result<()> {
    info!(output = %args.output.display(), "Running allocation");

    let (config, ledger) = args.inputs.allocate()?;
    write_reports(&ledger, &config, &args.output, args.products.as_deref())?;

    if cli.quiet {
        return Ok(());
    }
    let balanced = ledger.is_balanced(BALANCE_TOLERANCE);
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!(
                "{}",
                formatter.format_allocation(&ledger, &args.output, args.products.as_deref(), balanced)
            );
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!(
                "{}",
                formatter.format_allocation(&ledger, &args.output, args.products.as_deref(), balanced)?
            );
        }
    }
    Ok(())
}

/// Writes the allocated cost report and, optionally, the product cost report.
pub fn write_reports(
    ledger: &AllocatedCosts,
    config: &AllocationConfig,
    output: &Path,
    products: Option<&Path>,
) -> Result<()> {
    let mut writer = AllocatedCostCsvWriter::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer
        .write_allocated_costs(ledger, config)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if let Some(path) = products {
        let mut writer = ProductCostCsvWriter::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer
            .write_allocated_costs(ledger, config)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::inputs::CostSource;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[general]
default_product = "platform"

[tag_keys]
service = ["service"]
"#;

    const COSTS: &str = "\
Date,Tags,AmortizedCost,OnDemandCost,Currency
2024-01-31,service:db,100,120,EUR
2024-01-31,service:web,20,20,EUR
";

    const KEYS: &str = "\
Date,ProviderService,ProviderCostAllocationKey,ConsumerService,Product
2024-01-31,db,3,web,
2024-01-31,db,1,api,
2024-01-31,web,1,,shop
";

    #[test]
    fn test_allocate_writes_reports() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("ccalloc.toml");
        let costs_path = dir.path().join("costs.csv");
        let keys_path = dir.path().join("keys.csv");
        fs::write(&config_path, CONFIG).unwrap();
        fs::write(&costs_path, COSTS).unwrap();
        fs::write(&keys_path, KEYS).unwrap();

        let inputs = InputArgs {
            config: config_path,
            cost: vec![format!("generic:{}", costs_path.display()).parse::<CostSource>().unwrap()],
            keys: vec![keys_path],
        };
        let (config, ledger) = inputs.allocate().unwrap();
        assert!(ledger.is_balanced(BALANCE_TOLERANCE));

        let output = dir.path().join("allocated.csv");
        let products = dir.path().join("products.csv");
        write_reports(&ledger, &config, &output, Some(&products)).unwrap();

        let allocated = fs::read_to_string(&output).unwrap();
        // header, two cloud items, three allocation items
        assert_eq!(allocated.lines().count(), 6);

        let products = fs::read_to_string(&products).unwrap();
        let kinds: Vec<&str> = products
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(10).unwrap_or_default())
            .collect();
        assert_eq!(kinds, vec!["Declared", "Residual"]);
    }
}
