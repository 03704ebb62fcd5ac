//! Input arguments shared by the allocate and summary commands.

use anyhow::{Context, Result};
use ccalloc_core::{
    AllocatedCosts, AllocationConfig, AllocationDeclaration, CloudCostReader, CloudCostRecord,
    DeclarationReader,
};
use ccalloc_engine::{AllocationError, CostAllocator};
use ccalloc_io::{load_config, AzureEaReader, CostCsvReader, FocusReader, KeysCsvReader};
use clap::Args;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Kind of a cloud cost export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    /// Generic CSV (`Date, Tags, AmortizedCost, OnDemandCost, Currency`).
    Generic,
    /// FOCUS CSV.
    Focus,
    /// Azure Enterprise Agreement amortized cost CSV.
    AzureEa,
}

/// A cloud cost file with its kind, written `KIND:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostSource {
    pub kind: CostKind,
    pub path: PathBuf,
}

impl FromStr for CostSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KIND:path, got '{s}'"))?;
        let kind = match kind.to_lowercase().as_str() {
            "generic" => CostKind::Generic,
            "focus" => CostKind::Focus,
            "azure-ea" => CostKind::AzureEa,
            other => {
                return Err(format!(
                    "unknown cost file kind '{other}' (expected generic, focus or azure-ea)"
                ));
            }
        };
        if path.is_empty() {
            return Err("empty cost file path".to_string());
        }
        Ok(Self {
            kind,
            path: PathBuf::from(path),
        })
    }
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            CostKind::Generic => "generic",
            CostKind::Focus => "focus",
            CostKind::AzureEa => "azure-ea",
        };
        write!(f, "{kind}:{}", self.path.display())
    }
}

/// Configuration, cloud cost, and allocation key inputs.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long, short)]
    pub config: PathBuf,

    /// Cloud cost file as KIND:path, where KIND is generic, focus or azure-ea.
    #[arg(long, required = true)]
    pub cost: Vec<CostSource>,

    /// Cost allocation keys file.
    #[arg(long, short)]
    pub keys: Vec<PathBuf>,
}

impl InputArgs {
    /// Loads the configuration.
    pub fn load_config(&self) -> Result<AllocationConfig> {
        load_config(&self.config)
            .with_context(|| format!("Failed to load configuration {}", self.config.display()))
    }

    /// Reads every cloud cost file.
    pub fn read_cloud_costs(&self, config: &AllocationConfig) -> Result<Vec<CloudCostRecord>> {
        let mut records = Vec::new();
        for source in &self.cost {
            let read = match source.kind {
                CostKind::Generic => CostCsvReader::from_path(&source.path)
                    .and_then(|mut reader| reader.read_cloud_costs(config)),
                CostKind::Focus => FocusReader::from_path(&source.path)
                    .and_then(|mut reader| reader.read_cloud_costs(config)),
                CostKind::AzureEa => AzureEaReader::from_path(&source.path)
                    .and_then(|mut reader| reader.read_cloud_costs(config)),
            };
            records.extend(read.with_context(|| format!("Failed to read cloud costs {source}"))?);
        }
        Ok(records)
    }

    /// Reads every allocation keys file.
    pub fn read_declarations(&self, config: &AllocationConfig) -> Result<Vec<AllocationDeclaration>> {
        read_declarations(&self.keys, config)
    }

    /// Loads every input and runs the allocation.
    pub fn allocate(&self) -> Result<(AllocationConfig, AllocatedCosts)> {
        let config = self.load_config()?;
        let records = self.read_cloud_costs(&config)?;
        let declarations = self.read_declarations(&config)?;
        info!(
            records = records.len(),
            declarations = declarations.len(),
            "Inputs loaded"
        );

        let ledger = CostAllocator::new(&config)
            .allocate(records, declarations)
            .map_err(|err| {
                let message = failure_context(&err);
                anyhow::Error::new(err).context(message)
            })?;
        Ok((config, ledger))
    }
}

fn failure_context(err: &AllocationError) -> &'static str {
    if err.is_cycle_error() {
        "Cost allocation cycles could not be broken, review cycles.service_precedence"
    } else {
        "Cost allocation failed"
    }
}

/// Reads allocation keys files in order.
pub fn read_declarations(
    paths: &[PathBuf],
    config: &AllocationConfig,
) -> Result<Vec<AllocationDeclaration>> {
    let mut declarations = Vec::new();
    for path in paths {
        let read = KeysCsvReader::from_path(path).and_then(|mut reader| reader.read_declarations(config));
        declarations
            .extend(read.with_context(|| format!("Failed to read allocation keys {}", path.display()))?);
    }
    Ok(declarations)
}
