//! Summary command - per-product and per-service totals of an allocation.

use anyhow::Result;
use ccalloc_core::{AllocatedCosts, CostAmounts, ProductKey};
use indexmap::IndexMap;
use tracing::info;

use super::allocate::BALANCE_TOLERANCE;
use super::inputs::InputArgs;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Service-level totals of one service, over all its instances.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServiceTotals {
    pub instances: usize,
    pub cloud: CostAmounts,
    pub incoming: CostAmounts,
    pub total: CostAmounts,
}

/// Totals shown by the summary command.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    pub date: String,
    pub currency: String,
    pub cloud: CostAmounts,
    pub products: IndexMap<ProductKey, CostAmounts>,
    pub services: IndexMap<String, ServiceTotals>,
    pub service_residuals: CostAmounts,
    pub unresolved_items: usize,
    pub cycle_breaks: usize,
    pub balanced: bool,
}

impl LedgerSummary {
    /// Summarizes a ledger; products and services are sorted by name.
    pub fn from_ledger(ledger: &AllocatedCosts, tolerance: f64) -> Self {
        let mut products = ledger.product_totals();
        products.sort_keys();

        let mut services: IndexMap<String, ServiceTotals> = IndexMap::new();
        for summary in &ledger.instances {
            let totals = services.entry(summary.instance.service.clone()).or_default();
            totals.instances += 1;
            totals.cloud += summary.cloud;
            totals.incoming += summary.incoming;
            totals.total += summary.total;
        }
        services.sort_keys();

        Self {
            date: ledger.date.clone(),
            currency: ledger.currency.clone(),
            cloud: ledger.totals.cloud,
            products,
            services,
            service_residuals: ledger.totals.service_residuals,
            unresolved_items: ledger.totals.unresolved_items,
            cycle_breaks: ledger.totals.cycle_breaks,
            balanced: ledger.is_balanced(tolerance),
        }
    }
}

/// Runs the summary command.
pub fn run(args: &InputArgs, cli: &Cli) -> Result<()> {
    info!("Running summary");

    let (_, ledger) = args.allocate()?;
    let summary = LedgerSummary::from_ledger(&ledger, BALANCE_TOLERANCE);

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_summary(&summary));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_summary(&summary)?);
        }
    }
    Ok(())
}
