//! JSON output formatting.

use anyhow::Result;
use ccalloc_core::{AllocatedCosts, CostAmounts};
use serde::Serialize;
use std::path::Path;

use crate::commands::check::CheckReport;
use crate::commands::summary::LedgerSummary;

// ============================================================================
// Output Types
// ============================================================================

/// Amortized and on-demand amounts.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AmountsOutput {
    pub amortized: f64,
    pub on_demand: f64,
}

impl From<CostAmounts> for AmountsOutput {
    fn from(cost: CostAmounts) -> Self {
        Self {
            amortized: cost.amortized,
            on_demand: cost.on_demand,
        }
    }
}

/// Outcome of the allocate command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutput {
    pub date: String,
    pub currency: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<String>,
    pub cloud_items: usize,
    pub allocation_items: usize,
    pub product_items: usize,
    pub cycle_breaks: usize,
    pub unresolved_items: usize,
    pub balanced: bool,
}

/// A product total.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductOutput {
    pub product: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub meter: String,
    pub cost: AmountsOutput,
}

/// A service total.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOutput {
    pub service: String,
    pub instances: usize,
    pub cloud: AmountsOutput,
    pub incoming: AmountsOutput,
    pub total: AmountsOutput,
}

/// Summary output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutput {
    pub date: String,
    pub currency: String,
    pub cloud: AmountsOutput,
    pub products: Vec<ProductOutput>,
    pub services: Vec<ServiceOutput>,
    pub service_residuals: AmountsOutput,
    pub unresolved_items: usize,
    pub cycle_breaks: usize,
    pub balanced: bool,
}

/// Check output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutput {
    pub config: String,
    pub valid: bool,
    pub dimensions: Vec<String>,
    pub keys_files: usize,
    pub declarations: usize,
    pub selectors: usize,
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats the outcome of the allocate command.
    pub fn format_allocation(
        &self,
        ledger: &AllocatedCosts,
        output: &Path,
        products: Option<&Path>,
        balanced: bool,
    ) -> Result<String> {
        self.format(&AllocationOutput {
            date: ledger.date.clone(),
            currency: ledger.currency.clone(),
            output: output.display().to_string(),
            products: products.map(|p| p.display().to_string()),
            cloud_items: ledger.cloud_items.len(),
            allocation_items: ledger.allocation_items.len(),
            product_items: ledger.product_items.len(),
            cycle_breaks: ledger.totals.cycle_breaks,
            unresolved_items: ledger.totals.unresolved_items,
            balanced,
        })
    }

    /// Converts a summary to output.
    pub(crate) fn summary_to_output(summary: &LedgerSummary) -> SummaryOutput {
        SummaryOutput {
            date: summary.date.clone(),
            currency: summary.currency.clone(),
            cloud: summary.cloud.into(),
            products: summary
                .products
                .iter()
                .map(|(key, cost)| ProductOutput {
                    product: key.product.clone(),
                    meter: key.meter.clone(),
                    cost: (*cost).into(),
                })
                .collect(),
            services: summary
                .services
                .iter()
                .map(|(service, totals)| ServiceOutput {
                    service: service.clone(),
                    instances: totals.instances,
                    cloud: totals.cloud.into(),
                    incoming: totals.incoming.into(),
                    total: totals.total.into(),
                })
                .collect(),
            service_residuals: summary.service_residuals.into(),
            unresolved_items: summary.unresolved_items,
            cycle_breaks: summary.cycle_breaks,
            balanced: summary.balanced,
        }
    }

    /// Formats a summary.
    pub fn format_summary(&self, summary: &LedgerSummary) -> Result<String> {
        self.format(&Self::summary_to_output(summary))
    }

    /// Formats the outcome of the check command.
    pub fn format_check(&self, report: &CheckReport) -> Result<String> {
        self.format(&CheckOutput {
            config: report.config.display().to_string(),
            valid: true,
            dimensions: report.dimensions.clone(),
            keys_files: report.keys_files,
            declarations: report.declarations,
            selectors: report.selectors,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_amounts_span_lines() {
        let formatter = JsonFormatter::new(true);
        let amounts = AmountsOutput::from(CostAmounts::new(3.0, 4.0));
        let output = formatter.format(&amounts).unwrap();
        assert_eq!(output.lines().count(), 4);
    }

    #[test]
    fn test_compact_amounts_on_one_line() {
        let formatter = JsonFormatter::new(false);
        let amounts = AmountsOutput::from(CostAmounts::new(3.0, 4.0));
        let output = formatter.format(&amounts).unwrap();
        assert_eq!(output, r#"{"amortized":3.0,"onDemand":4.0}"#);
    }

    #[test]
    fn test_amounts_output() {
        let output = AmountsOutput::from(CostAmounts::new(1.5, 2.0));
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            serde_json::json!({"amortized": 1.5, "onDemand": 2.0})
        );
    }
}
