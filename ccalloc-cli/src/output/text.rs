//! Text output formatting with colors.

use ccalloc_core::{AllocatedCosts, CostAmounts};
use std::path::Path;

use crate::commands::check::CheckReport;
use crate::commands::summary::LedgerSummary;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    name_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            name_width: 24,
        }
    }

    /// Formats the outcome of the allocate command.
    pub fn format_allocation(
        &self,
        ledger: &AllocatedCosts,
        output: &Path,
        products: Option<&Path>,
        balanced: bool,
    ) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {} {}",
            self.bold("Allocation"),
            ledger.date,
            self.dim(&ledger.currency)
        ));
        lines.push("─".repeat(50));
        lines.push(format!("Cloud items:      {}", ledger.cloud_items.len()));
        lines.push(format!("Allocation items: {}", ledger.allocation_items.len()));
        lines.push(format!("Product items:    {}", ledger.product_items.len()));
        if ledger.totals.cycle_breaks > 0 {
            lines.push(format!(
                "Cycle breaks:     {}",
                self.yellow(&ledger.totals.cycle_breaks.to_string())
            ));
        }
        if ledger.totals.unresolved_items > 0 {
            lines.push(format!(
                "Unresolved items: {}",
                self.yellow(&ledger.totals.unresolved_items.to_string())
            ));
        }
        lines.push(format!("Balanced:         {}", self.status(balanced)));
        lines.push(String::new());
        lines.push(format!("Wrote {}", output.display()));
        if let Some(path) = products {
            lines.push(format!("Wrote {}", path.display()));
        }

        lines.join("\n")
    }

    /// Formats per-product and per-service totals.
    pub fn format_summary(&self, summary: &LedgerSummary) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {} {}",
            self.bold("Cost Allocation Summary"),
            summary.date,
            self.dim(&summary.currency)
        ));
        lines.push("─".repeat(60));
        lines.push(self.header_line("Product"));
        for (product, cost) in &summary.products {
            lines.push(self.amount_line(&product.to_string(), *cost));
        }
        if !summary.service_residuals.is_negligible(1e-9) {
            lines.push(self.yellow(
                &self.amount_line("(not allocated to products)", summary.service_residuals),
            ));
        }

        lines.push(String::new());
        lines.push(self.header_line("Service"));
        for (service, totals) in &summary.services {
            lines.push(self.amount_line(service, totals.total));
        }

        lines.push(String::new());
        lines.push(self.amount_line("Cloud total", summary.cloud));
        if summary.cycle_breaks > 0 {
            lines.push(format!("Cycle breaks:     {}", summary.cycle_breaks));
        }
        if summary.unresolved_items > 0 {
            lines.push(format!("Unresolved items: {}", summary.unresolved_items));
        }
        lines.push(format!("Balanced:         {}", self.status(summary.balanced)));

        lines.join("\n")
    }

    /// Formats the outcome of the check command.
    pub fn format_check(&self, report: &CheckReport) -> String {
        let mut lines = vec![format!(
            "{} Configuration {} is valid",
            self.green("✓"),
            report.config.display()
        )];
        if !report.dimensions.is_empty() {
            lines.push(format!("  Dimensions: {}", report.dimensions.join(", ")));
        }
        if report.keys_files > 0 {
            lines.push(format!(
                "{} {} declarations in {} keys files, {} selectors parsed",
                self.green("✓"),
                report.declarations,
                report.keys_files,
                report.selectors
            ));
        }
        lines.join("\n")
    }

    // ========================================================================
    // Layout helpers
    // ========================================================================

    fn header_line(&self, label: &str) -> String {
        format!(
            "{:<width$} {:>14} {:>14}",
            label,
            "Amortized",
            "On-demand",
            width = self.name_width
        )
    }

    pub(crate) fn amount_line(&self, label: &str, cost: CostAmounts) -> String {
        format!(
            "{:<width$} {:>14} {:>14}",
            label,
            format_amount(cost.amortized),
            format_amount(cost.on_demand),
            width = self.name_width
        )
    }

    fn status(&self, ok: bool) -> String {
        if ok {
            self.green("yes")
        } else {
            self.red("no")
        }
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }
}

/// Formats an amount with two decimals and thousands separators.
pub(crate) fn format_amount(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (integer, decimals) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{decimals}")
}
