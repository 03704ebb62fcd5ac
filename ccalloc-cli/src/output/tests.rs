//! CLI output formatting tests.
//!
//! These tests verify that CLI output is correctly formatted for both
//! text and JSON output modes.

#[cfg(test)]
mod text_formatter_tests {
    use super::super::text::{format_amount, TextFormatter};
    use crate::commands::check::CheckReport;
    use crate::commands::summary::{LedgerSummary, ServiceTotals};
    use ccalloc_core::{AllocatedCosts, CostAmounts, ProductKey};
    use indexmap::IndexMap;
    use std::path::{Path, PathBuf};

    fn summary() -> LedgerSummary {
        let mut products = IndexMap::new();
        products.insert(ProductKey::new("shop", None), CostAmounts::new(1234.5, 1500.0));
        let mut services = IndexMap::new();
        services.insert(
            "db".to_string(),
            ServiceTotals {
                instances: 1,
                cloud: CostAmounts::new(1234.5, 1500.0),
                incoming: CostAmounts::ZERO,
                total: CostAmounts::new(1234.5, 1500.0),
            },
        );
        LedgerSummary {
            date: "2024-01-31".to_string(),
            currency: "EUR".to_string(),
            cloud: CostAmounts::new(1234.5, 1500.0),
            products,
            services,
            service_residuals: CostAmounts::ZERO,
            unresolved_items: 0,
            cycle_breaks: 1,
            balanced: true,
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(999.999), "1,000.00");
        assert_eq!(format_amount(1_234_567.891), "1,234,567.89");
        assert_eq!(format_amount(-42.5), "-42.50");
        assert_eq!(format_amount(-0.001), "0.00");
    }

    #[test]
    fn test_format_summary_without_colors() {
        let formatter = TextFormatter::new(false);
        let output = formatter.format_summary(&summary());
        assert!(output.contains("Cost Allocation Summary 2024-01-31 EUR"));
        assert!(output.contains("shop"));
        assert!(output.contains("1,234.50"));
        assert!(output.contains("Cycle breaks:     1"));
        assert!(output.contains("Balanced:         yes"));
        assert!(!output.contains("not allocated to products"));
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn test_format_summary_with_colors() {
        let formatter = TextFormatter::new(true);
        let output = formatter.format_summary(&summary());
        assert!(output.contains("\x1b[1m"));
        assert!(output.contains("\x1b[32myes\x1b[0m"));
    }

    #[test]
    fn test_format_summary_residuals() {
        let formatter = TextFormatter::new(false);
        let mut summary = summary();
        summary.service_residuals = CostAmounts::new(10.0, 12.0);
        summary.balanced = false;
        let output = formatter.format_summary(&summary);
        assert!(output.contains("(not allocated to products)"));
        assert!(output.contains("Balanced:         no"));
    }

    #[test]
    fn test_format_allocation() {
        let formatter = TextFormatter::new(false);
        let mut ledger = AllocatedCosts::default();
        ledger.date = "2024-01-31".to_string();
        ledger.totals.unresolved_items = 2;
        let output = formatter.format_allocation(
            &ledger,
            Path::new("out.csv"),
            Some(Path::new("products.csv")),
            true,
        );
        assert!(output.contains("Unresolved items: 2"));
        assert!(!output.contains("Cycle breaks"));
        assert!(output.contains("Wrote out.csv"));
        assert!(output.contains("Wrote products.csv"));
    }

    #[test]
    fn test_format_check() {
        let formatter = TextFormatter::new(false);
        let report = CheckReport {
            config: PathBuf::from("ccalloc.toml"),
            dimensions: vec!["Environment".to_string()],
            keys_files: 2,
            declarations: 7,
            selectors: 3,
        };
        let output = formatter.format_check(&report);
        assert!(output.contains("Configuration ccalloc.toml is valid"));
        assert!(output.contains("Dimensions: Environment"));
        assert!(output.contains("7 declarations in 2 keys files, 3 selectors parsed"));
    }

    #[test]
    fn test_amount_line_alignment() {
        let formatter = TextFormatter::new(false);
        let line = formatter.amount_line("db", CostAmounts::new(1.0, 2.0));
        assert_eq!(line.len(), 24 + 1 + 14 + 1 + 14);
        assert!(line.ends_with("2.00"));
    }
}

#[cfg(test)]
mod json_formatter_tests {
    use super::super::json::JsonFormatter;
    use crate::commands::summary::LedgerSummary;
    use ccalloc_core::{AllocatedCosts, CostAmounts, InstanceId, InstanceSummary};
    use std::path::Path;

    #[test]
    fn test_summary_json_shape() {
        let ledger = AllocatedCosts {
            date: "2024-01-31".to_string(),
            currency: "EUR".to_string(),
            instances: vec![InstanceSummary {
                instance: InstanceId::service_default("db"),
                cloud: CostAmounts::new(5.0, 6.0),
                incoming: CostAmounts::ZERO,
                total: CostAmounts::new(5.0, 6.0),
                to_products: CostAmounts::ZERO,
                to_services: CostAmounts::ZERO,
                residual: CostAmounts::new(5.0, 6.0),
            }],
            ..Default::default()
        };
        let summary = LedgerSummary::from_ledger(&ledger, 1e-6);
        let output = JsonFormatter::new(false).format_summary(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["date"], "2024-01-31");
        assert_eq!(value["services"][0]["service"], "db");
        assert_eq!(value["services"][0]["total"]["onDemand"], 6.0);
        assert_eq!(value["products"].as_array().map(Vec::len), Some(0));
        assert_eq!(value["balanced"], true);
    }

    #[test]
    fn test_allocation_json_omits_missing_products() {
        let output = JsonFormatter::new(false)
            .format_allocation(&AllocatedCosts::default(), Path::new("out.csv"), None, true)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["output"], "out.csv");
        assert!(value.get("products").is_none());
        assert_eq!(value["allocationItems"], 0);
    }
}
