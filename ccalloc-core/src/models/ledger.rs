//! Output of an allocation run.
//!
//! These types are produced by the engine and consumed by writers and the
//! CLI. They are plain data: nothing here recomputes allocations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::cost::{CloudCostItem, CostAmounts};
use super::declaration::{AllocationType, DeclarationOrigin, Meter, ProductDimension};
use super::identity::{InstanceId, ProductKey};
use super::tags::TagSet;

// ============================================================================
// Allocation Cost Item
// ============================================================================

/// The result of propagating one declaration along its edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationCostItem {
    /// Formatted date.
    pub date: String,
    /// Instance whose cost is allocated.
    pub provider: InstanceId,
    /// Instance receiving the cost.
    pub consumer: InstanceId,
    /// Provider tag selector text, empty for the default selector.
    pub provider_tag_selector: String,
    /// Allocation type of the originating declaration.
    pub allocation_type: AllocationType,
    /// Origin of the declaration.
    pub origin: DeclarationOrigin,
    /// Resolved key (the consumer cost for `Cost` declarations).
    pub key: f64,
    /// Cloud tag selector text, empty when absent.
    pub cloud_tag_selector: String,
    /// Product the cost is consumed on behalf of.
    pub product: Option<String>,
    /// Service-level cost.
    pub cost: CostAmounts,
    /// Product-view cost: lands on the product when one is named.
    pub product_cost: CostAmounts,
    /// Consumer tags.
    pub tags: TagSet,
    /// Consumer dimension values.
    pub dimensions: IndexMap<String, String>,
    /// Provider meters.
    pub provider_meters: Vec<Meter>,
    /// Product dimensions.
    pub product_dimensions: Vec<ProductDimension>,
    /// Product meters.
    pub product_meters: Vec<Meter>,
    /// Currency.
    pub currency: String,
    /// True for self consumption and for edges naming a product.
    pub is_final_consumption: bool,
}

impl AllocationCostItem {
    /// Returns the label of the allocation type as written to reports.
    pub fn type_label(&self) -> &'static str {
        self.origin.report_label(self.allocation_type)
    }
}

// ============================================================================
// Product Cost Item
// ============================================================================

/// How a product cost item came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCostKind {
    /// Allocated by a declaration naming the product.
    Declared,
    /// Residual of an instance, sent to the default product.
    Residual,
}

impl std::fmt::Display for ProductCostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductCostKind::Declared => write!(f, "Declared"),
            ProductCostKind::Residual => write!(f, "Residual"),
        }
    }
}

/// Cost landing on a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCostItem {
    /// Formatted date.
    pub date: String,
    /// Product and meter.
    pub product: ProductKey,
    /// Consumer instance of the declaration, or the residual's instance.
    pub instance: InstanceId,
    /// Provider of the declaration (same as `instance` for residuals).
    pub provider: InstanceId,
    /// Cost amounts.
    pub cost: CostAmounts,
    /// Currency.
    pub currency: String,
    /// Dimension values.
    pub dimensions: IndexMap<String, String>,
    /// Product dimensions.
    pub product_dimensions: Vec<ProductDimension>,
    /// Product meters.
    pub product_meters: Vec<Meter>,
    /// Declared or residual.
    pub kind: ProductCostKind,
}

/// Cost kept at service level by an instance that forwards nothing further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResidual {
    /// Instance keeping the cost.
    pub instance: InstanceId,
    /// Residual amounts.
    pub cost: CostAmounts,
}

// ============================================================================
// Summaries
// ============================================================================

/// Per-instance cost summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// The instance.
    pub instance: InstanceId,
    /// Cost of the instance's own cloud items.
    pub cloud: CostAmounts,
    /// Service-level cost received from providers.
    pub incoming: CostAmounts,
    /// Service-level total (cloud + incoming).
    pub total: CostAmounts,
    /// Product-view cost sent to products.
    pub to_products: CostAmounts,
    /// Product-view cost sent to consumer instances.
    pub to_services: CostAmounts,
    /// Product-view cost left over.
    pub residual: CostAmounts,
}

/// Totals of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of all cloud costs.
    pub cloud: CostAmounts,
    /// Sum of all product costs (declared and residual).
    pub products: CostAmounts,
    /// Sum of residuals kept at service level.
    pub service_residuals: CostAmounts,
    /// Number of cloud items without a resolvable service.
    pub unresolved_items: usize,
    /// Number of edges removed to break cycles.
    pub cycle_breaks: usize,
}

// ============================================================================
// Allocated Costs
// ============================================================================

/// The fully allocated cost ledger of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocatedCosts {
    /// Formatted reporting date.
    pub date: String,
    /// Reporting currency.
    pub currency: String,
    /// Cloud items, in insertion order.
    pub cloud_items: Vec<CloudCostItem>,
    /// Allocation items, in declaration order.
    pub allocation_items: Vec<AllocationCostItem>,
    /// Product items, declared first then residuals.
    pub product_items: Vec<ProductCostItem>,
    /// Residuals kept at service level.
    pub residuals: Vec<ServiceResidual>,
    /// Per-instance summaries, in processing order.
    pub instances: Vec<InstanceSummary>,
    /// Totals.
    pub totals: LedgerTotals,
}

impl AllocatedCosts {
    /// Returns the total cost per product, in first-seen order.
    pub fn product_totals(&self) -> IndexMap<ProductKey, CostAmounts> {
        let mut totals: IndexMap<ProductKey, CostAmounts> = IndexMap::new();
        for item in &self.product_items {
            *totals.entry(item.product.clone()).or_default() += item.cost;
        }
        totals
    }

    /// Returns the summary of an instance.
    pub fn instance(&self, id: &InstanceId) -> Option<&InstanceSummary> {
        self.instances
            .iter()
            .find(|s| &s.instance == id)
    }

    /// Returns the cost received by `consumer` from `provider` (service level).
    pub fn allocated_between(&self, provider: &InstanceId, consumer: &InstanceId) -> CostAmounts {
        self.allocation_items
            .iter()
            .filter(|item| &item.provider == provider && &item.consumer == consumer)
            .map(|item| item.cost)
            .sum()
    }

    /// Returns true if cloud costs equal product costs plus service residuals.
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        let outputs = self.totals.products + self.totals.service_residuals;
        (self.totals.cloud - outputs).is_negligible(tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_item(product: &str, amortized: f64) -> ProductCostItem {
        ProductCostItem {
            date: "2024-01-31".to_string(),
            product: ProductKey::new(product, None),
            instance: InstanceId::service_default("a"),
            provider: InstanceId::service_default("a"),
            cost: CostAmounts::new(amortized, amortized),
            currency: "EUR".to_string(),
            dimensions: IndexMap::new(),
            product_dimensions: Vec::new(),
            product_meters: Vec::new(),
            kind: ProductCostKind::Declared,
        }
    }

    #[test]
    fn test_product_totals_group_by_product() {
        let ledger = AllocatedCosts {
            product_items: vec![
                product_item("x", 10.0),
                product_item("y", 5.0),
                product_item("x", 2.5),
            ],
            ..Default::default()
        };
        let totals = ledger.product_totals();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&ProductKey::new("x", None)], CostAmounts::new(12.5, 12.5));
        assert_eq!(totals.get_index(1).map(|(k, _)| k.product.as_str()), Some("y"));
    }

    #[test]
    fn test_is_balanced() {
        let mut ledger = AllocatedCosts::default();
        ledger.totals.cloud = CostAmounts::new(100.0, 120.0);
        ledger.totals.products = CostAmounts::new(90.0, 100.0);
        ledger.totals.service_residuals = CostAmounts::new(10.0, 20.0);
        assert!(ledger.is_balanced(1e-9));

        ledger.totals.service_residuals = CostAmounts::ZERO;
        assert!(!ledger.is_balanced(1e-9));
    }
}
