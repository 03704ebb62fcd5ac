//! Ledger assembly.
//!
//! Turns pass outcomes into the allocated cost ledger: one allocation item
//! per remaining edge, product items, residuals, per-instance summaries and
//! totals.

use ccalloc_core::{AllocatedCosts, AllocationCostItem, CostAmounts, InstanceSummary, LedgerTotals};
use tracing::debug;

use crate::allocator::AllocationPasses;
use crate::graph::AllocationGraph;
use crate::products::{ProductTracker, SettledResiduals};
use crate::store::CostItemStore;

/// Inputs of ledger assembly besides the store.
pub struct LedgerParts<'a> {
    /// The graph after cycle breaking.
    pub graph: &'a AllocationGraph,
    /// Processing order.
    pub order: &'a [usize],
    /// Pass outcomes.
    pub passes: &'a AllocationPasses,
    /// Product-view flows.
    pub tracker: &'a ProductTracker,
    /// Reporting date.
    pub date: String,
    /// Reporting currency.
    pub currency: String,
    /// Default product receiving residuals.
    pub default_product: Option<&'a str>,
    /// Number of edges removed to break cycles.
    pub cycle_breaks: usize,
}

/// Assembles the ledger, appending allocation items to the store.
pub fn build_ledger(mut store: CostItemStore, parts: LedgerParts<'_>) -> AllocatedCosts {
    let LedgerParts {
        graph,
        order,
        passes,
        tracker,
        date,
        currency,
        default_product,
        cycle_breaks,
    } = parts;

    for (e, edge) in graph.edges().iter().enumerate() {
        if edge.removed {
            continue;
        }
        let declaration = graph.declaration(e);
        store.append_allocation_item(AllocationCostItem {
            date: declaration.date.clone(),
            provider: declaration.provider.clone(),
            consumer: declaration.consumer.clone(),
            provider_tag_selector: declaration.provider_tag_selector_text().to_string(),
            allocation_type: declaration.allocation_type,
            origin: declaration.origin,
            key: passes.weights[e],
            cloud_tag_selector: declaration
                .cloud_tag_selector
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            product: declaration.product.clone(),
            cost: CostAmounts::new(
                passes.amortized_service.share(e),
                passes.on_demand_service.share(e),
            ),
            product_cost: CostAmounts::new(
                passes.amortized_product.share(e),
                passes.on_demand_product.share(e),
            ),
            tags: declaration.tags.clone(),
            dimensions: declaration.dimensions.clone(),
            provider_meters: declaration.provider_meters.clone(),
            product_dimensions: declaration.product_dimensions.clone(),
            product_meters: declaration.product_meters.clone(),
            currency: declaration.currency.clone(),
            is_final_consumption: edge.is_self_consumption() || edge.product.is_some(),
        });
    }

    let mut product_items = ProductTracker::declared_items(
        graph,
        &passes.amortized_product,
        &passes.on_demand_product,
    );
    let SettledResiduals {
        product_items: residual_items,
        service_residuals,
    } = tracker.settle_residuals(graph, default_product, &date, &currency);
    product_items.extend(residual_items);

    let instances = order
        .iter()
        .map(|&node| {
            let id = graph.instance(node);
            let totals = store.totals(id);
            let flows = tracker.flows(node);
            InstanceSummary {
                instance: id.clone(),
                cloud: totals.cloud,
                incoming: totals.incoming,
                total: totals.total(),
                to_products: flows.to_products,
                to_services: flows.to_services,
                residual: flows.residual(),
            }
        })
        .collect();

    let totals = LedgerTotals {
        cloud: store.grand_cloud_total(),
        products: product_items.iter().map(|item| item.cost).sum(),
        service_residuals: service_residuals.iter().map(|r| r.cost).sum(),
        unresolved_items: store.unresolved_count(),
        cycle_breaks,
    };
    debug!(
        cloud = totals.cloud.amortized,
        products = totals.products.amortized,
        residuals = totals.service_residuals.amortized,
        "Ledger totals (amortized)"
    );

    let (cloud_items, allocation_items) = store.into_items();
    AllocatedCosts {
        date,
        currency,
        cloud_items,
        allocation_items,
        product_items,
        residuals: service_residuals,
        instances,
        totals,
    }
}
