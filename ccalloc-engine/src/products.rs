//! Product tracker.
//!
//! Follows the product view of an allocation: how much cost each instance
//! received, how much it forwarded to products and to consumer instances,
//! and what is left over. Left-over cost goes to the default product when
//! one is configured and stays at service level otherwise.

use ccalloc_core::{
    CostAmounts, InstanceId, ProductCostItem, ProductCostKind, ProductKey, ServiceResidual,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::allocator::PassOutcome;
use crate::graph::AllocationGraph;

/// Residuals at or below this amount are ignored.
pub const RESIDUAL_TOLERANCE: f64 = 1e-9;

/// Product-view cost flows of one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceFlows {
    /// Cloud cost plus shares received from providers.
    pub received: CostAmounts,
    /// Cost forwarded to products.
    pub to_products: CostAmounts,
    /// Cost forwarded to other instances.
    pub to_services: CostAmounts,
}

impl InstanceFlows {
    /// Returns received minus forwarded cost.
    pub fn residual(&self) -> CostAmounts {
        self.received - self.to_products - self.to_services
    }
}

/// Where residuals end up.
#[derive(Debug, Default)]
pub struct SettledResiduals {
    /// Residuals sent to the default product.
    pub product_items: Vec<ProductCostItem>,
    /// Residuals kept at service level.
    pub service_residuals: Vec<ServiceResidual>,
}

/// Tracks product-view flows per instance node.
#[derive(Debug)]
pub struct ProductTracker {
    flows: Vec<InstanceFlows>,
}

impl ProductTracker {
    /// Builds the tracker from the two product-view passes.
    pub fn from_passes(
        graph: &AllocationGraph,
        amortized: &PassOutcome,
        on_demand: &PassOutcome,
    ) -> Self {
        let mut flows: Vec<InstanceFlows> = (0..graph.instance_count())
            .map(|node| InstanceFlows {
                received: CostAmounts::new(
                    amortized.instance_cost(node),
                    on_demand.instance_cost(node),
                ),
                ..Default::default()
            })
            .collect();

        for (e, edge) in graph.edges().iter().enumerate() {
            if edge.removed {
                continue;
            }
            let share = CostAmounts::new(amortized.share(e), on_demand.share(e));
            let provider = &mut flows[edge.provider];
            if edge.product.is_some() {
                provider.to_products += share;
            } else if !edge.is_self_consumption() {
                provider.to_services += share;
            }
        }

        Self { flows }
    }

    /// Returns the flows of an instance node.
    pub fn flows(&self, node: usize) -> &InstanceFlows {
        &self.flows[node]
    }

    /// Builds one product cost item per non-removed edge naming a product.
    pub fn declared_items(
        graph: &AllocationGraph,
        amortized: &PassOutcome,
        on_demand: &PassOutcome,
    ) -> Vec<ProductCostItem> {
        graph
            .edges()
            .iter()
            .enumerate()
            .filter(|(_, edge)| !edge.removed)
            .filter_map(|(e, edge)| {
                let product = graph.product(edge.product?).clone();
                let declaration = graph.declaration(e);
                Some(ProductCostItem {
                    date: declaration.date.clone(),
                    product,
                    instance: declaration.consumer.clone(),
                    provider: declaration.provider.clone(),
                    cost: CostAmounts::new(amortized.share(e), on_demand.share(e)),
                    currency: declaration.currency.clone(),
                    dimensions: declaration.dimensions.clone(),
                    product_dimensions: declaration.product_dimensions.clone(),
                    product_meters: declaration.product_meters.clone(),
                    kind: ProductCostKind::Declared,
                })
            })
            .collect()
    }

    /// Settles residuals above [`RESIDUAL_TOLERANCE`].
    ///
    /// With a default product, each residual becomes a `Residual` product
    /// item; without one, it is kept at service level.
    pub fn settle_residuals(
        &self,
        graph: &AllocationGraph,
        default_product: Option<&str>,
        date: &str,
        currency: &str,
    ) -> SettledResiduals {
        let mut settled = SettledResiduals::default();
        for (node, flows) in self.flows.iter().enumerate() {
            let residual = flows.residual();
            if residual.is_negligible(RESIDUAL_TOLERANCE) {
                continue;
            }
            let instance: &InstanceId = graph.instance(node);
            match default_product {
                Some(product) => {
                    debug!(%instance, product, "Residual cost sent to default product");
                    settled.product_items.push(ProductCostItem {
                        date: date.to_string(),
                        product: ProductKey::new(product, None),
                        instance: instance.clone(),
                        provider: instance.clone(),
                        cost: residual,
                        currency: currency.to_string(),
                        dimensions: IndexMap::new(),
                        product_dimensions: Vec::new(),
                        product_meters: Vec::new(),
                        kind: ProductCostKind::Residual,
                    });
                }
                None => settled.service_residuals.push(ServiceResidual {
                    instance: instance.clone(),
                    cost: residual,
                }),
            }
        }

        if !settled.service_residuals.is_empty() {
            warn!(
                instances = settled.service_residuals.len(),
                "Cost not allocated to any product; configure a default product to collect it"
            );
        }
        settled
    }
}
