//! Allocation passes.
//!
//! A pass visits instances in topological order and splits the cost of
//! each instance among its outgoing edges. Passes are pure: they read the
//! graph, the store and a weight vector, and return a fresh
//! [`PassOutcome`].
//!
//! Inside an instance, outgoing edges are grouped by provider tag selector.
//! Each group receives the cost of the instance's items matching its
//! selector, and each group's cost is further split into product buckets:
//! cost that entered the instance on behalf of a product is routed to the
//! edges naming that product.

use ccalloc_core::{Metric, TagSelector, TagSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::graph::{AllocationGraph, Edge, EdgeWeight};
use crate::store::CostItemStore;

// ============================================================================
// Pass Types
// ============================================================================

/// Where edge shares land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostView {
    /// Every share flows to the consumer instance.
    Service,
    /// Shares of edges naming a product land on the product; others flow
    /// to the consumer instance.
    Product,
}

/// Result of one pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// Metric propagated.
    pub metric: Metric,
    /// View used.
    pub view: CostView,
    /// Cost of every instance node (cloud plus received shares).
    pub instance_costs: Vec<f64>,
    /// Share of every edge; zero for removed and skipped edges.
    pub edge_shares: Vec<f64>,
}

impl PassOutcome {
    /// Returns the cost of an instance node.
    pub fn instance_cost(&self, node: usize) -> f64 {
        self.instance_costs[node]
    }

    /// Returns the share of an edge.
    pub fn share(&self, edge: usize) -> f64 {
        self.edge_shares[edge]
    }
}

/// Outcomes of all passes of a run.
#[derive(Debug, Clone)]
pub struct AllocationPasses {
    /// Resolved edge weights.
    pub weights: Vec<f64>,
    /// Amortized cost, service view.
    pub amortized_service: PassOutcome,
    /// On-demand cost, service view.
    pub on_demand_service: PassOutcome,
    /// Amortized cost, product view.
    pub amortized_product: PassOutcome,
    /// On-demand cost, product view.
    pub on_demand_product: PassOutcome,
}

impl AllocationPasses {
    /// Returns the outcome for a metric and view.
    pub fn outcome(&self, metric: Metric, view: CostView) -> &PassOutcome {
        match (metric, view) {
            (Metric::Amortized, CostView::Service) => &self.amortized_service,
            (Metric::OnDemand, CostView::Service) => &self.on_demand_service,
            (Metric::Amortized, CostView::Product) => &self.amortized_product,
            (Metric::OnDemand, CostView::Product) => &self.on_demand_product,
        }
    }
}

// ============================================================================
// Phases
// ============================================================================

/// Returns edge weights before the first pass: static keys, zero for pending edges.
pub fn initial_weights(graph: &AllocationGraph) -> Vec<f64> {
    graph
        .edges()
        .iter()
        .map(|edge| match edge.weight {
            EdgeWeight::Static(key) => key,
            EdgeWeight::Pending => 0.0,
        })
        .collect()
}

/// Resolves pending weights from a first pass: the consumer's cost.
pub fn resolve_cost_weights(
    graph: &AllocationGraph,
    initial: &[f64],
    first_pass: &PassOutcome,
) -> Vec<f64> {
    graph
        .edges()
        .iter()
        .zip(initial)
        .map(|(edge, &weight)| {
            if edge.is_pending() {
                first_pass.instance_cost(edge.consumer)
            } else {
                weight
            }
        })
        .collect()
}

/// Runs every phase of an allocation.
///
/// The first pass propagates amortized cost at service level while
/// ignoring `Cost` edges; its instance costs become the weights of those
/// edges. Four passes follow with the resolved weights.
pub fn run_phases(
    graph: &AllocationGraph,
    store: &CostItemStore,
    order: &[usize],
) -> AllocationPasses {
    let initial = initial_weights(graph);

    info!("Allocating costs, ignoring keys that are costs");
    let first = run_pass(graph, store, order, &initial, Metric::Amortized, CostView::Service, true);
    let weights = resolve_cost_weights(graph, &initial, &first);

    info!("Allocating amortized costs for services");
    let amortized_service =
        run_pass(graph, store, order, &weights, Metric::Amortized, CostView::Service, false);
    info!("Allocating on-demand costs for services");
    let on_demand_service =
        run_pass(graph, store, order, &weights, Metric::OnDemand, CostView::Service, false);
    info!("Allocating amortized costs for products");
    let amortized_product =
        run_pass(graph, store, order, &weights, Metric::Amortized, CostView::Product, false);
    info!("Allocating on-demand costs for products");
    let on_demand_product =
        run_pass(graph, store, order, &weights, Metric::OnDemand, CostView::Product, false);

    AllocationPasses {
        weights,
        amortized_service,
        on_demand_service,
        amortized_product,
        on_demand_product,
    }
}

// ============================================================================
// Pass
// ============================================================================

/// A cost entering an instance: one of its cloud items or an incoming share.
struct Contribution<'a> {
    cost: f64,
    tags: &'a TagSet,
    product: Option<usize>,
}

/// Cost bucket of a selector group, for one product or the default.
#[derive(Debug, Default)]
struct Bucket {
    key_total: f64,
    raw: f64,
    adjusted: f64,
}

/// Outgoing edges sharing a provider tag selector.
struct SelectorGroup<'g> {
    selector: Option<&'g TagSelector>,
    edges: Vec<usize>,
    raw: f64,
    adjusted: f64,
    /// Cost not routed to a product.
    default: Bucket,
    /// Cost routed to products named by the group's edges.
    products: IndexMap<usize, Bucket>,
}

impl<'g> SelectorGroup<'g> {
    fn new(selector: Option<&'g TagSelector>) -> Self {
        Self {
            selector,
            edges: Vec::new(),
            raw: 0.0,
            adjusted: 0.0,
            default: Bucket::default(),
            products: IndexMap::new(),
        }
    }

    fn add_raw(&mut self, item: &Contribution<'_>) {
        self.raw += item.cost;
        match item.product.and_then(|p| self.products.get_mut(&p)) {
            Some(bucket) => bucket.raw += item.cost,
            None => self.default.raw += item.cost,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn adjust_buckets(&mut self) {
        let count = (self.products.len() + 1) as f64;
        let (raw, adjusted) = (self.raw, self.adjusted);
        for bucket in std::iter::once(&mut self.default).chain(self.products.values_mut()) {
            bucket.adjusted = if is_nonzero(raw) {
                bucket.raw * adjusted / raw
            } else {
                adjusted / count
            };
        }
    }

    fn share(&self, edge: &Edge, key: f64, view: CostView) -> f64 {
        match view {
            CostView::Product => ratio(self.adjusted, key, self.default.key_total),
            CostView::Service => {
                let mut share = ratio(self.default.adjusted, key, self.default.key_total);
                if let Some(bucket) = edge.product.and_then(|p| self.products.get(&p)) {
                    share += ratio(bucket.adjusted, key, bucket.key_total);
                }
                share
            }
        }
    }
}

#[allow(clippy::float_cmp)]
fn is_nonzero(value: f64) -> bool {
    value != 0.0
}

fn ratio(cost: f64, key: f64, key_total: f64) -> f64 {
    if is_nonzero(key_total) {
        cost * key / key_total
    } else {
        debug!(cost, "Zero allocation key total, share set to zero");
        0.0
    }
}

/// Runs one pass.
///
/// `order` must be a topological order of the instance nodes. With
/// `skip_pending`, edges whose weight is pending get no share and their
/// keys are left out of key totals.
pub fn run_pass(
    graph: &AllocationGraph,
    store: &CostItemStore,
    order: &[usize],
    weights: &[f64],
    metric: Metric,
    view: CostView,
    skip_pending: bool,
) -> PassOutcome {
    let mut instance_costs = vec![0.0; graph.instance_count()];
    let mut edge_shares = vec![0.0; graph.edges().len()];

    for &node in order {
        let id = graph.instance(node);

        let mut items: Vec<Contribution<'_>> = store
            .cloud_items(id)
            .map(|item| Contribution {
                cost: item.cost.get(metric),
                tags: &item.tags,
                product: None,
            })
            .collect();
        for e in graph.active_incoming(node) {
            let edge = graph.edge(e);
            let cost = if view == CostView::Product && edge.product.is_some() {
                0.0
            } else {
                edge_shares[e]
            };
            items.push(Contribution {
                cost,
                tags: &graph.declaration(e).tags,
                product: edge.product,
            });
        }
        let cost: f64 = items.iter().map(|item| item.cost).sum();
        instance_costs[node] = cost;

        let mut groups = group_outgoing(graph, node, weights, skip_pending);
        if groups.is_empty() {
            continue;
        }
        if !distribute(&mut groups, &items, cost) {
            debug!(instance = %id, "Provider tag selectors do not form a partition");
        }

        for group in &groups {
            for &e in &group.edges {
                let edge = graph.edge(e);
                if skip_pending && edge.is_pending() {
                    continue;
                }
                edge_shares[e] = group.share(edge, weights[e], view);
            }
        }
    }

    debug!(%metric, ?view, "Pass complete");
    PassOutcome {
        metric,
        view,
        instance_costs,
        edge_shares,
    }
}

fn group_outgoing<'g>(
    graph: &'g AllocationGraph,
    node: usize,
    weights: &[f64],
    skip_pending: bool,
) -> Vec<SelectorGroup<'g>> {
    let mut groups: IndexMap<&str, SelectorGroup<'g>> = IndexMap::new();
    for e in graph.active_outgoing(node) {
        let declaration = graph.declaration(e);
        let edge = graph.edge(e);
        let group = groups
            .entry(declaration.provider_tag_selector_text())
            .or_insert_with(|| SelectorGroup::new(declaration.provider_tag_selector.as_ref()));
        group.edges.push(e);
        if let Some(product) = edge.product {
            group.products.entry(product).or_default();
        }
        if skip_pending && edge.is_pending() {
            continue;
        }

        let key = weights[e];
        group.default.key_total += key;
        if let Some(bucket) = edge.product.and_then(|p| group.products.get_mut(&p)) {
            bucket.key_total += key;
        }
    }
    groups.into_values().collect()
}

/// Assigns instance cost to selector groups and their buckets.
///
/// Returns true if the selectors form a partition of the items.
#[allow(clippy::cast_precision_loss)]
fn distribute(groups: &mut [SelectorGroup<'_>], items: &[Contribution<'_>], cost: f64) -> bool {
    let default_group = groups.iter().position(|g| g.selector.is_none());

    let mut partition = true;
    for item in items {
        let mut matched = 0usize;
        for group in groups.iter_mut() {
            let Some(selector) = group.selector else {
                continue;
            };
            if selector.matches(item.tags) {
                matched += 1;
                group.add_raw(item);
            }
        }
        if matched == 0 {
            if let Some(index) = default_group {
                groups[index].add_raw(item);
                matched = 1;
            }
        }
        if matched != 1 {
            partition = false;
        }
    }

    let total_raw: f64 = groups.iter().map(|g| g.raw).sum();
    let count = groups.len() as f64;
    for group in groups.iter_mut() {
        group.adjusted = if partition {
            group.raw
        } else if is_nonzero(total_raw) {
            cost * group.raw / total_raw
        } else {
            cost / count
        };
        group.adjust_buckets();
    }
    partition
}
