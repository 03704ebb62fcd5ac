//! Cost allocation graph.
//!
//! Nodes are service instances, in insertion order: instances owning cloud
//! items first, then instances discovered through declarations. Each
//! declaration becomes one edge from its provider to its consumer.

use std::collections::BTreeSet;

use ccalloc_core::{AllocationDeclaration, AllocationType, InstanceId, ProductKey, TagSelector};
use indexmap::IndexSet;
use tracing::debug;

use crate::error::AllocationError;
use crate::store::CostItemStore;

// ============================================================================
// Edges
// ============================================================================

/// Weight of an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeWeight {
    /// Known before allocation (`Key` and expanded `CloudTagSelector`).
    Static(f64),
    /// Resolved from the consumer's cost after the first pass (`Cost`).
    Pending,
}

/// An allocation edge.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Provider node.
    pub provider: usize,
    /// Consumer node.
    pub consumer: usize,
    /// Product node, if the declaration names a product.
    pub product: Option<usize>,
    /// Weight.
    pub weight: EdgeWeight,
    /// Index of the originating declaration.
    pub declaration: usize,
    /// True once removed by the cycle breaker.
    pub removed: bool,
}

impl Edge {
    /// Returns true if the edge goes from an instance to itself.
    pub fn is_self_consumption(&self) -> bool {
        self.provider == self.consumer
    }

    /// Returns true if the weight is resolved after the first pass.
    pub fn is_pending(&self) -> bool {
        self.weight == EdgeWeight::Pending
    }
}

// ============================================================================
// Allocation Graph
// ============================================================================

/// The consumption graph among instances and products.
#[derive(Debug, Default)]
pub struct AllocationGraph {
    instances: IndexSet<InstanceId>,
    products: IndexSet<ProductKey>,
    declarations: Vec<AllocationDeclaration>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl AllocationGraph {
    /// Builds the graph from the store's instances and the final declaration list.
    pub fn build(declarations: Vec<AllocationDeclaration>, store: &CostItemStore) -> Self {
        let mut graph = Self::default();
        for id in store.instances() {
            graph.add_instance(id);
        }

        for (index, declaration) in declarations.iter().enumerate() {
            let provider = graph.add_instance(&declaration.provider);
            let consumer = graph.add_instance(&declaration.consumer);
            let product = declaration
                .product_key()
                .map(|key| graph.products.insert_full(key).0);
            let weight = match declaration.allocation_type {
                AllocationType::Cost => EdgeWeight::Pending,
                AllocationType::Key | AllocationType::CloudTagSelector => {
                    EdgeWeight::Static(declaration.key)
                }
            };

            let edge_id = graph.edges.len();
            graph.edges.push(Edge {
                provider,
                consumer,
                product,
                weight,
                declaration: index,
                removed: false,
            });
            graph.outgoing[provider].push(edge_id);
            graph.incoming[consumer].push(edge_id);
        }
        graph.declarations = declarations;

        debug!(
            instances = graph.instances.len(),
            products = graph.products.len(),
            edges = graph.edges.len(),
            "Built allocation graph"
        );
        graph
    }

    fn add_instance(&mut self, id: &InstanceId) -> usize {
        if let Some(index) = self.instances.get_index_of(id) {
            return index;
        }
        let (index, _) = self.instances.insert_full(id.clone());
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        index
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the number of instance nodes.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Returns the instance of a node.
    pub fn instance(&self, node: usize) -> &InstanceId {
        &self.instances[node]
    }

    /// Iterates over instance nodes in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceId> {
        self.instances.iter()
    }

    /// Returns the node of an instance.
    pub fn node_of(&self, id: &InstanceId) -> Option<usize> {
        self.instances.get_index_of(id)
    }

    /// Returns the product of a product node.
    pub fn product(&self, node: usize) -> &ProductKey {
        &self.products[node]
    }

    /// Returns the number of product nodes.
    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Returns an edge.
    pub fn edge(&self, edge: usize) -> &Edge {
        &self.edges[edge]
    }

    /// Returns all edges, removed ones included.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the declaration of an edge.
    pub fn declaration(&self, edge: usize) -> &AllocationDeclaration {
        &self.declarations[self.edges[edge].declaration]
    }

    /// Returns the provider tag selector of an edge.
    pub fn selector(&self, edge: usize) -> Option<&TagSelector> {
        self.declaration(edge).provider_tag_selector.as_ref()
    }

    /// Returns all declarations.
    pub fn declarations(&self) -> &[AllocationDeclaration] {
        &self.declarations
    }

    /// Returns the outgoing edges of a node, removed ones included.
    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    /// Returns the incoming edges of a node, removed ones included.
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Iterates over the non-removed outgoing edges of a node.
    pub fn active_outgoing(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.outgoing[node]
            .iter()
            .copied()
            .filter(|&e| !self.edges[e].removed)
    }

    /// Iterates over the non-removed incoming edges of a node, self consumption excluded.
    pub fn active_incoming(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.incoming[node]
            .iter()
            .copied()
            .filter(|&e| !self.edges[e].removed && !self.edges[e].is_self_consumption())
    }

    /// Marks an edge as removed.
    pub fn remove_edge(&mut self, edge: usize) {
        self.edges[edge].removed = true;
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Returns instance nodes in topological order.
    ///
    /// Kahn's algorithm over non-removed, non-self edges; among ready nodes
    /// the earliest inserted goes first.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnexpectedCycle`] if a cycle remains.
    pub fn topological_order(&self) -> Result<Vec<usize>, AllocationError> {
        let count = self.instances.len();
        let mut in_degree = vec![0usize; count];
        for edge in self.live_edges() {
            in_degree[edge.consumer] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&n| in_degree[n] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for e in self.active_outgoing(node) {
                let edge = &self.edges[e];
                if edge.is_self_consumption() {
                    continue;
                }
                in_degree[edge.consumer] -= 1;
                if in_degree[edge.consumer] == 0 {
                    ready.insert(edge.consumer);
                }
            }
        }

        if order.len() < count {
            let cycle = (0..count)
                .filter(|&n| in_degree[n] > 0)
                .map(|n| self.instances[n].to_string())
                .collect::<Vec<_>>()
                .join(",");
            return Err(AllocationError::UnexpectedCycle { cycle });
        }
        Ok(order)
    }

    fn live_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| !e.removed && !e.is_self_consumption())
    }
}
