//! Cost item store.
//!
//! Indexes cloud items and allocation items by owning instance, keeping
//! insertion order so that iteration is deterministic.

use ccalloc_core::{AllocationCostItem, CloudCostItem, CostAmounts, InstanceId, TagSelector};
use indexmap::IndexMap;

// ============================================================================
// Instance Totals
// ============================================================================

/// Running cost totals of one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceTotals {
    /// Cost of the instance's own cloud items.
    pub cloud: CostAmounts,
    /// Service-level cost received from other instances.
    pub incoming: CostAmounts,
}

impl InstanceTotals {
    /// Returns cloud plus incoming cost.
    pub fn total(&self) -> CostAmounts {
        self.cloud + self.incoming
    }
}

// ============================================================================
// Inner State
// ============================================================================

/// Item indices of one instance.
#[derive(Debug, Default)]
struct InstanceEntry {
    /// Indices into the cloud item list.
    cloud: Vec<usize>,
    /// Indices into the allocation item list (items consumed by the instance).
    allocations: Vec<usize>,
    /// Running totals.
    totals: InstanceTotals,
}

// ============================================================================
// Cost Item Store
// ============================================================================

/// Store of the cost items of one run.
#[derive(Debug, Default)]
pub struct CostItemStore {
    cloud_items: Vec<CloudCostItem>,
    allocation_items: Vec<AllocationCostItem>,
    instances: IndexMap<InstanceId, InstanceEntry>,
}

impl CostItemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from cloud items, in order.
    pub fn with_cloud_items(items: impl IntoIterator<Item = CloudCostItem>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.insert_cloud_item(item);
        }
        store
    }

    /// Registers an instance without items; no-op if already known.
    pub fn register_instance(&mut self, id: &InstanceId) {
        if !self.instances.contains_key(id) {
            self.instances.insert(id.clone(), InstanceEntry::default());
        }
    }

    /// Inserts a cloud item under its owning instance.
    pub fn insert_cloud_item(&mut self, item: CloudCostItem) {
        let index = self.cloud_items.len();
        let entry = self.instances.entry(item.instance.clone()).or_default();
        entry.cloud.push(index);
        entry.totals.cloud += item.cost;
        self.cloud_items.push(item);
    }

    /// Appends an allocation item under its consumer instance.
    ///
    /// Self consumption is indexed but does not count as incoming cost.
    pub fn append_allocation_item(&mut self, item: AllocationCostItem) {
        let index = self.allocation_items.len();
        let self_consumption = item.provider == item.consumer;
        self.register_instance(&item.provider);
        let entry = self.instances.entry(item.consumer.clone()).or_default();
        entry.allocations.push(index);
        if !self_consumption {
            entry.totals.incoming += item.cost;
        }
        self.allocation_items.push(item);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the running totals of an instance.
    pub fn totals(&self, id: &InstanceId) -> InstanceTotals {
        self.instances
            .get(id)
            .map(|entry| entry.totals)
            .unwrap_or_default()
    }

    /// Returns cloud plus incoming cost of an instance.
    pub fn instance_total(&self, id: &InstanceId) -> CostAmounts {
        self.totals(id).total()
    }

    /// Returns the cloud cost of an instance.
    pub fn cloud_total(&self, id: &InstanceId) -> CostAmounts {
        self.totals(id).cloud
    }

    /// Iterates over the cloud items of an instance.
    pub fn cloud_items<'a>(&'a self, id: &InstanceId) -> impl Iterator<Item = &'a CloudCostItem> {
        self.instances
            .get(id)
            .into_iter()
            .flat_map(|entry| entry.cloud.iter().map(|&i| &self.cloud_items[i]))
    }

    /// Iterates over the allocation items consumed by an instance.
    pub fn allocation_items<'a>(
        &'a self,
        id: &InstanceId,
    ) -> impl Iterator<Item = &'a AllocationCostItem> {
        self.instances
            .get(id)
            .into_iter()
            .flat_map(|entry| entry.allocations.iter().map(|&i| &self.allocation_items[i]))
    }

    /// Iterates over the cloud items of an instance matching a selector.
    pub fn matching_cloud_items<'a>(
        &'a self,
        id: &InstanceId,
        selector: &'a TagSelector,
    ) -> impl Iterator<Item = &'a CloudCostItem> {
        self.cloud_items(id)
            .filter(move |item| selector.matches(&item.tags))
    }

    /// Iterates over known instances in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceId> {
        self.instances.keys()
    }

    /// Returns every cloud item, in insertion order.
    pub fn all_cloud_items(&self) -> &[CloudCostItem] {
        &self.cloud_items
    }

    /// Returns every allocation item, in insertion order.
    pub fn all_allocation_items(&self) -> &[AllocationCostItem] {
        &self.allocation_items
    }

    /// Returns the sum of all cloud costs.
    pub fn grand_cloud_total(&self) -> CostAmounts {
        self.cloud_items.iter().map(|item| item.cost).sum()
    }

    /// Returns the number of cloud items without a resolvable service.
    pub fn unresolved_count(&self) -> usize {
        self.cloud_items.iter().filter(|item| item.unresolved).count()
    }

    /// Consumes the store, returning cloud and allocation items.
    pub fn into_items(self) -> (Vec<CloudCostItem>, Vec<AllocationCostItem>) {
        (self.cloud_items, self.allocation_items)
    }
}
