//! Cost allocator.
//!
//! Runs an allocation end to end: resolution of cloud records, declaration
//! expansion, currency and date checks, graph construction, cycle
//! breaking, allocation passes, product tracking and ledger assembly.

use ccalloc_core::{
    AllocatedCosts, AllocationConfig, AllocationDeclaration, CloudCostRecord,
};
use tracing::{error, info, instrument, warn};

use crate::allocator::run_phases;
use crate::cycles::break_cycles;
use crate::error::AllocationError;
use crate::expand::expand_declarations;
use crate::graph::AllocationGraph;
use crate::ledger::{build_ledger, LedgerParts};
use crate::products::ProductTracker;
use crate::store::CostItemStore;

/// Allocates cloud costs according to declarations.
///
/// The allocator holds the configuration only; every run starts from
/// scratch and repeated runs on the same inputs produce identical ledgers.
#[derive(Debug, Clone, Copy)]
pub struct CostAllocator<'a> {
    config: &'a AllocationConfig,
}

impl<'a> CostAllocator<'a> {
    /// Creates an allocator.
    pub fn new(config: &'a AllocationConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AllocationConfig {
        self.config
    }

    /// Resolves cloud records and allocates them.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] on unbreakable cycles, when the cycle
    /// break bound is reached, or on currency mismatches.
    #[instrument(skip_all, fields(records = records.len(), declarations = declarations.len()))]
    pub fn allocate(
        &self,
        records: Vec<CloudCostRecord>,
        declarations: Vec<AllocationDeclaration>,
    ) -> Result<AllocatedCosts, AllocationError> {
        let store = CostItemStore::with_cloud_items(
            records
                .into_iter()
                .map(|record| self.config.resolve_cloud_item(record)),
        );
        let unresolved = store.unresolved_count();
        if unresolved > 0 {
            warn!(count = unresolved, "Cloud cost items without a service were attributed to the unknown service");
        }
        self.allocate_store(store, declarations)
    }

    /// Allocates the cloud items of a store.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn allocate_store(
        &self,
        store: CostItemStore,
        declarations: Vec<AllocationDeclaration>,
    ) -> Result<AllocatedCosts, AllocationError> {
        let mut declarations = expand_declarations(declarations, &store, self.config);
        let date = reference_date(&store, &declarations);
        let currency = reconcile_currency(&store, &mut declarations)?;

        let mut graph = AllocationGraph::build(declarations, &store);
        let breaks = break_cycles(&mut graph, &self.config.cycles)?;
        let order = graph.topological_order().inspect_err(|err| {
            error!(%err, "Cost allocation graph is still cyclic");
        })?;

        let passes = run_phases(&graph, &store, &order);
        let tracker =
            ProductTracker::from_passes(&graph, &passes.amortized_product, &passes.on_demand_product);

        let ledger = build_ledger(
            store,
            LedgerParts {
                graph: &graph,
                order: &order,
                passes: &passes,
                tracker: &tracker,
                date,
                currency,
                default_product: self.config.general.default_product.as_deref(),
                cycle_breaks: breaks.len(),
            },
        );
        info!(
            instances = ledger.instances.len(),
            allocation_items = ledger.allocation_items.len(),
            product_items = ledger.product_items.len(),
            "Allocation complete"
        );
        Ok(ledger)
    }
}

// ============================================================================
// Consistency Checks
// ============================================================================

/// Returns the first non-empty date, warning about every other date found.
fn reference_date(store: &CostItemStore, declarations: &[AllocationDeclaration]) -> String {
    let dates = store
        .all_cloud_items()
        .iter()
        .map(|item| item.date.as_str())
        .chain(declarations.iter().map(|d| d.date.as_str()))
        .filter(|date| !date.is_empty());

    let mut reference: Option<&str> = None;
    for date in dates {
        match reference {
            None => reference = Some(date),
            Some(expected) if expected != date => {
                warn!(expected, found = date, "Found cost items with different dates");
            }
            Some(_) => {}
        }
    }
    reference.unwrap_or_default().to_string()
}

/// Returns the reference currency and fills it into declarations without one.
fn reconcile_currency(
    store: &CostItemStore,
    declarations: &mut [AllocationDeclaration],
) -> Result<String, AllocationError> {
    let reference = store
        .all_cloud_items()
        .iter()
        .map(|item| item.currency.as_str())
        .chain(declarations.iter().map(|d| d.currency.as_str()))
        .find(|currency| !currency.is_empty())
        .unwrap_or_default()
        .to_string();

    let cloud = store.all_cloud_items().iter().map(|item| item.currency.as_str());
    for currency in cloud.chain(declarations.iter().map(|d| d.currency.as_str())) {
        if !currency.is_empty() && currency != reference {
            error!(expected = %reference, found = currency, "Found cost items with different currencies");
            return Err(AllocationError::CurrencyMismatch {
                expected: reference,
                found: currency.to_string(),
            });
        }
    }

    for declaration in declarations.iter_mut() {
        if declaration.currency.is_empty() {
            declaration.currency.clone_from(&reference);
        }
    }
    Ok(reference)
}
