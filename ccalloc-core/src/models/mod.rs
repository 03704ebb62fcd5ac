//! Domain models for ccalloc.
//!
//! ## Submodules
//!
//! - [`identity`] - Instance and product identities
//! - [`tags`] - Tag sets and tag key normalization
//! - [`cost`] - Cost amounts, cloud cost records and items
//! - [`declaration`] - Cost allocation declarations
//! - [`ledger`] - Allocated cost ledger produced by the engine

mod cost;
mod declaration;
mod identity;
mod ledger;
mod tags;

pub use cost::{CloudCostItem, CloudCostRecord, CostAmounts, Metric};
pub use declaration::{
    AllocationDeclaration, AllocationType, DeclarationOrigin, Meter, ProductDimension,
};
pub use identity::{normalize_name, InstanceId, ProductKey, UNKNOWN_SERVICE};
pub use ledger::{
    AllocatedCosts, AllocationCostItem, InstanceSummary, LedgerTotals, ProductCostItem,
    ProductCostKind, ServiceResidual,
};
pub use tags::{normalize_tag_key, TagSet};
