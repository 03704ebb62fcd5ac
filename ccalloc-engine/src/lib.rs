// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ccalloc Engine
//!
//! The cost allocation engine: builds a consumption graph among service
//! instances and products, breaks cycles, and propagates cloud costs along
//! weighted edges into a fully allocated ledger.
//!
//! ## Pipeline
//!
//! - [`store::CostItemStore`] - Cost items indexed by owning instance
//! - [`expand::expand_declarations`] - Cloud tag selector and consumer tag expansion
//! - [`graph::AllocationGraph`] - Instances, products, and allocation edges
//! - [`cycles::break_cycles`] - Bounded, deterministic cycle breaking
//! - [`allocator::run_phases`] - Allocation passes per metric and view
//! - [`products::ProductTracker`] - Product costs and residuals
//! - [`ledger::build_ledger`] - Final ledger assembly
//!
//! ## Example
//!
//! ```ignore
//! use ccalloc_engine::CostAllocator;
//!
//! let allocator = CostAllocator::new(&config);
//! let ledger = allocator.allocate(records, declarations)?;
//! assert!(ledger.is_balanced(1e-6));
//! ```

pub mod allocator;
pub mod cycles;
pub mod engine;
pub mod error;
pub mod expand;
pub mod graph;
pub mod ledger;
pub mod products;
pub mod store;

pub use allocator::{run_pass, AllocationPasses, CostView, PassOutcome};
pub use cycles::CycleBreak;
pub use engine::CostAllocator;
pub use error::AllocationError;
pub use graph::{AllocationGraph, Edge, EdgeWeight};
pub use products::{InstanceFlows, ProductTracker, RESIDUAL_TOLERANCE};
pub use store::{CostItemStore, InstanceTotals};
