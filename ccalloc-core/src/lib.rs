// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ccalloc Core
//!
//! Core types, configuration, and traits for the ccalloc cost allocator.
//!
//! This crate provides the foundational abstractions used across all other
//! ccalloc crates, including:
//!
//! - Domain models (instances, cost items, declarations, ledger)
//! - The tag selector language
//! - The immutable allocation configuration
//! - Error types
//! - Trait definitions for readers and writers
//!
//! ## Key Types
//!
//! ### Identities
//! - [`InstanceId`] - A `(service, instance)` pair, the pivot unit of allocation
//! - [`ProductKey`] - A `(product, meter)` pair
//!
//! ### Cost Types
//! - [`CostAmounts`] - Amortized and on-demand cost
//! - [`CloudCostRecord`] - Raw billing line from a reader
//! - [`CloudCostItem`] - Billing line resolved to its owning instance
//! - [`AllocationDeclaration`] - Cost allocation declaration of a provider
//!
//! ### Output
//! - [`AllocatedCosts`] - The allocated ledger of a run
//! - [`AllocationCostItem`] - Cost propagated along one edge
//! - [`ProductCostItem`] - Cost landing on a product
//!
//! ### Selectors & Configuration
//! - [`TagSelector`] - Boolean expression over tags
//! - [`AllocationConfig`] - Tag keys, dimensions, and cycle settings

pub mod config;
pub mod error;
pub mod models;
pub mod selector;
pub mod traits;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Identities
    normalize_name,
    InstanceId,
    ProductKey,
    UNKNOWN_SERVICE,
    // Tags
    normalize_tag_key,
    TagSet,
    // Costs
    CloudCostItem,
    CloudCostRecord,
    CostAmounts,
    Metric,
    // Declarations
    AllocationDeclaration,
    AllocationType,
    DeclarationOrigin,
    Meter,
    ProductDimension,
    // Ledger
    AllocatedCosts,
    AllocationCostItem,
    InstanceSummary,
    LedgerTotals,
    ProductCostItem,
    ProductCostKind,
    ServiceResidual,
};

pub use config::{
    AllocationConfig, CycleConfig, GeneralConfig, TagKeyConfig, UnusedCommitmentConfig,
};
pub use selector::TagSelector;
pub use traits::{AllocatedCostReader, AllocatedCostWriter, CloudCostReader, DeclarationReader};
