//! Trait definitions for ccalloc.
//!
//! This module defines the seams between the allocation engine and its
//! collaborators: sources of cloud costs and allocation keys, and sinks
//! for the allocated ledger.

use crate::config::AllocationConfig;
use crate::models::{AllocatedCosts, AllocationDeclaration, CloudCostRecord};

/// Trait for sources of cloud cost records.
///
/// Implementors read billing lines from an export and hand them over
/// unresolved: the engine resolves services, instances and dimensions
/// with the configuration.
pub trait CloudCostReader {
    /// Error returned by the reader.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads every cloud cost record of the source.
    fn read_cloud_costs(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<Vec<CloudCostRecord>, Self::Error>;
}

/// Trait for sources of cost allocation declarations.
///
/// Selectors must be parsed here, so malformed expressions fail before
/// allocation starts.
pub trait DeclarationReader {
    /// Error returned by the reader.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads every declaration of the source.
    fn read_declarations(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<Vec<AllocationDeclaration>, Self::Error>;
}

/// Trait for sources of a previously allocated ledger.
///
/// Only the cost items are read back. Summaries and totals are left
/// empty.
pub trait AllocatedCostReader {
    /// Error returned by the reader.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the cloud and allocation cost items of the source.
    fn read_allocated_costs(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<AllocatedCosts, Self::Error>;
}

/// Trait for sinks of the allocated cost ledger.
pub trait AllocatedCostWriter {
    /// Error returned by the writer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes the ledger.
    fn write_allocated_costs(
        &mut self,
        costs: &AllocatedCosts,
        config: &AllocationConfig,
    ) -> Result<(), Self::Error>;
}
