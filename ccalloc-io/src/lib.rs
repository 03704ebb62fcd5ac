// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ccalloc I/O
//!
//! Files in and out of the ccalloc cost allocator.
//!
//! This crate provides:
//!
//! - **Configuration**: TOML (or JSON) configuration files
//! - **Readers**: Generic, FOCUS and Azure EA cloud cost CSV exports, cost
//!   allocation keys, allocated cost reports
//! - **Writers**: Allocated cost and product cost CSV reports
//!
//! Readers and writers implement the collaborator traits of `ccalloc-core`.
//!
//! ## Usage
//!
//! ```ignore
//! use ccalloc_core::{CloudCostReader, DeclarationReader};
//! use ccalloc_io::{load_config, FocusReader, KeysCsvReader};
//!
//! let config = load_config(Path::new("ccalloc.toml"))?;
//! let records = FocusReader::from_path(Path::new("focus.csv"))?.read_cloud_costs(&config)?;
//! let declarations = KeysCsvReader::from_path(Path::new("keys.csv"))?.read_declarations(&config)?;
//! ```

pub mod config_file;
pub mod error;
pub mod readers;
pub mod writer;

pub use config_file::{load_config, parse_config, ConfigFormat};
pub use error::DataError;
pub use readers::{
    AllocatedCostCsvReader, AzureEaReader, CostCsvReader, FocusReader, KeysCsvReader,
};
pub use writer::{
    allocated_cost_headers, product_cost_headers, AllocatedCostCsvWriter, ProductCostCsvWriter,
};
