//! CSV readers for cloud costs, allocation keys and allocated costs.
//!
//! - [`CostCsvReader`] - Generic cloud cost exports
//! - [`FocusReader`] - FOCUS cloud cost exports
//! - [`AzureEaReader`] - Azure EA amortized cost exports
//! - [`KeysCsvReader`] - Cost allocation keys
//! - [`AllocatedCostCsvReader`] - Allocated cost reports of a previous run

mod allocated;
mod azure_ea;
mod cost_csv;
mod focus;
mod keys;

pub use allocated::AllocatedCostCsvReader;
pub use azure_ea::AzureEaReader;
pub use cost_csv::CostCsvReader;
pub use focus::FocusReader;
pub use keys::KeysCsvReader;

use csv::StringRecord;
use indexmap::IndexMap;

use crate::error::DataError;

// ============================================================================
// Header Lookup
// ============================================================================

/// Column positions by header name.
#[derive(Debug, Clone, Default)]
pub(crate) struct Columns {
    positions: IndexMap<String, usize>,
}

impl Columns {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { positions }
    }

    /// Fails unless every column of `required` is present.
    pub(crate) fn require(&self, required: &[&str]) -> Result<(), DataError> {
        match required.iter().find(|c| !self.positions.contains_key(**c)) {
            Some(column) => Err(DataError::MissingColumn {
                column: (*column).to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the trimmed value of a column, empty when absent.
    pub(crate) fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.positions
            .get(column)
            .and_then(|&i| record.get(i))
            .map_or("", str::trim)
    }
}

/// Returns the 1-based line of a record, for error messages.
pub(crate) fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

/// Parses an amount; empty means zero.
pub(crate) fn parse_amount(text: &str) -> Option<f64> {
    if text.is_empty() {
        return Some(0.0);
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}
