//! Generic cloud cost CSV reader.
//!
//! Columns: `Date`, `Tags` (serialized `key:value,` pairs), `AmortizedCost`,
//! `OnDemandCost`, `Currency`. A missing on-demand cost defaults to the
//! amortized cost.

use ccalloc_core::{AllocationConfig, CloudCostReader, CloudCostRecord, TagSet};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::DataError;

#[derive(Debug, Deserialize)]
struct GenericCostRow {
    #[serde(rename = "Date")]
    date: String,

    #[serde(rename = "Tags", default)]
    tags: String,

    #[serde(rename = "AmortizedCost")]
    amortized_cost: Option<f64>,

    #[serde(rename = "OnDemandCost", default)]
    on_demand_cost: Option<f64>,

    #[serde(rename = "Currency", default)]
    currency: String,
}

impl From<GenericCostRow> for CloudCostRecord {
    fn from(row: GenericCostRow) -> Self {
        let amortized_cost = row.amortized_cost.unwrap_or_default();
        CloudCostRecord {
            date: row.date,
            amortized_cost,
            on_demand_cost: row.on_demand_cost.unwrap_or(amortized_cost),
            currency: row.currency,
            tags: TagSet::parse_serialized(&row.tags),
            ..Default::default()
        }
    }
}

/// Reads cloud costs from a generic CSV export.
pub struct CostCsvReader<R> {
    reader: csv::Reader<R>,
    source: String,
}

impl CostCsvReader<File> {
    /// Opens a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> CostCsvReader<R> {
    /// Wraps any reader; `source` names it in logs.
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self {
            reader,
            source: source.into(),
        }
    }
}

impl<R: Read> CloudCostReader for CostCsvReader<R> {
    type Error = DataError;

    fn read_cloud_costs(
        &mut self,
        _config: &AllocationConfig,
    ) -> Result<Vec<CloudCostRecord>, DataError> {
        debug!(source = %self.source, "Reading cloud costs");
        let mut records = Vec::new();
        for result in self.reader.deserialize() {
            let row: GenericCostRow = result?;
            records.push(CloudCostRecord::from(row));
        }
        info!(source = %self.source, count = records.len(), "Read cloud cost items");
        Ok(records)
    }
}
