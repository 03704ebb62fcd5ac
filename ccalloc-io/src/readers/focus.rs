//! FOCUS cloud cost CSV reader.
//!
//! Reads daily FOCUS exports. The charge period of every row must be
//! exactly one day; its start is the item date. Effective cost is the
//! amortized cost and contracted cost the on-demand cost. Rows with an
//! unused commitment are owned by the configured unused commitment
//! instance instead of being resolved from tags.

use ccalloc_core::{AllocationConfig, CloudCostReader, CloudCostRecord, CoreError, TagSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::{line_of, parse_amount, Columns};
use crate::error::DataError;

const REQUIRED_COLUMNS: &[&str] = &[
    "ChargePeriodStart",
    "ChargePeriodEnd",
    "EffectiveCost",
    "ContractedCost",
    "BillingCurrency",
    "Tags",
];

const UNUSED_COMMITMENT: &str = "Unused";

/// Reads cloud costs from a FOCUS CSV export.
pub struct FocusReader<R> {
    reader: csv::Reader<R>,
    source: String,
}

impl FocusReader<File> {
    /// Opens a FOCUS CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> FocusReader<R> {
    /// Wraps any reader; `source` names it in logs.
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader: csv::Reader::from_reader(reader),
            source: source.into(),
        }
    }
}

impl<R: Read> CloudCostReader for FocusReader<R> {
    type Error = DataError;

    fn read_cloud_costs(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<Vec<CloudCostRecord>, DataError> {
        debug!(source = %self.source, "Reading FOCUS cloud costs");
        let columns = Columns::new(self.reader.headers()?);
        columns.require(REQUIRED_COLUMNS)?;

        let mut records = Vec::new();
        let mut unused = 0usize;
        for result in self.reader.records() {
            let row = result?;
            let record = read_row(&columns, &row, config)?;
            if record.forced_instance.is_some() {
                unused += 1;
            }
            records.push(record);
        }

        info!(
            source = %self.source,
            count = records.len(),
            unused_commitments = unused,
            "Read FOCUS cost items"
        );
        Ok(records)
    }
}

fn read_row(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> Result<CloudCostRecord, DataError> {
    let line = line_of(row);

    let start = parse_timestamp(columns.get(row, "ChargePeriodStart")).ok_or_else(|| {
        DataError::invalid_row(line, "ChargePeriodStart is not a valid date or timestamp")
    })?;
    let end = parse_timestamp(columns.get(row, "ChargePeriodEnd")).ok_or_else(|| {
        DataError::invalid_row(line, "ChargePeriodEnd is not a valid date or timestamp")
    })?;
    if end - start != TimeDelta::days(1) {
        return Err(DataError::invalid_row(
            line,
            "charge period must be exactly one day",
        ));
    }

    let amortized_cost = parse_amount(columns.get(row, "EffectiveCost"))
        .ok_or_else(|| DataError::invalid_row(line, "EffectiveCost cannot be parsed"))?;
    let on_demand_cost = parse_amount(columns.get(row, "ContractedCost"))
        .ok_or_else(|| DataError::invalid_row(line, "ContractedCost cannot be parsed"))?;
    let tags = parse_tags(columns.get(row, "Tags"))
        .map_err(|e| DataError::invalid_row(line, format!("invalid Tags: {e}")))?;

    let mut record = CloudCostRecord {
        date: config.format_date(start.date()),
        amortized_cost,
        on_demand_cost,
        currency: columns.get(row, "BillingCurrency").to_string(),
        tags,
        ..Default::default()
    };

    if columns.get(row, "CommitmentDiscountStatus") == UNUSED_COMMITMENT {
        let owner = config.focus_unused_commitment.as_ref().ok_or_else(|| {
            CoreError::InvalidConfig(
                "FOCUS export contains unused commitments but no focus_unused_commitment section is configured"
                    .to_string(),
            )
        })?;
        record.forced_instance = Some(owner.owner());
        record.forced_dimensions = owner.dimension_values(&config.general.dimensions);
    }

    Ok(record)
}

/// Parses an RFC 3339 timestamp, a naive timestamp, or a plain date.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Parses the FOCUS tag column: a JSON object, `null`, or empty.
fn parse_tags(text: &str) -> Result<TagSet, CoreError> {
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return Ok(TagSet::new());
    }
    TagSet::from_json(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccalloc_core::{InstanceId, UnusedCommitmentConfig};
    use indexmap::IndexMap;

    const HEADER: &str = "ChargePeriodStart,ChargePeriodEnd,EffectiveCost,ContractedCost,BillingCurrency,Tags,CommitmentDiscountStatus";

    fn read(rows: &str, config: &AllocationConfig) -> Result<Vec<CloudCostRecord>, DataError> {
        let data = format!("{HEADER}\n{rows}");
        FocusReader::new(data.as_bytes(), "test").read_cloud_costs(config)
    }

    fn unused_config() -> AllocationConfig {
        let mut config = AllocationConfig::default();
        config.general.dimensions = vec!["Environment".to_string()];
        let mut dimensions = IndexMap::new();
        dimensions.insert("Environment".to_string(), "Prod".to_string());
        config.focus_unused_commitment = Some(UnusedCommitmentConfig {
            service: "reservations".to_string(),
            instance: None,
            dimensions,
        });
        config
    }

    #[test]
    fn test_read_focus_row() {
        let rows = r#"2024-01-31T00:00:00Z,2024-02-01T00:00:00Z,8.5,10,EUR,"{""Service"": ""Web"", ""replicas"": 3}",Used
"#;
        let records = read(rows, &AllocationConfig::default()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.date, "2024-01-31");
        assert_eq!(record.amortized_cost, 8.5);
        assert_eq!(record.on_demand_cost, 10.0);
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.tags.get("service"), Some("web"));
        assert_eq!(record.tags.get("replicas"), Some("3"));
        assert!(record.forced_instance.is_none());
    }

    #[test]
    fn test_null_tags() {
        let rows = "2024-01-31,2024-02-01,1,1,EUR,null,\n";
        let records = read(rows, &AllocationConfig::default()).unwrap();
        assert!(records[0].tags.is_empty());
    }

    #[test]
    fn test_charge_period_must_be_one_day() {
        let rows = "2024-01-31,2024-02-02,1,1,EUR,null,\n";
        let err = read(rows, &AllocationConfig::default()).unwrap_err();
        assert!(matches!(err, DataError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn test_unused_commitment_owner() {
        let rows = "2024-01-31,2024-02-01,5,0,EUR,null,Unused\n";
        let records = read(rows, &unused_config()).unwrap();
        let record = &records[0];
        assert_eq!(
            record.forced_instance,
            Some(InstanceId::service_default("reservations"))
        );
        assert_eq!(
            record.forced_dimensions.get("Environment").map(String::as_str),
            Some("prod")
        );
    }

    #[test]
    fn test_unused_commitment_requires_config() {
        let rows = "2024-01-31,2024-02-01,5,0,EUR,null,Unused\n";
        let err = read(rows, &AllocationConfig::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_column() {
        let data = "ChargePeriodStart,EffectiveCost\n";
        let err = FocusReader::new(data.as_bytes(), "test")
            .read_cloud_costs(&AllocationConfig::default())
            .unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { .. }));
    }
}
