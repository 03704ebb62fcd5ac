//! Azure Enterprise Agreement amortized cost CSV reader.
//!
//! Dates are `MM/DD/YYYY`. The amortized cost is `CostInBillingCurrency`.
//! Reserved usage is priced on demand as `Quantity * UnitPrice`, unused
//! reservations have no on-demand cost and are owned by the configured
//! unused reservation instance.

use ccalloc_core::{AllocationConfig, CloudCostReader, CloudCostRecord, CoreError, TagSet};
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::{line_of, parse_amount, Columns};
use crate::error::DataError;

const REQUIRED_COLUMNS: &[&str] = &[
    "Date",
    "CostInBillingCurrency",
    "BillingCurrencyCode",
    "ChargeType",
    "ReservationId",
    "Tags",
];

const UNUSED_RESERVATION: &str = "UnusedReservation";

/// Reads cloud costs from an Azure EA amortized cost export.
pub struct AzureEaReader<R> {
    reader: csv::Reader<R>,
    source: String,
}

impl AzureEaReader<File> {
    /// Opens an Azure EA CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> AzureEaReader<R> {
    /// Wraps any reader; `source` names it in logs.
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader: csv::Reader::from_reader(reader),
            source: source.into(),
        }
    }
}

impl<R: Read> CloudCostReader for AzureEaReader<R> {
    type Error = DataError;

    fn read_cloud_costs(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<Vec<CloudCostRecord>, DataError> {
        debug!(source = %self.source, "Reading Azure EA cloud costs");
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
            unused_reservations = unused,
            "Read Azure EA cost items"
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

    let date = columns.get(row, "Date");
    let date = NaiveDate::parse_from_str(date, "%m/%d/%Y").map_err(|_| {
        DataError::invalid_row(line, format!("expected date format MM/DD/YYYY, got '{date}'"))
    })?;

    let amortized_cost = parse_amount(columns.get(row, "CostInBillingCurrency"))
        .ok_or_else(|| DataError::invalid_row(line, "CostInBillingCurrency cannot be parsed"))?;
    let unused = columns.get(row, "ChargeType") == UNUSED_RESERVATION;
    let on_demand_cost = if columns.get(row, "ReservationId").is_empty() {
        amortized_cost
    } else if unused {
        0.0
    } else {
        let quantity = parse_amount(columns.get(row, "Quantity"))
            .ok_or_else(|| DataError::invalid_row(line, "Quantity cannot be parsed"))?;
        let unit_price = parse_amount(columns.get(row, "UnitPrice"))
            .ok_or_else(|| DataError::invalid_row(line, "UnitPrice cannot be parsed"))?;
        quantity * unit_price
    };
    let tags = parse_tags(columns.get(row, "Tags"))
        .map_err(|e| DataError::invalid_row(line, format!("invalid Tags: {e}")))?;

    let mut record = CloudCostRecord {
        date: config.format_date(date),
        amortized_cost,
        on_demand_cost,
        currency: columns.get(row, "BillingCurrencyCode").to_string(),
        tags,
        ..Default::default()
    };

    if unused {
        let owner = config.azure_unused_reservation.as_ref().ok_or_else(|| {
            CoreError::InvalidConfig(
                "Azure EA export contains unused reservations but no azure_unused_reservation section is configured"
                    .to_string(),
            )
        })?;
        record.forced_instance = Some(owner.owner());
        record.forced_dimensions = owner.dimension_values(&config.general.dimensions);
    }

    Ok(record)
}

/// Parses the Azure tag column: `"key": "value"` pairs, with or without
/// the enclosing braces.
fn parse_tags(text: &str) -> Result<TagSet, CoreError> {
    if text.is_empty() {
        return Ok(TagSet::new());
    }
    if text.starts_with('{') {
        TagSet::from_json(text)
    } else {
        TagSet::from_json(&format!("{{{text}}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccalloc_core::{InstanceId, UnusedCommitmentConfig};
    use indexmap::IndexMap;

    const HEADER: &str =
        "Date,CostInBillingCurrency,BillingCurrencyCode,ChargeType,ReservationId,Quantity,UnitPrice,Tags";

    fn read(rows: &str, config: &AllocationConfig) -> Result<Vec<CloudCostRecord>, DataError> {
        let data = format!("{HEADER}\n{rows}");
        AzureEaReader::new(data.as_bytes(), "test").read_cloud_costs(config)
    }

    #[test]
    fn test_read_pay_as_you_go_row() {
        let rows = r#"01/31/2024,7.25,EUR,Usage,,3,2,"""Service"": ""Web"",""env"": ""PROD"""
"#;
        let records = read(rows, &AllocationConfig::default()).unwrap();
        let record = &records[0];
        assert_eq!(record.date, "2024-01-31");
        assert_eq!(record.amortized_cost, 7.25);
        assert_eq!(record.on_demand_cost, 7.25);
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.tags.get("service"), Some("web"));
        assert_eq!(record.tags.get("env"), Some("prod"));
    }

    #[test]
    fn test_reserved_usage_priced_on_demand() {
        let rows = "01/31/2024,4,EUR,Usage,r-1,3,2.5,\n";
        let records = read(rows, &AllocationConfig::default()).unwrap();
        assert_eq!(records[0].amortized_cost, 4.0);
        assert_eq!(records[0].on_demand_cost, 7.5);
        assert!(records[0].tags.is_empty());
    }

    #[test]
    fn test_unused_reservation_owner() {
        let mut config = AllocationConfig::default();
        config.general.dimensions = vec!["Environment".to_string()];
        let mut dimensions = IndexMap::new();
        dimensions.insert("Environment".to_string(), "Shared".to_string());
        config.azure_unused_reservation = Some(UnusedCommitmentConfig {
            service: "Reservations".to_string(),
            instance: None,
            dimensions,
        });

        let rows = "01/31/2024,6,EUR,UnusedReservation,r-1,3,2.5,\n";
        let records = read(rows, &config).unwrap();
        let record = &records[0];
        assert_eq!(record.on_demand_cost, 0.0);
        assert_eq!(
            record.forced_instance,
            Some(InstanceId::service_default("reservations"))
        );
        assert_eq!(
            record.forced_dimensions.get("Environment").map(String::as_str),
            Some("shared")
        );
    }

    #[test]
    fn test_unused_reservation_requires_config() {
        let rows = "01/31/2024,6,EUR,UnusedReservation,r-1,3,2.5,\n";
        let err = read(rows, &AllocationConfig::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_rejects_iso_dates() {
        let rows = "2024-01-31,1,EUR,Usage,,,,\n";
        let err = read(rows, &AllocationConfig::default()).unwrap_err();
        assert!(matches!(err, DataError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn test_braced_tags() {
        let tags = parse_tags(r#"{"team": "Data"}"#).unwrap();
        assert_eq!(tags.get("team"), Some("data"));
        assert!(parse_tags(r#""team" "data""#).is_err());
    }
}
