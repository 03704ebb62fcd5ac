//! Allocated cost CSV reader.
//!
//! Reads back the report of [`AllocatedCostCsvWriter`](crate::AllocatedCostCsvWriter).
//! Rows with a `ProviderService` are allocation items, the others cloud
//! items. Product amounts are only written for rows naming a product, so
//! other allocation items read back with a zero product cost.

use ccalloc_core::{
    AllocatedCostReader, AllocatedCosts, AllocationConfig, AllocationCostItem, AllocationType,
    CloudCostItem, CostAmounts, DeclarationOrigin, InstanceId, Meter, ProductDimension, TagSet,
};
use csv::StringRecord;
use indexmap::IndexMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::{line_of, parse_amount, Columns};
use crate::error::DataError;
use crate::writer::ALLOCATED_COST_COLUMNS;

/// Reads a previously written allocated cost report.
pub struct AllocatedCostCsvReader<R> {
    reader: csv::Reader<R>,
    source: String,
}

impl AllocatedCostCsvReader<File> {
    /// Opens an allocated cost CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> AllocatedCostCsvReader<R> {
    /// Wraps any reader; `source` names it in logs.
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader: csv::Reader::from_reader(reader),
            source: source.into(),
        }
    }
}

impl<R: Read> AllocatedCostReader for AllocatedCostCsvReader<R> {
    type Error = DataError;

    fn read_allocated_costs(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<AllocatedCosts, DataError> {
        debug!(source = %self.source, "Reading allocated costs");
        let columns = Columns::new(self.reader.headers()?);
        columns.require(ALLOCATED_COST_COLUMNS)?;

        let mut costs = AllocatedCosts::default();
        for result in self.reader.records() {
            let row = result?;
            if costs.date.is_empty() {
                costs.date = columns.get(&row, "Date").to_string();
            }
            if costs.currency.is_empty() {
                costs.currency = columns.get(&row, "Currency").to_string();
            }
            if columns.get(&row, "ProviderService").is_empty() {
                costs.cloud_items.push(cloud_item(&columns, &row, config)?);
            } else {
                costs.allocation_items.push(allocation_item(&columns, &row, config)?);
            }
        }

        info!(
            source = %self.source,
            cloud_items = costs.cloud_items.len(),
            allocation_items = costs.allocation_items.len(),
            "Read allocated costs"
        );
        Ok(costs)
    }
}

// ============================================================================
// Rows
// ============================================================================

fn cloud_item(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> Result<CloudCostItem, DataError> {
    let line = line_of(row);
    Ok(CloudCostItem {
        date: columns.get(row, "Date").to_string(),
        instance: instance(columns, row, "Service", "Instance"),
        dimensions: dimensions(columns, row, config),
        tags: TagSet::parse_serialized(columns.get(row, "Tags")),
        cost: amounts(columns, row, "AmortizedCost", "OnDemandCost", line)?,
        currency: columns.get(row, "Currency").to_string(),
        unresolved: false,
    })
}

fn allocation_item(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> Result<AllocationCostItem, DataError> {
    let line = line_of(row);
    let general = &config.general;

    let label = columns.get(row, "ProviderCostAllocationType");
    let (allocation_type, origin) = match label {
        "ConsumerTag" => (AllocationType::Key, DeclarationOrigin::ConsumerTag),
        "CloudTagSelector" => (
            AllocationType::CloudTagSelector,
            DeclarationOrigin::CloudTagSelector,
        ),
        other => {
            let allocation_type = other.parse::<AllocationType>().map_err(|_| {
                DataError::invalid_row(line, format!("unknown allocation type '{other}'"))
            })?;
            (allocation_type, DeclarationOrigin::Declared)
        }
    };

    let product = Some(columns.get(row, "Product"))
        .filter(|p| !p.is_empty())
        .map(ToString::to_string);
    let (product_cost, product_dimensions, product_meters) = if product.is_some() {
        let meters = (1..=general.product_meter_count)
            .map(|i| {
                let suffix = if i == 1 { String::new() } else { i.to_string() };
                meter(columns, row, "ProductMeter", &suffix, line)
            })
            .collect::<Result<Vec<_>, _>>()?;
        (
            amounts(columns, row, "ProductAmortizedCost", "ProductOnDemandCost", line)?,
            product_dimensions(columns, row, general.product_dimension_count),
            meters.into_iter().flatten().collect(),
        )
    } else {
        (CostAmounts::ZERO, Vec::new(), Vec::new())
    };

    let provider_meters = (1..=general.provider_meter_count)
        .map(|i| meter(columns, row, "ProviderMeter", &i.to_string(), line))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    let key = parse_amount(columns.get(row, "ProviderCostAllocationKey"))
        .ok_or_else(|| DataError::invalid_row(line, "ProviderCostAllocationKey cannot be parsed"))?;
    let is_final_consumption = match columns.get(row, "IsFinalConsumption") {
        "" | "false" => false,
        "true" => true,
        other => {
            return Err(DataError::invalid_row(
                line,
                format!("IsFinalConsumption must be true or false, got '{other}'"),
            ));
        }
    };

    Ok(AllocationCostItem {
        date: columns.get(row, "Date").to_string(),
        provider: instance(columns, row, "ProviderService", "ProviderInstance"),
        consumer: instance(columns, row, "Service", "Instance"),
        provider_tag_selector: columns.get(row, "ProviderTagSelector").to_string(),
        allocation_type,
        origin,
        key,
        cloud_tag_selector: columns
            .get(row, "ProviderCostAllocationCloudTagSelector")
            .to_string(),
        product,
        cost: amounts(columns, row, "AmortizedCost", "OnDemandCost", line)?,
        product_cost,
        tags: TagSet::parse_serialized(columns.get(row, "Tags")),
        dimensions: dimensions(columns, row, config),
        provider_meters,
        product_dimensions,
        product_meters,
        currency: columns.get(row, "Currency").to_string(),
        is_final_consumption,
    })
}

// ============================================================================
// Field Helpers
// ============================================================================

fn instance(columns: &Columns, row: &StringRecord, service: &str, instance: &str) -> InstanceId {
    InstanceId::new(columns.get(row, service), columns.get(row, instance))
}

fn amounts(
    columns: &Columns,
    row: &StringRecord,
    amortized: &str,
    on_demand: &str,
    line: u64,
) -> Result<CostAmounts, DataError> {
    let parse = |column: &str| {
        parse_amount(columns.get(row, column))
            .ok_or_else(|| DataError::invalid_row(line, format!("{column} cannot be parsed")))
    };
    Ok(CostAmounts::new(parse(amortized)?, parse(on_demand)?))
}

fn dimensions(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> IndexMap<String, String> {
    config
        .general
        .dimensions
        .iter()
        .filter_map(|name| {
            let value = columns.get(row, name);
            (!value.is_empty()).then(|| (name.clone(), value.to_string()))
        })
        .collect()
}

/// Reads one meter column group; an empty group is no meter.
fn meter(
    columns: &Columns,
    row: &StringRecord,
    prefix: &str,
    suffix: &str,
    line: u64,
) -> Result<Option<Meter>, DataError> {
    let name = columns.get(row, &format!("{prefix}Name{suffix}"));
    let unit = columns.get(row, &format!("{prefix}Unit{suffix}"));
    if name.is_empty() && unit.is_empty() {
        return Ok(None);
    }
    let value_column = format!("{prefix}Value{suffix}");
    let value = match columns.get(row, &value_column) {
        "" => None,
        text => Some(text.parse::<f64>().map_err(|_| {
            DataError::invalid_row(line, format!("{value_column} is not a number: '{text}'"))
        })?),
    };
    Ok(Some(Meter::new(name, unit, value)))
}

fn product_dimensions(columns: &Columns, row: &StringRecord, count: usize) -> Vec<ProductDimension> {
    (1..=count)
        .filter_map(|i| {
            let name = columns.get(row, &format!("ProductDimensionName{i}"));
            let element = columns.get(row, &format!("ProductDimensionElement{i}"));
            (!name.is_empty() || !element.is_empty()).then(|| ProductDimension {
                name: name.to_string(),
                element: element.to_string(),
            })
        })
        .collect()
}
