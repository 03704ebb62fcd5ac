//! CSV writers for the allocated ledger.
//!
//! - [`AllocatedCostCsvWriter`] - One row per cost item, grouped by instance
//! - [`ProductCostCsvWriter`] - One row per product cost item

use ccalloc_core::{
    AllocatedCostWriter, AllocatedCosts, AllocationConfig, AllocationCostItem, CloudCostItem,
    InstanceId, Meter, ProductDimension,
};
use csv::Writer;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::DataError;

pub(crate) const ALLOCATED_COST_COLUMNS: &[&str] = &[
    "Date",
    "Service",
    "Instance",
    "Tags",
    "AmortizedCost",
    "OnDemandCost",
    "Currency",
    "ProviderService",
    "ProviderInstance",
    "ProviderTagSelector",
    "ProviderCostAllocationType",
    "ProviderCostAllocationKey",
    "ProviderCostAllocationCloudTagSelector",
    "Product",
    "ProductAmortizedCost",
    "ProductOnDemandCost",
];

const PRODUCT_COST_COLUMNS: &[&str] = &[
    "Date",
    "Product",
    "ProductMeterName",
    "Service",
    "Instance",
    "ProviderService",
    "ProviderInstance",
    "AmortizedCost",
    "OnDemandCost",
    "Currency",
    "Kind",
];

// ============================================================================
// Headers
// ============================================================================

/// Returns the allocated cost CSV header for a configuration.
pub fn allocated_cost_headers(config: &AllocationConfig) -> Vec<String> {
    let general = &config.general;
    let mut headers: Vec<String> = ALLOCATED_COST_COLUMNS.iter().map(ToString::to_string).collect();
    headers.extend(general.dimensions.iter().cloned());
    for i in 1..=general.provider_meter_count {
        headers.push(format!("ProviderMeterName{i}"));
        headers.push(format!("ProviderMeterUnit{i}"));
        headers.push(format!("ProviderMeterValue{i}"));
    }
    for i in 1..=general.product_dimension_count {
        headers.push(format!("ProductDimensionName{i}"));
        headers.push(format!("ProductDimensionElement{i}"));
    }
    for i in 1..=general.product_meter_count {
        let suffix = if i == 1 { String::new() } else { i.to_string() };
        headers.push(format!("ProductMeterName{suffix}"));
        headers.push(format!("ProductMeterUnit{suffix}"));
        headers.push(format!("ProductMeterValue{suffix}"));
    }
    headers.push("IsFinalConsumption".to_string());
    headers
}

/// Returns the product cost CSV header for a configuration.
pub fn product_cost_headers(config: &AllocationConfig) -> Vec<String> {
    let mut headers: Vec<String> = PRODUCT_COST_COLUMNS.iter().map(ToString::to_string).collect();
    headers.extend(config.general.dimensions.iter().cloned());
    headers
}

// ============================================================================
// Field Helpers
// ============================================================================

fn amount(value: f64) -> String {
    value.to_string()
}

fn dimension_fields(dimensions: &IndexMap<String, String>, config: &AllocationConfig) -> Vec<String> {
    config
        .general
        .dimensions
        .iter()
        .map(|name| dimensions.get(name).cloned().unwrap_or_default())
        .collect()
}

/// Meter columns; the value is written only for named meters.
fn meter_fields(meters: &[Meter], count: usize) -> Vec<String> {
    let mut fields = Vec::with_capacity(count * 3);
    for i in 0..count {
        match meters.get(i) {
            Some(meter) => {
                fields.push(meter.name.clone());
                fields.push(meter.unit.clone());
                fields.push(match meter.value {
                    Some(value) if !meter.name.is_empty() => amount(value),
                    _ => String::new(),
                });
            }
            None => fields.extend([String::new(), String::new(), String::new()]),
        }
    }
    fields
}

fn product_dimension_fields(dimensions: &[ProductDimension], count: usize) -> Vec<String> {
    let mut fields = Vec::with_capacity(count * 2);
    for i in 0..count {
        match dimensions.get(i) {
            Some(dimension) => {
                fields.push(dimension.name.clone());
                fields.push(dimension.element.clone());
            }
            None => fields.extend([String::new(), String::new()]),
        }
    }
    fields
}

fn cloud_row(item: &CloudCostItem, config: &AllocationConfig) -> Vec<String> {
    let general = &config.general;
    let mut row = vec![
        item.date.clone(),
        item.instance.service.clone(),
        item.instance.instance.clone(),
        item.tags.to_serialized(),
        amount(item.cost.amortized),
        amount(item.cost.on_demand),
        item.currency.clone(),
    ];
    row.resize(ALLOCATED_COST_COLUMNS.len(), String::new());
    row.extend(dimension_fields(&item.dimensions, config));
    let empty = general.provider_meter_count * 3
        + general.product_dimension_count * 2
        + general.product_meter_count * 3;
    row.extend(std::iter::repeat_n(String::new(), empty));
    row.push(String::new());
    row
}

fn allocation_row(item: &AllocationCostItem, config: &AllocationConfig) -> Vec<String> {
    let general = &config.general;
    let has_product = item.product.is_some();
    let product_amount = |value: f64| if has_product { amount(value) } else { String::new() };

    let mut row = vec![
        item.date.clone(),
        item.consumer.service.clone(),
        item.consumer.instance.clone(),
        item.tags.to_serialized(),
        amount(item.cost.amortized),
        amount(item.cost.on_demand),
        item.currency.clone(),
        item.provider.service.clone(),
        item.provider.instance.clone(),
        item.provider_tag_selector.clone(),
        item.type_label().to_string(),
        amount(item.key),
        item.cloud_tag_selector.clone(),
        item.product.clone().unwrap_or_default(),
        product_amount(item.product_cost.amortized),
        product_amount(item.product_cost.on_demand),
    ];
    row.extend(dimension_fields(&item.dimensions, config));
    row.extend(meter_fields(&item.provider_meters, general.provider_meter_count));
    if has_product {
        row.extend(product_dimension_fields(
            &item.product_dimensions,
            general.product_dimension_count,
        ));
        row.extend(meter_fields(&item.product_meters, general.product_meter_count));
    } else {
        let empty = general.product_dimension_count * 2 + general.product_meter_count * 3;
        row.extend(std::iter::repeat_n(String::new(), empty));
    }
    row.push(item.is_final_consumption.to_string());
    row
}

// ============================================================================
// Allocated Cost Writer
// ============================================================================

/// Writes every cost item of a ledger, instances sorted by id.
///
/// Within an instance, cloud items come first, then the allocation items
/// the instance consumes.
pub struct AllocatedCostCsvWriter<W: Write> {
    writer: Writer<W>,
}

impl AllocatedCostCsvWriter<File> {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> AllocatedCostCsvWriter<W> {
    /// Wraps any writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Writer::from_writer(writer),
        }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered rows cannot be flushed.
    pub fn into_inner(self) -> Result<W, DataError> {
        self.writer
            .into_inner()
            .map_err(|e| DataError::Io(e.into_error()))
    }
}

impl<W: Write> AllocatedCostWriter for AllocatedCostCsvWriter<W> {
    type Error = DataError;

    fn write_allocated_costs(
        &mut self,
        costs: &AllocatedCosts,
        config: &AllocationConfig,
    ) -> Result<(), DataError> {
        let mut by_instance: BTreeMap<&InstanceId, (Vec<&CloudCostItem>, Vec<&AllocationCostItem>)> =
            BTreeMap::new();
        for item in &costs.cloud_items {
            by_instance.entry(&item.instance).or_default().0.push(item);
        }
        for item in &costs.allocation_items {
            by_instance.entry(&item.consumer).or_default().1.push(item);
        }

        self.writer.write_record(allocated_cost_headers(config))?;
        let mut rows = 0usize;
        for (cloud_items, allocation_items) in by_instance.values() {
            for item in cloud_items {
                self.writer.write_record(cloud_row(item, config))?;
            }
            for item in allocation_items {
                self.writer.write_record(allocation_row(item, config))?;
            }
            rows += cloud_items.len() + allocation_items.len();
        }
        self.writer.flush()?;

        info!(rows, instances = by_instance.len(), "Wrote allocated costs");
        Ok(())
    }
}

// ============================================================================
// Product Cost Writer
// ============================================================================

/// Writes the product cost items of a ledger.
pub struct ProductCostCsvWriter<W: Write> {
    writer: Writer<W>,
}

impl ProductCostCsvWriter<File> {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> ProductCostCsvWriter<W> {
    /// Wraps any writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Writer::from_writer(writer),
        }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered rows cannot be flushed.
    pub fn into_inner(self) -> Result<W, DataError> {
        self.writer
            .into_inner()
            .map_err(|e| DataError::Io(e.into_error()))
    }
}

impl<W: Write> AllocatedCostWriter for ProductCostCsvWriter<W> {
    type Error = DataError;

    fn write_allocated_costs(
        &mut self,
        costs: &AllocatedCosts,
        config: &AllocationConfig,
    ) -> Result<(), DataError> {
        self.writer.write_record(product_cost_headers(config))?;
        for item in &costs.product_items {
            let mut row = vec![
                item.date.clone(),
                item.product.product.clone(),
                item.product.meter.clone(),
                item.instance.service.clone(),
                item.instance.instance.clone(),
                item.provider.service.clone(),
                item.provider.instance.clone(),
                amount(item.cost.amortized),
                amount(item.cost.on_demand),
                item.currency.clone(),
                item.kind.to_string(),
            ];
            row.extend(dimension_fields(&item.dimensions, config));
            self.writer.write_record(row)?;
        }
        self.writer.flush()?;

        info!(rows = costs.product_items.len(), "Wrote product costs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccalloc_core::{AllocationType, CostAmounts, DeclarationOrigin, TagSet};

    fn config() -> AllocationConfig {
        let mut config = AllocationConfig::default();
        config.general.dimensions = vec!["Environment".to_string()];
        config.general.provider_meter_count = 1;
        config.general.product_meter_count = 1;
        config
    }

    fn allocation_item(consumer: &str, product: Option<&str>) -> AllocationCostItem {
        AllocationCostItem {
            date: "2024-01-31".to_string(),
            provider: InstanceId::service_default("db"),
            consumer: InstanceId::service_default(consumer),
            provider_tag_selector: String::new(),
            allocation_type: AllocationType::Key,
            origin: DeclarationOrigin::Declared,
            key: 2.0,
            cloud_tag_selector: String::new(),
            product: product.map(ToString::to_string),
            cost: CostAmounts::new(5.0, 6.0),
            product_cost: CostAmounts::new(5.0, 6.0),
            tags: TagSet::new(),
            dimensions: IndexMap::new(),
            provider_meters: vec![Meter::new("Storage", "GB", Some(3.0))],
            product_dimensions: Vec::new(),
            product_meters: Vec::new(),
            currency: "EUR".to_string(),
            is_final_consumption: product.is_some(),
        }
    }

    #[test]
    fn test_headers() {
        let headers = allocated_cost_headers(&config());
        assert_eq!(headers.len(), ALLOCATED_COST_COLUMNS.len() + 1 + 3 + 3 + 1);
        assert_eq!(headers[16], "Environment");
        assert_eq!(headers[17], "ProviderMeterName1");
        assert_eq!(headers[20], "ProductMeterName");
        assert_eq!(headers.last().map(String::as_str), Some("IsFinalConsumption"));
    }

    #[test]
    fn test_rows_match_header_width() {
        let config = config();
        let width = allocated_cost_headers(&config).len();
        let cloud = CloudCostItem::new(
            "2024-01-31",
            InstanceId::service_default("db"),
            CostAmounts::new(1.0, 2.0),
        );
        assert_eq!(cloud_row(&cloud, &config).len(), width);
        assert_eq!(allocation_row(&allocation_item("web", None), &config).len(), width);
        assert_eq!(allocation_row(&allocation_item("web", Some("shop")), &config).len(), width);
    }

    #[test]
    fn test_allocation_row_product_amounts() {
        let config = config();
        let row = allocation_row(&allocation_item("web", None), &config);
        assert_eq!(row[10], "Key");
        assert_eq!(row[14], "");
        assert_eq!(row[17], "Storage");
        assert_eq!(row[19], "3");
        assert_eq!(row.last().map(String::as_str), Some("false"));

        let row = allocation_row(&allocation_item("web", Some("shop")), &config);
        assert_eq!(row[13], "shop");
        assert_eq!(row[14], "5");
        assert_eq!(row.last().map(String::as_str), Some("true"));
    }

    #[test]
    fn test_write_sorted_by_instance() {
        let config = config();
        let costs = AllocatedCosts {
            cloud_items: vec![
                CloudCostItem::new("2024-01-31", InstanceId::service_default("web"), CostAmounts::ZERO),
                CloudCostItem::new("2024-01-31", InstanceId::service_default("db"), CostAmounts::ZERO),
            ],
            allocation_items: vec![allocation_item("web", None)],
            ..Default::default()
        };

        let mut writer = AllocatedCostCsvWriter::new(Vec::new());
        writer.write_allocated_costs(&costs, &config).unwrap();
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let services: Vec<&str> = output
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(1).unwrap_or_default())
            .collect();
        assert_eq!(services, vec!["db", "web", "web"]);
    }
}
