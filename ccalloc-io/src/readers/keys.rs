//! Cost allocation keys CSV reader.
//!
//! Each row is a declaration of a provider instance. Rows that cannot be
//! used (no provider service, unknown allocation type, missing or zero
//! key) are skipped with an error log; malformed selectors abort the read.
//!
//! The consumer is resolved in this order: consumer tags through the
//! configured tag keys, then the explicit `ConsumerService`,
//! `ConsumerInstance` and `Consumer<Dimension>` columns. A row naming a
//! product without a consumer is self consumption; a row naming neither
//! goes to the default service.

use ccalloc_core::{
    AllocationConfig, AllocationDeclaration, AllocationType, DeclarationReader, InstanceId, Meter,
    ProductDimension, TagSelector, TagSet,
};
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info};

use super::{line_of, Columns};
use crate::error::DataError;

/// Reads cost allocation declarations from a CSV file.
pub struct KeysCsvReader<R> {
    reader: csv::Reader<R>,
    source: String,
}

impl KeysCsvReader<File> {
    /// Opens a cost allocation keys file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: Read> KeysCsvReader<R> {
    /// Wraps any reader; `source` names it in logs.
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        let reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        Self {
            reader,
            source: source.into(),
        }
    }
}

impl<R: Read> DeclarationReader for KeysCsvReader<R> {
    type Error = DataError;

    fn read_declarations(
        &mut self,
        config: &AllocationConfig,
    ) -> Result<Vec<AllocationDeclaration>, DataError> {
        debug!(source = %self.source, "Reading cost allocation keys");
        let columns = Columns::new(self.reader.headers()?);
        columns.require(&["ProviderService"])?;

        let mut declarations = Vec::new();
        let mut skipped = 0usize;
        for result in self.reader.records() {
            let row = result?;
            match read_row(&columns, &row, config)? {
                Some(declaration) => declarations.push(declaration),
                None => skipped += 1,
            }
        }

        info!(
            source = %self.source,
            count = declarations.len(),
            skipped,
            "Read cost allocation keys"
        );
        Ok(declarations)
    }
}

// ============================================================================
// Row Parsing
// ============================================================================

fn read_row(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> Result<Option<AllocationDeclaration>, DataError> {
    let line = line_of(row);

    let provider_service = columns.get(row, "ProviderService").to_lowercase();
    if provider_service.is_empty() {
        error!(line, "Skipping cost allocation key line without ProviderService");
        return Ok(None);
    }
    let provider = InstanceId::new(&provider_service, columns.get(row, "ProviderInstance"));

    let allocation_type = match columns.get(row, "ProviderCostAllocationType").parse::<AllocationType>() {
        Ok(allocation_type) => allocation_type,
        Err(err) => {
            error!(line, provider = %provider, %err, "Skipping cost allocation key line");
            return Ok(None);
        }
    };

    let provider_tag_selector = TagSelector::parse_optional(columns.get(row, "ProviderTagSelector"))?;

    let mut key = 0.0;
    let mut cloud_tag_selector = None;
    match allocation_type {
        AllocationType::Key => {
            let text = columns.get(row, "ProviderCostAllocationKey");
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() && value != 0.0 => key = value,
                _ => {
                    error!(
                        line,
                        provider = %provider,
                        key = text,
                        "Skipping cost allocation key line with missing, zero, or non-numeric key"
                    );
                    return Ok(None);
                }
            }
        }
        AllocationType::CloudTagSelector => {
            let text = columns.get(row, "ProviderCostAllocationCloudTagSelector");
            cloud_tag_selector = TagSelector::parse_optional(text)?;
            if cloud_tag_selector.is_none() {
                error!(
                    line,
                    provider = %provider,
                    "Skipping CloudTagSelector line without ProviderCostAllocationCloudTagSelector"
                );
                return Ok(None);
            }
        }
        AllocationType::Cost => {}
    }

    // Consumer tags first, explicit consumer columns take precedence
    let tags = TagSet::parse_serialized(columns.get(row, "ConsumerTags"));
    let mut consumer_service = tags
        .resolve(&config.tag_keys.service)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();
    let mut consumer_instance = tags
        .resolve(&config.tag_keys.instance)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();
    let mut dimensions = config.resolve_dimensions(&tags);

    let explicit_service = columns.get(row, "ConsumerService");
    if !explicit_service.is_empty() {
        consumer_service = explicit_service.to_lowercase();
    }
    let explicit_instance = columns.get(row, "ConsumerInstance");
    if !explicit_instance.is_empty() {
        consumer_instance = explicit_instance.to_lowercase();
    }
    for dimension in &config.general.dimensions {
        let value = columns.get(row, &format!("Consumer{dimension}"));
        if !value.is_empty() {
            dimensions.insert(dimension.clone(), value.to_lowercase());
        }
    }

    let product = columns.get(row, "Product");
    let consumer = if !consumer_service.is_empty() {
        InstanceId::new(&consumer_service, &consumer_instance)
    } else if !product.is_empty() {
        provider.clone()
    } else {
        InstanceId::service_default(config.fallback_service())
    };

    let mut declaration = AllocationDeclaration::new(provider, consumer, key)
        .with_type(allocation_type)
        .with_product(product)
        .with_tags(tags);
    declaration.date = columns.get(row, "Date").to_string();
    declaration.provider_tag_selector = provider_tag_selector;
    declaration.cloud_tag_selector = cloud_tag_selector;
    declaration.dimensions = dimensions;
    declaration.provider_meters = read_provider_meters(columns, row, config, line);
    if declaration.product.is_some() {
        declaration.product_dimensions = read_product_dimensions(columns, row, config);
        declaration.product_meters = read_product_meters(columns, row, config, line);
    }
    Ok(Some(declaration))
}

fn read_meter(
    columns: &Columns,
    row: &StringRecord,
    [name_col, unit_col, value_col]: [&str; 3],
    line: u64,
) -> Option<Meter> {
    let name = columns.get(row, name_col);
    let unit = columns.get(row, unit_col);
    let value_text = columns.get(row, value_col);
    let value = if value_text.is_empty() {
        None
    } else if let Ok(value) = value_text.parse::<f64>() {
        Some(value)
    } else {
        error!(line, column = value_col, value = value_text, "Meter value is not a number");
        None
    };

    (!name.is_empty() || !unit.is_empty() || value.is_some()).then(|| Meter::new(name, unit, value))
}

fn read_provider_meters(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
    line: u64,
) -> Vec<Meter> {
    (1..=config.general.provider_meter_count)
        .filter_map(|i| {
            let names = [
                format!("ProviderMeterName{i}"),
                format!("ProviderMeterUnit{i}"),
                format!("ProviderMeterValue{i}"),
            ];
            read_meter(columns, row, [names[0].as_str(), names[1].as_str(), names[2].as_str()], line)
        })
        .collect()
}

/// Product meter columns carry no index for the first meter.
fn read_product_meters(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
    line: u64,
) -> Vec<Meter> {
    (1..=config.general.product_meter_count)
        .filter_map(|i| {
            let suffix = if i == 1 { String::new() } else { i.to_string() };
            let names = [
                format!("ProductMeterName{suffix}"),
                format!("ProductMeterUnit{suffix}"),
                format!("ProductMeterValue{suffix}"),
            ];
            read_meter(columns, row, [names[0].as_str(), names[1].as_str(), names[2].as_str()], line)
        })
        .collect()
}

fn read_product_dimensions(
    columns: &Columns,
    row: &StringRecord,
    config: &AllocationConfig,
) -> Vec<ProductDimension> {
    (1..=config.general.product_dimension_count)
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
