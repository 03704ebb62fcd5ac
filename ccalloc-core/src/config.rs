//! Allocation configuration.
//!
//! The configuration is an immutable value handed to the engine at
//! construction time. Tag key lists are ordered: the first key present on
//! an item wins.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;
use crate::models::{
    normalize_name, CloudCostItem, CloudCostRecord, CostAmounts, InstanceId, TagSet,
    UNKNOWN_SERVICE,
};

/// Default bound on cycle breaks.
pub const DEFAULT_MAX_BREAKS: usize = 10;

/// Default date format.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Configuration Sections
// ============================================================================

/// Complete allocation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllocationConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Tag key resolution lists.
    #[serde(default)]
    pub tag_keys: TagKeyConfig,
    /// Cycle breaking settings.
    #[serde(default)]
    pub cycles: CycleConfig,
    /// Owner of unused commitments in FOCUS exports.
    #[serde(default)]
    pub focus_unused_commitment: Option<UnusedCommitmentConfig>,
    /// Owner of unused reservations in Azure EA exports.
    #[serde(default)]
    pub azure_unused_reservation: Option<UnusedCommitmentConfig>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `chrono` format of dates in inputs and outputs.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Service owning items without a service tag.
    #[serde(default)]
    pub default_service: Option<String>,
    /// Product receiving cost left over at instances that forward nothing to products.
    #[serde(default)]
    pub default_product: Option<String>,
    /// Dimension names, in report order.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Number of provider meter column groups.
    #[serde(default)]
    pub provider_meter_count: usize,
    /// Number of product dimension column groups.
    #[serde(default)]
    pub product_dimension_count: usize,
    /// Number of product meter column groups.
    #[serde(default)]
    pub product_meter_count: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            date_format: Some(DEFAULT_DATE_FORMAT.to_string()),
            default_service: None,
            default_product: None,
            dimensions: Vec::new(),
            provider_meter_count: 0,
            product_dimension_count: 0,
            product_meter_count: 0,
        }
    }
}

/// Ordered tag key lists per logical field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TagKeyConfig {
    /// Keys holding the service name.
    #[serde(default)]
    pub service: Vec<String>,
    /// Keys holding the instance name.
    #[serde(default)]
    pub instance: Vec<String>,
    /// Keys holding a consumer service name.
    #[serde(default)]
    pub consumer_service: Vec<String>,
    /// Consumer service values meaning "no consumer".
    #[serde(default = "default_ignored_values")]
    pub consumer_service_ignored_values: Vec<String>,
    /// Keys holding a consumer instance name.
    #[serde(default)]
    pub consumer_instance: Vec<String>,
    /// Keys holding a product name.
    #[serde(default)]
    pub product: Vec<String>,
    /// Keys per dimension.
    #[serde(default)]
    pub dimensions: IndexMap<String, Vec<String>>,
    /// Consumer keys per dimension.
    #[serde(default)]
    pub consumer_dimensions: IndexMap<String, Vec<String>>,
}

fn default_ignored_values() -> Vec<String> {
    vec!["-".to_string()]
}

/// Cycle breaking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleConfig {
    /// Services in precedence order.
    #[serde(default)]
    pub service_precedence: Vec<String>,
    /// Maximum number of edges removed to break cycles.
    #[serde(default = "default_max_breaks")]
    pub max_breaks: usize,
}

fn default_max_breaks() -> usize {
    DEFAULT_MAX_BREAKS
}

impl CycleConfig {
    /// Returns the rank of a service in the precedence list (0 is highest).
    pub fn precedence_rank(&self, service: &str) -> Option<usize> {
        self.service_precedence.iter().position(|s| s == service)
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            service_precedence: Vec::new(),
            max_breaks: DEFAULT_MAX_BREAKS,
        }
    }
}

/// Owner of unused commitment lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnusedCommitmentConfig {
    /// Service owning unused commitments.
    pub service: String,
    /// Instance owning unused commitments (defaults to the service).
    #[serde(default)]
    pub instance: Option<String>,
    /// Dimension values of unused commitments.
    #[serde(default)]
    pub dimensions: IndexMap<String, String>,
}

impl UnusedCommitmentConfig {
    /// Returns the owning instance.
    pub fn owner(&self) -> InstanceId {
        InstanceId::new(&self.service, self.instance.as_deref().unwrap_or_default())
    }

    /// Returns the normalized values of the configured dimensions.
    pub fn dimension_values(&self, dimensions: &[String]) -> IndexMap<String, String> {
        self.dimensions
            .iter()
            .filter(|(name, _)| dimensions.contains(name))
            .map(|(name, value)| (name.clone(), value.trim().to_lowercase()))
            .collect()
    }
}

// ============================================================================
// Normalization and Validation
// ============================================================================

fn normalize_list(list: &mut [String]) {
    for item in list.iter_mut() {
        *item = normalize_name(item);
    }
}

fn normalize_option(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = normalize_name(v);
    }
    if value.as_deref().is_some_and(str::is_empty) {
        *value = None;
    }
}

impl AllocationConfig {
    /// Returns a copy with every name and tag key normalized.
    ///
    /// Dimension names keep their case since they are report column names.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        normalize_option(&mut self.general.default_service);
        normalize_option(&mut self.general.default_product);
        for dimension in &mut self.general.dimensions {
            *dimension = dimension.trim().to_string();
        }

        let keys = &mut self.tag_keys;
        normalize_list(&mut keys.service);
        normalize_list(&mut keys.instance);
        normalize_list(&mut keys.consumer_service);
        normalize_list(&mut keys.consumer_service_ignored_values);
        normalize_list(&mut keys.consumer_instance);
        normalize_list(&mut keys.product);
        for list in keys.dimensions.values_mut() {
            normalize_list(list);
        }
        for list in keys.consumer_dimensions.values_mut() {
            normalize_list(list);
        }

        normalize_list(&mut self.cycles.service_precedence);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for duplicate dimensions, a zero
    /// cycle break bound, empty tag keys, or an invalid date format.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cycles.max_breaks == 0 {
            return Err(CoreError::InvalidConfig(
                "cycles.max_breaks must be at least 1".to_string(),
            ));
        }

        for (i, dimension) in self.general.dimensions.iter().enumerate() {
            if dimension.is_empty() {
                return Err(CoreError::InvalidConfig("Empty dimension name".to_string()));
            }
            if self.general.dimensions[..i].contains(dimension) {
                return Err(CoreError::InvalidConfig(format!(
                    "Duplicate dimension '{dimension}'"
                )));
            }
        }

        for dimension in self
            .tag_keys
            .dimensions
            .keys()
            .chain(self.tag_keys.consumer_dimensions.keys())
        {
            if !self.general.dimensions.contains(dimension) {
                return Err(CoreError::InvalidConfig(format!(
                    "Tag keys configured for unknown dimension '{dimension}'"
                )));
            }
        }

        let keys = &self.tag_keys;
        let all_keys = keys
            .service
            .iter()
            .chain(&keys.instance)
            .chain(&keys.consumer_service)
            .chain(&keys.consumer_instance)
            .chain(&keys.product)
            .chain(keys.dimensions.values().flatten())
            .chain(keys.consumer_dimensions.values().flatten());
        for key in all_keys {
            if key.trim().is_empty() {
                return Err(CoreError::InvalidConfig("Empty tag key".to_string()));
            }
        }

        let sample = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default();
        let formatted = sample.format(self.date_format()).to_string();
        if NaiveDate::parse_from_str(&formatted, self.date_format()).is_err() {
            return Err(CoreError::InvalidConfig(format!(
                "Date format '{}' cannot round-trip a date",
                self.date_format()
            )));
        }

        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the date format.
    pub fn date_format(&self) -> &str {
        match self.general.date_format.as_deref() {
            Some(format) if !format.trim().is_empty() => format,
            _ => DEFAULT_DATE_FORMAT,
        }
    }

    /// Formats a date with the configured format.
    pub fn format_date(&self, date: NaiveDate) -> String {
        date.format(self.date_format()).to_string()
    }

    /// Returns the service used when an item carries no service tag.
    pub fn fallback_service(&self) -> &str {
        self.general
            .default_service
            .as_deref()
            .unwrap_or(UNKNOWN_SERVICE)
    }

    /// Returns true if a consumer service tag value means "no consumer".
    pub fn is_ignored_consumer_service(&self, value: &str) -> bool {
        self.tag_keys
            .consumer_service_ignored_values
            .iter()
            .any(|v| v == value)
    }

    // ========================================================================
    // Tag Resolution
    // ========================================================================

    /// Resolves the dimension values of a tag set.
    pub fn resolve_dimensions(&self, tags: &TagSet) -> IndexMap<String, String> {
        self.resolve_dimension_keys(tags, &self.tag_keys.dimensions)
    }

    /// Resolves the consumer dimension values of a tag set.
    pub fn resolve_consumer_dimensions(&self, tags: &TagSet) -> IndexMap<String, String> {
        self.resolve_dimension_keys(tags, &self.tag_keys.consumer_dimensions)
    }

    fn resolve_dimension_keys(
        &self,
        tags: &TagSet,
        keys: &IndexMap<String, Vec<String>>,
    ) -> IndexMap<String, String> {
        let mut dimensions = IndexMap::new();
        for dimension in &self.general.dimensions {
            if let Some((_, value)) = keys.get(dimension).and_then(|k| tags.resolve(k)) {
                dimensions.insert(dimension.clone(), value.to_string());
            }
        }
        dimensions
    }

    /// Resolves the owning instance of a tag set.
    ///
    /// Returns the instance and whether the service had to fall back to
    /// [`fallback_service`](Self::fallback_service).
    pub fn resolve_instance(&self, tags: &TagSet) -> (InstanceId, bool) {
        let service = tags.resolve(&self.tag_keys.service).map(|(_, v)| v);
        let instance = tags
            .resolve(&self.tag_keys.instance)
            .map(|(_, v)| v)
            .unwrap_or_default();
        match service {
            Some(service) if !service.is_empty() => (InstanceId::new(service, instance), false),
            _ => (InstanceId::new(self.fallback_service(), instance), true),
        }
    }

    /// Resolves a cloud cost record into a cloud cost item.
    ///
    /// Records whose service cannot be resolved are attributed to the
    /// default service, or to the `unknown` service when none is
    /// configured; in the latter case the item is flagged as unresolved.
    pub fn resolve_cloud_item(&self, record: CloudCostRecord) -> CloudCostItem {
        let (instance, fell_back) = match record.forced_instance {
            Some(instance) => (instance, false),
            None => self.resolve_instance(&record.tags),
        };
        let unresolved = fell_back && self.general.default_service.is_none();
        if unresolved {
            warn!(
                tags = %record.tags.to_serialized(),
                "Cost item has no service tag and no default service is configured"
            );
        }

        let mut dimensions = self.resolve_dimensions(&record.tags);
        for (name, value) in record.forced_dimensions {
            dimensions.insert(name, value);
        }

        CloudCostItem {
            date: record.date,
            instance,
            dimensions,
            tags: record.tags,
            cost: CostAmounts::new(record.amortized_cost, record.on_demand_cost),
            currency: record.currency.trim().to_string(),
            unresolved,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
