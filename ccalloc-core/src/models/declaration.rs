//! Cost allocation declarations.
//!
//! A declaration is emitted by a provider instance and states that part of
//! its cost goes to a consumer instance, optionally on behalf of a product.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::identity::{InstanceId, ProductKey};
use super::tags::TagSet;
use crate::error::CoreError;
use crate::selector::TagSelector;

// ============================================================================
// Allocation Type
// ============================================================================

/// How the weight of a declaration is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AllocationType {
    /// Static weight given by the declaration key.
    #[default]
    Key,
    /// Weight is the consumer's own amortized cost, resolved after a first pass.
    Cost,
    /// Weight is the amortized cost of the cloud items matching a cloud tag selector.
    CloudTagSelector,
}

impl AllocationType {
    /// Returns the name used in allocation key files.
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationType::Key => "Key",
            AllocationType::Cost => "Cost",
            AllocationType::CloudTagSelector => "CloudTagSelector",
        }
    }
}

impl fmt::Display for AllocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "Key" => Ok(AllocationType::Key),
            "Cost" => Ok(AllocationType::Cost),
            "CloudTagSelector" => Ok(AllocationType::CloudTagSelector),
            other => Err(CoreError::InvalidData(format!(
                "Unknown cost allocation type '{other}'"
            ))),
        }
    }
}

/// Where a declaration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeclarationOrigin {
    /// Read from an allocation key source.
    #[default]
    Declared,
    /// Expanded from a `CloudTagSelector` declaration, one per consumer instance.
    CloudTagSelector,
    /// Synthesized from consumer or product tags found on a cost item.
    ConsumerTag,
}

impl DeclarationOrigin {
    /// Returns the label written to reports for this origin and type.
    pub fn report_label(&self, allocation_type: AllocationType) -> &'static str {
        match self {
            DeclarationOrigin::ConsumerTag => "ConsumerTag",
            _ => allocation_type.as_str(),
        }
    }
}

// ============================================================================
// Meters and Product Dimensions
// ============================================================================

/// A usage meter reported alongside an allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    /// Meter name.
    pub name: String,
    /// Unit of the value.
    pub unit: String,
    /// Metered value, if any.
    pub value: Option<f64>,
}

impl Meter {
    /// Creates a meter.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            value,
        }
    }
}

/// A product dimension (name/element pair).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDimension {
    /// Dimension name.
    pub name: String,
    /// Dimension element.
    pub element: String,
}

// ============================================================================
// Allocation Declaration
// ============================================================================

/// A cost allocation declaration of a provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDeclaration {
    /// Formatted date.
    pub date: String,
    /// Instance whose cost is allocated.
    pub provider: InstanceId,
    /// Restricts the provider cost items taken into account; `None` is the default selector.
    pub provider_tag_selector: Option<TagSelector>,
    /// How the weight is obtained.
    pub allocation_type: AllocationType,
    /// Static weight (for `Key` and expanded `CloudTagSelector` declarations).
    pub key: f64,
    /// Selector over cloud items, for `CloudTagSelector` declarations.
    pub cloud_tag_selector: Option<TagSelector>,
    /// Instance receiving the cost.
    pub consumer: InstanceId,
    /// Product the cost is consumed on behalf of.
    pub product: Option<String>,
    /// Product dimensions.
    #[serde(default)]
    pub product_dimensions: Vec<ProductDimension>,
    /// Product meters; the first one scopes product cost routing.
    #[serde(default)]
    pub product_meters: Vec<Meter>,
    /// Provider meters.
    #[serde(default)]
    pub provider_meters: Vec<Meter>,
    /// Consumer tags.
    #[serde(default)]
    pub tags: TagSet,
    /// Consumer dimension values.
    #[serde(default)]
    pub dimensions: IndexMap<String, String>,
    /// Currency, inherited from cloud items when empty.
    #[serde(default)]
    pub currency: String,
    /// Where the declaration comes from.
    #[serde(default)]
    pub origin: DeclarationOrigin,
}

impl AllocationDeclaration {
    /// Creates a `Key` declaration from `provider` to `consumer`.
    pub fn new(provider: InstanceId, consumer: InstanceId, key: f64) -> Self {
        Self {
            date: String::new(),
            provider,
            provider_tag_selector: None,
            allocation_type: AllocationType::Key,
            key,
            cloud_tag_selector: None,
            consumer,
            product: None,
            product_dimensions: Vec::new(),
            product_meters: Vec::new(),
            provider_meters: Vec::new(),
            tags: TagSet::new(),
            dimensions: IndexMap::new(),
            currency: String::new(),
            origin: DeclarationOrigin::Declared,
        }
    }

    /// Sets the allocation type (builder style).
    #[must_use]
    pub fn with_type(mut self, allocation_type: AllocationType) -> Self {
        self.allocation_type = allocation_type;
        self
    }

    /// Sets the product (builder style).
    #[must_use]
    pub fn with_product(mut self, product: &str) -> Self {
        let product = product.trim().to_lowercase();
        self.product = (!product.is_empty()).then_some(product);
        self
    }

    /// Sets the provider tag selector (builder style).
    #[must_use]
    pub fn with_provider_tag_selector(mut self, selector: TagSelector) -> Self {
        self.provider_tag_selector = Some(selector);
        self
    }

    /// Sets the cloud tag selector (builder style).
    #[must_use]
    pub fn with_cloud_tag_selector(mut self, selector: TagSelector) -> Self {
        self.cloud_tag_selector = Some(selector);
        self
    }

    /// Sets the consumer tags (builder style).
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Returns true if the consumer is the provider itself.
    ///
    /// Self consumption materializes final consumption (typically on
    /// behalf of a product) and never feeds back into the provider cost.
    pub fn is_self_consumption(&self) -> bool {
        self.provider == self.consumer
    }

    /// Returns the first product meter, which scopes product cost routing.
    pub fn product_meter(&self) -> Option<&Meter> {
        self.product_meters.first()
    }

    /// Returns the product key of this declaration, if it names a product.
    pub fn product_key(&self) -> Option<ProductKey> {
        self.product.as_deref().map(|product| {
            ProductKey::new(product, self.product_meters.first().map(|m| m.name.as_str()))
        })
    }

    /// Returns the provider tag selector text, empty for the default selector.
    pub fn provider_tag_selector_text(&self) -> &str {
        self.provider_tag_selector
            .as_ref()
            .map_or("", TagSelector::as_str)
    }
}
