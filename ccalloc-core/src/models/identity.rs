//! Identity types for services, instances, and products.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service name used when neither tags nor configuration provide one.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Normalizes a service, instance, or product name (trimmed, lower-cased).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Instance Id
// ============================================================================

/// Identifies a service instance, the pivot unit of allocation.
///
/// Both parts are normalized on construction. An empty instance name
/// defaults to the service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    /// Service name.
    pub service: String,
    /// Instance name.
    pub instance: String,
}

impl InstanceId {
    /// Creates an instance id, defaulting the instance to the service.
    pub fn new(service: &str, instance: &str) -> Self {
        let service = normalize_name(service);
        let instance = normalize_name(instance);
        let instance = if instance.is_empty() {
            service.clone()
        } else {
            instance
        };
        Self { service, instance }
    }

    /// Creates the default instance of a service (instance named after the service).
    pub fn service_default(service: &str) -> Self {
        Self::new(service, "")
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.instance)
    }
}

// ============================================================================
// Product Key
// ============================================================================

/// Identifies a product and the meter its cost is scoped to.
///
/// The meter name is empty for products without a product meter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    /// Product name.
    pub product: String,
    /// Name of the product meter (may be empty).
    pub meter: String,
}

impl ProductKey {
    /// Creates a product key from a product and an optional meter name.
    pub fn new(product: &str, meter: Option<&str>) -> Self {
        Self {
            product: normalize_name(product),
            meter: meter.map(normalize_name).unwrap_or_default(),
        }
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.meter.is_empty() {
            write!(f, "{}", self.product)
        } else {
            write!(f, "{}.{}", self.product, self.meter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_defaults_to_service() {
        let id = InstanceId::new(" Storage ", "");
        assert_eq!(id.service, "storage");
        assert_eq!(id.instance, "storage");
        assert_eq!(id.to_string(), "storage.storage");
    }

    #[test]
    fn test_instance_is_normalized() {
        let id = InstanceId::new("Container", "EU-West");
        assert_eq!(id, InstanceId::new("container", "eu-west"));
    }

    #[test]
    fn test_product_key_display() {
        assert_eq!(ProductKey::new("Shop", None).to_string(), "shop");
        assert_eq!(ProductKey::new("Shop", Some("Orders")).to_string(), "shop.orders");
    }
}
