//! Cloud cost types.
//!
//! This module contains the cost side of the data model:
//! - [`CostAmounts`] - The two parallel cost metrics
//! - [`Metric`] - Selects one of the metrics
//! - [`CloudCostRecord`] - A raw billing line handed over by a reader
//! - [`CloudCostItem`] - A billing line resolved to its owning instance

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

use super::identity::InstanceId;
use super::tags::TagSet;

// ============================================================================
// Cost Amounts
// ============================================================================

/// The two cost metrics propagated independently through the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostAmounts {
    /// Amortized cost (reservations and savings plans spread over usage).
    pub amortized: f64,
    /// On-demand cost (list price).
    pub on_demand: f64,
}

impl CostAmounts {
    /// Zero for both metrics.
    pub const ZERO: Self = Self {
        amortized: 0.0,
        on_demand: 0.0,
    };

    /// Creates an amount pair.
    pub fn new(amortized: f64, on_demand: f64) -> Self {
        Self {
            amortized,
            on_demand,
        }
    }

    /// Returns the value of one metric.
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Amortized => self.amortized,
            Metric::OnDemand => self.on_demand,
        }
    }

    /// Sets the value of one metric.
    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Amortized => self.amortized = value,
            Metric::OnDemand => self.on_demand = value,
        }
    }

    /// Returns true if both metrics are within `tolerance` of zero.
    pub fn is_negligible(&self, tolerance: f64) -> bool {
        self.amortized.abs() <= tolerance && self.on_demand.abs() <= tolerance
    }
}

impl Add for CostAmounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.amortized + rhs.amortized, self.on_demand + rhs.on_demand)
    }
}

impl AddAssign for CostAmounts {
    fn add_assign(&mut self, rhs: Self) {
        self.amortized += rhs.amortized;
        self.on_demand += rhs.on_demand;
    }
}

impl Sub for CostAmounts {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.amortized - rhs.amortized, self.on_demand - rhs.on_demand)
    }
}

impl std::iter::Sum for CostAmounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Selects one of the two cost metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Amortized cost.
    Amortized,
    /// On-demand cost.
    OnDemand,
}

impl Metric {
    /// Both metrics, amortized first.
    pub const ALL: [Metric; 2] = [Metric::Amortized, Metric::OnDemand];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Amortized => write!(f, "amortized"),
            Metric::OnDemand => write!(f, "on-demand"),
        }
    }
}

// ============================================================================
// Cloud Cost Record
// ============================================================================

/// A billing line as read from a cloud cost export, before tag resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudCostRecord {
    /// Formatted date of the billing line.
    pub date: String,
    /// Amortized cost.
    pub amortized_cost: f64,
    /// On-demand cost.
    pub on_demand_cost: f64,
    /// Billing currency.
    pub currency: String,
    /// Resource tags.
    pub tags: TagSet,
    /// Owner forced by the reader (e.g. unused commitments), bypassing tag resolution.
    #[serde(default)]
    pub forced_instance: Option<InstanceId>,
    /// Dimension values forced by the reader.
    #[serde(default)]
    pub forced_dimensions: IndexMap<String, String>,
}

// ============================================================================
// Cloud Cost Item
// ============================================================================

/// A cloud billing line attributed to its owning service instance.
///
/// Built from a [`CloudCostRecord`] by
/// [`AllocationConfig::resolve_cloud_item`](crate::AllocationConfig::resolve_cloud_item)
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudCostItem {
    /// Formatted date of the billing line.
    pub date: String,
    /// Owning instance.
    pub instance: InstanceId,
    /// Dimension values by dimension name.
    pub dimensions: IndexMap<String, String>,
    /// Resource tags.
    pub tags: TagSet,
    /// Cost amounts.
    pub cost: CostAmounts,
    /// Billing currency.
    pub currency: String,
    /// True if no service tag was found and no default service applied.
    pub unresolved: bool,
}

impl CloudCostItem {
    /// Creates an item owned by `instance` with no tags or dimensions.
    pub fn new(date: impl Into<String>, instance: InstanceId, cost: CostAmounts) -> Self {
        Self {
            date: date.into(),
            instance,
            dimensions: IndexMap::new(),
            tags: TagSet::new(),
            cost,
            currency: String::new(),
            unresolved: false,
        }
    }

    /// Sets the tags (builder style).
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the currency (builder style).
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}
