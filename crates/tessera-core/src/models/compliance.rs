//! Compliance status results.
//!
//! A compliance evaluation classifies each installed product as
//! covered (green), partially covered (yellow), or uncovered (red) at
//! one instant, and explains every non-green classification with a
//! reason record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::window::TemporalWindow;

/// Overall traffic-light summary of a [`ComplianceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    Valid,
    Partial,
    Invalid,
}

/// Keys used in [`ComplianceReason::attributes`].
pub mod reason_attr {
    pub const COVERED: &str = "covered";
    pub const ENTITLEMENT_ID: &str = "entitlement_id";
    pub const HAS: &str = "has";
    pub const PRODUCT_ID: &str = "product_id";
    pub const STACK_ID: &str = "stack_id";
}

/// Why a product or stack is not fully covered.
///
/// The key is the uppercased attribute name (`SOCKETS`, `RAM`, ...)
/// for dimension shortfalls, or one of the sentinel keys `NOTCOVERED`
/// and `UNMAPPEDGUEST`. The attribute bag carries the concrete values
/// (`has`/`covered`) and the id of the stack, entitlement, or product
/// the reason refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReason {
    pub key: String,
    pub message: String,
    pub attributes: BTreeMap<String, String>,
}

impl ComplianceReason {
    /// Sentinel key for installed products with no entitlement at all.
    pub const NOT_COVERED: &'static str = "NOTCOVERED";
    /// Sentinel key for coverage that only exists through an
    /// unmapped-guest entitlement.
    pub const UNMAPPED_GUEST: &'static str = "UNMAPPEDGUEST";
}

/// Point-in-time compliance picture for one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    /// The instant this status describes.
    pub date: DateTime<Utc>,
    /// First future instant at which the consumer stops being fully
    /// compliant. Only computed when currently fully compliant.
    pub compliant_until: Option<DateTime<Utc>>,
    /// Installed product id to the entitlements fully covering it.
    pub compliant_products: BTreeMap<String, Vec<Uuid>>,
    /// Installed product id to the entitlements partially covering it.
    pub partially_compliant_products: BTreeMap<String, Vec<Uuid>>,
    /// Stack id to that stack's entitlements, for stacks that do not
    /// fully cover the consumer's hardware.
    pub partial_stacks: BTreeMap<String, Vec<Uuid>>,
    /// Installed products with no entitlement at all.
    pub non_compliant_products: Vec<String>,
    /// For partially compliant consumers, the date range over which
    /// each product keeps its current classification.
    pub product_ranges: BTreeMap<String, TemporalWindow>,
    pub reasons: Vec<ComplianceReason>,
}

impl ComplianceStatus {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            compliant_until: None,
            compliant_products: BTreeMap::new(),
            partially_compliant_products: BTreeMap::new(),
            partial_stacks: BTreeMap::new(),
            non_compliant_products: Vec::new(),
            product_ranges: BTreeMap::new(),
            reasons: Vec::new(),
        }
    }

    /// Fully compliant: nothing uncovered, nothing partial.
    pub fn is_compliant(&self) -> bool {
        self.non_compliant_products.is_empty() && self.partially_compliant_products.is_empty()
    }

    /// At least one product has some coverage.
    pub fn is_partially_compliant(&self) -> bool {
        !self.compliant_products.is_empty() || !self.partially_compliant_products.is_empty()
    }

    /// Overall traffic light. Reasons count: an entitlement that is
    /// individually short (or temporary) keeps the consumer partial
    /// even when every installed product found full coverage.
    pub fn state(&self) -> ComplianceState {
        if !self.non_compliant_products.is_empty() {
            ComplianceState::Invalid
        } else if !self.partially_compliant_products.is_empty() || !self.reasons.is_empty() {
            ComplianceState::Partial
        } else {
            ComplianceState::Valid
        }
    }

    /// Record `entitlement_id` as fully covering `product_id`.
    pub fn add_compliant_product(&mut self, product_id: &str, entitlement_id: Uuid) {
        push_unique(
            self.compliant_products
                .entry(product_id.to_string())
                .or_default(),
            entitlement_id,
        );
    }

    /// Record `entitlement_id` as partially covering `product_id`.
    pub fn add_partially_compliant_product(&mut self, product_id: &str, entitlement_id: Uuid) {
        push_unique(
            self.partially_compliant_products
                .entry(product_id.to_string())
                .or_default(),
            entitlement_id,
        );
    }

    pub fn add_partial_stack(&mut self, stack_id: &str, entitlement_id: Uuid) {
        push_unique(
            self.partial_stacks.entry(stack_id.to_string()).or_default(),
            entitlement_id,
        );
    }

    pub fn add_non_compliant_product(&mut self, product_id: &str) {
        if !self.non_compliant_products.iter().any(|p| p == product_id) {
            self.non_compliant_products.push(product_id.to_string());
        }
    }
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}
