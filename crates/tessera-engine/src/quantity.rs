//! Suggested bind quantities and pool classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::models::attributes::attr;
use tessera_core::models::consumer::Consumer;

use crate::snapshot::{EntitlementView, PoolView};
use crate::stacking::StackTracker;

/// What a client should attach from a pool by default, and the step
/// size for adjusting that number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantitySuggestion {
    pub suggested: i64,
    pub increment: i64,
}

/// Suggest a quantity that makes the consumer compliant for this
/// pool's stack, taking already-held entitlements into account.
///
/// `existing` is the consumer's entitlements active on the target
/// date. Pools without multi-entitlement, and manifest consumers,
/// always get one.
pub fn suggested_quantity(
    pool: &PoolView<'_>,
    consumer: &Consumer,
    existing: &[EntitlementView<'_>],
) -> QuantitySuggestion {
    let attrs = pool.attrs();
    let mut suggestion = QuantitySuggestion {
        suggested: 1,
        increment: 1,
    };

    if !attrs.is_multi_entitlement() || consumer.kind.is_manifest() {
        return suggestion;
    }

    if let Some(stack_id) = attrs.stacking_id() {
        let mut tracker = StackTracker::from_pool(consumer, pool);
        for ent in existing {
            if ent.stack_id() == Some(stack_id) {
                tracker.add_entitlement(ent);
            }
        }
        let scope: Vec<PoolView<'_>> = existing.iter().map(|ent| ent.pool).collect();
        suggestion.suggested = tracker.quantity_to_cover(pool, &scope);
    }

    if attrs.has_product_attribute(attr::INSTANCE_MULTIPLIER) && !consumer.is_guest() {
        suggestion.increment = attrs.instance_multiplier();
    }
    suggestion
}

/// How many entitlements an unlimited pool is effectively worth to
/// this consumer. Autobind uses this as the capacity of pools that
/// otherwise have none.
pub fn suggested_pool_quantity(
    pool: &PoolView<'_>,
    consumer: &Consumer,
    existing: &[EntitlementView<'_>],
) -> i64 {
    let attrs = pool.attrs();
    if attrs.is_multi_entitlement() && attrs.is_stacked() {
        let mut tracker = StackTracker::from_pool(consumer, pool);
        let scope: Vec<PoolView<'_>> = existing.iter().map(|ent| ent.pool).collect();
        return tracker.quantity_to_cover(pool, &scope);
    }
    1
}

/// Client-facing pool category derived from the stacking and
/// multi-entitlement attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolComplianceType {
    InstanceBased,
    Stackable,
    UniqueStackable,
    MultiEntitlement,
    Standard,
    Unknown,
}

impl fmt::Display for PoolComplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InstanceBased => "instance based",
            Self::Stackable => "stackable",
            Self::UniqueStackable => "unique stackable",
            Self::MultiEntitlement => "multi entitlement",
            Self::Standard => "standard",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

pub fn classify_pool(pool: &PoolView<'_>) -> PoolComplianceType {
    let attrs = pool.attrs();
    let stacked = attrs.is_stacked();
    let multi = attrs.is_multi_entitlement();

    if attrs.has_product_attribute(attr::INSTANCE_MULTIPLIER) {
        if multi && stacked {
            return PoolComplianceType::InstanceBased;
        }
        return PoolComplianceType::Unknown;
    }
    match (stacked, multi) {
        (true, true) => PoolComplianceType::Stackable,
        (false, true) => PoolComplianceType::MultiEntitlement,
        (true, false) => PoolComplianceType::UniqueStackable,
        (false, false) => PoolComplianceType::Standard,
    }
}
