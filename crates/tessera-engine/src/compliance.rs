//! Consumer compliance evaluation.
//!
//! Takes a consumer and its entitlements and classifies every
//! installed product as covered, partially covered, or uncovered at
//! one instant. Entitlement windows are half-open, so an entitlement
//! contributes nothing at its own end date and the picture flips the
//! moment a window closes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tessera_core::models::compliance::{ComplianceReason, ComplianceStatus, reason_attr};
use tessera_core::models::attributes::attr;
use tessera_core::models::consumer::Consumer;
use tessera_core::models::window::TemporalWindow;
use tracing::debug;
use uuid::Uuid;

use crate::snapshot::{EntitlementView, PoolView};
use crate::stacking::{StackCoverage, StackTracker};

/// One compliance evaluation.
pub struct ComplianceRequest<'a> {
    pub consumer: &'a Consumer,
    /// Every entitlement the consumer holds, active or not; the
    /// evaluation filters by date itself so it can look ahead.
    pub entitlements: &'a [EntitlementView<'a>],
    pub as_of: DateTime<Utc>,
    /// Also work out when a currently compliant consumer stops being
    /// compliant.
    pub compute_compliant_until: bool,
    /// Also work out, per product, the date range over which its
    /// classification holds.
    pub compute_product_ranges: bool,
}

/// Evaluate the full compliance picture for a consumer.
pub fn status(request: &ComplianceRequest<'_>) -> ComplianceStatus {
    let mut status = status_on(request.consumer, request.entitlements, request.as_of);

    if request.compute_compliant_until && status.is_compliant() {
        status.compliant_until =
            compliant_until(request.consumer, request.entitlements, request.as_of);
    }
    if request.compute_product_ranges {
        status.product_ranges = product_ranges(
            request.consumer,
            request.entitlements,
            request.as_of,
            &status,
        );
    }
    status
}

/// Classify every installed product at one instant.
pub fn status_on(
    consumer: &Consumer,
    entitlements: &[EntitlementView<'_>],
    ondate: DateTime<Utc>,
) -> ComplianceStatus {
    let mut status = ComplianceStatus::new(ondate);

    // Distributors consume nothing themselves.
    if consumer.kind.is_manifest() {
        return status;
    }

    let active: Vec<EntitlementView<'_>> = entitlements
        .iter()
        .copied()
        .filter(|ent| ent.active_on(ondate))
        .collect();

    // Each stack is checked once per evaluation.
    let mut compliant_stacks: Vec<&str> = Vec::new();
    let mut partial_stacks: Vec<&str> = Vec::new();

    for ent in &active {
        let relevant: Vec<&str> = consumer
            .installed_products
            .iter()
            .map(|installed| installed.product_id.as_str())
            .filter(|pid| ent.pool.pool.provides(pid))
            .collect();
        debug!(entitlement = %ent.id(), products = relevant.len(), "checking entitlement");

        let mut partially_stacked = false;
        if let Some(stack_id) = ent.stack_id() {
            if partial_stacks.contains(&stack_id) {
                partially_stacked = true;
                status.add_partial_stack(stack_id, ent.id());
            } else if !compliant_stacks.contains(&stack_id) {
                let coverage = stack_coverage(consumer, stack_id, &active);
                if coverage.covered {
                    compliant_stacks.push(stack_id);
                } else {
                    partially_stacked = true;
                    status.add_partial_stack(stack_id, ent.id());
                    partial_stacks.push(stack_id);
                    status.reasons.extend(coverage.reasons);
                }
            }
        }

        // A lone entitlement is measured on its own.
        let single_coverage = if ent.stack_id().is_none() {
            Some(entitlement_coverage(consumer, ent, &active))
        } else {
            None
        };

        // Undersized coverage matters even when it backs no installed
        // product; the consumer still is not what it paid for.
        if relevant.is_empty() {
            if let Some(coverage) = &single_coverage {
                if !coverage.covered {
                    status.reasons.extend(coverage.reasons.iter().cloned());
                }
            }
        }

        // Coverage from a temporary pool can only ever be partial.
        if ent.pool.attrs().is_true(attr::UNMAPPED_GUESTS_ONLY) {
            status.reasons.push(unmapped_guest_reason(ent.id()));
        }

        for pid in relevant {
            if partially_stacked {
                status.add_partially_compliant_product(pid, ent.id());
                continue;
            }
            if let Some(coverage) = &single_coverage {
                if !coverage.covered {
                    status.add_partially_compliant_product(pid, ent.id());
                    status.reasons.extend(coverage.reasons.iter().cloned());
                    continue;
                }
            }
            status.add_compliant_product(pid, ent.id());
        }
    }

    // Full coverage beats partial for the same product. The stack
    // itself stays partial; it may back other products.
    let fully_covered: Vec<String> = status.compliant_products.keys().cloned().collect();
    status
        .partially_compliant_products
        .retain(|pid, _| !fully_covered.contains(pid));

    for installed in &consumer.installed_products {
        let pid = installed.product_id.as_str();
        if !status.compliant_products.contains_key(pid)
            && !status.partially_compliant_products.contains_key(pid)
        {
            status.add_non_compliant_product(pid);
            status.reasons.push(not_covered_reason(pid));
        }
    }

    dedup_reasons(&mut status.reasons);
    status
}

/// Coverage of one stack across all of the consumer's entitlements
/// carrying that stack id.
pub fn stack_coverage(
    consumer: &Consumer,
    stack_id: &str,
    entitlements: &[EntitlementView<'_>],
) -> StackCoverage {
    let mut tracker = StackTracker::new(consumer, Some(stack_id.to_string()));
    for ent in entitlements {
        if ent.stack_id() == Some(stack_id) {
            tracker.add_entitlement(ent);
        }
    }
    tracker.coverage(&scope_pools(entitlements))
}

/// Coverage provided by a single entitlement on its own.
pub fn entitlement_coverage(
    consumer: &Consumer,
    entitlement: &EntitlementView<'_>,
    entitlements: &[EntitlementView<'_>],
) -> StackCoverage {
    let mut tracker = StackTracker::new(consumer, None);
    tracker.add_entitlement(entitlement);
    tracker.coverage(&scope_pools(entitlements))
}

fn scope_pools<'a>(entitlements: &[EntitlementView<'a>]) -> Vec<PoolView<'a>> {
    entitlements.iter().map(|ent| ent.pool).collect()
}

/// First future instant at which the consumer stops being fully
/// compliant, assuming its entitlements stay as they are. Only end
/// dates can break compliance, and a window is already over at its
/// end date, so each candidate date is evaluated directly.
fn compliant_until(
    consumer: &Consumer,
    entitlements: &[EntitlementView<'_>],
    start: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if consumer.installed_products.is_empty() {
        return None;
    }

    let mut dates: Vec<DateTime<Utc>> = entitlements
        .iter()
        .filter(|ent| {
            consumer
                .installed_products
                .iter()
                .any(|installed| ent.pool.pool.provides(&installed.product_id))
        })
        .map(|ent| ent.entitlement.end_date)
        .collect();
    dates.sort();
    dates.dedup();

    for date in dates {
        if date <= start {
            continue;
        }
        if !status_on(consumer, entitlements, date).is_compliant() {
            return Some(date);
        }
    }
    None
}

/// For each product that has any coverage now, the contiguous window
/// over which its current classification (or better) holds.
fn product_ranges(
    consumer: &Consumer,
    entitlements: &[EntitlementView<'_>],
    ondate: DateTime<Utc>,
    baseline: &ComplianceStatus,
) -> BTreeMap<String, TemporalWindow> {
    let mut ranges = BTreeMap::new();
    if consumer.installed_products.is_empty() {
        return ranges;
    }

    let mut dates: Vec<DateTime<Utc>> = entitlements
        .iter()
        .flat_map(|ent| [ent.entitlement.start_date, ent.entitlement.end_date])
        .collect();
    dates.sort();
    dates.dedup();
    if dates.is_empty() {
        return ranges;
    }

    let pids: Vec<String> = consumer
        .installed_products
        .iter()
        .map(|installed| installed.product_id.clone())
        .filter(|pid| !baseline.non_compliant_products.contains(pid))
        .collect();
    if pids.is_empty() {
        return ranges;
    }

    let was_compliant = |pid: &str| baseline.compliant_products.contains_key(pid);
    let was_partial = |pid: &str| baseline.partially_compliant_products.contains_key(pid);

    // Walk backwards to find where each product's streak began. The
    // status at a boundary describes the period that starts there.
    let mut starts: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    let mut last_valid = ondate;
    for boundary in dates.iter().rev().filter(|d| **d <= ondate) {
        if starts.len() == pids.len() {
            break;
        }
        let then = status_on(consumer, entitlements, *boundary);
        for pid in &pids {
            if starts.contains_key(pid) {
                continue;
            }
            let degraded = then.non_compliant_products.iter().any(|p| p == pid)
                || (was_compliant(pid) && !then.compliant_products.contains_key(pid))
                || (was_partial(pid) && !then.partially_compliant_products.contains_key(pid));
            if degraded {
                starts.insert(pid.clone(), last_valid);
            }
        }
        last_valid = *boundary;
    }

    // Walk forwards to find where each streak ends. Moving from
    // partial to full does not end a streak.
    let mut ends: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    for boundary in dates.iter().filter(|d| **d > ondate) {
        if ends.len() == pids.len() {
            break;
        }
        let then = status_on(consumer, entitlements, *boundary);
        for pid in &pids {
            if ends.contains_key(pid) {
                continue;
            }
            let degraded = then.non_compliant_products.iter().any(|p| p == pid)
                || (was_compliant(pid) && !then.compliant_products.contains_key(pid))
                || (was_partial(pid)
                    && !then.partially_compliant_products.contains_key(pid)
                    && !then.compliant_products.contains_key(pid));
            if degraded {
                ends.insert(pid.clone(), *boundary);
            }
        }
    }

    let first = dates[0];
    let last = *dates.last().unwrap_or(&first);
    for pid in pids {
        let start = starts.get(&pid).copied().unwrap_or(first);
        let end = ends.get(&pid).copied().unwrap_or(last);
        ranges.insert(pid, TemporalWindow { start, end });
    }
    ranges
}

fn not_covered_reason(product_id: &str) -> ComplianceReason {
    let mut attributes = BTreeMap::new();
    attributes.insert(reason_attr::PRODUCT_ID.to_string(), product_id.to_string());
    ComplianceReason {
        key: ComplianceReason::NOT_COVERED.to_string(),
        message: format!("product {product_id} is not covered by any entitlement"),
        attributes,
    }
}

fn unmapped_guest_reason(entitlement_id: Uuid) -> ComplianceReason {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        reason_attr::ENTITLEMENT_ID.to_string(),
        entitlement_id.to_string(),
    );
    ComplianceReason {
        key: ComplianceReason::UNMAPPED_GUEST.to_string(),
        message: "coverage comes from a temporary unmapped guest entitlement".to_string(),
        attributes,
    }
}

/// The same shortfall can surface once per product it affects.
fn dedup_reasons(reasons: &mut Vec<ComplianceReason>) {
    let mut unique: Vec<ComplianceReason> = Vec::with_capacity(reasons.len());
    for reason in reasons.drain(..) {
        if !unique.contains(&reason) {
            unique.push(reason);
        }
    }
    *reasons = unique;
}
