//! Stack trackers and coverage arithmetic.
//!
//! A [`StackTracker`] accumulates the hardware dimensions provided by
//! a set of entitlements (or simulated entitlements from a pool) and
//! compares them against the consumer's reported facts. One plain
//! entitlement and a whole stack are tracked the same way; a stack is
//! just a tracker more than one entitlement feeds.

use std::collections::BTreeMap;

use tessera_core::models::attributes::{AttributeMap, attr};
use tessera_core::models::compliance::{ComplianceReason, reason_attr};
use tessera_core::models::consumer::{Consumer, ConsumerKind};
use uuid::Uuid;

use crate::snapshot::{EntitlementView, PoolView};

/// Dimensions checked for physical consumers.
pub const PHYSICAL_ATTRIBUTES: &[&str] = &[
    attr::SOCKETS,
    attr::CORES,
    attr::RAM,
    attr::ARCH,
    attr::GUEST_LIMIT,
    attr::STORAGE_BAND,
];

/// Dimensions checked for virtual guests.
pub const VIRT_ATTRIBUTES: &[&str] = &[
    attr::VCPU,
    attr::RAM,
    attr::ARCH,
    attr::GUEST_LIMIT,
    attr::STORAGE_BAND,
];

/// Dimensions a host-restricted pool exempts its guest from.
const UNCHECKED_WHEN_HOST_RESTRICTED: &[&str] = &[attr::RAM, attr::VCPU];

/// The dimension set that applies to a consumer.
pub fn compliance_attributes(consumer: &Consumer) -> &'static [&'static str] {
    if consumer.is_guest() {
        VIRT_ATTRIBUTES
    } else {
        PHYSICAL_ATTRIBUTES
    }
}

/// The consumer-side value a dimension attribute is compared against.
pub fn fact_value(consumer: &Consumer, attribute: &str) -> i64 {
    match attribute {
        attr::SOCKETS => consumer.sockets(),
        attr::CORES => consumer.total_cores(),
        // vcpu counts total cores, same as the physical cores check.
        attr::VCPU => consumer.total_cores(),
        attr::RAM => consumer.ram_gb(),
        attr::STORAGE_BAND => consumer.storage_band_usage(),
        attr::GUEST_LIMIT => consumer.active_guest_count(),
        _ => 1,
    }
}

/// Does a product arch declaration (comma-separated, e.g.
/// `"x86_64,ppc64"`) cover the consumer's reported machine arch?
///
/// Non-system consumers without an arch fact always pass, as does a
/// product with no arch declaration. An `ALL` entry matches anything
/// and `X86` implies the i386/i586/i686 variants.
pub fn architecture_matches(
    product_arch: Option<&str>,
    consumer_arch: Option<&str>,
    kind: ConsumerKind,
) -> bool {
    if consumer_arch.is_none() && kind != ConsumerKind::System {
        return true;
    }
    let Some(product_arch) = product_arch else {
        return true;
    };

    let mut supported: Vec<String> = product_arch
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .collect();
    if supported.iter().any(|a| a == "X86") {
        supported.push("I386".into());
        supported.push("I586".into());
        supported.push("I686".into());
    }

    if supported.iter().any(|a| a == "ALL") {
        return true;
    }
    match consumer_arch {
        Some(arch) => {
            let arch = arch.to_uppercase();
            supported.iter().any(|a| *a == arch)
        }
        None => false,
    }
}

/// Highest `guest_limit` granted by any entitlement in scope. `None`
/// when nothing in scope carries the attribute; `Some(-1)` means one
/// of them grants unlimited guests.
pub fn global_guest_limit(scope_pools: &[PoolView<'_>]) -> Option<i64> {
    let mut total: Option<i64> = None;
    for pool in scope_pools {
        let Some(value) = pool.attrs().product_attribute(attr::GUEST_LIMIT) else {
            continue;
        };
        let value: i64 = value.parse().unwrap_or(0);
        if value == -1 {
            return Some(-1);
        }
        let current = total.unwrap_or(0);
        total = Some(current.max(value));
    }
    total
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// What a tracker's reasons point back at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerSource {
    Stack(String),
    /// A single entitlement; `None` until the first one is added.
    Entitlement(Option<Uuid>),
}

/// An accumulated dimension value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Accumulated {
    Count(i64),
    /// One comma-separated arch declaration per contributing pool.
    /// Every entry must match the consumer.
    Arches(Vec<String>),
    /// Guest limit is global across all entitlements in scope; the
    /// tracked value is a placeholder until coverage adjusts it.
    /// `None` means enforced but granted by nothing in scope.
    GuestLimit(Option<i64>),
}

/// Accumulates dimension coverage for one entitlement or one stack.
#[derive(Debug)]
pub struct StackTracker<'a> {
    consumer: &'a Consumer,
    source: TrackerSource,
    entitlement_ids: Vec<Uuid>,
    /// Set when any contributing pool is host-restricted.
    host_restricted: Option<String>,
    accumulated: BTreeMap<&'static str, Accumulated>,
    /// False once anything real has been added. A tracker can enforce
    /// nothing at all and still be non-empty.
    empty: bool,
}

/// Outcome of comparing a tracker against the consumer's facts.
#[derive(Debug, Clone)]
pub struct StackCoverage {
    pub covered: bool,
    /// Fraction of checked dimensions that are covered.
    pub percentage: f64,
    pub reasons: Vec<ComplianceReason>,
}

impl StackCoverage {
    /// Lowercased dimension names the coverage failed on.
    pub fn failing_attributes(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.key.to_lowercase()).collect()
    }
}

impl<'a> StackTracker<'a> {
    pub fn new(consumer: &'a Consumer, stack_id: Option<String>) -> Self {
        let source = match stack_id {
            Some(id) => TrackerSource::Stack(id),
            None => TrackerSource::Entitlement(None),
        };
        Self {
            consumer,
            source,
            entitlement_ids: Vec::new(),
            host_restricted: None,
            accumulated: BTreeMap::new(),
            empty: true,
        }
    }

    /// Tracker seeded from a pool nobody has consumed yet: the pool's
    /// attributes become enforced (at quantity zero) so that
    /// [`StackTracker::quantity_to_cover`] knows what to grow.
    pub fn from_pool(consumer: &'a Consumer, pool: &PoolView<'_>) -> Self {
        let stack_id = pool.attrs().stacking_id().map(str::to_string);
        let mut tracker = Self::new(consumer, stack_id);
        tracker.add_pool(pool, 0);
        tracker
    }

    pub fn source(&self) -> &TrackerSource {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn entitlement_ids(&self) -> &[Uuid] {
        &self.entitlement_ids
    }

    /// Whether a dimension is being enforced by this tracker. Guests
    /// on host-restricted pools are exempt from ram/vcpu.
    pub fn enforces(&self, attribute: &str) -> bool {
        if self.host_restricted.is_some()
            && self.consumer.is_guest()
            && UNCHECKED_WHEN_HOST_RESTRICTED.contains(&attribute)
        {
            return false;
        }
        self.accumulated.contains_key(attribute)
    }

    /// Accumulate `quantity` simulated entitlements from `pool`.
    pub fn add_pool(&mut self, pool: &PoolView<'_>, quantity: i64) {
        if quantity > 0 {
            self.empty = false;
        }

        let attrs = pool.attrs();
        if let Some(host) = attrs.attribute(attr::REQUIRES_HOST) {
            self.host_restricted = Some(host.to_string());
        }

        for attribute in compliance_attributes(self.consumer) {
            let Some(value) = attrs.product_attribute(attribute) else {
                continue;
            };
            let current = if self.enforces(attribute) {
                self.accumulated.get(attribute).cloned()
            } else {
                None
            };
            let next = accumulate(attribute, current, value, &attrs, quantity);
            self.accumulated.insert(attribute, next);
        }
    }

    /// Accumulate a real entitlement. Each entitlement counts once; a
    /// non-stacked entitlement with quantity above one still only
    /// counts as one.
    pub fn add_entitlement(&mut self, ent: &EntitlementView<'_>) {
        if let TrackerSource::Entitlement(id @ None) = &mut self.source {
            *id = Some(ent.id());
        }
        if self.entitlement_ids.contains(&ent.id()) {
            return;
        }
        self.empty = false;
        self.entitlement_ids.push(ent.id());

        let quantity = if !ent.is_stacked() && ent.quantity() > 1 {
            1
        } else {
            ent.quantity()
        };
        self.add_pool(&ent.pool, quantity);
    }

    /// Compare accumulated values against the consumer's facts.
    ///
    /// `scope_pools` holds one entry per entitlement in scope (real or
    /// simulated) and feeds the global guest-limit adjustment; a pool
    /// may appear more than once.
    pub fn coverage(&mut self, scope_pools: &[PoolView<'_>]) -> StackCoverage {
        if self.enforces(attr::GUEST_LIMIT) {
            self.accumulated.insert(
                attr::GUEST_LIMIT,
                Accumulated::GuestLimit(global_guest_limit(scope_pools)),
            );
        }

        let attributes = compliance_attributes(self.consumer);
        let mut covered_count = 0usize;
        let mut reasons = Vec::new();
        for attribute in attributes {
            if !self.enforces(attribute) {
                // Unenforced dimensions count as covered.
                covered_count += 1;
                continue;
            }
            match self.check(attribute) {
                None => covered_count += 1,
                Some(reason) => reasons.push(reason),
            }
        }

        StackCoverage {
            covered: reasons.is_empty(),
            percentage: covered_count as f64 / attributes.len() as f64,
            reasons,
        }
    }

    /// How many entitlements must be drawn from `pool` for this
    /// tracker to cover the consumer. Respects the pool's instance
    /// multiplier for physical consumers and stops growing at the
    /// pool's available quantity.
    pub fn quantity_to_cover(&mut self, pool: &PoolView<'_>, scope_pools: &[PoolView<'_>]) -> i64 {
        let attrs = pool.attrs();
        // Dimensions where stacking more entitlements changes nothing
        // do not drive the quantity.
        let quantity_attributes: Vec<&'static str> = compliance_attributes(self.consumer)
            .iter()
            .copied()
            .filter(|a| *a != attr::ARCH && *a != attr::GUEST_LIMIT)
            .filter(|a| attrs.has_product_attribute(a))
            .collect();

        let increment = if attrs.has_product_attribute(attr::INSTANCE_MULTIPLIER)
            && !self.consumer.is_guest()
        {
            attrs.instance_multiplier()
        } else {
            1
        };

        let mut quantity = 0i64;
        // A tracker with existing entitlements gets one free
        // evaluation before anything is added.
        let mut add_first = self.empty;
        let mut last_accumulated: Option<BTreeMap<&'static str, Accumulated>> = None;
        loop {
            if add_first || quantity != 0 {
                self.add_pool(pool, increment);
                quantity += increment;
                // Malformed attribute values could stall the growth;
                // stop once an iteration changes nothing.
                if last_accumulated.as_ref() == Some(&self.accumulated) {
                    break;
                }
                last_accumulated = Some(self.accumulated.clone());
            }
            add_first = true;

            let coverage = self.coverage(scope_pools);
            let covered = coverage
                .failing_attributes()
                .iter()
                .all(|failed| !quantity_attributes.iter().any(|a| a == failed));
            if covered {
                break;
            }
            let can_grow =
                pool.pool.is_unlimited() || quantity + increment <= pool.pool.available();
            if !can_grow {
                break;
            }
        }
        quantity
    }

    fn check(&self, attribute: &'static str) -> Option<ComplianceReason> {
        match self.accumulated.get(attribute) {
            None => None,
            Some(Accumulated::Arches(declarations)) => {
                let consumer_arch = self.consumer.arch();
                for declaration in declarations {
                    if !architecture_matches(
                        Some(declaration),
                        consumer_arch,
                        self.consumer.kind,
                    ) {
                        return Some(self.coverage_reason(
                            attribute,
                            consumer_arch.unwrap_or("unknown"),
                            declaration,
                        ));
                    }
                }
                None
            }
            Some(Accumulated::GuestLimit(limit)) => {
                let guests = self.consumer.active_guest_count();
                match limit {
                    Some(-1) => None,
                    Some(limit) if *limit >= guests => None,
                    Some(limit) => {
                        Some(self.coverage_reason(attribute, guests, limit))
                    }
                    None => Some(self.coverage_reason(attribute, guests, 0)),
                }
            }
            Some(Accumulated::Count(provided)) => {
                let required = fact_value(self.consumer, attribute);
                if *provided >= required {
                    None
                } else {
                    Some(self.coverage_reason(attribute, required, provided))
                }
            }
        }
    }

    fn coverage_reason(
        &self,
        attribute: &str,
        has: impl ToString,
        covered: impl ToString,
    ) -> ComplianceReason {
        let has = has.to_string();
        let covered = covered.to_string();
        let message = if attribute == attr::ARCH {
            format!("architecture {has} is not supported by {covered}")
        } else {
            format!("covers {covered} of {has} {attribute}")
        };

        let mut attributes = BTreeMap::new();
        attributes.insert(reason_attr::HAS.to_string(), has);
        attributes.insert(reason_attr::COVERED.to_string(), covered);
        match &self.source {
            TrackerSource::Stack(id) => {
                attributes.insert(reason_attr::STACK_ID.to_string(), id.clone());
            }
            TrackerSource::Entitlement(Some(id)) => {
                attributes.insert(reason_attr::ENTITLEMENT_ID.to_string(), id.to_string());
            }
            TrackerSource::Entitlement(None) => {}
        }

        ComplianceReason {
            key: attribute.to_uppercase(),
            message,
            attributes,
        }
    }
}

/// Apply one pool's attribute value to the running accumulation.
fn accumulate(
    attribute: &str,
    current: Option<Accumulated>,
    value: &str,
    attrs: &AttributeMap<'_>,
    quantity: i64,
) -> Accumulated {
    match attribute {
        attr::ARCH => {
            let mut list = match current {
                Some(Accumulated::Arches(list)) => list,
                _ => Vec::new(),
            };
            list.push(value.to_string());
            Accumulated::Arches(list)
        }
        attr::GUEST_LIMIT => Accumulated::GuestLimit(Some(-1)),
        attr::SOCKETS => {
            let current = count_of(current);
            let increment = attrs.instance_multiplier();
            // Only whole instances contribute sockets.
            let adjusted = quantity - (quantity % increment);
            let per_instance: i64 = value.parse().unwrap_or(0);
            Accumulated::Count(current + per_instance * adjusted / increment)
        }
        _ => {
            let current = count_of(current);
            let per_unit: i64 = value.parse().unwrap_or(0);
            Accumulated::Count(current + per_unit * quantity)
        }
    }
}

fn count_of(current: Option<Accumulated>) -> i64 {
    match current {
        Some(Accumulated::Count(n)) => n,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap as Map;
    use tessera_core::models::consumer::{GuestId, facts};
    use tessera_core::models::pool::{Pool, PoolKind};
    use tessera_core::models::product::Product;

    fn consumer(fact_pairs: &[(&str, &str)]) -> Consumer {
        Consumer {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "box".into(),
            kind: ConsumerKind::System,
            username: None,
            service_level: None,
            autoheal: true,
            capabilities: Vec::new(),
            facts: fact_pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            installed_products: Vec::new(),
            guest_ids: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn product(attr_pairs: &[(&str, &str)]) -> Product {
        Product {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            product_id: "SKU001".into(),
            name: "Premium OS".into(),
            multiplier: 1,
            attributes: attr_pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            dependent_product_ids: Vec::new(),
            content: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pool(quantity: i64) -> Pool {
        Pool {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            kind: PoolKind::Normal,
            product_id: "SKU001".into(),
            provided_product_ids: Vec::new(),
            derived_product_id: None,
            derived_provided_product_ids: Vec::new(),
            quantity,
            consumed: 0,
            start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            attributes: Map::new(),
            restricted_to_username: None,
            source_entitlement_id: None,
            source_stack_id: None,
            subscription_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stacked_socket_counts_are_additive() {
        let consumer = consumer(&[(facts::SOCKETS, "8")]);
        let product = product(&[("sockets", "4"), ("stacking_id", "s1")]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::new(&consumer, Some("s1".into()));
        tracker.add_pool(&view, 1);
        let partial = tracker.coverage(&[view]);
        assert!(!partial.covered, "4 of 8 sockets should not cover");
        assert_eq!(partial.reasons[0].key, "SOCKETS");

        tracker.add_pool(&view, 1);
        let full = tracker.coverage(&[view, view]);
        assert!(full.covered, "two 4-socket entitlements cover 8 sockets");
    }

    #[test]
    fn socket_accumulation_only_counts_whole_instances() {
        let consumer = consumer(&[(facts::SOCKETS, "4")]);
        let product = product(&[
            ("sockets", "2"),
            ("stacking_id", "s1"),
            ("instance_multiplier", "2"),
        ]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        // Quantity 3 with multiplier 2 counts as one whole instance.
        let mut tracker = StackTracker::new(&consumer, Some("s1".into()));
        tracker.add_pool(&view, 3);
        let coverage = tracker.coverage(&[view]);
        assert!(!coverage.covered);
        let covered = &coverage.reasons[0].attributes[reason_attr::COVERED];
        assert_eq!(covered, "2");
    }

    #[test]
    fn host_restricted_pool_exempts_guest_from_ram_and_vcpu() {
        let mut c = consumer(&[
            (facts::IS_GUEST, "true"),
            (facts::SOCKETS, "1"),
            (facts::CORES_PER_SOCKET, "16"),
            (facts::RAM_TOTAL_KB, "33554432"),
        ]);
        c.kind = ConsumerKind::System;
        let product = product(&[("ram", "4"), ("vcpu", "2"), ("stacking_id", "s1")]);
        let mut p = pool(10);
        p.attributes
            .insert("requires_host".into(), "host-uuid".into());
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::new(&c, Some("s1".into()));
        tracker.add_pool(&view, 1);
        assert!(!tracker.enforces(attr::RAM));
        assert!(!tracker.enforces(attr::VCPU));
        let coverage = tracker.coverage(&[view]);
        assert!(coverage.covered, "undersized ram/vcpu ignored on host-restricted pool");
    }

    #[test]
    fn arch_mismatch_fails_coverage() {
        let consumer = consumer(&[(facts::ARCH, "s390x"), (facts::SOCKETS, "1")]);
        let product = product(&[("arch", "x86_64,ppc64"), ("sockets", "2")]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::new(&consumer, None);
        tracker.add_pool(&view, 1);
        let coverage = tracker.coverage(&[view]);
        assert!(!coverage.covered);
        assert_eq!(coverage.reasons[0].key, "ARCH");
    }

    #[test]
    fn x86_declaration_covers_i686() {
        assert!(architecture_matches(
            Some("x86"),
            Some("i686"),
            ConsumerKind::System
        ));
        assert!(architecture_matches(
            Some("ALL"),
            Some("s390x"),
            ConsumerKind::System
        ));
        assert!(!architecture_matches(
            Some("x86_64"),
            Some("aarch64"),
            ConsumerKind::System
        ));
        // Non-system consumers without an arch fact pass.
        assert!(architecture_matches(
            Some("x86_64"),
            None,
            ConsumerKind::Distributor
        ));
    }

    #[test]
    fn guest_limit_is_global_across_scope() {
        let mut c = consumer(&[]);
        c.guest_ids = (0..5)
            .map(|i| GuestId {
                guest_id: format!("g{i}"),
                active: true,
            })
            .collect();

        let small = product(&[("guest_limit", "2")]);
        let large = product(&[("guest_limit", "8")]);
        let p1 = pool(10);
        let p2 = pool(10);
        let small_view = PoolView::new(&p1, &small);
        let large_view = PoolView::new(&p2, &large);

        // Alone, the small pool cannot cover five guests.
        let mut tracker = StackTracker::new(&c, None);
        tracker.add_pool(&small_view, 1);
        assert!(!tracker.coverage(&[small_view]).covered);

        // Another entitlement with a higher limit lifts the whole
        // consumer.
        let mut tracker = StackTracker::new(&c, None);
        tracker.add_pool(&small_view, 1);
        assert!(tracker.coverage(&[small_view, large_view]).covered);

        assert_eq!(
            global_guest_limit(&[small_view, large_view]),
            Some(8)
        );
    }

    #[test]
    fn quantity_to_cover_grows_until_covered() {
        let consumer = consumer(&[(facts::SOCKETS, "8")]);
        let product = product(&[("sockets", "2"), ("stacking_id", "s1")]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::from_pool(&consumer, &view);
        assert_eq!(tracker.quantity_to_cover(&view, &[]), 4);
    }

    #[test]
    fn quantity_to_cover_steps_by_instance_multiplier() {
        let consumer = consumer(&[(facts::SOCKETS, "4")]);
        let product = product(&[
            ("sockets", "2"),
            ("stacking_id", "s1"),
            ("instance_multiplier", "2"),
        ]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::from_pool(&consumer, &view);
        // Each pair of units contributes one 2-socket instance.
        assert_eq!(tracker.quantity_to_cover(&view, &[]), 4);
    }

    #[test]
    fn quantity_to_cover_stops_at_available() {
        let consumer = consumer(&[(facts::SOCKETS, "16")]);
        let product = product(&[("sockets", "2"), ("stacking_id", "s1")]);
        let p = pool(3);
        let view = PoolView::new(&p, &product);

        let mut tracker = StackTracker::from_pool(&consumer, &view);
        // Needs 8 but only 3 are available.
        assert_eq!(tracker.quantity_to_cover(&view, &[]), 3);
    }

    #[test]
    fn existing_stack_gets_a_free_evaluation() {
        let consumer = consumer(&[(facts::SOCKETS, "4")]);
        let product = product(&[("sockets", "4"), ("stacking_id", "s1")]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        // Tracker already holds enough coverage.
        let mut tracker = StackTracker::new(&consumer, Some("s1".into()));
        tracker.add_pool(&view, 1);
        assert_eq!(tracker.quantity_to_cover(&view, &[view]), 0);
    }

    #[test]
    fn non_stacked_entitlement_counts_once() {
        let consumer = consumer(&[(facts::SOCKETS, "8")]);
        let product = product(&[("sockets", "2")]);
        let p = pool(10);
        let view = PoolView::new(&p, &product);

        let ent = tessera_core::models::entitlement::Entitlement {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            consumer_id: consumer.id,
            pool_id: p.id,
            quantity: 4,
            start_date: p.start_date,
            end_date: p.end_date,
            certificate_serial: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let ent_view = EntitlementView {
            entitlement: &ent,
            pool: view,
        };

        let mut tracker = StackTracker::new(&consumer, None);
        tracker.add_entitlement(&ent_view);
        // Quantity 4 of a non-stacked product still covers only 2
        // sockets.
        let coverage = tracker.coverage(&[view]);
        assert!(!coverage.covered);
        assert_eq!(
            coverage.reasons[0].attributes[reason_attr::COVERED],
            "2"
        );

        // Adding the same entitlement again changes nothing.
        tracker.add_entitlement(&ent_view);
        assert_eq!(tracker.entitlement_ids().len(), 1);
    }
}
