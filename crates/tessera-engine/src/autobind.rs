//! Autobind pool selection.
//!
//! Given a consumer, its current compliance picture, and a set of
//! candidate pools, pick the pools and quantities that cover the
//! consumer's installed products best. Stacks and single entitlements
//! are handled through one abstraction, an entitlement group, which
//! either can fully cover the consumer or is discarded.

use std::cmp::Ordering;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tessera_core::models::attributes::attr;
use tessera_core::models::compliance::ComplianceStatus;
use tessera_core::models::consumer::Consumer;
use tessera_core::models::entitlement::Entitlement;
use tracing::debug;
use uuid::Uuid;

use crate::compliance::{entitlement_coverage, stack_coverage};
use crate::config::{EngineConfig, RankCriterion};
use crate::quantity::suggested_pool_quantity;
use crate::snapshot::{EntitlementView, PoolView};
use crate::stacking::{StackCoverage, architecture_matches, compliance_attributes, fact_value};

/// One line of a selection: how much to draw from which pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolQuantity {
    pub pool_id: Uuid,
    pub quantity: i64,
}

/// The outcome of a selection run. The caller decides what a
/// non-empty `uncovered_products` list means; a real bind treats it
/// as failure while a dry run reports it.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// Chosen pools and quantities, ordered by pool id.
    pub selections: Vec<PoolQuantity>,
    pub covered_products: Vec<String>,
    /// Requested products no valid group could cover.
    pub uncovered_products: Vec<String>,
}

pub struct AutobindRequest<'a> {
    pub consumer: &'a Consumer,
    /// Product ids the selection should cover; already-compliant ones
    /// are filtered out here.
    pub installed: Vec<String>,
    /// Pools that already passed the eligibility rules.
    pub candidates: Vec<PoolView<'a>>,
    /// The consumer's compliance status at the target date.
    pub compliance: &'a ComplianceStatus,
    /// The entitlements referenced by the compliance status, deduped.
    pub attached: &'a [EntitlementView<'a>],
    /// Cover the pools' derived products instead of the regular ones.
    /// Used when healing a host on behalf of its guests.
    pub consider_derived: bool,
    pub exempt_service_levels: &'a [String],
    pub config: &'a EngineConfig,
}

/// A candidate pool plus how many entitlements it can still grant.
/// Unlimited pools are capped at what this consumer could ever need.
#[derive(Debug, Clone, Copy)]
struct CandidatePool<'a> {
    view: PoolView<'a>,
    available: i64,
}

/// A stack, or a single pool, treated uniformly.
#[derive(Debug)]
struct EntitlementGroup<'a> {
    stackable: bool,
    stack_id: String,
    pools: Vec<CandidatePool<'a>>,
    /// Products this group was selected to cover.
    covered: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct GroupMetrics {
    host_count: usize,
    virt_count: usize,
    average_score: f64,
    total_quantity: i64,
    stackable: bool,
}

pub fn select_pools(request: &AutobindRequest<'_>) -> SelectionOutcome {
    let selector = Selector {
        consumer: request.consumer,
        attached: request.attached,
        consider_derived: request.consider_derived,
        config: request.config,
    };

    let mut installed: Vec<String> = request
        .installed
        .iter()
        .filter(|pid| !request.compliance.compliant_products.contains_key(*pid))
        .cloned()
        .collect();

    let candidates = candidate_pools(request);
    debug!(
        candidates = candidates.len(),
        targets = installed.len(),
        "selecting pools"
    );

    let mut valid: Vec<EntitlementGroup<'_>> = Vec::new();
    for mut group in build_groups(candidates) {
        if !selector.validate(&mut group, &installed) {
            debug!(stack = %group.stack_id, "group cannot reach full coverage");
            continue;
        }
        let completes_partial = group.stackable
            && request.compliance.partial_stacks.contains_key(&group.stack_id);
        if selector.common_products(&group, &installed).is_empty() && !completes_partial {
            debug!(stack = %group.stack_id, "group provides no needed products");
            continue;
        }
        selector.remove_extra_attrs(&mut group, &installed);
        selector.prune_pools(&mut group, &installed);
        valid.push(group);
    }

    let mut best: Vec<EntitlementGroup<'_>> = Vec::new();

    // Groups that complete an existing partial stack are taken
    // unconditionally, in stack id order, before anything else.
    for stack_id in request.compliance.partial_stacks.keys() {
        let mut index = 0;
        while index < valid.len() {
            if valid[index].stackable && valid[index].stack_id == *stack_id {
                let mut group = valid.remove(index);
                group.covered = selector.common_products(&group, &installed);
                installed.retain(|pid| !group.covered.contains(pid));
                best.push(group);
            } else {
                index += 1;
            }
        }
    }

    // Then keep taking the best remaining group until nothing useful
    // is left.
    while let Some(index) = selector.find_best(&valid, &installed) {
        let mut group = valid.remove(index);
        group.covered = selector.common_products(&group, &installed);
        installed.retain(|pid| !group.covered.contains(pid));
        best.push(group);
    }

    let mut selections: Vec<PoolQuantity> = Vec::new();
    let mut covered_products: Vec<String> = Vec::new();
    for group in &best {
        selections.extend(selector.pool_quantities(group));
        covered_products.extend(group.covered.iter().cloned());
    }
    selections.sort_by_key(|selection| selection.pool_id);
    covered_products.sort();
    covered_products.dedup();

    SelectionOutcome {
        selections,
        covered_products,
        uncovered_products: installed,
    }
}

/// Score used to order pools inside and across groups. Higher is
/// better: virt-only and host-restricted pools are preferred homes
/// for a guest, and a pool whose hardware counts line up closely with
/// the consumer wastes less of the subscription.
fn pool_score(pool: &PoolView<'_>, consumer: &Consumer) -> f64 {
    let attrs = pool.attrs();
    let mut score = 100.0;

    if attrs.is_true(attr::VIRT_ONLY) {
        score += 100.0;
    }
    if attrs.attribute(attr::REQUIRES_HOST).is_some() {
        score += 150.0;
    }

    const FIT_ATTRIBUTES: &[&str] = &[attr::SOCKETS, attr::CORES, attr::RAM, attr::VCPU];
    let checked = compliance_attributes(consumer);
    for attribute in FIT_ATTRIBUTES {
        if !checked.contains(attribute) {
            continue;
        }
        let consumer_val = fact_value(consumer, attribute);
        let pool_val = attrs.numeric(attribute).filter(|v| *v > 0);
        match pool_val {
            Some(pool_val) if consumer_val > 0 => {
                let required = (consumer_val + pool_val - 1) / pool_val;
                let multi = if *attribute == attr::SOCKETS {
                    attrs.instance_multiplier()
                } else {
                    1
                };
                if pool.pool.available() / multi >= required {
                    let overshoot = (pool_val * required - consumer_val) as f64;
                    let spread = (required - 1) as f64 / 2.0;
                    score += (10.0 - overshoot - spread).max(0.0) * 2.0;
                }
            }
            // A pool that does not limit this dimension fits anything.
            _ => score += 20.0,
        }
    }
    score
}

/// Apply the selector-level filters and work out each pool's usable
/// capacity.
fn candidate_pools<'a>(request: &AutobindRequest<'a>) -> Vec<CandidatePool<'a>> {
    let consumer = request.consumer;
    let is_guest = consumer.is_guest();
    let attached_levels = attached_service_levels(request.attached);

    let mut result = Vec::new();
    for view in &request.candidates {
        let attrs = view.attrs();

        let mut available = if view.pool.is_unlimited() {
            suggested_pool_quantity(view, consumer, &[])
        } else {
            view.pool.available()
        };
        if available > 0 && !attrs.is_multi_entitlement() {
            available = 1;
        }
        if available <= 0 {
            debug!(pool = %view.id(), "skipping exhausted pool");
            continue;
        }

        if !architecture_matches(
            attrs.product_attribute(attr::ARCH),
            consumer.arch(),
            consumer.kind,
        ) {
            debug!(pool = %view.id(), "skipping pool on arch mismatch");
            continue;
        }
        if !is_guest && attrs.is_true(attr::VIRT_ONLY) {
            debug!(pool = %view.id(), "skipping virt-only pool for physical consumer");
            continue;
        }
        if !service_level_agrees(&attrs.support_level(), &attached_levels, request) {
            debug!(pool = %view.id(), "skipping pool on service level mismatch");
            continue;
        }
        result.push(CandidatePool {
            view: *view,
            available,
        });
    }
    result
}

/// Distinct service levels already present on the consumer's
/// entitlements.
fn attached_service_levels(attached: &[EntitlementView<'_>]) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for ent in attached {
        if let Some(level) = ent.pool.attrs().support_level() {
            if !levels.iter().any(|l| l.eq_ignore_ascii_case(level)) {
                levels.push(level.to_string());
            }
        }
    }
    levels
}

/// A pool with a service level only qualifies when the consumer has
/// no leveled entitlements yet, or when its level matches one of
/// them.
fn service_level_agrees(
    pool_level: &Option<&str>,
    attached_levels: &[String],
    request: &AutobindRequest<'_>,
) -> bool {
    let Some(pool_level) = pool_level else {
        return true;
    };
    if request
        .exempt_service_levels
        .iter()
        .any(|level| level.eq_ignore_ascii_case(pool_level))
    {
        return true;
    }
    if attached_levels.is_empty() {
        return true;
    }
    attached_levels
        .iter()
        .any(|level| level.eq_ignore_ascii_case(pool_level))
}

/// Stacked pools sharing a stack id form one group; every other pool
/// is a group of its own.
fn build_groups(pools: Vec<CandidatePool<'_>>) -> Vec<EntitlementGroup<'_>> {
    let mut groups: Vec<EntitlementGroup<'_>> = Vec::new();
    for pool in pools {
        let exempt = pool.view.attrs().support_level_exempt();
        let stack_id = if exempt {
            // Exempt (self-support) pools never join a paid stack.
            None
        } else {
            pool.view.attrs().stacking_id().map(str::to_string)
        };
        match stack_id {
            Some(stack_id) => {
                if let Some(group) = groups
                    .iter_mut()
                    .find(|g| g.stackable && g.stack_id == stack_id)
                {
                    group.pools.push(pool);
                } else {
                    groups.push(EntitlementGroup {
                        stackable: true,
                        stack_id,
                        pools: vec![pool],
                        covered: Vec::new(),
                    });
                }
            }
            None => groups.push(EntitlementGroup {
                stackable: false,
                stack_id: String::new(),
                pools: vec![pool],
                covered: Vec::new(),
            }),
        }
    }
    groups
}

struct Selector<'a> {
    consumer: &'a Consumer,
    attached: &'a [EntitlementView<'a>],
    consider_derived: bool,
    config: &'a EngineConfig,
}

impl<'a> Selector<'a> {
    /// Coverage of the group with its pools mocked at the given
    /// quantities, alongside everything already attached. For
    /// non-stacked groups `single_index` names the one mock to
    /// measure.
    fn coverage(
        &self,
        group: &EntitlementGroup<'a>,
        quantities: &[i64],
        single_index: Option<usize>,
    ) -> StackCoverage {
        let mocks: Vec<Entitlement> = group
            .pools
            .iter()
            .zip(quantities)
            .map(|(pool, quantity)| mock_entitlement(self.consumer, &pool.view, *quantity))
            .collect();
        let mut views: Vec<EntitlementView<'_>> = mocks
            .iter()
            .zip(&group.pools)
            .map(|(entitlement, pool)| EntitlementView {
                entitlement,
                pool: pool.view,
            })
            .collect();
        views.extend_from_slice(self.attached);

        match single_index {
            Some(index) => {
                let target = views[index];
                entitlement_coverage(self.consumer, &target, &views)
            }
            None => stack_coverage(self.consumer, &group.stack_id, &views),
        }
    }

    fn full_quantities(&self, group: &EntitlementGroup<'a>) -> Vec<i64> {
        group.pools.iter().map(|pool| pool.available).collect()
    }

    /// Can this group, together with what is already attached, fully
    /// cover the consumer? Pools that break an otherwise coverable
    /// stack are dropped along the way.
    fn validate(&self, group: &mut EntitlementGroup<'a>, _targets: &[String]) -> bool {
        if group.pools.is_empty() {
            return false;
        }
        if !group.stackable {
            let quantities = self.full_quantities(group);
            return self.coverage(group, &quantities, Some(0)).covered;
        }

        let quantities = self.full_quantities(group);
        let coverage = self.coverage(group, &quantities, None);
        if coverage.covered {
            return true;
        }
        // An arch mismatch inside the stack cannot be fixed by
        // dropping pools; something mismatched is already attached.
        if coverage
            .reasons
            .iter()
            .any(|reason| reason.key.eq_ignore_ascii_case(attr::ARCH))
        {
            return false;
        }

        let failing = coverage.failing_attributes();
        group.pools.retain(|pool| {
            !failing
                .iter()
                .any(|attribute| pool.view.attrs().has_product_attribute(attribute))
        });
        let quantities = self.full_quantities(group);
        self.coverage(group, &quantities, None).covered
    }

    /// Product ids from `targets` this group's pools provide.
    fn common_products(&self, group: &EntitlementGroup<'a>, targets: &[String]) -> Vec<String> {
        self.provided_from(&group.pools, targets)
    }

    fn provided_from(&self, pools: &[CandidatePool<'a>], targets: &[String]) -> Vec<String> {
        targets
            .iter()
            .filter(|pid| pools.iter().any(|pool| self.pool_provides(pool, pid)))
            .cloned()
            .collect()
    }

    fn pool_provides(&self, pool: &CandidatePool<'a>, product_id: &str) -> bool {
        let p = pool.view.pool;
        if self.consider_derived && p.derived_product_id.is_some() {
            p.provides_derived(product_id)
        } else {
            p.provides(product_id)
        }
    }

    /// Drop pools that enforce a hardware dimension the rest of the
    /// group covers without them. This keeps two parallel stacks,
    /// each fully compliant on its own, from being bound together.
    fn remove_extra_attrs(&self, group: &mut EntitlementGroup<'a>, targets: &[String]) {
        if !group.stackable {
            return;
        }
        let provided = self.provided_from(&group.pools, targets).len();

        let used_attributes: Vec<&'static str> = compliance_attributes(self.consumer)
            .iter()
            .copied()
            .filter(|attribute| *attribute != attr::ARCH)
            .filter(|attribute| {
                group
                    .pools
                    .iter()
                    .any(|pool| pool.view.attrs().has_product_attribute(attribute))
            })
            .collect();

        let mut candidates: Vec<Vec<CandidatePool<'a>>> = vec![group.pools.clone()];
        for attribute in used_attributes {
            let without: Vec<CandidatePool<'a>> = group
                .pools
                .iter()
                .copied()
                .filter(|pool| !pool.view.attrs().has_product_attribute(attribute))
                .collect();
            if without.is_empty() {
                continue;
            }
            let trial = EntitlementGroup {
                stackable: true,
                stack_id: group.stack_id.clone(),
                pools: without,
                covered: Vec::new(),
            };
            let quantities = self.full_quantities(&trial);
            if self.coverage(&trial, &quantities, None).covered
                && self.provided_from(&trial.pools, targets).len() == provided
            {
                candidates.push(trial.pools);
            }
        }

        // Prefer the set that keeps the most virt-only and
        // host-restricted pools per pool; fewer pools break ties.
        let mut best_index = 0;
        let mut best_score = 0.0_f64;
        let mut best_len = candidates[0].len();
        for (index, pools) in candidates.iter().enumerate() {
            let score: f64 = pools
                .iter()
                .map(|pool| {
                    let attrs = pool.view.attrs();
                    let mut s = 0.0;
                    if attrs.is_true(attr::VIRT_ONLY) {
                        s += 100.0;
                    }
                    if attrs.attribute(attr::REQUIRES_HOST).is_some() {
                        s += 150.0;
                    }
                    s
                })
                .sum::<f64>()
                / pools.len() as f64;
            if score > best_score {
                best_score = score;
                best_index = index;
                best_len = pools.len();
            } else if score == best_score && best_len > pools.len() {
                best_index = index;
                best_len = pools.len();
            }
        }
        group.pools = candidates.swap_remove(best_index);
    }

    /// Remove pools the group does not need for coverage, keeping the
    /// high-priority ones. A stacked group always keeps at least one
    /// pool.
    fn prune_pools(&self, group: &mut EntitlementGroup<'a>, targets: &[String]) {
        if !group.stackable {
            return;
        }
        group.pools.sort_by(|a, b| self.prune_order(a, b));
        let provided = self.provided_from(&group.pools, targets).len();

        let mut index = group.pools.len();
        while index > 0 {
            index -= 1;
            let removed = group.pools.remove(index);
            let removal_holds = if group.pools.is_empty() {
                false
            } else {
                let quantities = self.full_quantities(group);
                self.coverage(group, &quantities, None).covered
                    && self.provided_from(&group.pools, targets).len() == provided
            };
            if !removal_holds {
                group.pools.push(removed);
            }
        }
    }

    /// Highest score first; between equals the pool that expires
    /// first wins.
    fn prune_order(&self, a: &CandidatePool<'a>, b: &CandidatePool<'a>) -> Ordering {
        let mut score_a = pool_score(&a.view, self.consumer);
        let mut score_b = pool_score(&b.view, self.consumer);
        match a.view.pool.end_date.cmp(&b.view.pool.end_date) {
            Ordering::Greater => score_b += 1.0,
            Ordering::Less => score_a += 1.0,
            Ordering::Equal => {}
        }
        score_b.partial_cmp(&score_a).unwrap_or(Ordering::Equal)
    }

    /// The minimum quantity per pool, in priority order, that makes
    /// the group cover the consumer. Earlier pools settle at their
    /// minima while later pools still promise their maximum.
    fn pool_quantities(&self, group: &EntitlementGroup<'a>) -> Vec<PoolQuantity> {
        let mut quantities = self.full_quantities(group);
        let mut result = Vec::new();

        for index in 0..group.pools.len() {
            let pool = group.pools[index];
            let attrs = pool.view.attrs();
            let increment = if attrs.has_product_attribute(attr::INSTANCE_MULTIPLIER)
                && !self.consumer.is_guest()
            {
                attrs.instance_multiplier()
            } else {
                1
            };

            let mut quantity = increment;
            while quantity <= pool.available {
                quantities[index] = quantity;
                let single = (!group.stackable).then_some(index);
                if self.coverage(group, &quantities, single).covered {
                    result.push(PoolQuantity {
                        pool_id: pool.view.id(),
                        quantity,
                    });
                    break;
                }
                quantity += increment;
            }
        }
        result
    }

    fn metrics(&self, group: &EntitlementGroup<'a>) -> GroupMetrics {
        let host_count = group
            .pools
            .iter()
            .filter(|pool| pool.view.attrs().attribute(attr::REQUIRES_HOST).is_some())
            .count();
        let virt_count = group
            .pools
            .iter()
            .filter(|pool| pool.view.attrs().is_true(attr::VIRT_ONLY))
            .count();
        let average_score = group
            .pools
            .iter()
            .map(|pool| pool_score(&pool.view, self.consumer))
            .sum::<f64>()
            / group.pools.len().max(1) as f64;
        let total_quantity = self
            .pool_quantities(group)
            .iter()
            .map(|selection| selection.quantity)
            .sum();

        GroupMetrics {
            host_count,
            virt_count,
            average_score,
            total_quantity,
            stackable: group.stackable,
        }
    }

    /// Pick the best remaining group that still provides something
    /// needed. Criteria run in configured order; the incumbent wins
    /// ties.
    fn find_best(&self, groups: &[EntitlementGroup<'a>], targets: &[String]) -> Option<usize> {
        let mut best: Option<(usize, GroupMetrics)> = None;
        for (index, group) in groups.iter().enumerate() {
            if self.common_products(group, targets).is_empty() {
                continue;
            }
            let metrics = self.metrics(group);
            match &best {
                None => best = Some((index, metrics)),
                Some((_, incumbent)) => {
                    if self.ranks_higher(&metrics, incumbent) {
                        best = Some((index, metrics));
                    }
                }
            }
        }
        best.map(|(index, _)| index)
    }

    fn ranks_higher(&self, candidate: &GroupMetrics, incumbent: &GroupMetrics) -> bool {
        for criterion in &self.config.ranking {
            let ordering = match criterion {
                RankCriterion::HostAffinity => candidate.host_count.cmp(&incumbent.host_count),
                RankCriterion::VirtAffinity => candidate.virt_count.cmp(&incumbent.virt_count),
                RankCriterion::AverageScore => candidate
                    .average_score
                    .partial_cmp(&incumbent.average_score)
                    .unwrap_or(Ordering::Equal),
                RankCriterion::SmallestQuantity => {
                    incumbent.total_quantity.cmp(&candidate.total_quantity)
                }
                RankCriterion::PreferUnstacked => {
                    (!candidate.stackable).cmp(&!incumbent.stackable)
                }
            };
            match ordering {
                Ordering::Greater => return true,
                Ordering::Less => return false,
                Ordering::Equal => {}
            }
        }
        false
    }
}

fn mock_entitlement(consumer: &Consumer, pool: &PoolView<'_>, quantity: i64) -> Entitlement {
    let now = Utc::now();
    Entitlement {
        id: Uuid::new_v4(),
        owner_id: pool.pool.owner_id,
        consumer_id: consumer.id,
        pool_id: pool.id(),
        quantity,
        start_date: pool.pool.start_date,
        end_date: pool.pool.end_date,
        certificate_serial: None,
        created_at: now,
        updated_at: now,
    }
}
