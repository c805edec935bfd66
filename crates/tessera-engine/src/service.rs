//! Bind orchestration — the async seam between the pure evaluation
//! components and the repository traits.
//!
//! Generic over repository implementations so that the engine has no
//! dependency on the database crate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use tessera_core::models::attributes::attr;
use tessera_core::models::compliance::ComplianceStatus;
use tessera_core::models::consumer::Consumer;
use tessera_core::models::entitlement::{CreateEntitlement, Entitlement};
use tessera_core::models::validation::{CallerType, Reason, ValidationResult};
use tessera_core::repository::{
    ConsumerRepository, EntitlementRepository, OwnerRepository, PoolRepository, ProductRepository,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autobind::{self, AutobindRequest, PoolQuantity, SelectionOutcome};
use crate::compliance::{self, ComplianceRequest};
use crate::config::EngineConfig;
use crate::eligibility::{self, EligibilityRequest};
use crate::error::{CoverageFailure, EngineError, EngineResult};
use crate::quantity::{QuantitySuggestion, suggested_quantity};
use crate::snapshot::{EntitlementGraph, EntitlementView, PoolSet, PoolView};

/// A granted entitlement plus the non-blocking reasons raised while
/// evaluating it.
#[derive(Debug)]
pub struct BindOutcome {
    pub entitlement: Entitlement,
    pub warnings: Vec<Reason>,
}

/// Result of a committed autobind.
#[derive(Debug)]
pub struct AutobindOutcome {
    pub entitlements: Vec<Entitlement>,
    pub covered_products: Vec<String>,
}

/// Loaded inputs for one selection run.
struct SelectionInput<'a> {
    consumer: &'a Consumer,
    host: Option<&'a Consumer>,
    graph: &'a EntitlementGraph,
    candidates: &'a PoolSet,
    targets: &'a [String],
    as_of: DateTime<Utc>,
    consider_derived: bool,
    service_level_override: Option<&'a str>,
    owner_default_service_level: Option<&'a str>,
}

/// Bind orchestration service.
pub struct BindService<
    C: ConsumerRepository,
    P: PoolRepository,
    R: ProductRepository,
    E: EntitlementRepository,
    O: OwnerRepository,
> {
    consumers: C,
    pools: P,
    products: R,
    entitlements: E,
    owners: O,
    config: EngineConfig,
}

impl<C, P, R, E, O> BindService<C, P, R, E, O>
where
    C: ConsumerRepository,
    P: PoolRepository,
    R: ProductRepository,
    E: EntitlementRepository,
    O: OwnerRepository,
{
    pub fn new(
        consumers: C,
        pools: P,
        products: R,
        entitlements: E,
        owners: O,
        config: EngineConfig,
    ) -> Self {
        Self {
            consumers,
            pools,
            products,
            entitlements,
            owners,
            config,
        }
    }

    /// Evaluate one (consumer, pool, quantity) request without
    /// binding anything. Used by pool listings and pre-flight checks;
    /// the caller type decides which rules block and which warn.
    pub async fn evaluate_bind(
        &self,
        consumer_id: Uuid,
        pool_id: Uuid,
        quantity: i64,
        caller: CallerType,
    ) -> EngineResult<ValidationResult> {
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let owner = self.owners.get_by_id(consumer.owner_id).await?;
        let host = self.resolve_host(&consumer).await?;
        let graph = self.load_graph(&consumer).await?;
        let views = graph.views()?;

        let pool = self.pools.get_by_id(pool_id).await?;
        let product = self
            .products
            .get_by_product_id(consumer.owner_id, &pool.product_id)
            .await?;

        let result = eligibility::evaluate(&EligibilityRequest {
            consumer: &consumer,
            host: host.as_ref(),
            pool: PoolView::new(&pool, &product),
            quantity,
            caller,
            existing: &views,
            now: Utc::now(),
            unmapped_guest_grace: self.unmapped_guest_grace(),
            sla_strictness: self.config.sla_strictness,
            service_level_override: None,
            owner_default_service_level: owner.default_service_level.as_deref(),
            exempt_service_levels: &[],
        })?;
        Ok(result)
    }

    /// Bind a specific pool. With no explicit quantity, plain pools
    /// get 1 and multi-entitlement pools get the suggested quantity.
    pub async fn bind_pool(
        &self,
        consumer_id: Uuid,
        pool_id: Uuid,
        quantity: Option<i64>,
    ) -> EngineResult<BindOutcome> {
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let owner = self.owners.get_by_id(consumer.owner_id).await?;
        let host = self.resolve_host(&consumer).await?;
        let graph = self.load_graph(&consumer).await?;
        let views = graph.views()?;

        let pool = self.pools.get_by_id(pool_id).await?;
        let product = self
            .products
            .get_by_product_id(consumer.owner_id, &pool.product_id)
            .await?;
        let view = PoolView::new(&pool, &product);

        let quantity = match quantity {
            Some(q) => q,
            None if view.attrs().is_multi_entitlement() => {
                suggested_quantity(&view, &consumer, &views).suggested.max(1)
            }
            None => 1,
        };

        let result = eligibility::evaluate(&EligibilityRequest {
            consumer: &consumer,
            host: host.as_ref(),
            pool: view,
            quantity,
            caller: CallerType::Bind,
            existing: &views,
            now: Utc::now(),
            unmapped_guest_grace: self.unmapped_guest_grace(),
            sla_strictness: self.config.sla_strictness,
            service_level_override: None,
            owner_default_service_level: owner.default_service_level.as_deref(),
            exempt_service_levels: &[],
        })?;
        if !result.is_success() {
            warn!(
                consumer = %consumer.id,
                pool = %pool.id,
                refused = %result.summary(),
                "bind refused"
            );
            return Err(EngineError::Refused(result));
        }

        let entitlement = self
            .entitlements
            .create(CreateEntitlement {
                consumer_id: consumer.id,
                pool_id: pool.id,
                quantity,
                start_date: None,
                end_date: None,
            })
            .await?;
        info!(
            consumer = %consumer.id,
            pool = %pool.id,
            quantity,
            "granted entitlement"
        );

        Ok(BindOutcome {
            entitlement,
            warnings: result.warnings,
        })
    }

    /// Bind whatever pools best cover the given products, or the
    /// consumer's uncovered installed products when none are named.
    /// All or nothing: one uncoverable product fails the whole call.
    pub async fn bind_products(
        &self,
        consumer_id: Uuid,
        products: Option<Vec<String>>,
        from_pools: Option<Vec<Uuid>>,
        as_of: Option<DateTime<Utc>>,
    ) -> EngineResult<AutobindOutcome> {
        if let Some(list) = &products {
            if list.is_empty() {
                return Err(EngineError::InvalidRequest {
                    message: "explicit product list must not be empty".into(),
                });
            }
        }
        let as_of = as_of.unwrap_or_else(Utc::now);
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let owner = self.owners.get_by_id(consumer.owner_id).await?;
        let host = self.resolve_host(&consumer).await?;

        let mut graph = self.load_graph(&consumer).await?;
        if self
            .revoke_stale_guest_entitlements(&consumer, host.as_ref(), &graph, as_of)
            .await?
        {
            graph = self.load_graph(&consumer).await?;
        }

        let targets = match products {
            Some(list) => list,
            None => consumer
                .installed_products
                .iter()
                .map(|p| p.product_id.clone())
                .collect(),
        };
        if targets.is_empty() {
            debug!(consumer = %consumer.id, "nothing installed, nothing to bind");
            return Ok(AutobindOutcome {
                entitlements: Vec::new(),
                covered_products: Vec::new(),
            });
        }

        // A mapped guest with an autohealing host gets the host fixed
        // up first; failure there never blocks the guest's own bind.
        if let Some(host) = &host {
            if host.autoheal {
                match self.heal_host(host, &targets, as_of).await {
                    Ok(outcome) => debug!(
                        host = %host.id,
                        granted = outcome.entitlements.len(),
                        "host healed"
                    ),
                    Err(err) => debug!(host = %host.id, error = %err, "host healing skipped"),
                }
            }
        }

        let candidates = self
            .load_candidates(consumer.owner_id, as_of, from_pools.as_deref())
            .await?;
        let (outcome, failures) = self.run_selection(SelectionInput {
            consumer: &consumer,
            host: host.as_ref(),
            graph: &graph,
            candidates: &candidates,
            targets: &targets,
            as_of,
            consider_derived: false,
            service_level_override: None,
            owner_default_service_level: owner.default_service_level.as_deref(),
        })?;

        if !outcome.uncovered_products.is_empty() {
            warn!(
                consumer = %consumer.id,
                uncovered = ?outcome.uncovered_products,
                "autobind cannot cover every requested product"
            );
            return Err(EngineError::Coverage { failures });
        }

        let entitlements = self.persist(&consumer, &outcome.selections).await?;
        Ok(AutobindOutcome {
            entitlements,
            covered_products: outcome.covered_products,
        })
    }

    /// Autobind for a host on behalf of its guests: the host binds
    /// pools whose derived products cover the guests' installed
    /// products. The caller resolves the host; the lookup stays
    /// behind the repository seam.
    pub async fn heal_host(
        &self,
        host: &Consumer,
        products: &[String],
        as_of: DateTime<Utc>,
    ) -> EngineResult<AutobindOutcome> {
        let owner = self.owners.get_by_id(host.owner_id).await?;
        let graph = self.load_graph(host).await?;
        let candidates = self.load_candidates(host.owner_id, as_of, None).await?;
        let (outcome, failures) = self.run_selection(SelectionInput {
            consumer: host,
            host: None,
            graph: &graph,
            candidates: &candidates,
            targets: products,
            as_of,
            consider_derived: true,
            service_level_override: None,
            owner_default_service_level: owner.default_service_level.as_deref(),
        })?;
        if !outcome.uncovered_products.is_empty() {
            return Err(EngineError::Coverage { failures });
        }
        let entitlements = self.persist(host, &outcome.selections).await?;
        Ok(AutobindOutcome {
            entitlements,
            covered_products: outcome.covered_products,
        })
    }

    /// What an autobind would select, committing nothing. Incomplete
    /// coverage comes back as an empty selection rather than an
    /// error; the diagnostics go to the log.
    pub async fn dry_run(
        &self,
        consumer_id: Uuid,
        service_level_override: Option<&str>,
        as_of: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<PoolQuantity>> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let owner = self.owners.get_by_id(consumer.owner_id).await?;
        let host = self.resolve_host(&consumer).await?;
        let graph = self.load_graph(&consumer).await?;

        let targets: Vec<String> = consumer
            .installed_products
            .iter()
            .map(|p| p.product_id.clone())
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.load_candidates(consumer.owner_id, as_of, None).await?;
        let (outcome, failures) = self.run_selection(SelectionInput {
            consumer: &consumer,
            host: host.as_ref(),
            graph: &graph,
            candidates: &candidates,
            targets: &targets,
            as_of,
            consider_derived: false,
            service_level_override,
            owner_default_service_level: owner.default_service_level.as_deref(),
        })?;

        if !outcome.uncovered_products.is_empty() {
            debug!(
                consumer = %consumer.id,
                uncovered = ?outcome.uncovered_products,
                failures = failures.len(),
                "dry run found incomplete coverage"
            );
            return Ok(Vec::new());
        }
        Ok(outcome.selections)
    }

    /// Full compliance picture for a consumer, including when it
    /// stops being compliant and per-product classification ranges.
    pub async fn compliance(
        &self,
        consumer_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> EngineResult<ComplianceStatus> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let graph = self.load_graph(&consumer).await?;
        let views = graph.views()?;
        Ok(compliance::status(&ComplianceRequest {
            consumer: &consumer,
            entitlements: &views,
            as_of,
            compute_compliant_until: true,
            compute_product_ranges: true,
        }))
    }

    /// Suggested and increment quantities for one pool, for pool
    /// listing UIs.
    pub async fn quantity_suggestion(
        &self,
        consumer_id: Uuid,
        pool_id: Uuid,
    ) -> EngineResult<QuantitySuggestion> {
        let consumer = self.consumers.get_by_id(consumer_id).await?;
        let graph = self.load_graph(&consumer).await?;
        let views = graph.views()?;
        let pool = self.pools.get_by_id(pool_id).await?;
        let product = self
            .products
            .get_by_product_id(consumer.owner_id, &pool.product_id)
            .await?;
        Ok(suggested_quantity(
            &PoolView::new(&pool, &product),
            &consumer,
            &views,
        ))
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn unmapped_guest_grace(&self) -> Duration {
        Duration::hours(self.config.unmapped_guest_grace_hours)
    }

    /// The hypervisor currently reporting this guest, if the consumer
    /// is a guest and one is registered.
    async fn resolve_host(&self, consumer: &Consumer) -> EngineResult<Option<Consumer>> {
        if !consumer.is_guest() {
            return Ok(None);
        }
        let Some(virt_uuid) = consumer.virt_uuid() else {
            return Ok(None);
        };
        Ok(self
            .consumers
            .find_host_of_guest(consumer.owner_id, virt_uuid)
            .await?)
    }

    /// Load the consumer's entitlements with every pool and product
    /// they reference.
    async fn load_graph(&self, consumer: &Consumer) -> EngineResult<EntitlementGraph> {
        let entitlements = self
            .entitlements
            .list_by_consumer(consumer.id, None)
            .await?;

        let pool_ids: BTreeSet<Uuid> = entitlements.iter().map(|e| e.pool_id).collect();
        let mut pools = Vec::with_capacity(pool_ids.len());
        for pool_id in pool_ids {
            pools.push(self.pools.get_by_id(pool_id).await?);
        }

        let product_ids: Vec<String> = pools
            .iter()
            .map(|p| p.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self
            .products
            .get_many(consumer.owner_id, &product_ids)
            .await?;

        Ok(EntitlementGraph::new(entitlements, pools, products))
    }

    /// Active pools of the owner with their products, optionally
    /// narrowed to an explicit pool list.
    async fn load_candidates(
        &self,
        owner_id: Uuid,
        as_of: DateTime<Utc>,
        preferred: Option<&[Uuid]>,
    ) -> EngineResult<PoolSet> {
        let mut pools = self.pools.find_active(owner_id, None, as_of).await?;
        if let Some(ids) = preferred {
            pools.retain(|pool| ids.contains(&pool.id));
        }
        let product_ids: Vec<String> = pools
            .iter()
            .map(|p| p.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self.products.get_many(owner_id, &product_ids).await?;
        Ok(PoolSet::new(pools, products))
    }

    /// The selection core shared by autobind, healing, and dry runs:
    /// compliance snapshot, per-pool eligibility filter, then pool
    /// selection. Pure once the data is loaded.
    fn run_selection(
        &self,
        input: SelectionInput<'_>,
    ) -> EngineResult<(SelectionOutcome, Vec<CoverageFailure>)> {
        let views = input.graph.views()?;
        let compliance = compliance::status_on(input.consumer, &views, input.as_of);
        let attached = attached_views(&views, &compliance);
        let candidate_views = input.candidates.views()?;
        let exempt = exempt_levels(&candidate_views);

        let mut eligible: Vec<PoolView<'_>> = Vec::new();
        let mut failures: BTreeMap<String, Vec<Reason>> = BTreeMap::new();
        for view in candidate_views {
            let result = eligibility::evaluate(&EligibilityRequest {
                consumer: input.consumer,
                host: input.host,
                pool: view,
                quantity: 1,
                caller: CallerType::BestPools,
                existing: &views,
                now: input.as_of,
                unmapped_guest_grace: self.unmapped_guest_grace(),
                sla_strictness: self.config.sla_strictness,
                service_level_override: input.service_level_override,
                owner_default_service_level: input.owner_default_service_level,
                exempt_service_levels: &exempt,
            })?;
            if result.is_success() {
                eligible.push(view);
                continue;
            }
            debug!(
                pool = %view.id(),
                refused = %result.summary(),
                "pool excluded from selection"
            );
            for target in input.targets {
                let provides = if input.consider_derived && view.pool.derived_product_id.is_some()
                {
                    view.pool.provides_derived(target)
                } else {
                    view.pool.provides(target)
                };
                if provides {
                    failures
                        .entry(target.clone())
                        .or_default()
                        .extend(result.errors.iter().cloned());
                }
            }
        }

        let outcome = autobind::select_pools(&AutobindRequest {
            consumer: input.consumer,
            installed: input.targets.to_vec(),
            candidates: eligible,
            compliance: &compliance,
            attached: &attached,
            consider_derived: input.consider_derived,
            exempt_service_levels: &exempt,
            config: &self.config,
        });

        let coverage_failures = outcome
            .uncovered_products
            .iter()
            .map(|pid| CoverageFailure {
                product_id: pid.clone(),
                reasons: failures.remove(pid).unwrap_or_default(),
            })
            .collect();

        Ok((outcome, coverage_failures))
    }

    /// Turn selections into entitlement records, in pool id order. A
    /// failed grant rolls back the earlier ones so a failed autobind
    /// leaves no partial state behind.
    async fn persist(
        &self,
        consumer: &Consumer,
        selections: &[PoolQuantity],
    ) -> EngineResult<Vec<Entitlement>> {
        let mut granted: Vec<Entitlement> = Vec::with_capacity(selections.len());
        for selection in selections {
            let created = self
                .entitlements
                .create(CreateEntitlement {
                    consumer_id: consumer.id,
                    pool_id: selection.pool_id,
                    quantity: selection.quantity,
                    start_date: None,
                    end_date: None,
                })
                .await;
            match created {
                Ok(entitlement) => {
                    info!(
                        consumer = %consumer.id,
                        pool = %selection.pool_id,
                        quantity = selection.quantity,
                        "granted entitlement"
                    );
                    granted.push(entitlement);
                }
                Err(err) => {
                    warn!(
                        consumer = %consumer.id,
                        pool = %selection.pool_id,
                        error = %err,
                        "grant failed, rolling back this autobind"
                    );
                    for done in &granted {
                        if let Err(revoke_err) = self.entitlements.revoke(done.id).await {
                            warn!(
                                entitlement = %done.id,
                                error = %revoke_err,
                                "rollback revoke failed"
                            );
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(granted)
    }

    /// A guest that gained a host, or outgrew the registration grace
    /// window, loses its unmapped-guest entitlements before binding
    /// anew. Returns whether anything was revoked.
    async fn revoke_stale_guest_entitlements(
        &self,
        consumer: &Consumer,
        host: Option<&Consumer>,
        graph: &EntitlementGraph,
        as_of: DateTime<Utc>,
    ) -> EngineResult<bool> {
        if !consumer.is_guest() {
            return Ok(false);
        }
        let newborn = as_of < consumer.created_at + self.unmapped_guest_grace();
        if host.is_none() && newborn {
            return Ok(false);
        }

        let mut revoked = false;
        for view in graph.views()? {
            if view.active_on(as_of) && view.pool.attrs().is_true(attr::UNMAPPED_GUESTS_ONLY) {
                info!(
                    consumer = %consumer.id,
                    entitlement = %view.id(),
                    "revoking unmapped-guest entitlement"
                );
                self.entitlements.revoke(view.id()).await?;
                revoked = true;
            }
        }
        Ok(revoked)
    }
}

/// The entitlements the compliance evaluation actually credited,
/// deduped across the compliant, partial, and partial-stack maps.
fn attached_views<'a>(
    views: &[EntitlementView<'a>],
    compliance: &ComplianceStatus,
) -> Vec<EntitlementView<'a>> {
    let mut ids: BTreeSet<Uuid> = BTreeSet::new();
    for referenced in compliance
        .compliant_products
        .values()
        .chain(compliance.partially_compliant_products.values())
        .chain(compliance.partial_stacks.values())
    {
        ids.extend(referenced.iter().copied());
    }
    views
        .iter()
        .copied()
        .filter(|view| ids.contains(&view.id()))
        .collect()
}

/// Service levels marked exempt anywhere in the candidate set. An
/// exempt level never participates in level matching.
fn exempt_levels(candidates: &[PoolView<'_>]) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for view in candidates {
        let attrs = view.attrs();
        if !attrs.support_level_exempt() {
            continue;
        }
        if let Some(level) = attrs.support_level() {
            if !levels.iter().any(|l| l.eq_ignore_ascii_case(level)) {
                levels.push(level.to_string());
            }
        }
    }
    levels
}
