//! Immutable snapshot views the engine evaluates over.
//!
//! The evaluation components never touch repositories. The service
//! layer loads a consumer's world into an [`EntitlementGraph`] up
//! front, and everything downstream works on borrowed views joining
//! each entity with the records it references.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::models::attributes::AttributeMap;
use tessera_core::models::entitlement::Entitlement;
use tessera_core::models::pool::Pool;
use tessera_core::models::product::Product;
use tessera_core::models::window::TemporalWindow;
use uuid::Uuid;

/// A pool joined with its marketing product.
#[derive(Debug, Clone, Copy)]
pub struct PoolView<'a> {
    pub pool: &'a Pool,
    pub product: &'a Product,
}

impl<'a> PoolView<'a> {
    pub fn new(pool: &'a Pool, product: &'a Product) -> Self {
        Self { pool, product }
    }

    pub fn id(&self) -> Uuid {
        self.pool.id
    }

    pub fn attrs(&self) -> AttributeMap<'a> {
        AttributeMap::resolve(self.pool, self.product)
    }

    pub fn window(&self) -> TemporalWindow {
        self.pool.window()
    }
}

/// An entitlement joined with the pool it came from.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementView<'a> {
    pub entitlement: &'a Entitlement,
    pub pool: PoolView<'a>,
}

impl<'a> EntitlementView<'a> {
    pub fn id(&self) -> Uuid {
        self.entitlement.id
    }

    pub fn quantity(&self) -> i64 {
        self.entitlement.quantity
    }

    /// The entitlement's own window, which may differ from the pool's.
    pub fn window(&self) -> TemporalWindow {
        self.entitlement.window()
    }

    pub fn active_on(&self, at: DateTime<Utc>) -> bool {
        self.window().active_on(at)
    }

    pub fn stack_id(&self) -> Option<&'a str> {
        self.pool.attrs().stacking_id()
    }

    pub fn is_stacked(&self) -> bool {
        self.stack_id().is_some()
    }
}

/// Owned storage for a consumer's entitlements plus every pool and
/// product they reference.
#[derive(Debug, Default)]
pub struct EntitlementGraph {
    entitlements: Vec<Entitlement>,
    pools: BTreeMap<Uuid, Pool>,
    products: BTreeMap<String, Product>,
}

impl EntitlementGraph {
    pub fn new(
        entitlements: Vec<Entitlement>,
        pools: Vec<Pool>,
        products: Vec<Product>,
    ) -> Self {
        Self {
            entitlements,
            pools: pools.into_iter().map(|p| (p.id, p)).collect(),
            products: products
                .into_iter()
                .map(|p| (p.product_id.clone(), p))
                .collect(),
        }
    }

    /// Join every entitlement with its pool and product. A missing
    /// reference means the stored data is inconsistent and is reported
    /// as an error rather than silently skipped.
    pub fn views(&self) -> TesseraResult<Vec<EntitlementView<'_>>> {
        self.entitlements
            .iter()
            .map(|ent| {
                let pool = self.pools.get(&ent.pool_id).ok_or_else(|| {
                    TesseraError::NotFound {
                        entity: "pool".into(),
                        id: ent.pool_id.to_string(),
                    }
                })?;
                let product = self.product_of(pool)?;
                Ok(EntitlementView {
                    entitlement: ent,
                    pool: PoolView::new(pool, product),
                })
            })
            .collect()
    }

    /// Look up the marketing product backing `pool`.
    pub fn product_of(&self, pool: &Pool) -> TesseraResult<&Product> {
        self.products
            .get(&pool.product_id)
            .ok_or_else(|| TesseraError::NotFound {
                entity: "product".into(),
                id: pool.product_id.clone(),
            })
    }
}

/// Owned storage for a set of candidate pools plus the products they
/// sell. Same join policy as [`EntitlementGraph`].
#[derive(Debug, Default)]
pub struct PoolSet {
    pools: Vec<Pool>,
    products: BTreeMap<String, Product>,
}

impl PoolSet {
    pub fn new(pools: Vec<Pool>, products: Vec<Product>) -> Self {
        Self {
            pools,
            products: products
                .into_iter()
                .map(|p| (p.product_id.clone(), p))
                .collect(),
        }
    }

    pub fn views(&self) -> TesseraResult<Vec<PoolView<'_>>> {
        self.pools
            .iter()
            .map(|pool| {
                let product = self.products.get(&pool.product_id).ok_or_else(|| {
                    TesseraError::NotFound {
                        entity: "product".into(),
                        id: pool.product_id.clone(),
                    }
                })?;
                Ok(PoolView::new(pool, product))
            })
            .collect()
    }
}
