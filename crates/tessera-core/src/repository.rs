//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Owner-scoped repositories
//! take an `owner_id` parameter to enforce tenancy isolation; the
//! engine itself never crosses an owner boundary.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TesseraResult;
use crate::models::{
    consumer::{Consumer, CreateConsumer, UpdateConsumer},
    entitlement::{CreateEntitlement, Entitlement},
    owner::{CreateOwner, Owner, UpdateOwner},
    pool::{CreatePool, Pool, UpdatePool},
    product::{CreateProduct, Product, UpdateProduct},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Owners (global scope)
// ---------------------------------------------------------------------------

pub trait OwnerRepository: Send + Sync {
    fn create(&self, input: CreateOwner) -> impl Future<Output = TesseraResult<Owner>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TesseraResult<Owner>> + Send;
    fn get_by_key(&self, key: &str) -> impl Future<Output = TesseraResult<Owner>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOwner,
    ) -> impl Future<Output = TesseraResult<Owner>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TesseraResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = TesseraResult<PaginatedResult<Owner>>> + Send;
}

// ---------------------------------------------------------------------------
// Owner-scoped repositories
// ---------------------------------------------------------------------------

pub trait ConsumerRepository: Send + Sync {
    fn create(
        &self,
        input: CreateConsumer,
    ) -> impl Future<Output = TesseraResult<Consumer>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TesseraResult<Consumer>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateConsumer,
    ) -> impl Future<Output = TesseraResult<Consumer>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TesseraResult<()>> + Send;
    fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TesseraResult<PaginatedResult<Consumer>>> + Send;

    /// Find the hypervisor currently reporting `virt_uuid` among its
    /// active guests, if any.
    fn find_host_of_guest(
        &self,
        owner_id: Uuid,
        virt_uuid: &str,
    ) -> impl Future<Output = TesseraResult<Option<Consumer>>> + Send;
}

pub trait ProductRepository: Send + Sync {
    fn create(&self, input: CreateProduct)
    -> impl Future<Output = TesseraResult<Product>> + Send;
    /// Products are addressed by their external id within an owner.
    fn get_by_product_id(
        &self,
        owner_id: Uuid,
        product_id: &str,
    ) -> impl Future<Output = TesseraResult<Product>> + Send;
    fn update(
        &self,
        owner_id: Uuid,
        product_id: &str,
        input: UpdateProduct,
    ) -> impl Future<Output = TesseraResult<Product>> + Send;
    fn delete(
        &self,
        owner_id: Uuid,
        product_id: &str,
    ) -> impl Future<Output = TesseraResult<()>> + Send;
    fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TesseraResult<PaginatedResult<Product>>> + Send;

    /// Batch fetch for snapshot assembly. Unknown ids are skipped, not
    /// errors; the caller decides whether a gap is fatal.
    fn get_many(
        &self,
        owner_id: Uuid,
        product_ids: &[String],
    ) -> impl Future<Output = TesseraResult<Vec<Product>>> + Send;
}

pub trait PoolRepository: Send + Sync {
    fn create(&self, input: CreatePool) -> impl Future<Output = TesseraResult<Pool>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TesseraResult<Pool>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdatePool,
    ) -> impl Future<Output = TesseraResult<Pool>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TesseraResult<()>> + Send;
    fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TesseraResult<PaginatedResult<Pool>>> + Send;

    /// Pools whose window contains `as_of`, optionally narrowed to
    /// those providing `product_id`.
    fn find_active(
        &self,
        owner_id: Uuid,
        product_id: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> impl Future<Output = TesseraResult<Vec<Pool>>> + Send;
}

pub trait EntitlementRepository: Send + Sync {
    /// Create an entitlement and consume capacity from its pool in one
    /// atomic step. Fails without side effects if the pool lacks
    /// capacity.
    fn create(
        &self,
        input: CreateEntitlement,
    ) -> impl Future<Output = TesseraResult<Entitlement>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TesseraResult<Entitlement>> + Send;
    /// Delete the entitlement and return its capacity to the pool.
    fn revoke(&self, id: Uuid) -> impl Future<Output = TesseraResult<()>> + Send;
    /// All entitlements held by a consumer, optionally narrowed to
    /// those active at `active_on`.
    fn list_by_consumer(
        &self,
        consumer_id: Uuid,
        active_on: Option<DateTime<Utc>>,
    ) -> impl Future<Output = TesseraResult<Vec<Entitlement>>> + Send;
    fn list_by_pool(
        &self,
        pool_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TesseraResult<PaginatedResult<Entitlement>>> + Send;
}
