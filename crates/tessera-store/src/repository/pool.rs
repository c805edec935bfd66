//! SurrealDB implementation of [`PoolRepository`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tessera_core::error::TesseraResult;
use tessera_core::models::pool::{CreatePool, Pool, PoolKind, UpdatePool};
use tessera_core::repository::{PaginatedResult, Pagination, PoolRepository};
use uuid::Uuid;

use crate::error::StoreError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct PoolRow {
    owner_id: String,
    kind: String,
    product_id: String,
    provided_product_ids: Vec<String>,
    derived_product_id: Option<String>,
    derived_provided_product_ids: Vec<String>,
    quantity: i64,
    consumed: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    attributes: BTreeMap<String, String>,
    restricted_to_username: Option<String>,
    source_entitlement_id: Option<String>,
    source_stack_id: Option<String>,
    subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct PoolRowWithId {
    record_id: String,
    owner_id: String,
    kind: String,
    product_id: String,
    provided_product_ids: Vec<String>,
    derived_product_id: Option<String>,
    derived_provided_product_ids: Vec<String>,
    quantity: i64,
    consumed: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    attributes: BTreeMap<String, String>,
    restricted_to_username: Option<String>,
    source_entitlement_id: Option<String>,
    source_stack_id: Option<String>,
    subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_pool_kind(s: &str) -> Result<PoolKind, StoreError> {
    match s {
        "Normal" => Ok(PoolKind::Normal),
        "Bonus" => Ok(PoolKind::Bonus),
        "EntitlementDerived" => Ok(PoolKind::EntitlementDerived),
        "StackDerived" => Ok(PoolKind::StackDerived),
        other => Err(StoreError::Query(format!("unknown pool kind: {other}"))),
    }
}

fn pool_kind_to_string(kind: &PoolKind) -> &'static str {
    match kind {
        PoolKind::Normal => "Normal",
        PoolKind::Bonus => "Bonus",
        PoolKind::EntitlementDerived => "EntitlementDerived",
        PoolKind::StackDerived => "StackDerived",
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))
}

impl PoolRow {
    fn into_pool(self, id: Uuid) -> Result<Pool, StoreError> {
        let source_entitlement_id = self
            .source_entitlement_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        Ok(Pool {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            kind: parse_pool_kind(&self.kind)?,
            product_id: self.product_id,
            provided_product_ids: self.provided_product_ids,
            derived_product_id: self.derived_product_id,
            derived_provided_product_ids: self.derived_provided_product_ids,
            quantity: self.quantity,
            consumed: self.consumed,
            start_date: self.start_date,
            end_date: self.end_date,
            attributes: self.attributes,
            restricted_to_username: self.restricted_to_username,
            source_entitlement_id,
            source_stack_id: self.source_stack_id,
            subscription_id: self.subscription_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PoolRowWithId {
    fn try_into_pool(self) -> Result<Pool, StoreError> {
        let id = parse_uuid(&self.record_id)?;
        let source_entitlement_id = self
            .source_entitlement_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        Ok(Pool {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            kind: parse_pool_kind(&self.kind)?,
            product_id: self.product_id,
            provided_product_ids: self.provided_product_ids,
            derived_product_id: self.derived_product_id,
            derived_provided_product_ids: self.derived_provided_product_ids,
            quantity: self.quantity,
            consumed: self.consumed,
            start_date: self.start_date,
            end_date: self.end_date,
            attributes: self.attributes,
            restricted_to_username: self.restricted_to_username,
            source_entitlement_id,
            source_stack_id: self.source_stack_id,
            subscription_id: self.subscription_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Pool repository.
#[derive(Clone)]
pub struct SurrealPoolRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPoolRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PoolRepository for SurrealPoolRepository<C> {
    async fn create(&self, input: CreatePool) -> TesseraResult<Pool> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let kind = input.kind.unwrap_or_default();

        let result = self
            .db
            .query(
                "CREATE type::record('pool', $id) SET \
                 owner_id = $owner_id, \
                 kind = $kind, \
                 product_id = $product_id, \
                 provided_product_ids = $provided_product_ids, \
                 derived_product_id = $derived_product_id, \
                 derived_provided_product_ids = $derived_provided_product_ids, \
                 quantity = $quantity, \
                 start_date = $start_date, \
                 end_date = $end_date, \
                 attributes = $attributes, \
                 restricted_to_username = $restricted_to_username, \
                 source_entitlement_id = $source_entitlement_id, \
                 source_stack_id = $source_stack_id, \
                 subscription_id = $subscription_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("owner_id", input.owner_id.to_string()))
            .bind(("kind", pool_kind_to_string(&kind).to_string()))
            .bind(("product_id", input.product_id))
            .bind((
                "provided_product_ids",
                input.provided_product_ids.unwrap_or_default(),
            ))
            .bind(("derived_product_id", input.derived_product_id))
            .bind((
                "derived_provided_product_ids",
                input.derived_provided_product_ids.unwrap_or_default(),
            ))
            .bind(("quantity", input.quantity))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .bind(("attributes", input.attributes.unwrap_or_default()))
            .bind(("restricted_to_username", input.restricted_to_username))
            .bind((
                "source_entitlement_id",
                input.source_entitlement_id.map(|u| u.to_string()),
            ))
            .bind(("source_stack_id", input.source_stack_id))
            .bind(("subscription_id", input.subscription_id))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<PoolRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "pool".into(),
            id: id_str,
        })?;

        Ok(row.into_pool(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TesseraResult<Pool> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('pool', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<PoolRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "pool".into(),
            id: id_str,
        })?;

        Ok(row.into_pool(id)?)
    }

    async fn update(&self, id: Uuid, input: UpdatePool) -> TesseraResult<Pool> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.quantity.is_some() {
            sets.push("quantity = $quantity");
        }
        if input.start_date.is_some() {
            sets.push("start_date = $start_date");
        }
        if input.end_date.is_some() {
            sets.push("end_date = $end_date");
        }
        if input.attributes.is_some() {
            sets.push("attributes = $attributes");
        }
        sets.push("updated_at = time::now()");

        let query = format!("UPDATE type::record('pool', $id) SET {}", sets.join(", "));

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(quantity) = input.quantity {
            builder = builder.bind(("quantity", quantity));
        }
        if let Some(start_date) = input.start_date {
            builder = builder.bind(("start_date", start_date));
        }
        if let Some(end_date) = input.end_date {
            builder = builder.bind(("end_date", end_date));
        }
        if let Some(attributes) = input.attributes {
            builder = builder.bind(("attributes", attributes));
        }

        let result = builder.await.map_err(StoreError::from)?;
        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<PoolRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "pool".into(),
            id: id_str,
        })?;

        Ok(row.into_pool(id)?)
    }

    async fn delete(&self, id: Uuid) -> TesseraResult<()> {
        self.db
            .query("DELETE type::record('pool', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(StoreError::from)?;

        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> TesseraResult<PaginatedResult<Pool>> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM pool \
                 WHERE owner_id = $owner_id GROUP ALL",
            )
            .bind(("owner_id", owner_id.to_string()))
            .await
            .map_err(StoreError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(StoreError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM pool \
                 WHERE owner_id = $owner_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<PoolRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_pool())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn find_active(
        &self,
        owner_id: Uuid,
        product_id: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> TesseraResult<Vec<Pool>> {
        // End dates are exclusive, matching the window semantics on Pool.
        let mut query = String::from(
            "SELECT meta::id(id) AS record_id, * FROM pool \
             WHERE owner_id = $owner_id \
             AND start_date <= $as_of AND end_date > $as_of",
        );
        if product_id.is_some() {
            query.push_str(
                " AND (product_id = $product_id \
                 OR provided_product_ids CONTAINS $product_id)",
            );
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut builder = self
            .db
            .query(&query)
            .bind(("owner_id", owner_id.to_string()))
            .bind(("as_of", as_of));

        if let Some(product_id) = product_id {
            builder = builder.bind(("product_id", product_id.to_string()));
        }

        let mut result = builder.await.map_err(StoreError::from)?;
        let rows: Vec<PoolRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_pool())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(items)
    }
}
