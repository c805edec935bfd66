//! SurrealDB implementation of [`EntitlementRepository`].
//!
//! Grants and revocations run inside SurrealDB transactions so the pool's
//! consumed counter and the entitlement row always move together. A grant
//! against an exhausted pool THROWs inside the transaction and leaves no
//! trace behind.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::models::entitlement::{CreateEntitlement, Entitlement};
use tessera_core::repository::{EntitlementRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::StoreError;

const CREATE_ENTITLEMENT: &str = "\
BEGIN TRANSACTION;
LET $pool = (SELECT * FROM ONLY type::record('pool', $pool_id));
IF $pool == NONE { THROW 'pool not found' };
IF $pool.quantity >= 0 AND $pool.consumed + $quantity > $pool.quantity { THROW 'pool exhausted' };
UPDATE type::record('pool', $pool_id) SET consumed += $quantity, updated_at = time::now();
CREATE type::record('entitlement', $id) SET \
    owner_id = $pool.owner_id, \
    consumer_id = $consumer_id, \
    pool_id = $pool_id, \
    quantity = $quantity, \
    start_date = $start_date ?? $pool.start_date, \
    end_date = $end_date ?? $pool.end_date;
COMMIT TRANSACTION;";

const REVOKE_ENTITLEMENT: &str = "\
BEGIN TRANSACTION;
LET $ent = (SELECT * FROM ONLY type::record('entitlement', $id));
IF $ent == NONE { THROW 'entitlement not found' };
UPDATE type::record('pool', $ent.pool_id) SET \
    consumed = math::max([consumed - $ent.quantity, 0]), \
    updated_at = time::now();
DELETE type::record('entitlement', $id);
COMMIT TRANSACTION;";

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct EntitlementRow {
    owner_id: String,
    consumer_id: String,
    pool_id: String,
    quantity: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    certificate_serial: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct EntitlementRowWithId {
    record_id: String,
    owner_id: String,
    consumer_id: String,
    pool_id: String,
    quantity: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    certificate_serial: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))
}

impl EntitlementRow {
    fn into_entitlement(self, id: Uuid) -> Result<Entitlement, StoreError> {
        Ok(Entitlement {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            consumer_id: parse_uuid(&self.consumer_id)?,
            pool_id: parse_uuid(&self.pool_id)?,
            quantity: self.quantity,
            start_date: self.start_date,
            end_date: self.end_date,
            certificate_serial: self.certificate_serial,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl EntitlementRowWithId {
    fn try_into_entitlement(self) -> Result<Entitlement, StoreError> {
        let id = parse_uuid(&self.record_id)?;
        Ok(Entitlement {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            consumer_id: parse_uuid(&self.consumer_id)?,
            pool_id: parse_uuid(&self.pool_id)?,
            quantity: self.quantity,
            start_date: self.start_date,
            end_date: self.end_date,
            certificate_serial: self.certificate_serial,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Entitlement repository.
#[derive(Clone)]
pub struct SurrealEntitlementRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealEntitlementRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> EntitlementRepository for SurrealEntitlementRepository<C> {
    async fn create(&self, input: CreateEntitlement) -> TesseraResult<Entitlement> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let pool_id_str = input.pool_id.to_string();

        let mut result = self
            .db
            .query(CREATE_ENTITLEMENT)
            .bind(("id", id_str.clone()))
            .bind(("pool_id", pool_id_str.clone()))
            .bind(("consumer_id", input.consumer_id.to_string()))
            .bind(("quantity", input.quantity))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .await
            .map_err(StoreError::from)?;

        // A THROW rolls the whole transaction back, so a refused grant
        // leaves the pool untouched. The THROW message lands on the
        // statement that threw while the others report generic
        // cancellation errors, so scan every statement's error.
        let errors = result.take_errors();
        if !errors.is_empty() {
            let mut errors: Vec<(usize, surrealdb::Error)> = errors.into_iter().collect();
            errors.sort_by_key(|(index, _)| *index);
            let msg = errors
                .iter()
                .map(|(_, e)| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            if msg.contains("pool exhausted") {
                return Err(TesseraError::Validation {
                    message: "pool exhausted".into(),
                });
            }
            if msg.contains("pool not found") {
                return Err(TesseraError::NotFound {
                    entity: "pool".into(),
                    id: pool_id_str,
                });
            }
            return Err(StoreError::Query(msg).into());
        }

        // Statements: 0 BEGIN, 1 LET, 2 IF, 3 IF, 4 UPDATE, 5 CREATE,
        // 6 COMMIT.
        let rows: Vec<EntitlementRow> = result.take(5).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "entitlement".into(),
            id: id_str,
        })?;

        Ok(row.into_entitlement(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TesseraResult<Entitlement> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('entitlement', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<EntitlementRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "entitlement".into(),
            id: id_str,
        })?;

        Ok(row.into_entitlement(id)?)
    }

    async fn revoke(&self, id: Uuid) -> TesseraResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(REVOKE_ENTITLEMENT)
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        // As in create: the THROW message sits on the throwing
        // statement, so scan every statement's error.
        let errors = result.take_errors();
        if !errors.is_empty() {
            let mut errors: Vec<(usize, surrealdb::Error)> = errors.into_iter().collect();
            errors.sort_by_key(|(index, _)| *index);
            let msg = errors
                .iter()
                .map(|(_, e)| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            if msg.contains("entitlement not found") {
                return Err(TesseraError::NotFound {
                    entity: "entitlement".into(),
                    id: id_str,
                });
            }
            return Err(StoreError::Query(msg).into());
        }

        Ok(())
    }

    async fn list_by_consumer(
        &self,
        consumer_id: Uuid,
        active_on: Option<DateTime<Utc>>,
    ) -> TesseraResult<Vec<Entitlement>> {
        // End dates are exclusive, matching the window semantics on
        // Entitlement.
        let mut query = String::from(
            "SELECT meta::id(id) AS record_id, * FROM entitlement \
             WHERE consumer_id = $consumer_id",
        );
        if active_on.is_some() {
            query.push_str(" AND start_date <= $active_on AND end_date > $active_on");
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut builder = self
            .db
            .query(&query)
            .bind(("consumer_id", consumer_id.to_string()));

        if let Some(active_on) = active_on {
            builder = builder.bind(("active_on", active_on));
        }

        let mut result = builder.await.map_err(StoreError::from)?;
        let rows: Vec<EntitlementRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_entitlement())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(items)
    }

    async fn list_by_pool(
        &self,
        pool_id: Uuid,
        pagination: Pagination,
    ) -> TesseraResult<PaginatedResult<Entitlement>> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM entitlement \
                 WHERE pool_id = $pool_id GROUP ALL",
            )
            .bind(("pool_id", pool_id.to_string()))
            .await
            .map_err(StoreError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(StoreError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM entitlement \
                 WHERE pool_id = $pool_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("pool_id", pool_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<EntitlementRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_entitlement())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
