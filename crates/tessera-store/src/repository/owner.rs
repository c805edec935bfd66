//! SurrealDB implementation of [`OwnerRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tessera_core::error::TesseraResult;
use tessera_core::models::owner::{ContentAccessMode, CreateOwner, Owner, UpdateOwner};
use tessera_core::repository::{OwnerRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::StoreError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OwnerRow {
    key: String,
    display_name: String,
    default_service_level: Option<String>,
    content_access_mode: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OwnerRowWithId {
    record_id: String,
    key: String,
    display_name: String,
    default_service_level: Option<String>,
    content_access_mode: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_access_mode(s: &str) -> Result<ContentAccessMode, StoreError> {
    match s {
        "Entitlement" => Ok(ContentAccessMode::Entitlement),
        "OrgEnvironment" => Ok(ContentAccessMode::OrgEnvironment),
        other => Err(StoreError::Query(format!(
            "unknown content access mode: {other}"
        ))),
    }
}

fn access_mode_to_string(mode: &ContentAccessMode) -> &'static str {
    match mode {
        ContentAccessMode::Entitlement => "Entitlement",
        ContentAccessMode::OrgEnvironment => "OrgEnvironment",
    }
}

impl OwnerRow {
    fn into_owner(self, id: Uuid) -> Result<Owner, StoreError> {
        Ok(Owner {
            id,
            key: self.key,
            display_name: self.display_name,
            default_service_level: self.default_service_level,
            content_access_mode: parse_access_mode(&self.content_access_mode)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OwnerRowWithId {
    fn try_into_owner(self) -> Result<Owner, StoreError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))?;
        Ok(Owner {
            id,
            key: self.key,
            display_name: self.display_name,
            default_service_level: self.default_service_level,
            content_access_mode: parse_access_mode(&self.content_access_mode)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Owner repository.
#[derive(Clone)]
pub struct SurrealOwnerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOwnerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> OwnerRepository for SurrealOwnerRepository<C> {
    async fn create(&self, input: CreateOwner) -> TesseraResult<Owner> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let mode = input.content_access_mode.unwrap_or_default();

        let result = self
            .db
            .query(
                "CREATE type::record('owner', $id) SET \
                 key = $key, \
                 display_name = $display_name, \
                 default_service_level = $default_service_level, \
                 content_access_mode = $content_access_mode",
            )
            .bind(("id", id_str.clone()))
            .bind(("key", input.key))
            .bind(("display_name", input.display_name))
            .bind(("default_service_level", input.default_service_level))
            .bind(("content_access_mode", access_mode_to_string(&mode).to_string()))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<OwnerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "owner".into(),
            id: id_str,
        })?;

        Ok(row.into_owner(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TesseraResult<Owner> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('owner', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<OwnerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "owner".into(),
            id: id_str,
        })?;

        Ok(row.into_owner(id)?)
    }

    async fn get_by_key(&self, key: &str) -> TesseraResult<Owner> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM owner \
                 WHERE key = $key",
            )
            .bind(("key", key.to_string()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<OwnerRowWithId> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "owner".into(),
            id: format!("key={key}"),
        })?;

        Ok(row.try_into_owner()?)
    }

    async fn update(&self, id: Uuid, input: UpdateOwner) -> TesseraResult<Owner> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.display_name.is_some() {
            sets.push("display_name = $display_name");
        }
        if input.default_service_level.is_some() {
            sets.push("default_service_level = $default_service_level");
        }
        if input.content_access_mode.is_some() {
            sets.push("content_access_mode = $content_access_mode");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('owner', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(display_name) = input.display_name {
            builder = builder.bind(("display_name", display_name));
        }
        if let Some(level) = input.default_service_level {
            builder = builder.bind(("default_service_level", level));
        }
        if let Some(ref mode) = input.content_access_mode {
            builder = builder.bind((
                "content_access_mode",
                access_mode_to_string(mode).to_string(),
            ));
        }

        let result = builder.await.map_err(StoreError::from)?;
        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<OwnerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "owner".into(),
            id: id_str,
        })?;

        Ok(row.into_owner(id)?)
    }

    async fn delete(&self, id: Uuid) -> TesseraResult<()> {
        self.db
            .query("DELETE type::record('owner', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(StoreError::from)?;

        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> TesseraResult<PaginatedResult<Owner>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM owner GROUP ALL")
            .await
            .map_err(StoreError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(StoreError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM owner \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<OwnerRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_owner())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
