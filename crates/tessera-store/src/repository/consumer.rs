//! SurrealDB implementation of [`ConsumerRepository`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tessera_core::error::TesseraResult;
use tessera_core::models::consumer::{
    Consumer, ConsumerKind, CreateConsumer, GuestId, InstalledProduct, UpdateConsumer,
};
use tessera_core::repository::{ConsumerRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::StoreError;

/// Nested row for an installed product report.
#[derive(Debug, Clone, SurrealValue)]
struct InstalledProductRow {
    product_id: String,
    version: Option<String>,
    arch: Option<String>,
}

impl From<InstalledProduct> for InstalledProductRow {
    fn from(p: InstalledProduct) -> Self {
        Self {
            product_id: p.product_id,
            version: p.version,
            arch: p.arch,
        }
    }
}

impl From<InstalledProductRow> for InstalledProduct {
    fn from(r: InstalledProductRow) -> Self {
        Self {
            product_id: r.product_id,
            version: r.version,
            arch: r.arch,
        }
    }
}

/// Nested row for a reported guest.
#[derive(Debug, Clone, SurrealValue)]
struct GuestIdRow {
    guest_id: String,
    active: bool,
}

impl From<GuestId> for GuestIdRow {
    fn from(g: GuestId) -> Self {
        Self {
            guest_id: g.guest_id,
            active: g.active,
        }
    }
}

impl From<GuestIdRow> for GuestId {
    fn from(r: GuestIdRow) -> Self {
        Self {
            guest_id: r.guest_id,
            active: r.active,
        }
    }
}

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct ConsumerRow {
    owner_id: String,
    name: String,
    kind: String,
    username: Option<String>,
    service_level: Option<String>,
    autoheal: bool,
    capabilities: Vec<String>,
    facts: BTreeMap<String, String>,
    installed_products: Vec<InstalledProductRow>,
    guest_ids: Vec<GuestIdRow>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct ConsumerRowWithId {
    record_id: String,
    owner_id: String,
    name: String,
    kind: String,
    username: Option<String>,
    service_level: Option<String>,
    autoheal: bool,
    capabilities: Vec<String>,
    facts: BTreeMap<String, String>,
    installed_products: Vec<InstalledProductRow>,
    guest_ids: Vec<GuestIdRow>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_kind(s: &str) -> Result<ConsumerKind, StoreError> {
    match s {
        "System" => Ok(ConsumerKind::System),
        "Person" => Ok(ConsumerKind::Person),
        "Hypervisor" => Ok(ConsumerKind::Hypervisor),
        "Distributor" => Ok(ConsumerKind::Distributor),
        other => Err(StoreError::Query(format!("unknown consumer kind: {other}"))),
    }
}

fn kind_to_string(kind: &ConsumerKind) -> &'static str {
    match kind {
        ConsumerKind::System => "System",
        ConsumerKind::Person => "Person",
        ConsumerKind::Hypervisor => "Hypervisor",
        ConsumerKind::Distributor => "Distributor",
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))
}

impl ConsumerRow {
    fn into_consumer(self, id: Uuid) -> Result<Consumer, StoreError> {
        Ok(Consumer {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            name: self.name,
            kind: parse_kind(&self.kind)?,
            username: self.username,
            service_level: self.service_level,
            autoheal: self.autoheal,
            capabilities: self.capabilities,
            facts: self.facts,
            installed_products: self.installed_products.into_iter().map(Into::into).collect(),
            guest_ids: self.guest_ids.into_iter().map(Into::into).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ConsumerRowWithId {
    fn try_into_consumer(self) -> Result<Consumer, StoreError> {
        let id = parse_uuid(&self.record_id)?;
        Ok(Consumer {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            name: self.name,
            kind: parse_kind(&self.kind)?,
            username: self.username,
            service_level: self.service_level,
            autoheal: self.autoheal,
            capabilities: self.capabilities,
            facts: self.facts,
            installed_products: self.installed_products.into_iter().map(Into::into).collect(),
            guest_ids: self.guest_ids.into_iter().map(Into::into).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Consumer repository.
#[derive(Clone)]
pub struct SurrealConsumerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealConsumerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ConsumerRepository for SurrealConsumerRepository<C> {
    async fn create(&self, input: CreateConsumer) -> TesseraResult<Consumer> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let installed: Vec<InstalledProductRow> = input
            .installed_products
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect();
        let guests: Vec<GuestIdRow> = input
            .guest_ids
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect();

        let result = self
            .db
            .query(
                "CREATE type::record('consumer', $id) SET \
                 owner_id = $owner_id, \
                 name = $name, \
                 kind = $kind, \
                 username = $username, \
                 service_level = $service_level, \
                 autoheal = $autoheal, \
                 capabilities = $capabilities, \
                 facts = $facts, \
                 installed_products = $installed_products, \
                 guest_ids = $guest_ids",
            )
            .bind(("id", id_str.clone()))
            .bind(("owner_id", input.owner_id.to_string()))
            .bind(("name", input.name))
            .bind(("kind", kind_to_string(&input.kind).to_string()))
            .bind(("username", input.username))
            .bind(("service_level", input.service_level))
            .bind(("autoheal", input.autoheal.unwrap_or(true)))
            .bind(("capabilities", input.capabilities.unwrap_or_default()))
            .bind(("facts", input.facts.unwrap_or_default()))
            .bind(("installed_products", installed))
            .bind(("guest_ids", guests))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<ConsumerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "consumer".into(),
            id: id_str,
        })?;

        Ok(row.into_consumer(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TesseraResult<Consumer> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('consumer', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ConsumerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "consumer".into(),
            id: id_str,
        })?;

        Ok(row.into_consumer(id)?)
    }

    async fn update(&self, id: Uuid, input: UpdateConsumer) -> TesseraResult<Consumer> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.service_level.is_some() {
            sets.push("service_level = $service_level");
        }
        if input.autoheal.is_some() {
            sets.push("autoheal = $autoheal");
        }
        if input.capabilities.is_some() {
            sets.push("capabilities = $capabilities");
        }
        if input.facts.is_some() {
            sets.push("facts = $facts");
        }
        if input.installed_products.is_some() {
            sets.push("installed_products = $installed_products");
        }
        if input.guest_ids.is_some() {
            sets.push("guest_ids = $guest_ids");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('consumer', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(level) = input.service_level {
            builder = builder.bind(("service_level", level));
        }
        if let Some(autoheal) = input.autoheal {
            builder = builder.bind(("autoheal", autoheal));
        }
        if let Some(capabilities) = input.capabilities {
            builder = builder.bind(("capabilities", capabilities));
        }
        if let Some(facts) = input.facts {
            builder = builder.bind(("facts", facts));
        }
        if let Some(installed) = input.installed_products {
            let installed: Vec<InstalledProductRow> =
                installed.into_iter().map(Into::into).collect();
            builder = builder.bind(("installed_products", installed));
        }
        if let Some(guests) = input.guest_ids {
            let guests: Vec<GuestIdRow> = guests.into_iter().map(Into::into).collect();
            builder = builder.bind(("guest_ids", guests));
        }

        let result = builder.await.map_err(StoreError::from)?;
        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<ConsumerRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "consumer".into(),
            id: id_str,
        })?;

        Ok(row.into_consumer(id)?)
    }

    async fn delete(&self, id: Uuid) -> TesseraResult<()> {
        self.db
            .query("DELETE type::record('consumer', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(StoreError::from)?;

        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> TesseraResult<PaginatedResult<Consumer>> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM consumer \
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
                "SELECT meta::id(id) AS record_id, * FROM consumer \
                 WHERE owner_id = $owner_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ConsumerRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_consumer())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn find_host_of_guest(
        &self,
        owner_id: Uuid,
        virt_uuid: &str,
    ) -> TesseraResult<Option<Consumer>> {
        // Fetch the owner's hypervisors and match the guest list in Rust;
        // guest UUIDs are matched case-insensitively.
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM consumer \
                 WHERE owner_id = $owner_id AND kind = 'Hypervisor' \
                 ORDER BY created_at ASC",
            )
            .bind(("owner_id", owner_id.to_string()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ConsumerRowWithId> = result.take(0).map_err(StoreError::from)?;

        for row in rows {
            let reports_guest = row
                .guest_ids
                .iter()
                .any(|g| g.active && g.guest_id.eq_ignore_ascii_case(virt_uuid));
            if reports_guest {
                return Ok(Some(row.try_into_consumer()?));
            }
        }

        Ok(None)
    }
}
