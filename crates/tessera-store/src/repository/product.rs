//! SurrealDB implementation of [`ProductRepository`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tessera_core::error::TesseraResult;
use tessera_core::models::product::{CreateProduct, Product, ProductContent, UpdateProduct};
use tessera_core::repository::{PaginatedResult, Pagination, ProductRepository};
use uuid::Uuid;

use crate::error::StoreError;

/// Nested row for enabled content references.
#[derive(Debug, Clone, SurrealValue)]
struct ContentRow {
    content_id: String,
    enabled: bool,
}

impl From<ProductContent> for ContentRow {
    fn from(c: ProductContent) -> Self {
        Self {
            content_id: c.content_id,
            enabled: c.enabled,
        }
    }
}

impl From<ContentRow> for ProductContent {
    fn from(r: ContentRow) -> Self {
        Self {
            content_id: r.content_id,
            enabled: r.enabled,
        }
    }
}

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct ProductRow {
    owner_id: String,
    product_id: String,
    name: String,
    multiplier: i64,
    attributes: BTreeMap<String, String>,
    dependent_product_ids: Vec<String>,
    content: Vec<ContentRow>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct ProductRowWithId {
    record_id: String,
    owner_id: String,
    product_id: String,
    name: String,
    multiplier: i64,
    attributes: BTreeMap<String, String>,
    dependent_product_ids: Vec<String>,
    content: Vec<ContentRow>,
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

impl ProductRow {
    fn into_product(self, id: Uuid) -> Result<Product, StoreError> {
        Ok(Product {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            product_id: self.product_id,
            name: self.name,
            multiplier: self.multiplier,
            attributes: self.attributes,
            dependent_product_ids: self.dependent_product_ids,
            content: self.content.into_iter().map(Into::into).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ProductRowWithId {
    fn try_into_product(self) -> Result<Product, StoreError> {
        let id = parse_uuid(&self.record_id)?;
        Ok(Product {
            id,
            owner_id: parse_uuid(&self.owner_id)?,
            product_id: self.product_id,
            name: self.name,
            multiplier: self.multiplier,
            attributes: self.attributes,
            dependent_product_ids: self.dependent_product_ids,
            content: self.content.into_iter().map(Into::into).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Product repository.
#[derive(Clone)]
pub struct SurrealProductRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealProductRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ProductRepository for SurrealProductRepository<C> {
    async fn create(&self, input: CreateProduct) -> TesseraResult<Product> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let content: Vec<ContentRow> = input
            .content
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect();

        let result = self
            .db
            .query(
                "CREATE type::record('product', $id) SET \
                 owner_id = $owner_id, \
                 product_id = $product_id, \
                 name = $name, \
                 multiplier = $multiplier, \
                 attributes = $attributes, \
                 dependent_product_ids = $dependent_product_ids, \
                 content = $content",
            )
            .bind(("id", id_str.clone()))
            .bind(("owner_id", input.owner_id.to_string()))
            .bind(("product_id", input.product_id))
            .bind(("name", input.name))
            .bind(("multiplier", input.multiplier.unwrap_or(1)))
            .bind(("attributes", input.attributes.unwrap_or_default()))
            .bind((
                "dependent_product_ids",
                input.dependent_product_ids.unwrap_or_default(),
            ))
            .bind(("content", content))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<ProductRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "product".into(),
            id: id_str,
        })?;

        Ok(row.into_product(id)?)
    }

    async fn get_by_product_id(&self, owner_id: Uuid, product_id: &str) -> TesseraResult<Product> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM product \
                 WHERE owner_id = $owner_id AND product_id = $product_id",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("product_id", product_id.to_string()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ProductRowWithId> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "product".into(),
            id: format!("product_id={product_id}"),
        })?;

        Ok(row.try_into_product()?)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        product_id: &str,
        input: UpdateProduct,
    ) -> TesseraResult<Product> {
        // Resolve the record first so missing products surface as NotFound.
        let existing = self.get_by_product_id(owner_id, product_id).await?;
        let id_str = existing.id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.multiplier.is_some() {
            sets.push("multiplier = $multiplier");
        }
        if input.attributes.is_some() {
            sets.push("attributes = $attributes");
        }
        if input.dependent_product_ids.is_some() {
            sets.push("dependent_product_ids = $dependent_product_ids");
        }
        if input.content.is_some() {
            sets.push("content = $content");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('product', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(multiplier) = input.multiplier {
            builder = builder.bind(("multiplier", multiplier));
        }
        if let Some(attributes) = input.attributes {
            builder = builder.bind(("attributes", attributes));
        }
        if let Some(ids) = input.dependent_product_ids {
            builder = builder.bind(("dependent_product_ids", ids));
        }
        if let Some(content) = input.content {
            let content: Vec<ContentRow> = content.into_iter().map(Into::into).collect();
            builder = builder.bind(("content", content));
        }

        let result = builder.await.map_err(StoreError::from)?;
        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows: Vec<ProductRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "product".into(),
            id: id_str,
        })?;

        Ok(row.into_product(existing.id)?)
    }

    async fn delete(&self, owner_id: Uuid, product_id: &str) -> TesseraResult<()> {
        self.db
            .query(
                "DELETE product \
                 WHERE owner_id = $owner_id AND product_id = $product_id",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("product_id", product_id.to_string()))
            .await
            .map_err(StoreError::from)?;

        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        pagination: Pagination,
    ) -> TesseraResult<PaginatedResult<Product>> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM product \
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
                "SELECT meta::id(id) AS record_id, * FROM product \
                 WHERE owner_id = $owner_id \
                 ORDER BY product_id ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ProductRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_product())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn get_many(&self, owner_id: Uuid, product_ids: &[String]) -> TesseraResult<Vec<Product>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM product \
                 WHERE owner_id = $owner_id AND product_id IN $product_ids \
                 ORDER BY product_id ASC",
            )
            .bind(("owner_id", owner_id.to_string()))
            .bind(("product_ids", product_ids.to_vec()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<ProductRowWithId> = result.take(0).map_err(StoreError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_product())
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(items)
    }
}
