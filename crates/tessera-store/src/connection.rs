//! SurrealDB connection management.
//!
//! The store talks to SurrealDB over WebSocket, authenticates as
//! root, and pins the namespace/database pair that every repository
//! query runs against.

use std::env;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::StoreError;

/// Connection settings for the entitlement store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username.
    pub username: String,
    /// Root password.
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "tessera".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl StoreConfig {
    /// Build a configuration from `TESSERA_DB_*` environment
    /// variables, keeping the defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("TESSERA_DB_URL").unwrap_or(defaults.url),
            namespace: env::var("TESSERA_DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: env::var("TESSERA_DB_DATABASE").unwrap_or(defaults.database),
            username: env::var("TESSERA_DB_USERNAME").unwrap_or(defaults.username),
            password: env::var("TESSERA_DB_PASSWORD").unwrap_or(defaults.password),
        }
    }
}

/// A live connection to the entitlement store.
#[derive(Clone)]
pub struct StoreManager {
    db: Surreal<Client>,
}

impl StoreManager {
    /// Connect, authenticate as root, and select the configured
    /// namespace and database.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Store connection established");

        Ok(Self { db })
    }

    /// Round-trip a trivial query to confirm the connection is usable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .query("RETURN 1")
            .await?
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// The underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
