//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. Attribute and fact maps are
//! FLEXIBLE objects; their keys are open-ended by design.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::StoreError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Owners (global scope)
-- =======================================================================
DEFINE TABLE owner SCHEMAFULL;
DEFINE FIELD key ON TABLE owner TYPE string;
DEFINE FIELD display_name ON TABLE owner TYPE string;
DEFINE FIELD default_service_level ON TABLE owner TYPE option<string>;
DEFINE FIELD content_access_mode ON TABLE owner TYPE string \
    ASSERT $value IN ['Entitlement', 'OrgEnvironment'];
DEFINE FIELD created_at ON TABLE owner TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE owner TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_owner_key ON TABLE owner COLUMNS key UNIQUE;

-- =======================================================================
-- Consumers (owner scope)
-- =======================================================================
DEFINE TABLE consumer SCHEMAFULL;
DEFINE FIELD owner_id ON TABLE consumer TYPE string;
DEFINE FIELD name ON TABLE consumer TYPE string;
DEFINE FIELD kind ON TABLE consumer TYPE string \
    ASSERT $value IN ['System', 'Person', 'Hypervisor', 'Distributor'];
DEFINE FIELD username ON TABLE consumer TYPE option<string>;
DEFINE FIELD service_level ON TABLE consumer TYPE option<string>;
DEFINE FIELD autoheal ON TABLE consumer TYPE bool DEFAULT true;
DEFINE FIELD capabilities ON TABLE consumer TYPE array<string> \
    DEFAULT [];
DEFINE FIELD facts ON TABLE consumer TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD installed_products ON TABLE consumer TYPE array \
    DEFAULT [];
DEFINE FIELD installed_products.* ON TABLE consumer TYPE object;
DEFINE FIELD installed_products.*.product_id ON TABLE consumer \
    TYPE string;
DEFINE FIELD installed_products.*.version ON TABLE consumer \
    TYPE option<string>;
DEFINE FIELD installed_products.*.arch ON TABLE consumer \
    TYPE option<string>;
DEFINE FIELD guest_ids ON TABLE consumer TYPE array DEFAULT [];
DEFINE FIELD guest_ids.* ON TABLE consumer TYPE object;
DEFINE FIELD guest_ids.*.guest_id ON TABLE consumer TYPE string;
DEFINE FIELD guest_ids.*.active ON TABLE consumer TYPE bool;
DEFINE FIELD created_at ON TABLE consumer TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE consumer TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_consumer_owner ON TABLE consumer COLUMNS owner_id;

-- =======================================================================
-- Products (owner scope, addressed by external product_id)
-- =======================================================================
DEFINE TABLE product SCHEMAFULL;
DEFINE FIELD owner_id ON TABLE product TYPE string;
DEFINE FIELD product_id ON TABLE product TYPE string;
DEFINE FIELD name ON TABLE product TYPE string;
DEFINE FIELD multiplier ON TABLE product TYPE int DEFAULT 1;
DEFINE FIELD attributes ON TABLE product TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD dependent_product_ids ON TABLE product \
    TYPE array<string> DEFAULT [];
DEFINE FIELD content ON TABLE product TYPE array DEFAULT [];
DEFINE FIELD content.* ON TABLE product TYPE object;
DEFINE FIELD content.*.content_id ON TABLE product TYPE string;
DEFINE FIELD content.*.enabled ON TABLE product TYPE bool;
DEFINE FIELD created_at ON TABLE product TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE product TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_product_owner_pid ON TABLE product \
    COLUMNS owner_id, product_id UNIQUE;

-- =======================================================================
-- Pools (owner scope)
-- =======================================================================
DEFINE TABLE pool SCHEMAFULL;
DEFINE FIELD owner_id ON TABLE pool TYPE string;
DEFINE FIELD kind ON TABLE pool TYPE string \
    ASSERT $value IN ['Normal', 'Bonus', 'EntitlementDerived', \
    'StackDerived'];
DEFINE FIELD product_id ON TABLE pool TYPE string;
DEFINE FIELD provided_product_ids ON TABLE pool TYPE array<string> \
    DEFAULT [];
DEFINE FIELD derived_product_id ON TABLE pool TYPE option<string>;
DEFINE FIELD derived_provided_product_ids ON TABLE pool \
    TYPE array<string> DEFAULT [];
DEFINE FIELD quantity ON TABLE pool TYPE int;
DEFINE FIELD consumed ON TABLE pool TYPE int DEFAULT 0;
DEFINE FIELD start_date ON TABLE pool TYPE datetime;
DEFINE FIELD end_date ON TABLE pool TYPE datetime;
DEFINE FIELD attributes ON TABLE pool TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD restricted_to_username ON TABLE pool TYPE option<string>;
DEFINE FIELD source_entitlement_id ON TABLE pool TYPE option<string>;
DEFINE FIELD source_stack_id ON TABLE pool TYPE option<string>;
DEFINE FIELD subscription_id ON TABLE pool TYPE option<string>;
DEFINE FIELD created_at ON TABLE pool TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE pool TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_pool_owner ON TABLE pool COLUMNS owner_id;

-- =======================================================================
-- Entitlements (consumer scope)
-- =======================================================================
DEFINE TABLE entitlement SCHEMAFULL;
DEFINE FIELD owner_id ON TABLE entitlement TYPE string;
DEFINE FIELD consumer_id ON TABLE entitlement TYPE string;
DEFINE FIELD pool_id ON TABLE entitlement TYPE string;
DEFINE FIELD quantity ON TABLE entitlement TYPE int;
DEFINE FIELD start_date ON TABLE entitlement TYPE datetime;
DEFINE FIELD end_date ON TABLE entitlement TYPE datetime;
DEFINE FIELD certificate_serial ON TABLE entitlement \
    TYPE option<int>;
DEFINE FIELD created_at ON TABLE entitlement TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE entitlement TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_entitlement_consumer ON TABLE entitlement \
    COLUMNS consumer_id;
DEFINE INDEX idx_entitlement_pool ON TABLE entitlement \
    COLUMNS pool_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), StoreError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                StoreError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                StoreError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn schema_defines_every_entity_table() {
        for table in ["owner", "consumer", "product", "pool", "entitlement"] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing table definition for {table}"
            );
        }
    }
}
