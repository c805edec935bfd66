//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    tessera_store::run_migrations(&db).await.unwrap();

    // Verify that every entity table exists by querying INFO FOR DB.
    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    assert!(info_str.contains("owner"), "missing owner table");
    assert!(info_str.contains("consumer"), "missing consumer table");
    assert!(info_str.contains("product"), "missing product table");
    assert!(info_str.contains("pool"), "missing pool table");
    assert!(info_str.contains("entitlement"), "missing entitlement table");

    // Verify migration was recorded.
    assert!(info_str.contains("_migration"), "missing _migration table");
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    // Run twice — should not fail.
    tessera_store::run_migrations(&db).await.unwrap();
    tessera_store::run_migrations(&db).await.unwrap();

    // Verify only one migration record exists.
    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one migration record");
}

#[tokio::test]
async fn can_create_record_after_migration() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    tessera_store::run_migrations(&db).await.unwrap();

    // Create an owner record to verify the schema accepts writes.
    db.query(
        "CREATE owner SET \
         key = 'acme', \
         display_name = 'ACME Corp', \
         content_access_mode = 'Entitlement'",
    )
    .await
    .unwrap()
    .check()
    .unwrap();

    let mut result = db
        .query("SELECT * FROM owner WHERE key = 'acme'")
        .await
        .unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn unique_index_prevents_duplicate_owner_keys() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    tessera_store::run_migrations(&db).await.unwrap();

    db.query(
        "CREATE owner SET \
         key = 'acme', \
         display_name = 'ACME Corp', \
         content_access_mode = 'Entitlement'",
    )
    .await
    .unwrap()
    .check()
    .unwrap();

    // Attempt duplicate key — should fail.
    let result = db
        .query(
            "CREATE owner SET \
             key = 'acme', \
             display_name = 'Another Corp', \
             content_access_mode = 'Entitlement'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err(), "duplicate key should be rejected");
}

#[tokio::test]
async fn unknown_content_access_mode_is_rejected() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    tessera_store::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE owner SET \
             key = 'bad-mode', \
             display_name = 'Bad Mode Corp', \
             content_access_mode = 'Surprise'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err(), "assert clause should reject unknown modes");
}
