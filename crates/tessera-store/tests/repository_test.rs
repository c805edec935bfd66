//! Integration tests for the entity repository implementations using
//! in-memory SurrealDB.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tessera_core::error::TesseraError;
use tessera_core::models::consumer::{
    ConsumerKind, CreateConsumer, GuestId, InstalledProduct, UpdateConsumer,
};
use tessera_core::models::entitlement::CreateEntitlement;
use tessera_core::models::owner::{CreateOwner, UpdateOwner};
use tessera_core::models::pool::{CreatePool, UpdatePool};
use tessera_core::models::product::{CreateProduct, ProductContent, UpdateProduct};
use tessera_core::repository::{
    ConsumerRepository, EntitlementRepository, OwnerRepository, Pagination, PoolRepository,
    ProductRepository,
};
use tessera_store::repository::{
    SurrealConsumerRepository, SurrealEntitlementRepository, SurrealOwnerRepository,
    SurrealPoolRepository, SurrealProductRepository,
};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    tessera_store::run_migrations(&db).await.unwrap();
    db
}

/// Helper: create an owner and return its ID.
async fn create_owner(db: &Surreal<Db>, key: &str) -> Uuid {
    SurrealOwnerRepository::new(db.clone())
        .create(CreateOwner {
            key: key.into(),
            display_name: format!("{key} org"),
            default_service_level: None,
            content_access_mode: None,
        })
        .await
        .unwrap()
        .id
}

fn consumer_input(owner_id: Uuid, name: &str) -> CreateConsumer {
    CreateConsumer {
        owner_id,
        name: name.into(),
        kind: ConsumerKind::System,
        username: None,
        service_level: None,
        autoheal: None,
        capabilities: None,
        facts: None,
        installed_products: None,
        guest_ids: None,
    }
}

fn product_input(owner_id: Uuid, product_id: &str) -> CreateProduct {
    CreateProduct {
        owner_id,
        product_id: product_id.into(),
        name: format!("Product {product_id}"),
        multiplier: None,
        attributes: None,
        dependent_product_ids: None,
        content: None,
    }
}

fn pool_input(owner_id: Uuid, product_id: &str, quantity: i64) -> CreatePool {
    CreatePool {
        owner_id,
        kind: None,
        product_id: product_id.into(),
        provided_product_ids: None,
        derived_product_id: None,
        derived_provided_product_ids: None,
        quantity,
        start_date: Utc::now() - Duration::days(1),
        end_date: Utc::now() + Duration::days(365),
        attributes: None,
        restricted_to_username: None,
        source_entitlement_id: None,
        source_stack_id: None,
        subscription_id: None,
    }
}

// -----------------------------------------------------------------------
// Owner tests
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_owner() {
    let db = setup().await;
    let repo = SurrealOwnerRepository::new(db);

    let owner = repo
        .create(CreateOwner {
            key: "acme".into(),
            display_name: "ACME Corp".into(),
            default_service_level: Some("Premium".into()),
            content_access_mode: None,
        })
        .await
        .unwrap();

    assert_eq!(owner.key, "acme");
    assert_eq!(owner.display_name, "ACME Corp");
    assert_eq!(owner.default_service_level.as_deref(), Some("Premium"));

    let fetched = repo.get_by_id(owner.id).await.unwrap();
    assert_eq!(fetched.id, owner.id);
    assert_eq!(fetched.key, owner.key);

    let by_key = repo.get_by_key("acme").await.unwrap();
    assert_eq!(by_key.id, owner.id);
}

#[tokio::test]
async fn duplicate_owner_key_rejected() {
    let db = setup().await;
    let repo = SurrealOwnerRepository::new(db);

    repo.create(CreateOwner {
        key: "unique-key".into(),
        display_name: "First".into(),
        default_service_level: None,
        content_access_mode: None,
    })
    .await
    .unwrap();

    let result = repo
        .create(CreateOwner {
            key: "unique-key".into(),
            display_name: "Second".into(),
            default_service_level: None,
            content_access_mode: None,
        })
        .await;

    assert!(result.is_err(), "duplicate key should be rejected");
}

#[tokio::test]
async fn update_owner() {
    let db = setup().await;
    let repo = SurrealOwnerRepository::new(db);

    let owner = repo
        .create(CreateOwner {
            key: "update-test".into(),
            display_name: "Before".into(),
            default_service_level: None,
            content_access_mode: None,
        })
        .await
        .unwrap();

    let updated = repo
        .update(
            owner.id,
            UpdateOwner {
                display_name: Some("After".into()),
                default_service_level: Some("Standard".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.id, owner.id);
    assert_eq!(updated.display_name, "After");
    assert_eq!(updated.default_service_level.as_deref(), Some("Standard"));
    assert_eq!(updated.key, "update-test"); // unchanged
    assert!(updated.updated_at >= owner.updated_at);
}

#[tokio::test]
async fn delete_owner() {
    let db = setup().await;
    let repo = SurrealOwnerRepository::new(db);

    let owner = repo
        .create(CreateOwner {
            key: "delete-test".into(),
            display_name: "To Delete".into(),
            default_service_level: None,
            content_access_mode: None,
        })
        .await
        .unwrap();

    repo.delete(owner.id).await.unwrap();

    let result = repo.get_by_id(owner.id).await;
    assert!(
        matches!(result, Err(TesseraError::NotFound { .. })),
        "should not find deleted owner"
    );
}

#[tokio::test]
async fn list_owners_with_pagination() {
    let db = setup().await;
    let repo = SurrealOwnerRepository::new(db);

    for i in 0..5 {
        repo.create(CreateOwner {
            key: format!("org-{i}"),
            display_name: format!("Org {i}"),
            default_service_level: None,
            content_access_mode: None,
        })
        .await
        .unwrap();
    }

    let page1 = repo
        .list(Pagination {
            offset: 0,
            limit: 3,
        })
        .await
        .unwrap();

    assert_eq!(page1.items.len(), 3);
    assert_eq!(page1.total, 5);
    assert_eq!(page1.offset, 0);
    assert_eq!(page1.limit, 3);

    let page2 = repo
        .list(Pagination {
            offset: 3,
            limit: 3,
        })
        .await
        .unwrap();

    assert_eq!(page2.items.len(), 2);
    assert_eq!(page2.total, 5);
}

// -----------------------------------------------------------------------
// Consumer tests
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_consumer() {
    let db = setup().await;
    let owner_id = create_owner(&db, "consumer-org").await;
    let repo = SurrealConsumerRepository::new(db);

    let mut input = consumer_input(owner_id, "web01");
    input.facts = Some(BTreeMap::from([
        ("cpu.cpu_socket(s)".to_string(), "4".to_string()),
        ("uname.machine".to_string(), "x86_64".to_string()),
    ]));
    input.installed_products = Some(vec![InstalledProduct {
        product_id: "rhel-server".into(),
        version: Some("9.4".into()),
        arch: Some("x86_64".into()),
    }]);

    let consumer = repo.create(input).await.unwrap();

    assert_eq!(consumer.owner_id, owner_id);
    assert_eq!(consumer.name, "web01");
    assert_eq!(consumer.kind, ConsumerKind::System);
    assert!(consumer.autoheal, "autoheal defaults on");
    assert_eq!(
        consumer.facts.get("cpu.cpu_socket(s)").map(String::as_str),
        Some("4")
    );
    assert_eq!(consumer.installed_products.len(), 1);
    assert_eq!(consumer.installed_products[0].product_id, "rhel-server");
    assert_eq!(
        consumer.installed_products[0].version.as_deref(),
        Some("9.4")
    );

    let fetched = repo.get_by_id(consumer.id).await.unwrap();
    assert_eq!(fetched.id, consumer.id);
    assert_eq!(fetched.facts, consumer.facts);
    assert_eq!(fetched.installed_products.len(), 1);
}

#[tokio::test]
async fn update_consumer_replaces_lists() {
    let db = setup().await;
    let owner_id = create_owner(&db, "update-consumer-org").await;
    let repo = SurrealConsumerRepository::new(db);

    let mut input = consumer_input(owner_id, "db01");
    input.installed_products = Some(vec![InstalledProduct {
        product_id: "old-product".into(),
        version: None,
        arch: None,
    }]);
    let consumer = repo.create(input).await.unwrap();

    let updated = repo
        .update(
            consumer.id,
            UpdateConsumer {
                service_level: Some("Premium".into()),
                autoheal: Some(false),
                installed_products: Some(vec![
                    InstalledProduct {
                        product_id: "new-product-1".into(),
                        version: None,
                        arch: None,
                    },
                    InstalledProduct {
                        product_id: "new-product-2".into(),
                        version: None,
                        arch: None,
                    },
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.service_level.as_deref(), Some("Premium"));
    assert!(!updated.autoheal);
    // Lists are replaced wholesale, not merged.
    assert_eq!(updated.installed_products.len(), 2);
    assert_eq!(updated.installed_products[0].product_id, "new-product-1");
    assert_eq!(updated.name, "db01"); // unchanged
}

#[tokio::test]
async fn find_host_of_guest_matches_case_insensitively() {
    let db = setup().await;
    let owner_id = create_owner(&db, "virt-org").await;
    let repo = SurrealConsumerRepository::new(db);

    let mut host_input = consumer_input(owner_id, "hyper01");
    host_input.kind = ConsumerKind::Hypervisor;
    host_input.guest_ids = Some(vec![GuestId {
        guest_id: "4C4C4544-0042".into(),
        active: true,
    }]);
    let host = repo.create(host_input).await.unwrap();

    let found = repo
        .find_host_of_guest(owner_id, "4c4c4544-0042")
        .await
        .unwrap();
    assert_eq!(found.map(|c| c.id), Some(host.id));

    let missing = repo
        .find_host_of_guest(owner_id, "no-such-guest")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn find_host_ignores_inactive_guests() {
    let db = setup().await;
    let owner_id = create_owner(&db, "inactive-guest-org").await;
    let repo = SurrealConsumerRepository::new(db);

    let mut host_input = consumer_input(owner_id, "hyper02");
    host_input.kind = ConsumerKind::Hypervisor;
    host_input.guest_ids = Some(vec![GuestId {
        guest_id: "gone-guest".into(),
        active: false,
    }]);
    repo.create(host_input).await.unwrap();

    let found = repo.find_host_of_guest(owner_id, "gone-guest").await.unwrap();
    assert!(found.is_none(), "inactive guest reports do not map a host");
}

#[tokio::test]
async fn list_consumers_scoped_to_owner() {
    let db = setup().await;
    let owner_a = create_owner(&db, "org-a").await;
    let owner_b = create_owner(&db, "org-b").await;
    let repo = SurrealConsumerRepository::new(db);

    repo.create(consumer_input(owner_a, "a1")).await.unwrap();
    repo.create(consumer_input(owner_a, "a2")).await.unwrap();
    repo.create(consumer_input(owner_b, "b1")).await.unwrap();

    let page = repo
        .list_by_owner(owner_a, Pagination::default())
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|c| c.owner_id == owner_a));
}

// -----------------------------------------------------------------------
// Product tests
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_product() {
    let db = setup().await;
    let owner_id = create_owner(&db, "product-org").await;
    let repo = SurrealProductRepository::new(db);

    let mut input = product_input(owner_id, "rhel-server");
    input.attributes = Some(BTreeMap::from([
        ("sockets".to_string(), "2".to_string()),
        ("stacking_id".to_string(), "rhel-stack".to_string()),
    ]));
    input.content = Some(vec![ProductContent {
        content_id: "repo-1".into(),
        enabled: true,
    }]);

    let product = repo.create(input).await.unwrap();

    assert_eq!(product.product_id, "rhel-server");
    assert_eq!(product.multiplier, 1, "multiplier defaults to 1");
    assert_eq!(product.attributes.get("sockets").map(String::as_str), Some("2"));
    assert_eq!(product.content.len(), 1);
    assert!(product.content[0].enabled);

    let fetched = repo
        .get_by_product_id(owner_id, "rhel-server")
        .await
        .unwrap();
    assert_eq!(fetched.id, product.id);
    assert_eq!(fetched.attributes, product.attributes);
}

#[tokio::test]
async fn product_ids_are_unique_per_owner() {
    let db = setup().await;
    let owner_a = create_owner(&db, "dup-org-a").await;
    let owner_b = create_owner(&db, "dup-org-b").await;
    let repo = SurrealProductRepository::new(db);

    repo.create(product_input(owner_a, "shared-id")).await.unwrap();

    let duplicate = repo.create(product_input(owner_a, "shared-id")).await;
    assert!(duplicate.is_err(), "same id in the same owner is rejected");

    // The same external id is fine under a different owner.
    repo.create(product_input(owner_b, "shared-id")).await.unwrap();
}

#[tokio::test]
async fn get_many_skips_unknown_ids() {
    let db = setup().await;
    let owner_id = create_owner(&db, "batch-org").await;
    let repo = SurrealProductRepository::new(db);

    repo.create(product_input(owner_id, "prod-a")).await.unwrap();
    repo.create(product_input(owner_id, "prod-b")).await.unwrap();

    let found = repo
        .get_many(
            owner_id,
            &[
                "prod-a".to_string(),
                "prod-b".to_string(),
                "prod-missing".to_string(),
            ],
        )
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.product_id == "prod-a"));
    assert!(found.iter().any(|p| p.product_id == "prod-b"));
}

#[tokio::test]
async fn update_product() {
    let db = setup().await;
    let owner_id = create_owner(&db, "product-update-org").await;
    let repo = SurrealProductRepository::new(db);

    repo.create(product_input(owner_id, "mutable")).await.unwrap();

    let updated = repo
        .update(
            owner_id,
            "mutable",
            UpdateProduct {
                name: Some("Renamed".into()),
                attributes: Some(BTreeMap::from([(
                    "vcpu".to_string(),
                    "4".to_string(),
                )])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.attributes.get("vcpu").map(String::as_str), Some("4"));
    assert_eq!(updated.product_id, "mutable"); // unchanged

    let missing = repo
        .update(owner_id, "no-such-product", UpdateProduct::default())
        .await;
    assert!(matches!(missing, Err(TesseraError::NotFound { .. })));
}

// -----------------------------------------------------------------------
// Pool tests
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_pool_starts_unconsumed() {
    let db = setup().await;
    let owner_id = create_owner(&db, "pool-org").await;
    let repo = SurrealPoolRepository::new(db);

    let mut input = pool_input(owner_id, "rhel-server", 10);
    input.provided_product_ids = Some(vec!["rhel-ha".into()]);
    input.attributes = Some(BTreeMap::from([(
        "virt_only".to_string(),
        "true".to_string(),
    )]));

    let pool = repo.create(input).await.unwrap();

    assert_eq!(pool.quantity, 10);
    assert_eq!(pool.consumed, 0);
    assert_eq!(pool.provided_product_ids, vec!["rhel-ha".to_string()]);
    assert_eq!(
        pool.attributes.get("virt_only").map(String::as_str),
        Some("true")
    );

    let fetched = repo.get_by_id(pool.id).await.unwrap();
    assert_eq!(fetched.id, pool.id);
    assert_eq!(fetched.start_date, pool.start_date);
    assert_eq!(fetched.end_date, pool.end_date);
}

#[tokio::test]
async fn find_active_pools_respects_window() {
    let db = setup().await;
    let owner_id = create_owner(&db, "window-org").await;
    let repo = SurrealPoolRepository::new(db);
    let now = Utc::now();

    let active = repo.create(pool_input(owner_id, "current", 5)).await.unwrap();

    let mut expired = pool_input(owner_id, "expired", 5);
    expired.start_date = now - Duration::days(30);
    expired.end_date = now - Duration::days(1);
    repo.create(expired).await.unwrap();

    let mut future = pool_input(owner_id, "future", 5);
    future.start_date = now + Duration::days(10);
    future.end_date = now + Duration::days(40);
    repo.create(future).await.unwrap();

    let found = repo.find_active(owner_id, None, now).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, active.id);
}

#[tokio::test]
async fn find_active_pools_filters_by_product() {
    let db = setup().await;
    let owner_id = create_owner(&db, "filter-org").await;
    let repo = SurrealPoolRepository::new(db);
    let now = Utc::now();

    let direct = repo.create(pool_input(owner_id, "target", 5)).await.unwrap();

    let mut providing = pool_input(owner_id, "bundle", 5);
    providing.provided_product_ids = Some(vec!["target".into()]);
    let providing = repo.create(providing).await.unwrap();

    repo.create(pool_input(owner_id, "unrelated", 5)).await.unwrap();

    let found = repo.find_active(owner_id, Some("target"), now).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.id == direct.id));
    assert!(found.iter().any(|p| p.id == providing.id));
}

#[tokio::test]
async fn update_pool_quantity() {
    let db = setup().await;
    let owner_id = create_owner(&db, "pool-update-org").await;
    let repo = SurrealPoolRepository::new(db);

    let pool = repo.create(pool_input(owner_id, "resizable", 5)).await.unwrap();

    let updated = repo
        .update(
            pool.id,
            UpdatePool {
                quantity: Some(20),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.quantity, 20);
    assert_eq!(updated.consumed, 0); // unchanged
    assert_eq!(updated.product_id, "resizable");
}

// -----------------------------------------------------------------------
// Entitlement tests
// -----------------------------------------------------------------------

/// Helper: owner, consumer and a pool with the given capacity.
async fn seed_entitlement_fixtures(
    db: &Surreal<Db>,
    key: &str,
    quantity: i64,
) -> (Uuid, tessera_core::models::pool::Pool) {
    let owner_id = create_owner(db, key).await;
    let consumer = SurrealConsumerRepository::new(db.clone())
        .create(consumer_input(owner_id, "machine"))
        .await
        .unwrap();
    let pool = SurrealPoolRepository::new(db.clone())
        .create(pool_input(owner_id, "rhel-server", quantity))
        .await
        .unwrap();
    (consumer.id, pool)
}

#[tokio::test]
async fn granting_consumes_pool_capacity() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "grant-org", 10).await;
    let ent_repo = SurrealEntitlementRepository::new(db.clone());
    let pool_repo = SurrealPoolRepository::new(db);

    let ent = ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 3,
            start_date: None,
            end_date: None,
        })
        .await
        .unwrap();

    assert_eq!(ent.consumer_id, consumer_id);
    assert_eq!(ent.pool_id, pool.id);
    assert_eq!(ent.quantity, 3);
    assert_eq!(ent.owner_id, pool.owner_id);
    // Dates default to the pool's window.
    assert_eq!(ent.start_date, pool.start_date);
    assert_eq!(ent.end_date, pool.end_date);

    let after = pool_repo.get_by_id(pool.id).await.unwrap();
    assert_eq!(after.consumed, 3);

    let fetched = ent_repo.get_by_id(ent.id).await.unwrap();
    assert_eq!(fetched.quantity, 3);
}

#[tokio::test]
async fn oversell_is_refused_without_side_effects() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "oversell-org", 2).await;
    let ent_repo = SurrealEntitlementRepository::new(db.clone());
    let pool_repo = SurrealPoolRepository::new(db);

    let result = ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 3,
            start_date: None,
            end_date: None,
        })
        .await;

    assert!(
        matches!(result, Err(TesseraError::Validation { .. })),
        "oversell should be refused"
    );

    let after = pool_repo.get_by_id(pool.id).await.unwrap();
    assert_eq!(after.consumed, 0, "refused grant must not consume capacity");

    let held = ent_repo.list_by_consumer(consumer_id, None).await.unwrap();
    assert!(held.is_empty(), "refused grant must not leave an entitlement");
}

#[tokio::test]
async fn unlimited_pools_never_exhaust() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "unlimited-org", -1).await;
    let ent_repo = SurrealEntitlementRepository::new(db.clone());
    let pool_repo = SurrealPoolRepository::new(db);

    ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 100,
            start_date: None,
            end_date: None,
        })
        .await
        .unwrap();

    let after = pool_repo.get_by_id(pool.id).await.unwrap();
    assert_eq!(after.consumed, 100, "consumed still tracks unlimited pools");
}

#[tokio::test]
async fn revoking_returns_capacity() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "revoke-org", 10).await;
    let ent_repo = SurrealEntitlementRepository::new(db.clone());
    let pool_repo = SurrealPoolRepository::new(db);

    let ent = ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 4,
            start_date: None,
            end_date: None,
        })
        .await
        .unwrap();

    ent_repo.revoke(ent.id).await.unwrap();

    let after = pool_repo.get_by_id(pool.id).await.unwrap();
    assert_eq!(after.consumed, 0);

    let result = ent_repo.get_by_id(ent.id).await;
    assert!(matches!(result, Err(TesseraError::NotFound { .. })));

    let missing = ent_repo.revoke(ent.id).await;
    assert!(matches!(missing, Err(TesseraError::NotFound { .. })));
}

#[tokio::test]
async fn list_by_consumer_filters_by_active_date() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "history-org", 10).await;
    let ent_repo = SurrealEntitlementRepository::new(db);
    let now = Utc::now();

    // One lapsed entitlement with an explicit past window, one current.
    ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 1,
            start_date: Some(now - Duration::days(30)),
            end_date: Some(now - Duration::days(1)),
        })
        .await
        .unwrap();
    ent_repo
        .create(CreateEntitlement {
            consumer_id,
            pool_id: pool.id,
            quantity: 1,
            start_date: None,
            end_date: None,
        })
        .await
        .unwrap();

    let all = ent_repo.list_by_consumer(consumer_id, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let active = ent_repo
        .list_by_consumer(consumer_id, Some(now))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].end_date > now);
}

#[tokio::test]
async fn list_entitlements_by_pool() {
    let db = setup().await;
    let (consumer_id, pool) = seed_entitlement_fixtures(&db, "pool-list-org", 10).await;
    let ent_repo = SurrealEntitlementRepository::new(db);

    for _ in 0..3 {
        ent_repo
            .create(CreateEntitlement {
                consumer_id,
                pool_id: pool.id,
                quantity: 1,
                start_date: None,
                end_date: None,
            })
            .await
            .unwrap();
    }

    let page = ent_repo
        .list_by_pool(
            pool.id,
            Pagination {
                offset: 0,
                limit: 2,
            },
        )
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn granting_against_missing_pool_fails() {
    let db = setup().await;
    let owner_id = create_owner(&db, "no-pool-org").await;
    let consumer = SurrealConsumerRepository::new(db.clone())
        .create(consumer_input(owner_id, "machine"))
        .await
        .unwrap();
    let ent_repo = SurrealEntitlementRepository::new(db);

    let result = ent_repo
        .create(CreateEntitlement {
            consumer_id: consumer.id,
            pool_id: Uuid::new_v4(),
            quantity: 1,
            start_date: None,
            end_date: None,
        })
        .await;

    assert!(matches!(result, Err(TesseraError::NotFound { .. })));
}
