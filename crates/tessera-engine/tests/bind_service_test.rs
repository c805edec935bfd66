//! Integration tests for [`BindService`] wired to the SurrealDB
//! repositories over an in-memory engine.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tessera_core::models::consumer::{ConsumerKind, CreateConsumer, GuestId, InstalledProduct};
use tessera_core::models::entitlement::CreateEntitlement;
use tessera_core::models::owner::CreateOwner;
use tessera_core::models::pool::CreatePool;
use tessera_core::models::product::CreateProduct;
use tessera_core::models::validation::{CallerType, ReasonCode};
use tessera_core::repository::{
    ConsumerRepository, EntitlementRepository, OwnerRepository, PoolRepository, ProductRepository,
};
use tessera_engine::{BindService, EngineConfig, EngineError};
use tessera_store::repository::{
    SurrealConsumerRepository, SurrealEntitlementRepository, SurrealOwnerRepository,
    SurrealPoolRepository, SurrealProductRepository,
};
use uuid::Uuid;

type Service = BindService<
    SurrealConsumerRepository<Db>,
    SurrealPoolRepository<Db>,
    SurrealProductRepository<Db>,
    SurrealEntitlementRepository<Db>,
    SurrealOwnerRepository<Db>,
>;

struct Fixture {
    db: Surreal<Db>,
    service: Service,
    owner_id: Uuid,
}

/// Helper: in-memory DB, migrations, one owner, and a wired service.
async fn setup() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    tessera_store::run_migrations(&db).await.unwrap();

    let owner_id = SurrealOwnerRepository::new(db.clone())
        .create(CreateOwner {
            key: "test-org".into(),
            display_name: "Test Org".into(),
            default_service_level: None,
            content_access_mode: None,
        })
        .await
        .unwrap()
        .id;

    let service = BindService::new(
        SurrealConsumerRepository::new(db.clone()),
        SurrealPoolRepository::new(db.clone()),
        SurrealProductRepository::new(db.clone()),
        SurrealEntitlementRepository::new(db.clone()),
        SurrealOwnerRepository::new(db.clone()),
        EngineConfig::default(),
    );

    Fixture {
        db,
        service,
        owner_id,
    }
}

fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Fixture {
    async fn consumer(&self, name: &str, facts: &[(&str, &str)], installed: &[&str]) -> Uuid {
        SurrealConsumerRepository::new(self.db.clone())
            .create(CreateConsumer {
                owner_id: self.owner_id,
                name: name.into(),
                kind: ConsumerKind::System,
                username: None,
                service_level: None,
                autoheal: None,
                capabilities: None,
                facts: Some(pairs(facts)),
                installed_products: Some(
                    installed
                        .iter()
                        .map(|id| InstalledProduct {
                            product_id: id.to_string(),
                            version: None,
                            arch: None,
                        })
                        .collect(),
                ),
                guest_ids: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn hypervisor(&self, name: &str, guest_uuids: &[&str]) -> Uuid {
        SurrealConsumerRepository::new(self.db.clone())
            .create(CreateConsumer {
                owner_id: self.owner_id,
                name: name.into(),
                kind: ConsumerKind::Hypervisor,
                username: None,
                service_level: None,
                autoheal: None,
                capabilities: None,
                facts: None,
                installed_products: None,
                guest_ids: Some(
                    guest_uuids
                        .iter()
                        .map(|id| GuestId {
                            guest_id: id.to_string(),
                            active: true,
                        })
                        .collect(),
                ),
            })
            .await
            .unwrap()
            .id
    }

    async fn product(&self, product_id: &str, attrs: &[(&str, &str)]) {
        SurrealProductRepository::new(self.db.clone())
            .create(CreateProduct {
                owner_id: self.owner_id,
                product_id: product_id.into(),
                name: format!("Product {product_id}"),
                multiplier: None,
                attributes: Some(pairs(attrs)),
                dependent_product_ids: None,
                content: None,
            })
            .await
            .unwrap();
    }

    async fn pool(
        &self,
        product_id: &str,
        provided: &[&str],
        quantity: i64,
        attrs: &[(&str, &str)],
    ) -> Uuid {
        SurrealPoolRepository::new(self.db.clone())
            .create(CreatePool {
                owner_id: self.owner_id,
                kind: None,
                product_id: product_id.into(),
                provided_product_ids: Some(provided.iter().map(|s| s.to_string()).collect()),
                derived_product_id: None,
                derived_provided_product_ids: None,
                quantity,
                start_date: Utc::now() - Duration::days(1),
                end_date: Utc::now() + Duration::days(365),
                attributes: Some(pairs(attrs)),
                restricted_to_username: None,
                source_entitlement_id: None,
                source_stack_id: None,
                subscription_id: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn held_by(&self, consumer_id: Uuid) -> usize {
        SurrealEntitlementRepository::new(self.db.clone())
            .list_by_consumer(consumer_id, None)
            .await
            .unwrap()
            .len()
    }

    async fn consumed(&self, pool_id: Uuid) -> i64 {
        SurrealPoolRepository::new(self.db.clone())
            .get_by_id(pool_id)
            .await
            .unwrap()
            .consumed
    }
}

fn refusal(err: EngineError) -> tessera_core::models::validation::ValidationResult {
    match err {
        EngineError::Refused(result) => result,
        other => panic!("expected a rules refusal, got {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Single-pool binds
// -----------------------------------------------------------------------

#[tokio::test]
async fn bind_pool_grants_an_entitlement() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let outcome = fx
        .service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap();

    assert_eq!(outcome.entitlement.consumer_id, consumer_id);
    assert_eq!(outcome.entitlement.pool_id, pool_id);
    assert_eq!(outcome.entitlement.quantity, 1);
    assert!(outcome.warnings.is_empty());

    assert_eq!(fx.consumed(pool_id).await, 1);
    assert_eq!(fx.held_by(consumer_id).await, 1);
}

#[tokio::test]
async fn second_bind_of_the_same_pool_is_refused() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    fx.service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap();

    let err = fx
        .service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap_err();
    let result = refusal(err);
    assert!(result.has_error(ReasonCode::AlreadyEntitled));

    assert_eq!(fx.consumed(pool_id).await, 1, "refusal must not consume");
}

#[tokio::test]
async fn exhausted_pool_is_refused() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 1, &[]).await;
    let first = fx.consumer("web01", &[], &["rhel-server"]).await;
    let second = fx.consumer("web02", &[], &["rhel-server"]).await;

    fx.service.bind_pool(first, pool_id, None).await.unwrap();

    let err = fx.service.bind_pool(second, pool_id, None).await.unwrap_err();
    let result = refusal(err);
    assert!(result.has_error(ReasonCode::QuantityExhausted));

    assert_eq!(fx.held_by(second).await, 0);
}

#[tokio::test]
async fn virt_only_pool_is_refused_for_physical() {
    let fx = setup().await;
    fx.product("virt-product", &[]).await;
    let pool_id = fx
        .pool(
            "virt-product",
            &["virt-product"],
            10,
            &[("virt_only", "true")],
        )
        .await;
    let consumer_id = fx.consumer("metal01", &[], &["virt-product"]).await;

    let err = fx
        .service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap_err();
    let result = refusal(err);
    assert!(result.has_error(ReasonCode::VirtRestricted));
}

#[tokio::test]
async fn arch_mismatch_warns_but_binds() {
    let fx = setup().await;
    fx.product("mainframe-product", &[("arch", "s390x")]).await;
    let pool_id = fx
        .pool("mainframe-product", &["mainframe-product"], 10, &[])
        .await;
    let consumer_id = fx
        .consumer(
            "intel01",
            &[("uname.machine", "x86_64")],
            &["mainframe-product"],
        )
        .await;

    let outcome = fx
        .service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap();

    assert!(
        outcome
            .warnings
            .iter()
            .any(|r| r.code == ReasonCode::ArchMismatch)
    );
    assert_eq!(fx.held_by(consumer_id).await, 1);
}

#[tokio::test]
async fn bind_quantity_defaults_to_the_suggestion_for_stackable_pools() {
    let fx = setup().await;
    fx.product(
        "stacked-sockets",
        &[
            ("stacking_id", "sock-stack"),
            ("sockets", "2"),
            ("multi-entitlement", "yes"),
        ],
    )
    .await;
    let pool_id = fx
        .pool("stacked-sockets", &["stacked-sockets"], 20, &[])
        .await;
    let consumer_id = fx
        .consumer(
            "big01",
            &[("cpu.cpu_socket(s)", "8")],
            &["stacked-sockets"],
        )
        .await;

    let outcome = fx
        .service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap();

    // 8 sockets against 2 per entitlement.
    assert_eq!(outcome.entitlement.quantity, 4);
    assert_eq!(fx.consumed(pool_id).await, 4);
}

#[tokio::test]
async fn evaluate_bind_reports_without_binding() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let result = fx
        .service
        .evaluate_bind(consumer_id, pool_id, 1, CallerType::ListPools)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(fx.held_by(consumer_id).await, 0);
    assert_eq!(fx.consumed(pool_id).await, 0);
}

// -----------------------------------------------------------------------
// Autobind
// -----------------------------------------------------------------------

#[tokio::test]
async fn autobind_covers_installed_products() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let outcome = fx
        .service
        .bind_products(consumer_id, None, None, None)
        .await
        .unwrap();

    assert_eq!(outcome.entitlements.len(), 1);
    assert_eq!(outcome.entitlements[0].pool_id, pool_id);
    assert_eq!(outcome.covered_products, vec!["rhel-server".to_string()]);

    assert_eq!(fx.consumed(pool_id).await, 1);
    assert_eq!(fx.held_by(consumer_id).await, 1);
}

#[tokio::test]
async fn partial_coverage_fails_without_binding() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx
        .consumer("web01", &[], &["rhel-server", "no-such-product"])
        .await;

    let err = fx
        .service
        .bind_products(consumer_id, None, None, None)
        .await
        .unwrap_err();

    match err {
        EngineError::Coverage { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].product_id, "no-such-product");
        }
        other => panic!("expected a coverage failure, got {other:?}"),
    }

    // Nothing may be granted when any target stays uncovered.
    assert_eq!(fx.held_by(consumer_id).await, 0);
    assert_eq!(fx.consumed(pool_id).await, 0);
}

#[tokio::test]
async fn explicit_empty_product_list_is_invalid() {
    let fx = setup().await;
    let consumer_id = fx.consumer("web01", &[], &[]).await;

    let err = fx
        .service
        .bind_products(consumer_id, Some(Vec::new()), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidRequest { .. }));
}

#[tokio::test]
async fn autobind_respects_the_pool_filter() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let _skipped = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let preferred = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let outcome = fx
        .service
        .bind_products(consumer_id, None, Some(vec![preferred]), None)
        .await
        .unwrap();

    assert_eq!(outcome.entitlements.len(), 1);
    assert_eq!(outcome.entitlements[0].pool_id, preferred);
}

#[tokio::test]
async fn new_host_revokes_unmapped_guest_entitlements() {
    let fx = setup().await;
    fx.product("temporary", &[]).await;
    let unmapped_pool = fx
        .pool(
            "temporary",
            &["temporary"],
            10,
            &[("virt_only", "true"), ("unmapped_guests_only", "true")],
        )
        .await;
    let guest_id = fx
        .consumer(
            "guest01",
            &[("virt.is_guest", "true"), ("virt.uuid", "guest-uuid-1")],
            &[],
        )
        .await;

    // Grant the 24-hour pool directly, as a fresh unmapped guest would get.
    SurrealEntitlementRepository::new(fx.db.clone())
        .create(CreateEntitlement {
            consumer_id: guest_id,
            pool_id: unmapped_pool,
            quantity: 1,
            start_date: None,
            end_date: None,
        })
        .await
        .unwrap();
    assert_eq!(fx.held_by(guest_id).await, 1);

    // Once a hypervisor reports the guest, the next autobind pass
    // drops the unmapped grant.
    fx.hypervisor("hyper01", &["guest-uuid-1"]).await;

    fx.service
        .bind_products(guest_id, None, None, None)
        .await
        .unwrap();

    assert_eq!(fx.held_by(guest_id).await, 0);
    assert_eq!(fx.consumed(unmapped_pool).await, 0);
}

// -----------------------------------------------------------------------
// Dry run, compliance, quantity
// -----------------------------------------------------------------------

#[tokio::test]
async fn dry_run_does_not_persist() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let selections = fx.service.dry_run(consumer_id, None, None).await.unwrap();

    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0].pool_id, pool_id);
    assert_eq!(selections[0].quantity, 1);

    assert_eq!(fx.held_by(consumer_id).await, 0);
    assert_eq!(fx.consumed(pool_id).await, 0);
}

#[tokio::test]
async fn dry_run_is_empty_when_nothing_covers() {
    let fx = setup().await;
    let consumer_id = fx.consumer("web01", &[], &["no-such-product"]).await;

    let selections = fx.service.dry_run(consumer_id, None, None).await.unwrap();
    assert!(selections.is_empty());
}

#[tokio::test]
async fn compliance_tracks_bound_coverage() {
    let fx = setup().await;
    fx.product("rhel-server", &[]).await;
    let pool_id = fx.pool("rhel-server", &["rhel-server"], 10, &[]).await;
    let consumer_id = fx.consumer("web01", &[], &["rhel-server"]).await;

    let before = fx.service.compliance(consumer_id, None).await.unwrap();
    assert!(
        before
            .non_compliant_products
            .contains(&"rhel-server".to_string())
    );

    fx.service
        .bind_pool(consumer_id, pool_id, None)
        .await
        .unwrap();

    let after = fx.service.compliance(consumer_id, None).await.unwrap();
    assert!(after.compliant_products.contains_key("rhel-server"));
    assert!(after.non_compliant_products.is_empty());
    assert!(after.compliant_until.is_some());
}

#[tokio::test]
async fn quantity_suggestion_accounts_for_stacking() {
    let fx = setup().await;
    fx.product(
        "stacked-sockets",
        &[
            ("stacking_id", "sock-stack"),
            ("sockets", "2"),
            ("multi-entitlement", "yes"),
        ],
    )
    .await;
    let pool_id = fx
        .pool("stacked-sockets", &["stacked-sockets"], 20, &[])
        .await;
    let consumer_id = fx
        .consumer(
            "big01",
            &[("cpu.cpu_socket(s)", "8")],
            &["stacked-sockets"],
        )
        .await;

    let suggestion = fx
        .service
        .quantity_suggestion(consumer_id, pool_id)
        .await
        .unwrap();

    assert_eq!(suggestion.suggested, 4);
    assert_eq!(suggestion.increment, 1);
}
