//! Pool domain model.
//!
//! A pool is a bounded well of entitlement capacity for one marketing
//! product over one validity window. Quantity accounting lives here;
//! policy interpretation of the attribute bags lives in the merged
//! [`AttributeMap`](crate::models::attributes::AttributeMap) view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::window::TemporalWindow;

/// How a pool came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Backed directly by a subscription.
    #[default]
    Normal,
    /// Granted as a side effect of the subscription (e.g. virt bonus).
    Bonus,
    /// Spawned by consuming another entitlement.
    EntitlementDerived,
    /// Spawned by a stack of entitlements on a host.
    StackDerived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: PoolKind,
    /// Marketing product this pool sells.
    pub product_id: String,
    /// Engineering products an entitlement from this pool covers.
    pub provided_product_ids: Vec<String>,
    /// Product granted to guests of a host consuming this pool.
    pub derived_product_id: Option<String>,
    pub derived_provided_product_ids: Vec<String>,
    /// Total capacity. Negative means unlimited.
    pub quantity: i64,
    /// Capacity currently handed out to entitlements.
    pub consumed: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
    /// Only the named user's consumers may bind this pool.
    pub restricted_to_username: Option<String>,
    /// Entitlement that spawned this pool, for derived kinds.
    pub source_entitlement_id: Option<Uuid>,
    /// Stack that spawned this pool, for stack-derived kinds.
    pub source_stack_id: Option<String>,
    /// Upstream subscription reference.
    pub subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pool {
    pub fn window(&self) -> TemporalWindow {
        TemporalWindow::new(self.start_date, self.end_date)
    }

    pub fn is_unlimited(&self) -> bool {
        self.quantity < 0
    }

    /// Remaining capacity. Meaningless for unlimited pools; callers
    /// check [`Pool::is_unlimited`] first.
    pub fn available(&self) -> i64 {
        self.quantity - self.consumed
    }

    /// True if an entitlement from this pool covers `product_id`,
    /// either as the marketing product or a provided product.
    pub fn provides(&self, product_id: &str) -> bool {
        self.product_id == product_id
            || self.provided_product_ids.iter().any(|p| p == product_id)
    }

    pub fn provides_derived(&self, product_id: &str) -> bool {
        self.derived_product_id.as_deref() == Some(product_id)
            || self
                .derived_provided_product_ids
                .iter()
                .any(|p| p == product_id)
    }
}

/// Fields required to create a new pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePool {
    pub owner_id: Uuid,
    pub kind: Option<PoolKind>,
    pub product_id: String,
    pub provided_product_ids: Option<Vec<String>>,
    pub derived_product_id: Option<String>,
    pub derived_provided_product_ids: Option<Vec<String>>,
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub attributes: Option<BTreeMap<String, String>>,
    pub restricted_to_username: Option<String>,
    pub source_entitlement_id: Option<Uuid>,
    pub source_stack_id: Option<String>,
    pub subscription_id: Option<String>,
}

/// Fields that can be updated on an existing pool (renewals adjust
/// quantity and dates in place).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePool {
    pub quantity: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub attributes: Option<BTreeMap<String, String>>,
}
