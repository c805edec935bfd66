//! Merged attribute views over a pool and its marketing product.
//!
//! Pools and products both carry free-form attribute maps. Policy code
//! never reads those maps directly; it goes through [`AttributeMap`],
//! which fixes the precedence rules and normalizes unset values.
//!
//! Two lookup orders exist and both fall through to the other source:
//! [`AttributeMap::attribute`] prefers the pool (used for behavioral
//! controls the pool may override, such as `requires_host` on derived
//! pools) while [`AttributeMap::product_attribute`] prefers the product
//! (used for capacity dimensions such as `sockets`). A value of `"0"`
//! counts as unset in either source and falls through.

use std::collections::BTreeMap;

use crate::models::pool::Pool;
use crate::models::product::Product;

/// Well-known attribute names.
pub mod attr {
    pub const ARCH: &str = "arch";
    pub const CORES: &str = "cores";
    pub const GUEST_LIMIT: &str = "guest_limit";
    pub const INSTANCE_MULTIPLIER: &str = "instance_multiplier";
    pub const MULTI_ENTITLEMENT: &str = "multi-entitlement";
    pub const PHYSICAL_ONLY: &str = "physical_only";
    pub const POOL_DERIVED: &str = "pool_derived";
    pub const RAM: &str = "ram";
    pub const REQUIRES_CONSUMER: &str = "requires_consumer";
    pub const REQUIRES_CONSUMER_TYPE: &str = "requires_consumer_type";
    pub const REQUIRES_HOST: &str = "requires_host";
    pub const SOCKETS: &str = "sockets";
    pub const STACKING_ID: &str = "stacking_id";
    pub const STORAGE_BAND: &str = "storage_band";
    pub const SUPPORT_LEVEL: &str = "support_level";
    pub const SUPPORT_LEVEL_EXEMPT: &str = "support_level_exempt";
    pub const UNMAPPED_GUESTS_ONLY: &str = "unmapped_guests_only";
    pub const VCPU: &str = "vcpu";
    pub const VIRT_ONLY: &str = "virt_only";
}

/// Read-only merged view of a pool's and a product's attributes.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMap<'a> {
    pool: &'a BTreeMap<String, String>,
    product: &'a BTreeMap<String, String>,
}

fn find_in<'a>(bag: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    match bag.get(name).map(String::as_str) {
        // "0" counts as unset and falls through to the other source.
        Some("0") | None => None,
        Some(value) => Some(value),
    }
}

impl<'a> AttributeMap<'a> {
    pub fn resolve(pool: &'a Pool, product: &'a Product) -> Self {
        Self {
            pool: &pool.attributes,
            product: &product.attributes,
        }
    }

    /// Lookup with pool precedence: pool attributes win, product
    /// attributes fill the gaps.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        find_in(self.pool, name).or_else(|| find_in(self.product, name))
    }

    /// Lookup with product precedence: product attributes win, pool
    /// attributes fill the gaps.
    pub fn product_attribute(&self, name: &str) -> Option<&'a str> {
        find_in(self.product, name).or_else(|| find_in(self.pool, name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn has_product_attribute(&self, name: &str) -> bool {
        self.product_attribute(name).is_some()
    }

    /// Pool-precedence lookup interpreted as a boolean flag.
    pub fn is_true(&self, name: &str) -> bool {
        self.attribute(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }

    /// Product-precedence lookup parsed as an integer. Unparsable
    /// values count as unset.
    pub fn numeric(&self, name: &str) -> Option<i64> {
        self.product_attribute(name)?.parse().ok()
    }

    pub fn is_multi_entitlement(&self) -> bool {
        self.product_attribute(attr::MULTI_ENTITLEMENT)
            .is_some_and(|v| v.eq_ignore_ascii_case("yes"))
    }

    pub fn stacking_id(&self) -> Option<&'a str> {
        self.product_attribute(attr::STACKING_ID)
    }

    pub fn is_stacked(&self) -> bool {
        self.stacking_id().is_some()
    }

    /// Instance multiplier, defaulting to 1 when absent or malformed.
    pub fn instance_multiplier(&self) -> i64 {
        self.numeric(attr::INSTANCE_MULTIPLIER).unwrap_or(1).max(1)
    }

    pub fn support_level(&self) -> Option<&'a str> {
        self.product_attribute(attr::SUPPORT_LEVEL)
    }

    pub fn support_level_exempt(&self) -> bool {
        self.product_attribute(attr::SUPPORT_LEVEL_EXEMPT)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}
