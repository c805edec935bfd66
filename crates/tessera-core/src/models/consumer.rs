//! Consumer domain model.
//!
//! A consumer is a registered system (or distributor manifest) that
//! holds entitlements. Hardware dimensions are reported as free-form
//! string facts; the typed accessors here are the only place fact keys
//! and unit conversions are interpreted.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known fact keys reported by registered systems.
pub mod facts {
    pub const ARCH: &str = "uname.machine";
    pub const CORES_PER_SOCKET: &str = "cpu.core(s)_per_socket";
    pub const IS_GUEST: &str = "virt.is_guest";
    pub const RAM_TOTAL_KB: &str = "memory.memtotal";
    pub const SOCKETS: &str = "cpu.cpu_socket(s)";
    pub const STORAGE_BAND_USAGE: &str = "band.storage.usage";
    pub const VIRT_UUID: &str = "virt.uuid";
}

/// The unit type a consumer registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    /// A physical or virtual machine.
    System,
    /// A person entry, used for username-restricted subscriptions.
    Person,
    /// A virtualization host reporting guests.
    Hypervisor,
    /// A downstream server consuming via manifest export.
    Distributor,
}

impl ConsumerKind {
    /// Manifest consumers receive exported entitlements rather than
    /// running content themselves, which relaxes hardware checks and
    /// tightens others.
    pub fn is_manifest(&self) -> bool {
        matches!(self, ConsumerKind::Distributor)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConsumerKind::System => "system",
            ConsumerKind::Person => "person",
            ConsumerKind::Hypervisor => "hypervisor",
            ConsumerKind::Distributor => "distributor",
        }
    }
}

/// A product the consumer reports as installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledProduct {
    pub product_id: String,
    pub version: Option<String>,
    pub arch: Option<String>,
}

/// A guest reported by a hypervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestId {
    /// The guest's virt UUID as reported by the host.
    pub guest_id: String,
    /// False once virt-who stops seeing the guest on this host.
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub kind: ConsumerKind,
    /// Registering username, matched against username-restricted pools.
    pub username: Option<String>,
    /// Preferred service level; overrides the owner default.
    pub service_level: Option<String>,
    /// Whether autobind may heal this consumer.
    pub autoheal: bool,
    /// Capabilities a manifest consumer advertises (e.g. `ram`,
    /// `cores`, `instance_multiplier`, `derived_product`).
    pub capabilities: Vec<String>,
    pub facts: BTreeMap<String, String>,
    pub installed_products: Vec<InstalledProduct>,
    /// Guests reported when this consumer acts as a host.
    pub guest_ids: Vec<GuestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consumer {
    pub fn is_manifest(&self) -> bool {
        self.kind.is_manifest()
    }

    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn numeric_fact(&self, key: &str) -> Option<i64> {
        self.fact(key)?.parse().ok()
    }

    pub fn is_guest(&self) -> bool {
        self.fact(facts::IS_GUEST)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// The virt UUID a hypervisor would report for this guest.
    pub fn virt_uuid(&self) -> Option<&str> {
        self.fact(facts::VIRT_UUID)
    }

    pub fn arch(&self) -> Option<&str> {
        self.fact(facts::ARCH)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }

    /// Reported socket count, defaulting to 1 when the fact is absent.
    pub fn sockets(&self) -> i64 {
        self.numeric_fact(facts::SOCKETS).unwrap_or(1)
    }

    /// Total core count: cores per socket times sockets.
    pub fn total_cores(&self) -> i64 {
        match self.numeric_fact(facts::CORES_PER_SOCKET) {
            Some(per_socket) => per_socket * self.sockets(),
            None => 1,
        }
    }

    /// Reported memory rounded to whole gigabytes. The raw fact is in
    /// kilobytes.
    pub fn ram_gb(&self) -> i64 {
        match self.numeric_fact(facts::RAM_TOTAL_KB) {
            Some(kb) => ((kb as f64) / 1024.0 / 1024.0).round() as i64,
            None => 1,
        }
    }

    pub fn storage_band_usage(&self) -> i64 {
        self.numeric_fact(facts::STORAGE_BAND_USAGE).unwrap_or(1)
    }

    /// Number of guests currently reported active on this host.
    pub fn active_guest_count(&self) -> i64 {
        self.guest_ids.iter().filter(|g| g.active).count() as i64
    }

    /// True while the consumer is still inside the grace window that
    /// unmapped-guest pools accept.
    pub fn registered_within(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        self.created_at + grace > now
    }
}

/// Fields required to register a new consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConsumer {
    pub owner_id: Uuid,
    pub name: String,
    pub kind: ConsumerKind,
    pub username: Option<String>,
    pub service_level: Option<String>,
    pub autoheal: Option<bool>,
    pub capabilities: Option<Vec<String>>,
    pub facts: Option<BTreeMap<String, String>>,
    pub installed_products: Option<Vec<InstalledProduct>>,
    pub guest_ids: Option<Vec<GuestId>>,
}

/// Fields that can be updated on an existing consumer. List and map
/// fields are replaced wholesale when present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateConsumer {
    pub name: Option<String>,
    pub service_level: Option<String>,
    pub autoheal: Option<bool>,
    pub capabilities: Option<Vec<String>>,
    pub facts: Option<BTreeMap<String, String>>,
    pub installed_products: Option<Vec<InstalledProduct>>,
    pub guest_ids: Option<Vec<GuestId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer_with_facts(pairs: &[(&str, &str)]) -> Consumer {
        Consumer {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "box".into(),
            kind: ConsumerKind::System,
            username: None,
            service_level: None,
            autoheal: true,
            capabilities: Vec::new(),
            facts: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            installed_products: Vec::new(),
            guest_ids: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn hardware_facts_default_to_one() {
        let c = consumer_with_facts(&[]);
        assert_eq!(c.sockets(), 1);
        assert_eq!(c.total_cores(), 1);
        assert_eq!(c.ram_gb(), 1);
        assert!(!c.is_guest());
    }

    #[test]
    fn total_cores_multiplies_per_socket_by_sockets() {
        let c = consumer_with_facts(&[
            (facts::SOCKETS, "4"),
            (facts::CORES_PER_SOCKET, "2"),
        ]);
        assert_eq!(c.total_cores(), 8);
    }

    #[test]
    fn ram_rounds_kilobytes_to_gigabytes() {
        // 8388608 KB = exactly 8 GB.
        let c = consumer_with_facts(&[(facts::RAM_TOTAL_KB, "8388608")]);
        assert_eq!(c.ram_gb(), 8);

        // Slightly under 8 GB still rounds to 8.
        let c = consumer_with_facts(&[(facts::RAM_TOTAL_KB, "8300000")]);
        assert_eq!(c.ram_gb(), 8);
    }

    #[test]
    fn active_guest_count_ignores_inactive_guests() {
        let mut c = consumer_with_facts(&[]);
        c.guest_ids = vec![
            GuestId {
                guest_id: "g1".into(),
                active: true,
            },
            GuestId {
                guest_id: "g2".into(),
                active: false,
            },
            GuestId {
                guest_id: "g3".into(),
                active: true,
            },
        ];
        assert_eq!(c.active_guest_count(), 2);
    }

    #[test]
    fn empty_fact_values_count_as_absent() {
        let c = consumer_with_facts(&[(facts::VIRT_UUID, "")]);
        assert_eq!(c.virt_uuid(), None);
    }
}
