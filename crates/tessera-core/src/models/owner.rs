//! Owner domain model.
//!
//! Owners are the top-level tenancy unit. Every consumer, product,
//! pool, and entitlement belongs to exactly one owner, and no engine
//! evaluation ever crosses an owner boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How content access is granted within an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAccessMode {
    /// Access flows strictly from entitlements.
    #[default]
    Entitlement,
    /// The whole org is granted access; entitlements still drive
    /// compliance reporting.
    OrgEnvironment,
}

/// An owner groups consumers and subscriptions under one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    /// URL-safe unique identifier (e.g., `acme-corp`).
    pub key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Service level applied to consumers that do not set their own.
    pub default_service_level: Option<String>,
    pub content_access_mode: ContentAccessMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOwner {
    pub key: String,
    pub display_name: String,
    pub default_service_level: Option<String>,
    pub content_access_mode: Option<ContentAccessMode>,
}

/// Fields that can be updated on an existing owner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOwner {
    pub display_name: Option<String>,
    pub default_service_level: Option<String>,
    pub content_access_mode: Option<ContentAccessMode>,
}
