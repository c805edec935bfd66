//! Entitlement domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::window::TemporalWindow;

/// A claim of `quantity` units from one pool by one consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub consumer_id: Uuid,
    pub pool_id: Uuid,
    pub quantity: i64,
    /// Validity window, normally mirroring the pool's.
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Serial of the issued certificate, once one exists.
    pub certificate_serial: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    pub fn window(&self) -> TemporalWindow {
        TemporalWindow::new(self.start_date, self.end_date)
    }
}

/// Fields required to create a new entitlement. Dates default to the
/// pool's window when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntitlement {
    pub consumer_id: Uuid,
    pub pool_id: Uuid,
    pub quantity: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}
