use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationalStatus {
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Availability {
    Available,
    Busy,
    Off,
}

/// Courier record. The current location is deliberately absent: it lives
/// in the Geo Index, which owns staleness and eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub operational_status: OperationalStatus,
    pub availability: Availability,
    pub zone_ids: Vec<Uuid>,
    pub rating: f64,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn covers_zone(&self, zone_id: Uuid) -> bool {
        self.zone_ids.contains(&zone_id)
    }

    /// Whether this courier may receive new work right now. Open-shift and
    /// on-break checks are applied by the engine, which owns shifts.
    pub fn is_dispatchable(&self) -> bool {
        self.operational_status == OperationalStatus::Active
            && self.availability == Availability::Available
    }
}
