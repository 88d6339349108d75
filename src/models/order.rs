use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Assigned,
    Delivered,
    Failed,
}

/// Thin view of an order inside the dispatch pipeline. Order CRUD lives
/// with the marketplace; we only track what dispatch needs: where to pick
/// up, where to drop off, and who (if anyone) holds the delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub zone_hint: Option<Uuid>,
    pub status: OrderStatus,
    pub assigned_courier: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
