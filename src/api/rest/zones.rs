use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::courier::GeoPoint;
use crate::models::zone::Zone;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/zones", post(create_zone).get(list_zones))
}

/// Zones are reference data; this endpoint exists for bootstrap, not for
/// ongoing management.
#[derive(Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    pub polygon: Vec<GeoPoint>,
}

async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateZoneRequest>,
) -> Result<Json<Zone>, DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::Validation("name cannot be empty".to_string()));
    }
    if payload.polygon.len() < 3 {
        return Err(DispatchError::Validation(
            "polygon needs at least three vertices".to_string(),
        ));
    }

    let zone = Zone {
        id: Uuid::new_v4(),
        name: payload.name,
        polygon: payload.polygon,
    };
    state.zones.insert(zone.id, zone.clone());
    Ok(Json(zone))
}

async fn list_zones(State(state): State<Arc<AppState>>) -> Json<Vec<Zone>> {
    let zones = state
        .zones
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(zones)
}
