use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::{LocationSample, UpsertMeta};
use crate::models::courier::{Availability, Courier, GeoPoint, OperationalStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id", axum::routing::get(get_courier))
        .route("/couriers/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub zone_ids: Vec<Uuid>,
    pub rating: f64,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::Validation("name cannot be empty".to_string()));
    }
    if payload.zone_ids.is_empty() {
        return Err(DispatchError::Validation(
            "courier must cover at least one zone".to_string(),
        ));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        operational_status: OperationalStatus::Active,
        availability: Availability::Off,
        zone_ids: payload.zone_ids,
        rating: payload.rating.clamp(0.0, 5.0),
        updated_at: Utc::now(),
    };

    state.couriers.insert(courier.id, courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let couriers = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(couriers)
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Courier>, DispatchError> {
    let courier = state
        .couriers
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("courier {id} not found")))?;
    Ok(Json(courier.clone()))
}

/// Location pings are fire-and-forget: the write can only degrade
/// matching quality, never order correctness, so nothing past the
/// courier lookup can fail this request.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Value>, DispatchError> {
    let (zone_ids, dispatchable) = {
        let courier = state
            .couriers
            .get(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("courier {id} not found")))?;
        (courier.zone_ids.clone(), courier.is_dispatchable())
    };

    let open_shift = state.open_shift_of(id);
    let available = dispatchable
        && open_shift
            .as_ref()
            .map(|shift| !shift.is_on_break())
            .unwrap_or(false);

    let sample = LocationSample {
        point: GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
        accuracy_m: payload.accuracy_m,
        speed_kmh: payload.speed_kmh,
        heading_deg: payload.heading_deg,
        recorded_at: Utc::now(),
    };
    state.geo.upsert_location(
        id,
        sample,
        UpsertMeta {
            available,
            zone_ids,
            open_shift: open_shift.map(|shift| shift.id),
        },
    );

    Ok(Json(json!({ "message": "location_updated" })))
}
