use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::queue::{enqueue_dispatch, DispatchRequest};
use crate::error::DispatchError;
use crate::models::courier::GeoPoint;
use crate::models::order::{DeliveryOrder, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/ready", post(order_ready))
        .route("/orders/:id", get(get_order))
}

/// The order-ready-for-delivery trigger from the marketplace. Carries the
/// order id and both endpoints; dispatch takes it from here.
#[derive(Deserialize)]
pub struct OrderReadyRequest {
    pub order_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub zone_hint: Option<Uuid>,
}

async fn order_ready(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderReadyRequest>,
) -> Result<Json<Value>, DispatchError> {
    if state.active_by_order.contains_key(&payload.order_id) {
        return Err(DispatchError::Conflict(format!(
            "order {} already has an active assignment",
            payload.order_id
        )));
    }

    let order = DeliveryOrder {
        id: payload.order_id,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        zone_hint: payload.zone_hint,
        status: OrderStatus::Pending,
        assigned_courier: None,
        created_at: Utc::now(),
    };
    state.orders.insert(order.id, order.clone());
    enqueue_dispatch(&state, DispatchRequest::new(order.id)).await?;

    Ok(Json(json!({ "message": "order_queued", "order": order })))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryOrder>, DispatchError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order.value().clone()))
}
