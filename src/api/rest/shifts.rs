use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::shifts;
use crate::error::DispatchError;
use crate::models::shift::ShiftTemplate;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/templates", get(list_templates))
        .route("/couriers/:id/shifts", post(start_shift))
        .route("/couriers/:id/shifts/end", post(end_shift))
        .route("/couriers/:id/breaks", post(start_break))
        .route("/couriers/:id/breaks/end", post(end_break))
        .route("/couriers/:id/earnings", get(earnings))
}

async fn list_templates(State(state): State<Arc<AppState>>) -> Json<Vec<ShiftTemplate>> {
    let templates = state
        .templates
        .iter()
        .filter(|entry| entry.is_active)
        .map(|entry| entry.value().clone())
        .collect();
    Json(templates)
}

#[derive(Deserialize)]
pub struct StartShiftRequest {
    pub template_id: Uuid,
}

async fn start_shift(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
    Json(payload): Json<StartShiftRequest>,
) -> Result<Json<Value>, DispatchError> {
    let shift = shifts::start_shift(&state, courier_id, payload.template_id, Utc::now())?;
    Ok(Json(json!({ "message": "shift_started", "shift": shift })))
}

async fn end_shift(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
) -> Result<Json<Value>, DispatchError> {
    let shift = shifts::end_shift(&state, courier_id, Utc::now())?;
    Ok(Json(json!({ "message": "shift_ended", "shift": shift })))
}

async fn start_break(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
) -> Result<Json<Value>, DispatchError> {
    let shift = shifts::start_break(&state, courier_id, Utc::now())?;
    Ok(Json(json!({ "message": "break_started", "shift": shift })))
}

async fn end_break(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
) -> Result<Json<Value>, DispatchError> {
    let shift = shifts::end_break(&state, courier_id, Utc::now())?;
    Ok(Json(json!({ "message": "break_ended", "shift": shift })))
}

async fn earnings(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
) -> Result<Json<Value>, DispatchError> {
    let summary = shifts::earnings_summary(&state, courier_id)?;
    Ok(Json(json!({ "message": "earnings_summary", "summary": summary })))
}
