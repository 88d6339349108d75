use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::lifecycle::{self, StatusUpdate};
use crate::error::DispatchError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::GeoPoint;
use crate::models::receipt::ReceiptKind;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/accept", post(accept))
        .route("/assignments/:id/reject", post(reject))
        .route("/assignments/:id/status", post(update_status))
        .route("/assignments/:id/receipts", post(upload_receipt))
        .route("/receipts/:id", delete(delete_receipt))
}

fn assignment_view(assignment: &Assignment) -> Value {
    let now = Utc::now();
    json!({
        "assignment": assignment,
        "time_remaining_secs": assignment.time_remaining(now),
        "is_expired": assignment.is_expired(now),
    })
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let assignments = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(assignments)
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, DispatchError> {
    let assignment = state
        .assignments
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("assignment {id} not found")))?;
    Ok(Json(assignment_view(&assignment)))
}

#[derive(Deserialize)]
pub struct CourierAction {
    pub courier_id: Uuid,
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierAction>,
) -> Result<Json<Value>, DispatchError> {
    let assignment = lifecycle::accept(&state, id, payload.courier_id, Utc::now())?;
    Ok(Json(json!({
        "message": "assignment_accepted",
        "assignment": assignment,
    })))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub courier_id: Uuid,
    pub reason: String,
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Value>, DispatchError> {
    let assignment =
        lifecycle::reject(&state, id, payload.courier_id, payload.reason, Utc::now()).await?;
    Ok(Json(json!({
        "message": "assignment_rejected",
        "assignment": assignment,
    })))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub courier_id: Uuid,
    pub status: AssignmentStatus,
    pub location: Option<GeoPoint>,
    pub failure_reason: Option<String>,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, DispatchError> {
    let extra = StatusUpdate {
        location: payload.location,
        failure_reason: payload.failure_reason,
    };
    let assignment = lifecycle::update_status(
        &state,
        id,
        payload.courier_id,
        payload.status,
        extra,
        Utc::now(),
    )?;
    Ok(Json(json!({
        "message": "assignment_status_updated",
        "assignment": assignment,
    })))
}

#[derive(Deserialize)]
pub struct UploadReceiptRequest {
    pub courier_id: Uuid,
    pub kind: ReceiptKind,
    pub file_name: String,
}

async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UploadReceiptRequest>,
) -> Result<Json<Value>, DispatchError> {
    let receipt = lifecycle::upload_receipt(
        &state,
        id,
        payload.courier_id,
        payload.kind,
        payload.file_name,
        Utc::now(),
    )?;
    Ok(Json(json!({
        "message": "receipt_uploaded",
        "receipt": receipt,
    })))
}

async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierAction>,
) -> Result<Json<Value>, DispatchError> {
    lifecycle::delete_receipt(&state, id, payload.courier_id)?;
    Ok(Json(json!({ "message": "receipt_deleted" })))
}
