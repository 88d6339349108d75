use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::queue::{enqueue_dispatch, DispatchRequest};
use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::{Availability, GeoPoint};
use crate::models::order::OrderStatus;
use crate::models::receipt::{allowed_kinds, Receipt, ReceiptKind};
use crate::notify::Channel;
use crate::state::AppState;

/// Caller-supplied extras for a status update.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub location: Option<GeoPoint>,
    pub failure_reason: Option<String>,
}

/// Courier takes the offered assignment. Valid only from `Assigned` and
/// only before the deadline; an expired offer fails with `Expired` and
/// the status is left for the sweep to settle, since a timed-out
/// assignment must never silently become accepted.
pub fn accept(
    state: &AppState,
    assignment_id: Uuid,
    courier_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Assignment, DispatchError> {
    let snapshot = {
        let mut entry = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| not_found(assignment_id))?;
        if entry.courier_id != courier_id {
            return Err(not_owner(assignment_id));
        }
        match entry.status {
            AssignmentStatus::Assigned => {}
            AssignmentStatus::TimedOut => {
                return Err(DispatchError::Expired(
                    "acceptance window has passed".to_string(),
                ));
            }
            other => {
                return Err(DispatchError::InvalidTransition(format!(
                    "cannot accept an assignment in status {other:?}"
                )));
            }
        }
        if entry.is_expired(now) {
            return Err(DispatchError::Expired(
                "acceptance window has passed".to_string(),
            ));
        }

        entry.status = AssignmentStatus::Accepted;
        entry.accepted_at = Some(now);
        entry.clone()
    };

    publish_transition(state, &snapshot, "assignment_accepted");
    Ok(snapshot)
}

/// Courier declines the offered assignment. The order immediately
/// re-enters the dispatch pipeline with this courier excluded from the
/// next round.
pub async fn reject(
    state: &AppState,
    assignment_id: Uuid,
    courier_id: Uuid,
    reason: String,
    now: DateTime<Utc>,
) -> Result<Assignment, DispatchError> {
    let snapshot = {
        let mut entry = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| not_found(assignment_id))?;
        if entry.courier_id != courier_id {
            return Err(not_owner(assignment_id));
        }
        if entry.status != AssignmentStatus::Assigned {
            return Err(DispatchError::InvalidTransition(format!(
                "cannot reject an assignment in status {:?}",
                entry.status
            )));
        }

        entry.status = AssignmentStatus::Rejected;
        entry.rejection_reason = Some(reason);
        entry.completed_at = Some(now);
        entry.clone()
    };

    release_order_slot(state, &snapshot, OrderStatus::Pending, now);
    publish_transition(state, &snapshot, "assignment_rejected");
    redispatch(state, &snapshot).await;
    Ok(snapshot)
}

/// Courier moves the delivery forward. The only legal edges here are
/// `Accepted -> InTransit` (gated on an uploaded pickup proof) and
/// `InTransit -> Delivered | Failed`; anything else is rejected without
/// mutating state.
pub fn update_status(
    state: &AppState,
    assignment_id: Uuid,
    courier_id: Uuid,
    requested: AssignmentStatus,
    extra: StatusUpdate,
    now: DateTime<Utc>,
) -> Result<Assignment, DispatchError> {
    if !matches!(
        requested,
        AssignmentStatus::InTransit | AssignmentStatus::Delivered | AssignmentStatus::Failed
    ) {
        return Err(DispatchError::InvalidTransition(format!(
            "status {requested:?} cannot be requested directly"
        )));
    }

    let snapshot = {
        let mut entry = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| not_found(assignment_id))?;
        if entry.courier_id != courier_id {
            return Err(not_owner(assignment_id));
        }
        if !entry.status.can_transition_to(requested) {
            return Err(DispatchError::InvalidTransition(format!(
                "cannot move from {:?} to {:?}",
                entry.status, requested
            )));
        }

        match requested {
            AssignmentStatus::InTransit => {
                if !has_receipt(state, assignment_id, ReceiptKind::PickupProof) {
                    return Err(DispatchError::InvalidTransition(
                        "pickup proof required before in_transit".to_string(),
                    ));
                }
                entry.started_at = Some(now);
            }
            AssignmentStatus::Delivered => {
                entry.completed_at = Some(now);
                entry.actual_duration_secs =
                    entry.accepted_at.map(|at| (now - at).num_seconds());
            }
            AssignmentStatus::Failed => {
                let reason = extra
                    .failure_reason
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| {
                        DispatchError::Validation("failure_reason is required".to_string())
                    })?;
                entry.failure_reason = Some(reason);
                entry.completed_at = Some(now);
            }
            _ => unreachable!("filtered above"),
        }

        if let Some(point) = extra.location {
            if let Some(previous) = entry.courier_location {
                entry.distance_travelled_km += haversine_km(&previous, &point);
            }
            entry.courier_location = Some(point);
        }
        entry.status = requested;
        entry.clone()
    };

    match snapshot.status {
        AssignmentStatus::InTransit => {
            publish_transition(state, &snapshot, "assignment_in_transit");
        }
        AssignmentStatus::Delivered => {
            credit_shift(state, &snapshot);
            release_order_slot(state, &snapshot, OrderStatus::Delivered, now);
            publish_transition(state, &snapshot, "assignment_delivered");
        }
        AssignmentStatus::Failed => {
            release_order_slot(state, &snapshot, OrderStatus::Failed, now);
            publish_transition(state, &snapshot, "assignment_failed");
        }
        _ => {}
    }

    Ok(snapshot)
}

/// Sweeper entry point: force the deadline. Conditional on the row still
/// being `Assigned`; when the courier already acted this is a no-op, so
/// a late acceptance and the timeout firing can never double-process the
/// same assignment. Returns whether the assignment was timed out.
pub async fn expire(
    state: &AppState,
    assignment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DispatchError> {
    let snapshot = {
        let Some(mut entry) = state.assignments.get_mut(&assignment_id) else {
            return Ok(false);
        };
        if entry.status != AssignmentStatus::Assigned {
            return Ok(false);
        }

        entry.status = AssignmentStatus::TimedOut;
        entry.completed_at = Some(now);
        entry.clone()
    };

    state.metrics.assignments_expired_total.inc();
    release_order_slot(state, &snapshot, OrderStatus::Pending, now);
    publish_transition(state, &snapshot, "assignment_expired");
    info!(
        assignment_id = %snapshot.id,
        order_id = %snapshot.order_id,
        courier_id = %snapshot.courier_id,
        "assignment timed out"
    );
    redispatch(state, &snapshot).await;
    Ok(true)
}

/// Attach a proof artifact. The uploader must be the assignment's courier
/// and the kind must be unlocked by the current status.
pub fn upload_receipt(
    state: &AppState,
    assignment_id: Uuid,
    courier_id: Uuid,
    kind: ReceiptKind,
    file_name: String,
    now: DateTime<Utc>,
) -> Result<Receipt, DispatchError> {
    if file_name.trim().is_empty() {
        return Err(DispatchError::Validation(
            "file_name cannot be empty".to_string(),
        ));
    }

    let status = {
        let assignment = state
            .assignments
            .get(&assignment_id)
            .ok_or_else(|| not_found(assignment_id))?;
        if assignment.courier_id != courier_id {
            return Err(not_owner(assignment_id));
        }
        assignment.status
    };

    if !allowed_kinds(status).contains(&kind) {
        return Err(DispatchError::InvalidTransition(format!(
            "receipt kind {kind:?} not allowed while assignment is {status:?}"
        )));
    }

    let receipt = Receipt {
        id: Uuid::new_v4(),
        assignment_id,
        courier_id,
        kind,
        file_name,
        uploaded_at: now,
    };
    state.receipts.insert(receipt.id, receipt.clone());
    Ok(receipt)
}

pub fn delete_receipt(
    state: &AppState,
    receipt_id: Uuid,
    courier_id: Uuid,
) -> Result<(), DispatchError> {
    let owner = state
        .receipts
        .get(&receipt_id)
        .map(|receipt| receipt.courier_id)
        .ok_or_else(|| DispatchError::NotFound(format!("receipt {receipt_id} not found")))?;
    if owner != courier_id {
        return Err(DispatchError::Unauthorized(format!(
            "receipt {receipt_id} does not belong to courier {courier_id}"
        )));
    }
    state.receipts.remove(&receipt_id);
    Ok(())
}

fn has_receipt(state: &AppState, assignment_id: Uuid, kind: ReceiptKind) -> bool {
    state
        .receipts
        .iter()
        .any(|entry| entry.assignment_id == assignment_id && entry.kind == kind)
}

/// Release the order's exclusive slot and restore the courier. Used by
/// every exit from an active status.
fn release_order_slot(
    state: &AppState,
    assignment: &Assignment,
    order_status: OrderStatus,
    now: DateTime<Utc>,
) {
    state
        .active_by_order
        .remove_if(&assignment.order_id, |_, active| *active == assignment.id);
    state.metrics.active_assignments.dec();

    if let Some(mut courier) = state.couriers.get_mut(&assignment.courier_id) {
        if courier.availability == Availability::Busy {
            courier.availability = Availability::Available;
        }
        courier.updated_at = now;
    }
    if let Some(mut order_row) = state.orders.get_mut(&assignment.order_id) {
        order_row.status = order_status;
        order_row.assigned_courier = match order_status {
            OrderStatus::Pending => None,
            _ => Some(assignment.courier_id),
        };
    }
}

/// Credit the delivered attempt to the courier's open shift.
fn credit_shift(state: &AppState, assignment: &Assignment) {
    let Some(shift_id) = state
        .open_shift_by_courier
        .get(&assignment.courier_id)
        .map(|entry| *entry)
    else {
        return;
    };
    if let Some(mut shift) = state.shifts.get_mut(&shift_id) {
        shift.total_orders += 1;
        shift.total_earnings += assignment.estimated_earning;
    }
}

async fn redispatch(state: &AppState, assignment: &Assignment) {
    let request = DispatchRequest::excluding(assignment.order_id, assignment.courier_id);
    if let Err(err) = enqueue_dispatch(state, request).await {
        error!(
            order_id = %assignment.order_id,
            error = %err,
            "failed to re-queue order after unfulfilled assignment"
        );
    }
}

fn publish_transition(state: &AppState, assignment: &Assignment, event: &str) {
    let payload = json!({
        "assignment_id": assignment.id,
        "order_id": assignment.order_id,
        "courier_id": assignment.courier_id,
        "status": assignment.status,
    });
    state.notifications.publish(
        Channel::Courier(assignment.courier_id),
        event,
        payload.clone(),
    );
    state
        .notifications
        .publish(Channel::Order(assignment.order_id), event, payload);
}

fn not_found(assignment_id: Uuid) -> DispatchError {
    DispatchError::NotFound(format!("assignment {assignment_id} not found"))
}

fn not_owner(assignment_id: Uuid) -> DispatchError {
    DispatchError::Unauthorized(format!(
        "assignment {assignment_id} belongs to another courier"
    ))
}
