use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::queue::DispatchRequest;
use crate::engine::sweeper::SweepJob;
use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::Availability;
use crate::models::order::{DeliveryOrder, OrderStatus};
use crate::notify::Channel;
use crate::state::AppState;

/// "No courier found" is a business outcome callers must branch on, not
/// an error.
#[derive(Debug)]
pub enum DispatchOutcome {
    Assigned(Assignment),
    NoCapacity,
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut rx: mpsc::Receiver<DispatchRequest>) {
    info!("dispatch engine started");

    while let Some(request) = rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();
        let order_id = request.order_id;

        let start = Instant::now();
        let outcome_label = match dispatch_order(&state, request).await {
            Ok(DispatchOutcome::Assigned(assignment)) => {
                info!(
                    order_id = %order_id,
                    courier_id = %assignment.courier_id,
                    expires_at = %assignment.expires_at,
                    "order assigned"
                );
                "assigned"
            }
            Ok(DispatchOutcome::NoCapacity) => {
                warn!(order_id = %order_id, "no courier available; order left unassigned");
                "no_capacity"
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "dispatch failed");
                "error"
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome_label])
            .observe(elapsed);
        state
            .metrics
            .dispatch_total
            .with_label_values(&[outcome_label])
            .inc();
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Match one ready order to one courier. Candidates come from the Geo
/// Index first (nearest within the search radius); if that snapshot is
/// empty the courier registry is scanned instead, where availability
/// outranks proximity. First successful exclusive attempt wins.
pub async fn dispatch_order(
    state: &AppState,
    request: DispatchRequest,
) -> Result<DispatchOutcome, DispatchError> {
    let now = Utc::now();
    let order = state
        .orders
        .get(&request.order_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| DispatchError::NotFound(format!("order {} not found", request.order_id)))?;

    let Some(zone_id) = resolve_zone(state, &order) else {
        warn!(order_id = %order.id, "no zone contains the pickup point");
        notify_unassigned(state, order.id);
        return Ok(DispatchOutcome::NoCapacity);
    };

    let mut candidates: Vec<Uuid> = state
        .geo
        .find_nearest(
            zone_id,
            &order.pickup,
            state.config.search_radius_km,
            state.config.candidate_limit,
            now,
        )
        .into_iter()
        .map(|hit| hit.courier_id)
        .filter(|id| is_eligible(state, *id, zone_id, &request.exclude))
        .collect();

    if candidates.is_empty() {
        candidates = fallback_candidates(state, zone_id, &request.exclude);
    }

    if candidates.is_empty() {
        notify_unassigned(state, order.id);
        return Ok(DispatchOutcome::NoCapacity);
    }

    for courier_id in candidates {
        match attempt_assignment(state, courier_id, &order, now).await {
            Ok(assignment) => return Ok(DispatchOutcome::Assigned(assignment)),
            // Another dispatch won the order; retrying other candidates
            // would only fail the same check.
            Err(err @ DispatchError::Conflict(_)) => return Err(err),
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    courier_id = %courier_id,
                    error = %err,
                    "assignment attempt failed; trying next candidate"
                );
            }
        }
    }

    notify_unassigned(state, order.id);
    Ok(DispatchOutcome::NoCapacity)
}

/// Create the exclusive assignment for this order/courier pair.
///
/// The vacant-entry insert on `active_by_order` is the atomicity point:
/// concurrent attempts for the same order serialize on that entry, the
/// loser sees it occupied and fails with `Conflict`.
pub async fn attempt_assignment(
    state: &AppState,
    courier_id: Uuid,
    order: &DeliveryOrder,
    now: DateTime<Utc>,
) -> Result<Assignment, DispatchError> {
    let assignment_id = Uuid::new_v4();
    match state.active_by_order.entry(order.id) {
        Entry::Occupied(_) => {
            return Err(DispatchError::Conflict(format!(
                "order {} already has an active assignment",
                order.id
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(assignment_id);
        }
    }

    let courier_location = state
        .geo
        .location_of(courier_id, now)
        .map(|sample| sample.point);
    let approach_km = courier_location
        .map(|point| haversine_km(&point, &order.pickup))
        .unwrap_or(0.0);
    let delivery_km = haversine_km(&order.pickup, &order.dropoff);
    let estimated_distance_km = approach_km + delivery_km;
    let estimated_duration_secs =
        (estimated_distance_km / state.config.avg_speed_kmh * 3_600.0).ceil() as i64;
    let estimated_earning = state.config.base_fee + state.config.per_km_fee * delivery_km;

    let expires_at = now + Duration::seconds(state.config.accept_window_secs);
    let assignment = Assignment {
        id: assignment_id,
        order_id: order.id,
        courier_id,
        status: AssignmentStatus::Assigned,
        assigned_at: now,
        expires_at,
        accepted_at: None,
        started_at: None,
        completed_at: None,
        pickup: order.pickup,
        dropoff: order.dropoff,
        courier_location,
        estimated_distance_km,
        estimated_duration_secs,
        estimated_earning,
        distance_travelled_km: 0.0,
        actual_duration_secs: None,
        rejection_reason: None,
        failure_reason: None,
    };

    state.assignments.insert(assignment_id, assignment.clone());
    if let Some(mut courier) = state.couriers.get_mut(&courier_id) {
        courier.availability = Availability::Busy;
        courier.updated_at = now;
    }
    if let Some(mut order_row) = state.orders.get_mut(&order.id) {
        order_row.status = OrderStatus::Assigned;
        order_row.assigned_courier = Some(courier_id);
    }
    state.metrics.active_assignments.inc();

    if let Err(err) = state
        .sweep_tx
        .send(SweepJob {
            assignment_id,
            expires_at,
        })
        .await
    {
        rollback_attempt(state, &assignment, now);
        return Err(DispatchError::Internal(format!(
            "failed to schedule expiry sweep: {err}"
        )));
    }

    let payload = json!({
        "assignment_id": assignment.id,
        "order_id": assignment.order_id,
        "courier_id": assignment.courier_id,
        "expires_at": assignment.expires_at,
        "estimated_earning": assignment.estimated_earning,
    });
    state
        .notifications
        .publish(Channel::Courier(courier_id), "assignment_offered", payload.clone());
    state
        .notifications
        .publish(Channel::Order(order.id), "assignment_offered", payload);

    Ok(assignment)
}

fn resolve_zone(state: &AppState, order: &DeliveryOrder) -> Option<Uuid> {
    if let Some(zone_id) = order.zone_hint {
        if state.zones.contains_key(&zone_id) {
            return Some(zone_id);
        }
    }
    state
        .zones
        .iter()
        .find(|entry| entry.contains(&order.pickup))
        .map(|entry| entry.id)
}

fn is_eligible(state: &AppState, courier_id: Uuid, zone_id: Uuid, exclude: &[Uuid]) -> bool {
    if exclude.contains(&courier_id) {
        return false;
    }
    let Some(courier) = state.couriers.get(&courier_id) else {
        return false;
    };
    if !courier.is_dispatchable() || !courier.covers_zone(zone_id) {
        return false;
    }
    match state.open_shift_of(courier_id) {
        Some(shift) => !shift.is_on_break(),
        None => false,
    }
}

/// Registry fallback for an empty Geo Index snapshot: every courier who
/// covers the zone and can take work right now, capped but unordered:
/// availability over proximity.
fn fallback_candidates(state: &AppState, zone_id: Uuid, exclude: &[Uuid]) -> Vec<Uuid> {
    state
        .couriers
        .iter()
        .map(|entry| *entry.key())
        .filter(|id| is_eligible(state, *id, zone_id, exclude))
        .take(state.config.candidate_limit)
        .collect()
}

fn rollback_attempt(state: &AppState, assignment: &Assignment, now: DateTime<Utc>) {
    state.assignments.remove(&assignment.id);
    state
        .active_by_order
        .remove_if(&assignment.order_id, |_, active| *active == assignment.id);
    if let Some(mut courier) = state.couriers.get_mut(&assignment.courier_id) {
        courier.availability = Availability::Available;
        courier.updated_at = now;
    }
    if let Some(mut order_row) = state.orders.get_mut(&assignment.order_id) {
        order_row.status = OrderStatus::Pending;
        order_row.assigned_courier = None;
    }
    state.metrics.active_assignments.dec();
}

fn notify_unassigned(state: &AppState, order_id: Uuid) {
    state.notifications.publish(
        Channel::Admin,
        "order_unassigned",
        json!({ "order_id": order_id }),
    );
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{attempt_assignment, dispatch_order, DispatchOutcome};
    use crate::engine::queue::DispatchRequest;
    use crate::engine::shifts;
    use crate::engine::testutil::harness;
    use crate::error::DispatchError;
    use crate::models::assignment::AssignmentStatus;
    use crate::models::courier::Availability;
    use crate::models::order::OrderStatus;

    #[tokio::test]
    async fn nearest_courier_wins() {
        let h = harness();
        let near = h.add_courier_on_shift("near");
        let far = h.add_courier_on_shift("far");
        h.put_location(near, 52.521, 13.406);
        h.put_location(far, 52.56, 13.45);

        let order = h.add_order(52.52, 13.405);
        let outcome = dispatch_order(&h.state, DispatchRequest::new(order.id))
            .await
            .unwrap();

        let DispatchOutcome::Assigned(assignment) = outcome else {
            panic!("expected an assignment");
        };
        assert_eq!(assignment.courier_id, near);
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert_eq!(
            assignment.time_remaining(assignment.assigned_at),
            h.state.config.accept_window_secs
        );

        let order_row = h.state.orders.get(&order.id).unwrap().clone();
        assert_eq!(order_row.status, OrderStatus::Assigned);
        assert_eq!(order_row.assigned_courier, Some(near));
        assert_eq!(
            h.state.couriers.get(&near).unwrap().availability,
            Availability::Busy
        );
        assert_eq!(*h.state.active_by_order.get(&order.id).unwrap(), assignment.id);
    }

    #[tokio::test]
    async fn sweep_is_scheduled_at_the_deadline() {
        let mut h = harness();
        let courier = h.add_courier_on_shift("c");
        h.put_location(courier, 52.52, 13.405);

        let order = h.add_order(52.52, 13.405);
        let outcome = dispatch_order(&h.state, DispatchRequest::new(order.id))
            .await
            .unwrap();
        let DispatchOutcome::Assigned(assignment) = outcome else {
            panic!("expected an assignment");
        };

        let job = h.sweep_rx.try_recv().expect("sweep job queued");
        assert_eq!(job.assignment_id, assignment.id);
        assert_eq!(job.expires_at, assignment.expires_at);
    }

    #[tokio::test]
    async fn empty_geo_snapshot_falls_back_to_registry() {
        let h = harness();
        // Eligible courier, but no location sample at all.
        let courier = h.add_courier_on_shift("ghost");

        let order = h.add_order(52.52, 13.405);
        let outcome = dispatch_order(&h.state, DispatchRequest::new(order.id))
            .await
            .unwrap();

        let DispatchOutcome::Assigned(assignment) = outcome else {
            panic!("fallback should have assigned");
        };
        assert_eq!(assignment.courier_id, courier);
        // No approach leg without a location: estimate covers delivery only.
        assert!(assignment.courier_location.is_none());
    }

    #[tokio::test]
    async fn courier_on_break_leaves_no_capacity() {
        let h = harness();
        let courier = h.add_courier_on_shift("resting");
        h.put_location(courier, 52.52, 13.405);
        shifts::start_break(&h.state, courier, Utc::now()).unwrap();

        let order = h.add_order(52.52, 13.405);
        let outcome = dispatch_order(&h.state, DispatchRequest::new(order.id))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::NoCapacity));
        assert!(h.state.active_by_order.get(&order.id).is_none());
        assert_eq!(
            h.state.orders.get(&order.id).unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn excluded_courier_is_skipped() {
        let h = harness();
        let near = h.add_courier_on_shift("near");
        let far = h.add_courier_on_shift("far");
        h.put_location(near, 52.521, 13.406);
        h.put_location(far, 52.53, 13.42);

        let order = h.add_order(52.52, 13.405);
        let outcome = dispatch_order(
            &h.state,
            DispatchRequest::excluding(order.id, near),
        )
        .await
        .unwrap();

        let DispatchOutcome::Assigned(assignment) = outcome else {
            panic!("expected an assignment");
        };
        assert_eq!(assignment.courier_id, far);
    }

    #[tokio::test]
    async fn pickup_outside_every_zone_is_no_capacity() {
        let h = harness();
        let courier = h.add_courier_on_shift("c");
        h.put_location(courier, 52.52, 13.405);

        // Way south of the fixture zone.
        let order = h.add_order(48.13, 11.58);
        let outcome = dispatch_order(&h.state, DispatchRequest::new(order.id))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::NoCapacity));
    }

    #[tokio::test]
    async fn concurrent_attempts_create_exactly_one_assignment() {
        let h = harness();
        let first = h.add_courier_on_shift("first");
        let second = h.add_courier_on_shift("second");
        let order = h.add_order(52.52, 13.405);

        let now = Utc::now();
        let (a, b) = tokio::join!(
            attempt_assignment(&h.state, first, &order, now),
            attempt_assignment(&h.state, second, &order, now),
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(DispatchError::Conflict(_))));

        let rows = h
            .state
            .assignments
            .iter()
            .filter(|entry| entry.order_id == order.id)
            .count();
        assert_eq!(rows, 1);
        assert!(h.state.active_by_order.get(&order.id).is_some());
    }
}
