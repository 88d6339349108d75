use chrono::{DateTime, Datelike, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::courier::{Availability, OperationalStatus};
use crate::models::shift::Shift;
use crate::notify::Channel;
use crate::state::AppState;

/// Open a shift against a template. One open shift per courier; the
/// vacant-entry insert on `open_shift_by_courier` enforces it.
pub fn start_shift(
    state: &AppState,
    courier_id: Uuid,
    template_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Shift, DispatchError> {
    {
        let courier = state
            .couriers
            .get(&courier_id)
            .ok_or_else(|| DispatchError::NotFound(format!("courier {courier_id} not found")))?;
        if courier.operational_status != OperationalStatus::Active {
            return Err(DispatchError::Conflict(format!(
                "courier {courier_id} is not active"
            )));
        }
    }

    let template = state
        .templates
        .get(&template_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| DispatchError::NotFound(format!("template {template_id} not found")))?;
    if !template.is_active {
        return Err(DispatchError::Conflict(format!(
            "template {template_id} is inactive"
        )));
    }
    if template.plan_for(now.weekday()).off_day {
        return Err(DispatchError::Conflict(
            "today is an off-day for this template".to_string(),
        ));
    }

    let shift = Shift::open(courier_id, &template, now);
    match state.open_shift_by_courier.entry(courier_id) {
        Entry::Occupied(_) => {
            return Err(DispatchError::Conflict(format!(
                "courier {courier_id} already has an open shift"
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(shift.id);
        }
    }
    state.shifts.insert(shift.id, shift.clone());

    if let Some(mut courier) = state.couriers.get_mut(&courier_id) {
        courier.availability = Availability::Available;
        courier.updated_at = now;
    }
    state.metrics.couriers_on_shift.inc();
    state.notifications.publish(
        Channel::Courier(courier_id),
        "shift_started",
        json!({ "shift_id": shift.id, "expected_end_time": shift.expected_end_time }),
    );

    Ok(shift)
}

/// Close the open shift, settle overtime, and take the courier out of
/// matching immediately.
pub fn end_shift(
    state: &AppState,
    courier_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Shift, DispatchError> {
    let Some((_, shift_id)) = state.open_shift_by_courier.remove(&courier_id) else {
        return Err(DispatchError::InvalidTransition(format!(
            "courier {courier_id} has no open shift"
        )));
    };

    let snapshot = {
        let mut shift = state.shifts.get_mut(&shift_id).ok_or_else(|| {
            DispatchError::Internal(format!("open shift {shift_id} missing from store"))
        })?;

        // A break left running is closed together with the shift.
        if shift.is_on_break() {
            shift.break_end = Some(now);
        }
        if let Some(template) = state.templates.get(&shift.template_id) {
            let (mins, pay) = shift.overtime_for(template.value(), now);
            shift.overtime_mins = mins;
            shift.overtime_pay = pay;
        }
        shift.is_open = false;
        shift.end_time = Some(now);
        shift.clone()
    };

    state.geo.remove(courier_id);
    if let Some(mut courier) = state.couriers.get_mut(&courier_id) {
        courier.availability = Availability::Off;
        courier.updated_at = now;
    }
    state.metrics.couriers_on_shift.dec();
    state.notifications.publish(
        Channel::Courier(courier_id),
        "shift_ended",
        json!({
            "shift_id": snapshot.id,
            "total_orders": snapshot.total_orders,
            "total_earnings": snapshot.total_earnings,
            "overtime_mins": snapshot.overtime_mins,
        }),
    );

    Ok(snapshot)
}

/// Breaks are strictly sequenced: a running break blocks another start,
/// and ending is only legal while one runs.
pub fn start_break(
    state: &AppState,
    courier_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Shift, DispatchError> {
    let shift_id = open_shift_id(state, courier_id)?;
    let snapshot = {
        let mut shift = state.shifts.get_mut(&shift_id).ok_or_else(|| {
            DispatchError::Internal(format!("open shift {shift_id} missing from store"))
        })?;
        if shift.is_on_break() {
            return Err(DispatchError::Conflict(
                "a break is already running".to_string(),
            ));
        }
        shift.break_start = Some(now);
        shift.break_end = None;
        shift.clone()
    };

    state.notifications.publish(
        Channel::Courier(courier_id),
        "break_started",
        json!({ "shift_id": snapshot.id }),
    );
    Ok(snapshot)
}

pub fn end_break(
    state: &AppState,
    courier_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Shift, DispatchError> {
    let shift_id = open_shift_id(state, courier_id)?;
    let snapshot = {
        let mut shift = state.shifts.get_mut(&shift_id).ok_or_else(|| {
            DispatchError::Internal(format!("open shift {shift_id} missing from store"))
        })?;
        if !shift.is_on_break() {
            return Err(DispatchError::InvalidTransition(
                "no break is running".to_string(),
            ));
        }
        shift.break_end = Some(now);
        shift.clone()
    };

    state.notifications.publish(
        Channel::Courier(courier_id),
        "break_ended",
        json!({ "shift_id": snapshot.id }),
    );
    Ok(snapshot)
}

#[derive(Debug, Serialize)]
pub struct EarningsSummary {
    pub courier_id: Uuid,
    pub open_shift: Option<Shift>,
    pub lifetime_orders: u32,
    pub lifetime_earnings: f64,
    pub lifetime_overtime_pay: f64,
}

pub fn earnings_summary(
    state: &AppState,
    courier_id: Uuid,
) -> Result<EarningsSummary, DispatchError> {
    if !state.couriers.contains_key(&courier_id) {
        return Err(DispatchError::NotFound(format!(
            "courier {courier_id} not found"
        )));
    }

    let mut summary = EarningsSummary {
        courier_id,
        open_shift: state.open_shift_of(courier_id),
        lifetime_orders: 0,
        lifetime_earnings: 0.0,
        lifetime_overtime_pay: 0.0,
    };
    for shift in state.shifts.iter() {
        if shift.courier_id != courier_id {
            continue;
        }
        summary.lifetime_orders += shift.total_orders;
        summary.lifetime_earnings += shift.total_earnings + shift.overtime_pay;
        summary.lifetime_overtime_pay += shift.overtime_pay;
    }
    Ok(summary)
}

fn open_shift_id(state: &AppState, courier_id: Uuid) -> Result<Uuid, DispatchError> {
    state
        .open_shift_by_courier
        .get(&courier_id)
        .map(|entry| *entry)
        .ok_or_else(|| {
            DispatchError::InvalidTransition(format!("courier {courier_id} has no open shift"))
        })
}
