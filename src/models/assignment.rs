use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    InTransit,
    Delivered,
    Failed,
    Rejected,
    TimedOut,
}

impl AssignmentStatus {
    /// The only legal forward edges. Every transition in the crate goes
    /// through this table; there is no other place that decides legality.
    pub fn can_transition_to(self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, next),
            (Assigned, Accepted)
                | (Assigned, Rejected)
                | (Assigned, TimedOut)
                | (Accepted, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Failed)
        )
    }

    /// Active statuses hold the order's exclusive assignment slot.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AssignmentStatus::Assigned | AssignmentStatus::Accepted | AssignmentStatus::InTransit
        )
    }

    /// Terminal but the order was not delivered: the order re-enters the
    /// dispatch pipeline.
    pub fn is_unfulfilled_terminal(self) -> bool {
        matches!(self, AssignmentStatus::Rejected | AssignmentStatus::TimedOut)
    }
}

/// The record binding one order to one courier for one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub courier_location: Option<GeoPoint>,
    pub estimated_distance_km: f64,
    pub estimated_duration_secs: i64,
    pub estimated_earning: f64,
    pub distance_travelled_km: f64,
    pub actual_duration_secs: Option<i64>,
    pub rejection_reason: Option<String>,
    pub failure_reason: Option<String>,
}

impl Assignment {
    /// Seconds left to accept, floored at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{Assignment, AssignmentStatus};
    use crate::models::courier::GeoPoint;

    fn assignment_with_window(secs: i64) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Uuid::from_u128(1),
            order_id: Uuid::from_u128(2),
            courier_id: Uuid::from_u128(3),
            status: AssignmentStatus::Assigned,
            assigned_at: now,
            expires_at: now + Duration::seconds(secs),
            accepted_at: None,
            started_at: None,
            completed_at: None,
            pickup: GeoPoint { lat: 52.52, lng: 13.405 },
            dropoff: GeoPoint { lat: 52.54, lng: 13.42 },
            courier_location: None,
            estimated_distance_km: 2.5,
            estimated_duration_secs: 360,
            estimated_earning: 5.5,
            distance_travelled_km: 0.0,
            actual_duration_secs: None,
            rejection_reason: None,
            failure_reason: None,
        }
    }

    #[test]
    fn time_remaining_is_full_window_at_creation() {
        let a = assignment_with_window(120);
        assert_eq!(a.time_remaining(a.assigned_at), 120);
        assert!(!a.is_expired(a.assigned_at));
    }

    #[test]
    fn time_remaining_floors_at_zero_past_deadline() {
        let a = assignment_with_window(120);
        let late = a.assigned_at + Duration::seconds(121);
        assert_eq!(a.time_remaining(late), 0);
        assert!(a.is_expired(late));
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline_instant() {
        let a = assignment_with_window(120);
        assert!(a.is_expired(a.expires_at));
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use AssignmentStatus::*;

        assert!(Assigned.can_transition_to(Accepted));
        assert!(Assigned.can_transition_to(Rejected));
        assert!(Assigned.can_transition_to(TimedOut));
        assert!(Accepted.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(InTransit.can_transition_to(Failed));

        // No shortcuts, no backwards edges, terminals are frozen.
        assert!(!Assigned.can_transition_to(InTransit));
        assert!(!Assigned.can_transition_to(Delivered));
        assert!(!Accepted.can_transition_to(Delivered));
        assert!(!Accepted.can_transition_to(Assigned));
        assert!(!InTransit.can_transition_to(Accepted));
        for terminal in [Delivered, Failed, Rejected, TimedOut] {
            for next in [Assigned, Accepted, InTransit, Delivered, Failed, Rejected, TimedOut] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn active_statuses_are_exactly_the_slot_holders() {
        use AssignmentStatus::*;
        assert!(Assigned.is_active());
        assert!(Accepted.is_active());
        assert!(InTransit.is_active());
        for status in [Delivered, Failed, Rejected, TimedOut] {
            assert!(!status.is_active());
        }
        assert!(Rejected.is_unfulfilled_terminal());
        assert!(TimedOut.is_unfulfilled_terminal());
        assert!(!Delivered.is_unfulfilled_terminal());
    }
}
