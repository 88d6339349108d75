use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-weekday plan inside a shift template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayPlan {
    pub off_day: bool,
    pub duration_mins: i64,
}

/// Weekly working-hours template. Reference data seeded at boot; couriers
/// pick one when starting a shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub hourly_rate: f64,
    pub overtime_multiplier: f64,
    /// Monday-first, one entry per weekday.
    pub days: [DayPlan; 7],
}

impl ShiftTemplate {
    pub fn plan_for(&self, weekday: Weekday) -> DayPlan {
        self.days[weekday.num_days_from_monday() as usize]
    }
}

/// One on-duty interval for a courier. Immutable once closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub template_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub expected_end_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub total_orders: u32,
    pub total_earnings: f64,
    pub overtime_mins: i64,
    pub overtime_pay: f64,
}

impl Shift {
    pub fn open(courier_id: Uuid, template: &ShiftTemplate, now: DateTime<Utc>) -> Self {
        let plan = template.plan_for(now.weekday());
        Self {
            id: Uuid::new_v4(),
            courier_id,
            template_id: template.id,
            start_time: now,
            expected_end_time: now + Duration::minutes(plan.duration_mins),
            end_time: None,
            break_start: None,
            break_end: None,
            is_open: true,
            total_orders: 0,
            total_earnings: 0.0,
            overtime_mins: 0,
            overtime_pay: 0.0,
        }
    }

    /// A break is running once started and not yet ended.
    pub fn is_on_break(&self) -> bool {
        self.break_start.is_some() && self.break_end.is_none()
    }

    /// Overtime owed for closing at `end`, in (minutes, pay).
    pub fn overtime_for(&self, template: &ShiftTemplate, end: DateTime<Utc>) -> (i64, f64) {
        if end <= self.expected_end_time {
            return (0, 0.0);
        }
        let mins = (end - self.expected_end_time).num_minutes();
        let pay = mins as f64 / 60.0 * template.hourly_rate * template.overtime_multiplier;
        (mins, pay)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{DayPlan, Shift, ShiftTemplate};

    fn template() -> ShiftTemplate {
        ShiftTemplate {
            id: Uuid::from_u128(10),
            name: "weekday".to_string(),
            is_active: true,
            hourly_rate: 12.0,
            overtime_multiplier: 1.5,
            days: [DayPlan { off_day: false, duration_mins: 480 }; 7],
        }
    }

    #[test]
    fn open_computes_expected_end_from_day_plan() {
        // 2024-01-01 is a Monday.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let shift = Shift::open(Uuid::from_u128(1), &template(), now);
        assert_eq!(shift.expected_end_time, now + Duration::minutes(480));
        assert!(shift.is_open);
        assert!(!shift.is_on_break());
    }

    #[test]
    fn overtime_is_zero_when_closed_on_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let shift = Shift::open(Uuid::from_u128(1), &template(), now);
        let (mins, pay) = shift.overtime_for(&template(), shift.expected_end_time);
        assert_eq!(mins, 0);
        assert_eq!(pay, 0.0);
    }

    #[test]
    fn overtime_pays_hourly_rate_times_multiplier() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let shift = Shift::open(Uuid::from_u128(1), &template(), now);
        let end = shift.expected_end_time + Duration::minutes(90);
        let (mins, pay) = shift.overtime_for(&template(), end);
        assert_eq!(mins, 90);
        // 1.5h * 12.0/h * 1.5x
        assert!((pay - 27.0).abs() < 1e-9);
    }
}
