use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::DispatchRequest;
use crate::engine::sweeper::SweepJob;
use crate::geo::GeoIndex;
use crate::models::assignment::Assignment;
use crate::models::courier::Courier;
use crate::models::order::DeliveryOrder;
use crate::models::receipt::Receipt;
use crate::models::shift::{DayPlan, Shift, ShiftTemplate};
use crate::models::zone::Zone;
use crate::notify::NotificationSink;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub couriers: DashMap<Uuid, Courier>,
    pub zones: DashMap<Uuid, Zone>,
    pub orders: DashMap<Uuid, DeliveryOrder>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub shifts: DashMap<Uuid, Shift>,
    pub templates: DashMap<Uuid, ShiftTemplate>,
    pub receipts: DashMap<Uuid, Receipt>,
    /// order -> assignment currently holding that order's exclusive slot.
    /// The entry API on this map is the serialization point for the
    /// at-most-one-active-assignment invariant.
    pub active_by_order: DashMap<Uuid, Uuid>,
    /// courier -> their single open shift.
    pub open_shift_by_courier: DashMap<Uuid, Uuid>,
    pub geo: GeoIndex,
    pub dispatch_tx: mpsc::Sender<DispatchRequest>,
    pub sweep_tx: mpsc::Sender<SweepJob>,
    pub notifications: NotificationSink,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
    ) -> (Self, mpsc::Receiver<DispatchRequest>, mpsc::Receiver<SweepJob>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let (sweep_tx, sweep_rx) = mpsc::channel(config.dispatch_queue_size);
        let notifications = NotificationSink::new(config.event_buffer_size);
        let geo = GeoIndex::new(
            Duration::seconds(config.location_ttl_secs),
            Duration::seconds(config.trail_ttl_secs),
            config.trail_cap,
        );

        (
            Self {
                config,
                couriers: DashMap::new(),
                zones: DashMap::new(),
                orders: DashMap::new(),
                assignments: DashMap::new(),
                shifts: DashMap::new(),
                templates: DashMap::new(),
                receipts: DashMap::new(),
                active_by_order: DashMap::new(),
                open_shift_by_courier: DashMap::new(),
                geo,
                dispatch_tx,
                sweep_tx,
                notifications,
                metrics: Metrics::new(),
            },
            dispatch_rx,
            sweep_rx,
        )
    }

    /// Shift templates are reference data, not a CRUD surface; a default
    /// full-time template is seeded so a fresh deployment can dispatch.
    pub fn seed_default_templates(&self) {
        let weekday = DayPlan {
            off_day: false,
            duration_mins: 480,
        };
        let sunday = DayPlan {
            off_day: true,
            duration_mins: 0,
        };
        let template = ShiftTemplate {
            id: Uuid::new_v4(),
            name: "standard full-time".to_string(),
            is_active: true,
            hourly_rate: 12.0,
            overtime_multiplier: 1.5,
            days: [weekday, weekday, weekday, weekday, weekday, weekday, sunday],
        };
        self.templates.insert(template.id, template);
    }

    pub fn open_shift_of(&self, courier_id: Uuid) -> Option<Shift> {
        let shift_id = *self.open_shift_by_courier.get(&courier_id)?;
        self.shifts.get(&shift_id).map(|s| s.clone())
    }
}
