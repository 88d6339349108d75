use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::DispatchRequest;
use crate::engine::shifts;
use crate::engine::sweeper::SweepJob;
use crate::geo::{LocationSample, UpsertMeta};
use crate::models::courier::{Availability, Courier, GeoPoint, OperationalStatus};
use crate::models::order::{DeliveryOrder, OrderStatus};
use crate::models::shift::{DayPlan, ShiftTemplate};
use crate::models::zone::Zone;
use crate::state::AppState;

/// Shared fixture for engine tests: a state with one zone covering the
/// Berlin test coordinates and a template with no off-days (so tests do
/// not depend on the weekday they run on).
pub(crate) struct Harness {
    pub state: Arc<AppState>,
    pub dispatch_rx: mpsc::Receiver<DispatchRequest>,
    pub sweep_rx: mpsc::Receiver<SweepJob>,
    pub zone_id: Uuid,
    pub template_id: Uuid,
}

pub(crate) fn harness() -> Harness {
    harness_with(Config::default())
}

pub(crate) fn harness_with(config: Config) -> Harness {
    let (state, dispatch_rx, sweep_rx) = AppState::new(config);
    let state = Arc::new(state);

    let zone = Zone {
        id: Uuid::new_v4(),
        name: "berlin-mitte".to_string(),
        polygon: vec![
            GeoPoint { lat: 52.3, lng: 13.2 },
            GeoPoint { lat: 52.7, lng: 13.2 },
            GeoPoint { lat: 52.7, lng: 13.6 },
            GeoPoint { lat: 52.3, lng: 13.6 },
        ],
    };
    let zone_id = zone.id;
    state.zones.insert(zone.id, zone);

    let template = ShiftTemplate {
        id: Uuid::new_v4(),
        name: "always-on".to_string(),
        is_active: true,
        hourly_rate: 12.0,
        overtime_multiplier: 1.5,
        days: [DayPlan {
            off_day: false,
            duration_mins: 480,
        }; 7],
    };
    let template_id = template.id;
    state.templates.insert(template.id, template);

    Harness {
        state,
        dispatch_rx,
        sweep_rx,
        zone_id,
        template_id,
    }
}

impl Harness {
    pub fn add_courier(&self, name: &str) -> Uuid {
        let courier = Courier {
            id: Uuid::new_v4(),
            name: name.to_string(),
            operational_status: OperationalStatus::Active,
            availability: Availability::Off,
            zone_ids: vec![self.zone_id],
            rating: 4.5,
            updated_at: Utc::now(),
        };
        let id = courier.id;
        self.state.couriers.insert(id, courier);
        id
    }

    pub fn add_courier_on_shift(&self, name: &str) -> Uuid {
        let id = self.add_courier(name);
        shifts::start_shift(&self.state, id, self.template_id, Utc::now())
            .expect("start shift in fixture");
        id
    }

    /// Mirror of the location-ping path: availability snapshot plus trail
    /// routing derived from the courier's current shift state.
    pub fn put_location(&self, courier_id: Uuid, lat: f64, lng: f64) {
        let courier = self
            .state
            .couriers
            .get(&courier_id)
            .expect("courier in fixture")
            .clone();
        let open_shift = self.state.open_shift_of(courier_id);
        let available = courier.is_dispatchable()
            && open_shift
                .as_ref()
                .map(|shift| !shift.is_on_break())
                .unwrap_or(false);

        self.state.geo.upsert_location(
            courier_id,
            LocationSample {
                point: GeoPoint { lat, lng },
                accuracy_m: Some(5.0),
                speed_kmh: None,
                heading_deg: None,
                recorded_at: Utc::now(),
            },
            UpsertMeta {
                available,
                zone_ids: courier.zone_ids,
                open_shift: open_shift.map(|shift| shift.id),
            },
        );
    }

    pub fn add_order(&self, lat: f64, lng: f64) -> DeliveryOrder {
        let order = DeliveryOrder {
            id: Uuid::new_v4(),
            pickup: GeoPoint { lat, lng },
            dropoff: GeoPoint {
                lat: lat + 0.02,
                lng: lng + 0.02,
            },
            zone_hint: None,
            status: OrderStatus::Pending,
            assigned_courier: None,
            created_at: Utc::now(),
        };
        self.state.orders.insert(order.id, order.clone());
        order
    }
}
