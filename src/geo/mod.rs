use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationSample {
    pub point: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// What the index knows about one courier: the latest sample plus the
/// matching metadata the engine filters on.
#[derive(Debug, Clone)]
struct LocationEntry {
    sample: LocationSample,
    available: bool,
    zone_ids: Vec<Uuid>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Trail {
    samples: Vec<LocationSample>,
    updated_at: DateTime<Utc>,
}

/// Metadata supplied alongside a location write.
#[derive(Debug, Clone)]
pub struct UpsertMeta {
    pub available: bool,
    pub zone_ids: Vec<Uuid>,
    /// Open shift to append the sample to, if any.
    pub open_shift: Option<Uuid>,
}

/// A courier returned by a nearest query, with its distance to the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyCourier {
    pub courier_id: Uuid,
    pub distance_km: f64,
}

/// Live, queryable store of courier locations. Samples expire after
/// `sample_ttl`; a stale entry is treated as absent, never as an error.
/// Reads are best-effort snapshots: correctness of dispatch decisions
/// rests on the per-order reservation, not on this index.
pub struct GeoIndex {
    entries: DashMap<Uuid, LocationEntry>,
    trails: DashMap<Uuid, Trail>,
    seq: AtomicU64,
    sample_ttl: Duration,
    trail_ttl: Duration,
    trail_cap: usize,
}

impl GeoIndex {
    pub fn new(sample_ttl: Duration, trail_ttl: Duration, trail_cap: usize) -> Self {
        Self {
            entries: DashMap::new(),
            trails: DashMap::new(),
            seq: AtomicU64::new(0),
            sample_ttl,
            trail_ttl,
            trail_cap,
        }
    }

    /// Overwrite the courier's entry and, when a shift is open, append the
    /// sample to that shift's trail. The trail is a bounded buffer: once
    /// full, the oldest sample is dropped.
    pub fn upsert_location(&self, courier_id: Uuid, sample: LocationSample, meta: UpsertMeta) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            courier_id,
            LocationEntry {
                sample,
                available: meta.available,
                zone_ids: meta.zone_ids,
                seq,
            },
        );

        if let Some(shift_id) = meta.open_shift {
            let mut trail = self.trails.entry(shift_id).or_insert_with(|| Trail {
                samples: Vec::new(),
                updated_at: sample.recorded_at,
            });
            if trail.samples.len() >= self.trail_cap {
                trail.samples.remove(0);
            }
            trail.samples.push(sample);
            trail.updated_at = sample.recorded_at;
        }
    }

    /// Up to `limit` available couriers covering `zone_id` within
    /// `radius_km` of `origin`, ascending by Haversine distance, ties
    /// broken by insertion order. Only couriers with a fresh sample are
    /// considered; an empty result is a normal outcome and callers are
    /// expected to fall back to the courier registry.
    pub fn find_nearest(
        &self,
        zone_id: Uuid,
        origin: &GeoPoint,
        radius_km: f64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<NearbyCourier> {
        let mut hits: Vec<(f64, u64, Uuid)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let loc = entry.value();
                if !loc.available
                    || now - loc.sample.recorded_at > self.sample_ttl
                    || !loc.zone_ids.contains(&zone_id)
                {
                    return None;
                }
                let distance = haversine_km(&loc.sample.point, origin);
                (distance <= radius_km).then_some((distance, loc.seq, *entry.key()))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.truncate(limit);
        hits.into_iter()
            .map(|(distance_km, _, courier_id)| NearbyCourier {
                courier_id,
                distance_km,
            })
            .collect()
    }

    /// Latest fresh sample for a courier, if any.
    pub fn location_of(&self, courier_id: Uuid, now: DateTime<Utc>) -> Option<LocationSample> {
        self.entries.get(&courier_id).and_then(|entry| {
            (now - entry.sample.recorded_at <= self.sample_ttl).then_some(entry.sample)
        })
    }

    /// Drop a courier from matching, e.g. when their shift ends.
    pub fn remove(&self, courier_id: Uuid) {
        self.entries.remove(&courier_id);
    }

    pub fn trail(&self, shift_id: Uuid, now: DateTime<Utc>) -> Option<Vec<LocationSample>> {
        self.trails.get(&shift_id).and_then(|trail| {
            (now - trail.updated_at <= self.trail_ttl).then(|| trail.samples.clone())
        })
    }

    /// Evict trails whose last write is past the trail TTL. Sample-level
    /// staleness is handled at read time; trails are bulk data and get
    /// swept explicitly.
    pub fn evict_stale_trails(&self, now: DateTime<Utc>) {
        self.trails
            .retain(|_, trail| now - trail.updated_at <= self.trail_ttl);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{haversine_km, GeoIndex, LocationSample, UpsertMeta};
    use crate::models::courier::GeoPoint;

    fn index() -> GeoIndex {
        GeoIndex::new(Duration::hours(1), Duration::hours(24), 1000)
    }

    fn sample(lat: f64, lng: f64, recorded_at: chrono::DateTime<Utc>) -> LocationSample {
        LocationSample {
            point: GeoPoint { lat, lng },
            accuracy_m: Some(5.0),
            speed_kmh: None,
            heading_deg: None,
            recorded_at,
        }
    }

    fn meta(zone: Uuid) -> UpsertMeta {
        UpsertMeta {
            available: true,
            zone_ids: vec![zone],
            open_shift: None,
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn nearest_orders_ascending_and_respects_radius() {
        let idx = index();
        let zone = Uuid::from_u128(9);
        let now = Utc::now();
        let origin = GeoPoint { lat: 52.52, lng: 13.405 };

        let near = Uuid::from_u128(1);
        let nearer = Uuid::from_u128(2);
        let far = Uuid::from_u128(3);
        idx.upsert_location(near, sample(52.53, 13.41, now), meta(zone));
        idx.upsert_location(nearer, sample(52.521, 13.406, now), meta(zone));
        // ~60 km north, outside a 5 km radius
        idx.upsert_location(far, sample(53.05, 13.405, now), meta(zone));

        let hits = idx.find_nearest(zone, &origin, 5.0, 5, now);
        let ids: Vec<Uuid> = hits.iter().map(|h| h.courier_id).collect();
        assert_eq!(ids, vec![nearer, near]);
        assert!(hits[0].distance_km < hits[1].distance_km);
    }

    #[test]
    fn stale_samples_and_foreign_zones_are_invisible() {
        let idx = index();
        let zone = Uuid::from_u128(9);
        let other_zone = Uuid::from_u128(8);
        let now = Utc::now();
        let origin = GeoPoint { lat: 52.52, lng: 13.405 };

        idx.upsert_location(
            Uuid::from_u128(1),
            sample(52.52, 13.405, now - Duration::hours(2)),
            meta(zone),
        );
        idx.upsert_location(Uuid::from_u128(2), sample(52.52, 13.405, now), meta(other_zone));

        assert!(idx.find_nearest(zone, &origin, 5.0, 5, now).is_empty());
    }

    #[test]
    fn unavailable_couriers_are_skipped() {
        let idx = index();
        let zone = Uuid::from_u128(9);
        let now = Utc::now();

        idx.upsert_location(
            Uuid::from_u128(1),
            sample(52.52, 13.405, now),
            UpsertMeta {
                available: false,
                zone_ids: vec![zone],
                open_shift: None,
            },
        );

        let origin = GeoPoint { lat: 52.52, lng: 13.405 };
        assert!(idx.find_nearest(zone, &origin, 5.0, 5, now).is_empty());
    }

    #[test]
    fn equidistant_couriers_tie_break_by_insertion_order() {
        let idx = index();
        let zone = Uuid::from_u128(9);
        let now = Utc::now();
        let origin = GeoPoint { lat: 52.52, lng: 13.405 };

        let first = Uuid::from_u128(7);
        let second = Uuid::from_u128(4);
        idx.upsert_location(first, sample(52.53, 13.405, now), meta(zone));
        idx.upsert_location(second, sample(52.53, 13.405, now), meta(zone));

        let hits = idx.find_nearest(zone, &origin, 5.0, 5, now);
        assert_eq!(hits[0].courier_id, first);
        assert_eq!(hits[1].courier_id, second);
    }

    #[test]
    fn trail_is_bounded() {
        let idx = GeoIndex::new(Duration::hours(1), Duration::hours(24), 3);
        let courier = Uuid::from_u128(1);
        let shift = Uuid::from_u128(2);
        let now = Utc::now();

        for i in 0..5 {
            idx.upsert_location(
                courier,
                sample(52.0 + i as f64 * 0.001, 13.0, now),
                UpsertMeta {
                    available: true,
                    zone_ids: vec![],
                    open_shift: Some(shift),
                },
            );
        }

        let trail = idx.trail(shift, now).unwrap();
        assert_eq!(trail.len(), 3);
        // Oldest samples were dropped.
        assert!((trail[0].point.lat - 52.002).abs() < 1e-9);
    }

    #[test]
    fn stale_trails_are_evicted() {
        let idx = index();
        let shift = Uuid::from_u128(2);
        let old = Utc::now() - Duration::hours(25);

        idx.upsert_location(
            Uuid::from_u128(1),
            sample(52.0, 13.0, old),
            UpsertMeta {
                available: true,
                zone_ids: vec![],
                open_shift: Some(shift),
            },
        );

        let now = Utc::now();
        assert!(idx.trail(shift, now).is_none());
        idx.evict_stale_trails(now);
        assert!(idx.trails.is_empty());
    }

    #[test]
    fn removed_courier_stops_matching() {
        let idx = index();
        let zone = Uuid::from_u128(9);
        let now = Utc::now();
        let courier = Uuid::from_u128(1);
        let origin = GeoPoint { lat: 52.52, lng: 13.405 };

        idx.upsert_location(courier, sample(52.52, 13.405, now), meta(zone));
        assert_eq!(idx.find_nearest(zone, &origin, 5.0, 5, now).len(), 1);

        idx.remove(courier);
        assert!(idx.find_nearest(zone, &origin, 5.0, 5, now).is_empty());
        assert!(idx.location_of(courier, now).is_none());
    }
}
