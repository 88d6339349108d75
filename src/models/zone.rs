use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

/// Geographic partition used to scope courier-to-order matching.
/// Reference data: created once at bootstrap, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub polygon: Vec<GeoPoint>,
}

impl Zone {
    /// Ray-casting point-in-polygon. The polygon is a closed ring; the
    /// closing edge from last back to first vertex is implied.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if self.polygon.len() < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = self.polygon.len() - 1;
        for i in 0..self.polygon.len() {
            let a = &self.polygon[i];
            let b = &self.polygon[j];

            let crosses = (a.lat > point.lat) != (b.lat > point.lat)
                && point.lng
                    < (b.lng - a.lng) * (point.lat - a.lat) / (b.lat - a.lat) + a.lng;
            if crosses {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Zone;
    use crate::models::courier::GeoPoint;

    fn square_zone() -> Zone {
        Zone {
            id: Uuid::from_u128(1),
            name: "center".to_string(),
            polygon: vec![
                GeoPoint { lat: 52.0, lng: 13.0 },
                GeoPoint { lat: 53.0, lng: 13.0 },
                GeoPoint { lat: 53.0, lng: 14.0 },
                GeoPoint { lat: 52.0, lng: 14.0 },
            ],
        }
    }

    #[test]
    fn point_inside_square_is_contained() {
        let zone = square_zone();
        assert!(zone.contains(&GeoPoint { lat: 52.5, lng: 13.5 }));
    }

    #[test]
    fn point_outside_square_is_not_contained() {
        let zone = square_zone();
        assert!(!zone.contains(&GeoPoint { lat: 51.9, lng: 13.5 }));
        assert!(!zone.contains(&GeoPoint { lat: 52.5, lng: 14.1 }));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let zone = Zone {
            id: Uuid::from_u128(2),
            name: "line".to_string(),
            polygon: vec![
                GeoPoint { lat: 52.0, lng: 13.0 },
                GeoPoint { lat: 53.0, lng: 13.0 },
            ],
        };
        assert!(!zone.contains(&GeoPoint { lat: 52.5, lng: 13.0 }));
    }
}
