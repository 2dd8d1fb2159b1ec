//! Data carried through the proximity coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// Monotonic query sequence number.
///
/// Only the coordinator advances it. A response is accepted only if the epoch
/// captured when its query was issued is still the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestEpoch(u64);

impl RequestEpoch {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The epoch following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RequestEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A heritage site returned by the nearby endpoint.
///
/// Only the fields the core needs are typed; everything else the endpoint
/// sends is kept in `details` and forwarded to the map surface untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: u64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl PointOfInterest {
    pub fn new(id: u64, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            name: name.into(),
            latitude,
            longitude,
            details: serde_json::Map::new(),
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// Parameters of one nearby query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub position: Position,
    pub radius_m: u32,
}

/// An accepted result set. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbySnapshot {
    pub epoch: RequestEpoch,
    pub position: Position,
    pub radius_m: u32,
    pub points: Vec<PointOfInterest>,
    /// When the response was accepted.
    pub received_at: DateTime<Utc>,
}

impl NearbySnapshot {
    /// Look up points by id, preserving the order of `ids` and skipping
    /// unknown ones.
    pub fn find_all(&self, ids: &[u64]) -> Vec<PointOfInterest> {
        ids.iter()
            .filter_map(|id| self.points.iter().find(|p| p.id == *id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_is_monotonic() {
        let e = RequestEpoch::default();
        assert!(e.next() > e);
        assert_eq!(e.next().next().value(), 2);
    }

    #[test]
    fn test_poi_keeps_descriptive_fields() {
        let json = r#"{"id":7,"name":"Gyeongbokgung","latitude":37.5796,"longitude":126.977,
                       "category":"palace","imageUrl":"https://example.org/g.jpg"}"#;
        let poi: PointOfInterest = serde_json::from_str(json).unwrap();
        assert_eq!(poi.id, 7);
        assert_eq!(poi.details["category"], "palace");

        let back = serde_json::to_value(&poi).unwrap();
        assert_eq!(back["imageUrl"], "https://example.org/g.jpg");
        assert_eq!(back["name"], "Gyeongbokgung");
    }

    #[test]
    fn test_find_all_preserves_requested_order() {
        let snapshot = NearbySnapshot {
            epoch: RequestEpoch::new(1),
            position: Position::new(37.5, 127.0),
            radius_m: 500,
            points: vec![
                PointOfInterest::new(1, "A", 37.5, 127.0),
                PointOfInterest::new(2, "B", 37.5, 127.0),
            ],
            received_at: Utc::now(),
        };
        let found = snapshot.find_all(&[2, 9, 1]);
        let ids: Vec<u64> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
