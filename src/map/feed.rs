// src/map/feed.rs
//! Payload served to the web map

use crate::gps::data::SharedSnapshot;
use crate::state::SharedPositionState;
use crate::status;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the map polls for. Coordinates and speed are `null` without a valid
/// fix; the client decides how to draw stale or missing data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPayload {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub valid: bool,
    pub age_seconds: f64,
}

impl MapPayload {
    pub fn from_snapshot(snapshot: &SharedSnapshot, now: DateTime<Utc>) -> Self {
        let position = snapshot.fix.position();
        Self {
            lat: position.map(|(lat, _)| lat),
            lon: position.map(|(_, lon)| lon),
            speed_kmh: snapshot.fix.speed(),
            valid: snapshot.fix.valid,
            age_seconds: status::age_seconds(snapshot, now),
        }
    }
}

/// Read side of the shared state for the web layer.
#[derive(Debug, Clone)]
pub struct MapFeed {
    state: SharedPositionState,
}

impl MapFeed {
    pub fn new(state: SharedPositionState) -> Self {
        Self { state }
    }

    /// Latest snapshot as a map payload, however old it is.
    pub fn current_payload(&self) -> MapPayload {
        MapPayload::from_snapshot(&self.state.read(), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::{ConnectionState, Fix};
    use chrono::Duration;

    #[test]
    fn test_valid_fix_payload() {
        let at = Utc::now();
        let fix = Fix {
            valid: true,
            latitude: 45.5017,
            longitude: -73.5673,
            speed_kmh: 0.926,
            timestamp: at,
            receiver_time: None,
        };
        let payload = MapPayload::from_snapshot(&SharedSnapshot::with_fix(fix), at + Duration::seconds(3));

        assert_eq!(payload.lat, Some(45.5017));
        assert_eq!(payload.lon, Some(-73.5673));
        assert_eq!(payload.speed_kmh, Some(0.926));
        assert!(payload.valid);
        assert_eq!(payload.age_seconds, 3.0);
    }

    #[test]
    fn test_invalid_fix_has_null_position() {
        let at = Utc::now();
        let mut fix = Fix::invalid(at);
        fix.latitude = 45.0;
        let snapshot = SharedSnapshot::with_fix(fix);

        let json = serde_json::to_value(MapPayload::from_snapshot(&snapshot, at)).unwrap();
        assert!(json["lat"].is_null());
        assert!(json["lon"].is_null());
        assert!(json["speed_kmh"].is_null());
        assert_eq!(json["valid"], false);
    }

    #[test]
    fn test_feed_reads_shared_state() {
        let state = SharedPositionState::new();
        let feed = MapFeed::new(state.clone());
        assert!(!feed.current_payload().valid);

        let mut fix = Fix::invalid(Utc::now());
        fix.valid = true;
        state.write(SharedSnapshot::with_fix(fix));
        assert!(feed.current_payload().valid);

        // Still served while the link is down
        state.update_connection(ConnectionState::Disconnected);
        assert!(feed.current_payload().valid);
    }
}
