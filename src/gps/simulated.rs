// src/gps/simulated.rs
//! Synthetic receiver for running without hardware
//!
//! Emits the same RMC sentences a real receiver would, walking a small
//! circle around a fixed origin at a steady cadence.

use super::nmea;
use super::source::{LineReader, PositionSource};
use crate::error::{ConnectionError, ReadError};
use chrono::Utc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Montreal, the default simulation origin
pub const DEFAULT_ORIGIN: (f64, f64) = (45.5017, -73.5673);

/// Radius of the simulated circle in degrees
const RADIUS_DEG: f64 = 0.0005;

/// Seconds per radian of travel around the circle
const PERIOD_SCALE: f64 = 10.0;

const SPEED_KNOTS: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SimulatedSource {
    interval: Duration,
    origin: (f64, f64),
}

impl SimulatedSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            origin: DEFAULT_ORIGIN,
        }
    }

    pub fn with_origin(mut self, latitude: f64, longitude: f64) -> Self {
        self.origin = (latitude, longitude);
        self
    }
}

impl PositionSource for SimulatedSource {
    type Reader = SimulatedReader;

    fn describe(&self) -> String {
        format!("simulator around {:.4},{:.4}", self.origin.0, self.origin.1)
    }

    async fn open(&mut self) -> Result<SimulatedReader, ConnectionError> {
        Ok(SimulatedReader {
            interval: self.interval,
            origin: self.origin,
            started: Instant::now(),
        })
    }
}

pub struct SimulatedReader {
    interval: Duration,
    origin: (f64, f64),
    started: Instant,
}

impl SimulatedReader {
    /// The sentence for `elapsed` seconds into the walk.
    fn sentence_at(&self, elapsed: f64) -> String {
        let angle = elapsed / PERIOD_SCALE;
        let latitude = self.origin.0 + RADIUS_DEG * angle.sin();
        let longitude = self.origin.1 + RADIUS_DEG * angle.cos();
        // Direction of travel is the tangent: north component cos, east component -sin.
        let course = (-angle.sin()).atan2(angle.cos()).to_degrees().rem_euclid(360.0);
        nmea::format_rmc(latitude, longitude, SPEED_KNOTS, course, Utc::now())
    }
}

impl LineReader for SimulatedReader {
    /// Always succeeds after one cadence interval; the timeout is not needed.
    async fn read_line(&mut self, _timeout: Duration) -> Result<String, ReadError> {
        sleep(self.interval).await;
        Ok(self.sentence_at(self.started.elapsed().as_secs_f64()))
    }

    async fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_lines_parse_as_valid_fixes() {
        let mut source = SimulatedSource::new(Duration::from_secs(1));
        let mut reader = source.open().await.unwrap();

        for _ in 0..5 {
            let line = reader.read_line(Duration::from_secs(2)).await.unwrap();
            let fix = nmea::parse_sentence(&line, Utc::now()).unwrap();
            assert!(fix.valid);
            assert!((fix.latitude - DEFAULT_ORIGIN.0).abs() <= RADIUS_DEG + 1e-4);
            assert!((fix.longitude - DEFAULT_ORIGIN.1).abs() <= RADIUS_DEG + 1e-4);
            assert!((fix.speed_kmh - SPEED_KNOTS * nmea::KNOTS_TO_KMH).abs() < 1e-9);
        }
        reader.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence() {
        let mut source = SimulatedSource::new(Duration::from_millis(500));
        let mut reader = source.open().await.unwrap();

        let before = Instant::now();
        reader.read_line(Duration::from_secs(2)).await.unwrap();
        assert_eq!(before.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_path_moves() {
        let mut source = SimulatedSource::new(Duration::from_secs(1)).with_origin(10.0, 20.0);
        let reader = source.open().await.unwrap();

        let a = nmea::parse_sentence(&reader.sentence_at(0.0), Utc::now()).unwrap();
        let b = nmea::parse_sentence(&reader.sentence_at(15.0), Utc::now()).unwrap();
        assert!((a.latitude - 10.0).abs() < 1e-4);
        assert!((a.longitude - 20.0005).abs() < 1e-4);
        assert_ne!((a.latitude, a.longitude), (b.latitude, b.longitude));
    }
}
