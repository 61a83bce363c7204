// src/status.rs
//! Derived, operator-facing status: colour tier and age of data

use crate::config::StatusThresholds;
use crate::gps::data::{ConnectionState, Fix, SharedSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTier {
    Fresh,
    Stale,
    Lost,
}

impl ColorTier {
    pub fn label(&self) -> &'static str {
        match self {
            ColorTier::Fresh => "FRESH",
            ColorTier::Stale => "STALE",
            ColorTier::Lost => "LOST",
        }
    }
}

/// What `poll_status()` hands to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub connection: ConnectionState,
    pub fix: Fix,
    pub age_seconds: f64,
    pub tier: ColorTier,
}

/// Seconds since the snapshot was last refreshed, never negative.
pub fn age_seconds(snapshot: &SharedSnapshot, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(snapshot.last_updated);
    (age.num_milliseconds() as f64 / 1000.0).max(0.0)
}

/// Tier for a given age, connection and fix validity.
///
/// For fixed connection and validity the result only ever moves toward
/// `Lost` as age grows.
pub fn tier(age_seconds: f64, connection: &ConnectionState, fix_valid: bool, thresholds: &StatusThresholds) -> ColorTier {
    if !connection.is_connected() || age_seconds > thresholds.stale_secs {
        ColorTier::Lost
    } else if fix_valid && age_seconds <= thresholds.fresh_secs {
        ColorTier::Fresh
    } else {
        ColorTier::Stale
    }
}

/// Build the full status report for a snapshot as seen at `now`.
pub fn classify(snapshot: &SharedSnapshot, now: DateTime<Utc>, thresholds: &StatusThresholds) -> StatusReport {
    let age = age_seconds(snapshot, now);
    StatusReport {
        tier: tier(age, &snapshot.connection, snapshot.fix.valid, thresholds),
        connection: snapshot.connection.clone(),
        fix: snapshot.fix.clone(),
        age_seconds: age,
    }
}
