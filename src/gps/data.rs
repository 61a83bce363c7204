// src/gps/data.rs
//! Position fix, connection state and the snapshot shared between tasks

use crate::error::{ConnectionError, ReadError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One position sample.
///
/// When `valid` is false the coordinates and speed are leftovers from the
/// sentence and must not be shown as a current position; use
/// [`Fix::position`] and [`Fix::speed`], which hide them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    /// When the sentence was received.
    pub timestamp: DateTime<Utc>,
    /// UTC time reported by the receiver itself, if the sentence carried one.
    pub receiver_time: Option<DateTime<Utc>>,
}

impl Fix {
    /// A fix that carries no position, e.g. before anything has been read.
    pub fn invalid(timestamp: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            speed_kmh: 0.0,
            timestamp,
            receiver_time: None,
        }
    }

    /// Latitude/longitude pair, only for a valid fix.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.valid.then_some((self.latitude, self.longitude))
    }

    /// Speed over ground in km/h, only for a valid fix.
    pub fn speed(&self) -> Option<f64> {
        self.valid.then_some(self.speed_kmh)
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: Option<f64>) -> String {
        match coord {
            Some(val) => format!("{:>12.6}°", val),
            None => "No fix".to_string(),
        }
    }

    /// Format value with unit for display
    pub fn format_value<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
        match value {
            Some(val) => format!("{:>12} {}", val, unit),
            None => "Unknown".to_string(),
        }
    }
}

/// Why the connection is in the error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    DeviceNotFound,
    PermissionDenied,
    DeviceBusy,
    OpenFailed,
    Timeout,
    Closed,
    Io,
    TooManyParseErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionFault {
    pub kind: FaultKind,
    pub message: String,
}

impl From<&ConnectionError> for ConnectionFault {
    fn from(error: &ConnectionError) -> Self {
        let kind = match error {
            ConnectionError::DeviceNotFound(_) => FaultKind::DeviceNotFound,
            ConnectionError::PermissionDenied(_) => FaultKind::PermissionDenied,
            ConnectionError::DeviceBusy(_) => FaultKind::DeviceBusy,
            ConnectionError::Other { .. } => FaultKind::OpenFailed,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl From<&ReadError> for ConnectionFault {
    fn from(error: &ReadError) -> Self {
        let kind = match error {
            ReadError::Timeout(_) => FaultKind::Timeout,
            ReadError::Closed => FaultKind::Closed,
            ReadError::Io(_) => FaultKind::Io,
            ReadError::TooManyParseErrors(_) => FaultKind::TooManyParseErrors,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Link state as seen by consumers. Only the acquisition loop changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(ConnectionFault),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            ConnectionState::Error(fault) => Some(fault.kind),
            _ => None,
        }
    }

    /// Short label for display
    pub fn label(&self) -> String {
        match self {
            ConnectionState::Disconnected => "Disconnected".to_string(),
            ConnectionState::Connecting => "Connecting".to_string(),
            ConnectionState::Connected => "Connected".to_string(),
            ConnectionState::Error(fault) => format!("Error: {}", fault.message),
        }
    }
}

/// The record every consumer reads. Always replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedSnapshot {
    pub fix: Fix,
    pub connection: ConnectionState,
    pub last_updated: DateTime<Utc>,
}

impl SharedSnapshot {
    /// Initial snapshot: disconnected, no fix.
    pub fn disconnected(at: DateTime<Utc>) -> Self {
        Self {
            fix: Fix::invalid(at),
            connection: ConnectionState::Disconnected,
            last_updated: at,
        }
    }

    /// Snapshot for a freshly parsed fix; the fix time becomes the update time.
    pub fn with_fix(fix: Fix) -> Self {
        let last_updated = fix.timestamp;
        Self {
            fix,
            connection: ConnectionState::Connected,
            last_updated,
        }
    }

    /// Same fix and update time, different connection state.
    pub fn with_connection(&self, connection: ConnectionState) -> Self {
        Self {
            fix: self.fix.clone(),
            connection,
            last_updated: self.last_updated,
        }
    }
}
