// src/error.rs
//! Error types for the GPS acquisition core
//!
//! Only [`ConfigError`] ever reaches a command caller. Connection, read and
//! parse errors are absorbed by the acquisition loop and show up as a
//! [`ConnectionState`](crate::gps::data::ConnectionState) change instead.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpsError>;

/// Crate-level error for the I/O surfaces around the core (config file, web server).
#[derive(Debug, Error)]
pub enum GpsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Error: {0}")]
    Other(String),
}

/// Bad startup parameters. Nothing is started when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("device path is empty")]
    EmptyDevice,

    #[error("baud rate must be non-zero")]
    InvalidBaudRate,

    #[error("web port {0} is out of range")]
    InvalidPort(u16),

    #[error("read timeout must be non-zero")]
    InvalidReadTimeout,

    #[error("simulation interval must be non-zero")]
    InvalidSimulationInterval,

    #[error("status thresholds must satisfy 0 <= fresh ({fresh}) <= stale ({stale})")]
    InvalidThresholds { fresh: f64, stale: f64 },

    #[error("backoff must have a non-zero initial delay, max >= initial and multiplier >= 1")]
    InvalidBackoff,
}

/// Failure to open a position source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("device {0} not found")]
    DeviceNotFound(PathBuf),

    #[error("permission denied opening {0}")]
    PermissionDenied(PathBuf),

    #[error("device {0} is busy")]
    DeviceBusy(PathBuf),

    #[error("failed to open {device}: {message}")]
    Other { device: PathBuf, message: String },
}

/// Failure while reading a line from an open source.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no line received within {0:?}")]
    Timeout(Duration),

    #[error("source closed the stream")]
    Closed,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("{0} consecutive unparseable lines")]
    TooManyParseErrors(u32),
}

/// A single line that could not be turned into a fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("line does not start with '$'")]
    MissingStart,

    #[error("sentence has no checksum")]
    MissingChecksum,

    #[error("checksum mismatch: expected {expected:02X}, computed {actual:02X}")]
    BadChecksum { expected: u8, actual: u8 },

    #[error("unsupported sentence type {0}")]
    Unsupported(String),

    #[error("sentence truncated: {fields} fields")]
    Truncated { fields: usize },

    #[error("invalid {field} field: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

impl ParseError {
    /// Whether this failure points at a corrupted link rather than a
    /// well-formed sentence we simply don't decode.
    pub fn counts_as_corruption(&self) -> bool {
        !matches!(self, ParseError::Unsupported(_))
    }
}

/// A diagnostic probe's own failure. Always captured into its report entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticCheckError {
    #[error("{0}")]
    Failed(String),

    #[error("probe unavailable: {0}")]
    ProbeUnavailable(String),
}
