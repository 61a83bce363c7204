// src/lib.rs
//! GPS Mapper Library
//!
//! Reads NMEA position sentences from a serial receiver or a built-in
//! simulator, keeps the latest fix in shared state, and exposes it to a
//! terminal status view and a web map feed.

pub mod acquisition;
pub mod config;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod gps;
pub mod map;
pub mod monitor;
pub mod service;
pub mod state;
pub mod status;

// Re-export main types for convenience
pub use acquisition::{AcquisitionHandle, AcquisitionLoop, LoopState};
pub use config::GpsConfig;
pub use error::{ConfigError, GpsError, Result};
pub use gps::{ConnectionState, Fix, SharedSnapshot};
pub use map::{MapFeed, MapPayload};
pub use monitor::GpsMonitor;
pub use state::SharedPositionState;
pub use status::{ColorTier, StatusReport};
