// src/gps/mod.rs
//! GPS data handling and parsing

pub mod data;
pub mod nmea;
pub mod raw;
pub mod serial;
pub mod simulated;
pub mod source;

pub use data::{ConnectionState, Fix, SharedSnapshot};
pub use serial::SerialSource;
pub use simulated::SimulatedSource;
pub use source::{LineReader, PositionSource};
