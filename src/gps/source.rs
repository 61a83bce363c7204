// src/gps/source.rs
//! The capability shared by the real receiver and the simulator

use crate::error::{ConnectionError, ReadError};
use std::future::Future;
use std::time::Duration;

/// Something that can be opened to produce a stream of NMEA lines.
///
/// The acquisition loop is generic over this, so the serial/simulated choice
/// is made once when the loop is built.
pub trait PositionSource: Send + 'static {
    type Reader: LineReader;

    /// Human-readable description for logs, e.g. `/dev/ttyAMA0 @ 9600`.
    fn describe(&self) -> String;

    fn open(&mut self) -> impl Future<Output = Result<Self::Reader, ConnectionError>> + Send;
}

/// An open handle. Owned exclusively by the acquisition loop while reading.
pub trait LineReader: Send + 'static {
    /// Wait at most `timeout` for the next complete line.
    fn read_line(&mut self, timeout: Duration) -> impl Future<Output = Result<String, ReadError>> + Send;

    /// Release the underlying device.
    fn close(self) -> impl Future<Output = ()> + Send;
}
