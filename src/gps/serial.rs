// src/gps/serial.rs
//! Serial-attached receiver

use super::source::{LineReader, PositionSource};
use crate::error::{ConnectionError, ReadError, Result};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// Opens the configured device at the configured baud rate.
#[derive(Debug, Clone)]
pub struct SerialSource {
    device: PathBuf,
    baud_rate: u32,
}

impl SerialSource {
    pub fn new(device: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
        }
    }
}

impl PositionSource for SerialSource {
    type Reader = SerialReader;

    fn describe(&self) -> String {
        format!("{} @ {}", self.device.display(), self.baud_rate)
    }

    async fn open(&mut self) -> std::result::Result<SerialReader, ConnectionError> {
        if !self.device.exists() {
            return Err(ConnectionError::DeviceNotFound(self.device.clone()));
        }

        let port = tokio_serial::new(self.device.to_string_lossy(), self.baud_rate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| classify_open_error(&self.device, &e))?;

        debug!(device = %self.device.display(), baud = self.baud_rate, "serial port opened");
        Ok(SerialReader {
            reader: BufReader::new(port),
            pending: Vec::new(),
        })
    }
}

/// Map a serial open failure onto the kinds callers give targeted advice for.
pub fn classify_open_error(device: &Path, error: &tokio_serial::Error) -> ConnectionError {
    use tokio_serial::ErrorKind;

    let description = error.description.to_lowercase();
    match error.kind {
        ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
            ConnectionError::DeviceNotFound(device.to_path_buf())
        }
        ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            ConnectionError::PermissionDenied(device.to_path_buf())
        }
        _ if description.contains("permission denied") || description.contains("not permitted") => {
            ConnectionError::PermissionDenied(device.to_path_buf())
        }
        ErrorKind::Io(io::ErrorKind::AddrInUse) => ConnectionError::DeviceBusy(device.to_path_buf()),
        _ if description.contains("busy") => ConnectionError::DeviceBusy(device.to_path_buf()),
        _ => ConnectionError::Other {
            device: device.to_path_buf(),
            message: error.description.clone(),
        },
    }
}

/// Open serial port, read line by line.
pub struct SerialReader {
    reader: BufReader<SerialStream>,
    // Partial line left by a timed-out read; completed by the next read on this handle.
    pending: Vec<u8>,
}

impl LineReader for SerialReader {
    async fn read_line(&mut self, timeout: Duration) -> std::result::Result<String, ReadError> {
        let read = self.reader.read_until(b'\n', &mut self.pending);
        match tokio::time::timeout(timeout, read).await {
            Err(_) => Err(ReadError::Timeout(timeout)),
            Ok(Ok(0)) => Err(ReadError::Closed),
            Ok(Ok(_)) => {
                // Receivers sometimes emit noise right after power-up; keep what decodes.
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                Ok(line)
            }
            Ok(Err(e)) => Err(ReadError::Io(e)),
        }
    }

    async fn close(self) {
        debug!("serial port closed");
        drop(self.reader);
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| format!("{} - {:?}", port.port_name, port.port_type))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::ErrorKind;

    fn device() -> PathBuf {
        PathBuf::from("/dev/ttyAMA0")
    }

    #[test]
    fn test_classify_not_found() {
        let err = tokio_serial::Error::new(ErrorKind::NoDevice, "no such device");
        assert_eq!(classify_open_error(&device(), &err), ConnectionError::DeviceNotFound(device()));

        let err = tokio_serial::Error::new(ErrorKind::Io(io::ErrorKind::NotFound), "No such file or directory");
        assert_eq!(classify_open_error(&device(), &err), ConnectionError::DeviceNotFound(device()));
    }

    #[test]
    fn test_classify_permission() {
        let err = tokio_serial::Error::new(ErrorKind::Io(io::ErrorKind::PermissionDenied), "Permission denied");
        assert_eq!(classify_open_error(&device(), &err), ConnectionError::PermissionDenied(device()));

        let err = tokio_serial::Error::new(ErrorKind::Unknown, "Operation not permitted");
        assert_eq!(classify_open_error(&device(), &err), ConnectionError::PermissionDenied(device()));
    }

    #[test]
    fn test_classify_busy() {
        let err = tokio_serial::Error::new(ErrorKind::Unknown, "Device or resource busy");
        assert_eq!(classify_open_error(&device(), &err), ConnectionError::DeviceBusy(device()));
    }

    #[test]
    fn test_classify_other() {
        let err = tokio_serial::Error::new(ErrorKind::InvalidInput, "bad baud rate");
        assert!(matches!(
            classify_open_error(&device(), &err),
            ConnectionError::Other { message, .. } if message == "bad baud rate"
        ));
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let mut source = SerialSource::new("/nonexistent/ttyGPS", 9600);
        let err = source.open().await.err().unwrap();
        assert_eq!(err, ConnectionError::DeviceNotFound(PathBuf::from("/nonexistent/ttyGPS")));
    }
}
