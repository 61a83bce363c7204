// src/diagnostics.rs
//! On-demand checks of the things a serial GPS needs from the host
//!
//! Every check runs regardless of the others. A probe that fails, or that
//! can't even run, becomes a `passed: false` entry; [`Diagnostics::run`]
//! itself never fails.

use crate::error::DiagnosticCheckError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const CHECK_SERIAL_LIBRARY: &str = "serial-library";
pub const CHECK_DEVICE_PRESENT: &str = "device-present";
pub const CHECK_DEVICE_PERMISSIONS: &str = "device-permissions";
pub const CHECK_HOST_PLATFORM: &str = "host-platform";
pub const CHECK_UART_ENABLED: &str = "uart-enabled";
pub const CHECK_GPS_DAEMON: &str = "gps-daemon";

const DEFAULT_BOOT_CONFIGS: [&str; 2] = ["/boot/firmware/config.txt", "/boot/config.txt"];
const DEFAULT_MODEL_PATH: &str = "/proc/device-tree/model";
const CONFLICTING_DAEMON: &str = "gpsd";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticCheck {
    pub check: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub checks: Vec<DiagnosticCheck>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosticReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DiagnosticCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn get(&self, check: &str) -> Option<&DiagnosticCheck> {
        self.checks.iter().find(|c| c.check == check)
    }
}

type ProbeResult<T> = Result<T, DiagnosticCheckError>;

/// Read-only access to the host. Swapped out in tests to force failures.
pub trait SystemProbe {
    fn serial_ports(&self) -> ProbeResult<Vec<String>>;
    fn path_exists(&self, path: &Path) -> ProbeResult<bool>;
    fn read_write_access(&self, path: &Path) -> ProbeResult<bool>;
    fn read_to_string(&self, path: &Path) -> ProbeResult<String>;
    fn process_running(&self, name: &str) -> ProbeResult<bool>;
}

/// The real host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn serial_ports(&self) -> ProbeResult<Vec<String>> {
        tokio_serial::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .map_err(|e| DiagnosticCheckError::ProbeUnavailable(e.to_string()))
    }

    fn path_exists(&self, path: &Path) -> ProbeResult<bool> {
        path.try_exists()
            .map_err(|e| DiagnosticCheckError::ProbeUnavailable(format!("{}: {}", path.display(), e)))
    }

    #[cfg(unix)]
    fn read_write_access(&self, path: &Path) -> ProbeResult<bool> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| DiagnosticCheckError::Failed(format!("{} contains a NUL byte", path.display())))?;
        // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
        let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
        Ok(rc == 0)
    }

    #[cfg(not(unix))]
    fn read_write_access(&self, _path: &Path) -> ProbeResult<bool> {
        Err(DiagnosticCheckError::ProbeUnavailable(
            "access checks are only supported on unix hosts".to_string(),
        ))
    }

    fn read_to_string(&self, path: &Path) -> ProbeResult<String> {
        std::fs::read_to_string(path)
            .map_err(|e| DiagnosticCheckError::Failed(format!("cannot read {}: {}", path.display(), e)))
    }

    fn process_running(&self, name: &str) -> ProbeResult<bool> {
        let output = Command::new("pgrep")
            .arg("-x")
            .arg(name)
            .output()
            .map_err(|e| DiagnosticCheckError::ProbeUnavailable(format!("pgrep: {}", e)))?;

        // pgrep: 0 = match, 1 = no match, anything else = error
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(DiagnosticCheckError::ProbeUnavailable(format!(
                "pgrep exited with {:?}",
                code
            ))),
        }
    }
}

pub struct Diagnostics<P = HostProbe> {
    device: PathBuf,
    probe: P,
    boot_configs: Vec<PathBuf>,
    model_path: PathBuf,
}

impl Diagnostics<HostProbe> {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self::with_probe(device, HostProbe)
    }
}

impl<P: SystemProbe> Diagnostics<P> {
    pub fn with_probe(device: impl Into<PathBuf>, probe: P) -> Self {
        Self {
            device: device.into(),
            probe,
            boot_configs: DEFAULT_BOOT_CONFIGS.iter().map(PathBuf::from).collect(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }

    /// Candidate Raspberry Pi boot config files, first existing one wins.
    pub fn with_boot_configs(mut self, paths: Vec<PathBuf>) -> Self {
        self.boot_configs = paths;
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Run every check and collect the results in a fixed order.
    pub fn run(&self) -> DiagnosticReport {
        let checks = [
            (CHECK_SERIAL_LIBRARY, self.check_serial_library()),
            (CHECK_DEVICE_PRESENT, self.check_device_present()),
            (CHECK_DEVICE_PERMISSIONS, self.check_device_permissions()),
            (CHECK_HOST_PLATFORM, self.check_host_platform()),
            (CHECK_UART_ENABLED, self.check_uart_enabled()),
            (CHECK_GPS_DAEMON, self.check_gps_daemon()),
        ]
        .into_iter()
        .map(|(name, result)| {
            let (passed, detail) = match result {
                Ok(detail) => (true, detail),
                Err(e) => (false, e.to_string()),
            };
            DiagnosticCheck {
                check: name.to_string(),
                passed,
                detail,
            }
        })
        .collect();

        DiagnosticReport {
            checks,
            generated_at: Utc::now(),
        }
    }

    fn check_serial_library(&self) -> ProbeResult<String> {
        let ports = self.probe.serial_ports()?;
        Ok(if ports.is_empty() {
            "serial support available, no ports detected".to_string()
        } else {
            format!("serial support available, ports: {}", ports.join(", "))
        })
    }

    fn check_device_present(&self) -> ProbeResult<String> {
        if self.probe.path_exists(&self.device)? {
            Ok(format!("{} exists", self.device.display()))
        } else {
            Err(DiagnosticCheckError::Failed(format!("{} not found", self.device.display())))
        }
    }

    fn check_device_permissions(&self) -> ProbeResult<String> {
        if !self.probe.path_exists(&self.device)? {
            return Err(DiagnosticCheckError::Failed(format!(
                "cannot check permissions, {} not present",
                self.device.display()
            )));
        }
        if self.probe.read_write_access(&self.device)? {
            Ok("read/write access OK".to_string())
        } else {
            Err(DiagnosticCheckError::Failed(format!(
                "no read/write access to {} (is the user in the dialout group?)",
                self.device.display()
            )))
        }
    }

    fn boot_config(&self) -> ProbeResult<Option<&PathBuf>> {
        for path in &self.boot_configs {
            if self.probe.path_exists(path)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    fn check_host_platform(&self) -> ProbeResult<String> {
        let model = self.probe.read_to_string(&self.model_path).ok();
        let model = model.as_deref().map(|m| m.trim_end_matches('\0').trim());

        if let Some(model) = model.filter(|m| m.contains("Raspberry Pi")) {
            return Ok(format!("{} detected", model));
        }
        if let Some(path) = self.boot_config()? {
            return Ok(format!("Raspberry Pi boot config found at {}", path.display()));
        }
        Err(DiagnosticCheckError::Failed(format!(
            "Raspberry Pi not detected ({}, {})",
            std::env::consts::OS,
            model.unwrap_or("unknown model")
        )))
    }

    fn check_uart_enabled(&self) -> ProbeResult<String> {
        let path = self.boot_config()?.ok_or_else(|| {
            DiagnosticCheckError::Failed("no boot config found, cannot confirm UART is enabled".to_string())
        })?;

        let contents = self.probe.read_to_string(path)?;
        let enabled = contents
            .lines()
            .map(str::trim)
            .any(|line| !line.starts_with('#') && line.replace(' ', "") == "enable_uart=1");

        if enabled {
            Ok(format!("enable_uart=1 set in {}", path.display()))
        } else {
            Err(DiagnosticCheckError::Failed(format!(
                "UART not enabled, add 'enable_uart=1' to {}",
                path.display()
            )))
        }
    }

    fn check_gps_daemon(&self) -> ProbeResult<String> {
        if self.probe.process_running(CONFLICTING_DAEMON)? {
            Err(DiagnosticCheckError::Failed(format!(
                "{} is running and may hold the serial port",
                CONFLICTING_DAEMON
            )))
        } else {
            Ok(format!("{} not running", CONFLICTING_DAEMON))
        }
    }
}
