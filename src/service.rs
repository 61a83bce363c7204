// src/service.rs
//! Free the serial device from gpsd and reset its line settings
//!
//! Every step runs through `sudo -n`, so a missing sudoers entry fails fast
//! instead of prompting.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// One privileged command in the restart sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartStep {
    pub args: Vec<OsString>,
    /// Whether failure of this step fails the whole restart.
    pub required: bool,
}

impl RestartStep {
    fn new(args: &[&str], required: bool) -> Self {
        Self {
            args: args.iter().map(OsString::from).collect(),
            required,
        }
    }
}

/// Steps for `device`. The line reset is only attempted when the device exists.
pub fn restart_steps(device: &Path, baud_rate: u32, device_present: bool) -> Vec<RestartStep> {
    let mut steps = vec![
        RestartStep::new(&["systemctl", "stop", "gpsd"], true),
        // Nothing to kill is the normal case once systemd stopped it
        RestartStep::new(&["killall", "gpsd"], false),
    ];

    if device_present {
        let mut stty = RestartStep::new(&["stty", "-F"], true);
        stty.args.push(device.as_os_str().to_owned());
        stty.args.push(OsString::from("raw"));
        stty.args.push(OsString::from(baud_rate.to_string()));
        steps.push(stty);
    }
    steps
}

/// Stop gpsd and reset the serial line. Returns whether every required step succeeded.
pub async fn restart_service(device: &Path, baud_rate: u32) -> bool {
    let present = tokio::fs::try_exists(device).await.unwrap_or(false);
    if !present {
        warn!(device = %device.display(), "device missing, skipping line reset");
    }

    let mut ok = true;
    for step in restart_steps(device, baud_rate, present) {
        let succeeded = run_step(&step).await;
        if step.required && !succeeded {
            ok = false;
        }
    }
    ok
}

async fn run_step(step: &RestartStep) -> bool {
    let command = step
        .args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new("sudo")
        .arg("-n")
        .args(&step.args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(STEP_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            info!(%command, "service step succeeded");
            true
        }
        Ok(Ok(out)) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if step.required {
                warn!(%command, status = %out.status, stderr = %stderr.trim(), "service step failed");
            } else {
                info!(%command, status = %out.status, "optional service step had nothing to do");
            }
            false
        }
        Ok(Err(e)) => {
            warn!(%command, error = %e, "could not run service step");
            false
        }
        Err(_) => {
            warn!(%command, "service step timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(step: &RestartStep) -> Vec<String> {
        step.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_steps_with_device() {
        let steps = restart_steps(Path::new("/dev/ttyAMA0"), 9600, true);
        assert_eq!(steps.len(), 3);
        assert_eq!(args(&steps[0]), ["systemctl", "stop", "gpsd"]);
        assert!(steps[0].required);
        assert_eq!(args(&steps[1]), ["killall", "gpsd"]);
        assert!(!steps[1].required);
        assert_eq!(args(&steps[2]), ["stty", "-F", "/dev/ttyAMA0", "raw", "9600"]);
    }

    #[test]
    fn test_steps_without_device() {
        let steps = restart_steps(Path::new("/dev/ttyUSB9"), 4800, false);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| !args(s).contains(&"stty".to_string())));
    }
}
