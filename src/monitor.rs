// src/monitor.rs v3
//! Main GPS monitor coordination
//!
//! The command surface the UI and CLI talk to. Commands take `&mut self`, so
//! two of them can never overlap on the same monitor.

use crate::{
    acquisition::{AcquisitionHandle, AcquisitionLoop, LoopSettings, LoopState, StatsSnapshot},
    config::GpsConfig,
    diagnostics::{DiagnosticReport, Diagnostics},
    error::ConfigError,
    gps::{SerialSource, SimulatedSource},
    map::{MapFeed, MapPayload},
    service,
    state::SharedPositionState,
    status::{self, StatusReport},
};
use chrono::Utc;
use tracing::info;

/// Main GPS monitor that owns the acquisition session
pub struct GpsMonitor {
    config: GpsConfig,
    state: SharedPositionState,
    acquisition: Option<AcquisitionHandle>,
}

impl GpsMonitor {
    /// Create an idle monitor. `config` is used by diagnostics until `start` replaces it.
    pub fn new(config: GpsConfig) -> Self {
        Self::new_with_shared(config, SharedPositionState::new())
    }

    /// Create an idle monitor that publishes into an existing state cell
    pub fn new_with_shared(config: GpsConfig, state: SharedPositionState) -> Self {
        Self {
            config,
            state,
            acquisition: None,
        }
    }

    /// Validate `config` and start acquiring.
    ///
    /// A running session is stopped first. On a config error nothing is
    /// started and any running session is left alone.
    pub async fn start(&mut self, config: GpsConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.stop().await;

        let settings = LoopSettings::from(&config);
        let handle = if config.simulate {
            info!(interval_ms = config.simulation_interval_ms, "starting simulated source");
            AcquisitionLoop::spawn(
                SimulatedSource::new(config.simulation_interval()),
                self.state.clone(),
                settings,
            )
        } else {
            info!(device = %config.device.display(), baud = config.baud_rate, "starting serial source");
            AcquisitionLoop::spawn(
                SerialSource::new(&config.device, config.baud_rate),
                self.state.clone(),
                settings,
            )
        };

        self.config = config;
        self.acquisition = Some(handle);
        Ok(())
    }

    /// Stop acquiring and wait until the device is released. A no-op when idle.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.acquisition.take() {
            handle.stop().await;
        }
    }

    /// Check if an acquisition session is active
    pub fn is_running(&self) -> bool {
        self.acquisition.is_some()
    }

    pub fn loop_state(&self) -> LoopState {
        self.acquisition
            .as_ref()
            .map_or(LoopState::Idle, AcquisitionHandle::loop_state)
    }

    /// Counters of the current session
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.acquisition.as_ref().map(AcquisitionHandle::stats)
    }

    /// Probe the host for the configured device. Blocks briefly on process and file checks.
    pub fn run_diagnostics(&self) -> DiagnosticReport {
        Diagnostics::new(&self.config.device).run()
    }

    /// Stop gpsd and reset the configured serial line
    pub async fn restart_service(&self) -> bool {
        service::restart_service(&self.config.device, self.config.baud_rate).await
    }

    pub fn poll_status(&self) -> StatusReport {
        status::classify(&self.state.read(), Utc::now(), &self.config.status)
    }

    pub fn map_payload(&self) -> MapPayload {
        self.map_feed().current_payload()
    }

    pub fn map_feed(&self) -> MapFeed {
        MapFeed::new(self.state.clone())
    }

    pub fn state(&self) -> SharedPositionState {
        self.state.clone()
    }

    pub fn config(&self) -> &GpsConfig {
        &self.config
    }
}

impl Default for GpsMonitor {
    fn default() -> Self {
        Self::new(GpsConfig::default())
    }
}
