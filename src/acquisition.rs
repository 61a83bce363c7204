// src/acquisition.rs
//! Background acquisition loop
//!
//! Owns the open source exclusively, turns lines into snapshots, and keeps
//! retrying with capped exponential backoff when the link fails. The only
//! way to end a session is an explicit stop; a dead receiver leaves the loop
//! cycling through `Backoff` with the error visible in the shared state.

use crate::config::{BackoffConfig, GpsConfig};
use crate::error::ReadError;
use crate::gps::data::{ConnectionFault, ConnectionState, SharedSnapshot};
use crate::gps::nmea;
use crate::gps::source::{LineReader, PositionSource};
use crate::state::SharedPositionState;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Connecting,
    Reading,
    Backoff,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Start,
    Opened,
    OpenFailed,
    FixRead,
    ReadFailed,
    BackoffElapsed,
    Stop,
}

impl LoopState {
    /// Transition table. Events that don't apply to the current state leave it unchanged.
    pub fn on(self, event: LoopEvent) -> LoopState {
        use LoopEvent::*;
        use LoopState::*;

        match (self, event) {
            (Stopped, _) => Stopped,
            (_, Stop) => Stopped,
            (Idle, Start) => Connecting,
            (Connecting, Opened) => Reading,
            (Connecting, OpenFailed) => Backoff,
            (Reading, FixRead) => Reading,
            (Reading, ReadFailed) => Backoff,
            (Backoff, BackoffElapsed) => Connecting,
            (state, _) => state,
        }
    }
}

/// Capped exponential delay between reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: Duration::from_millis(config.initial_ms),
        }
    }

    /// Delay to wait now; the following call returns a longer one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let max = Duration::from_millis(self.config.max_ms);
        let grown = delay.as_secs_f64() * self.config.multiplier;
        self.current = Duration::try_from_secs_f64(grown).map_or(max, |d| d.min(max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = Duration::from_millis(self.config.initial_ms);
    }
}

/// Loop tuning, taken from [`GpsConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub read_timeout: Duration,
    pub max_consecutive_parse_errors: u32,
    pub backoff: BackoffConfig,
}

impl From<&GpsConfig> for LoopSettings {
    fn from(config: &GpsConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            max_consecutive_parse_errors: config.max_consecutive_parse_errors,
            backoff: config.backoff,
        }
    }
}

/// Running counters, shared with whoever holds the handle.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    lines: AtomicU64,
    fixes: AtomicU64,
    skipped: AtomicU64,
    parse_errors: AtomicU64,
    open_failures: AtomicU64,
    read_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub fixes: u64,
    /// Well-formed sentences of a type we don't decode
    pub skipped: u64,
    pub parse_errors: u64,
    pub open_failures: u64,
    pub read_failures: u64,
}

impl AcquisitionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            fixes: self.fixes.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Control side of a running loop.
pub struct AcquisitionHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<LoopState>,
    stats: Arc<AcquisitionStats>,
    task: JoinHandle<()>,
}

impl AcquisitionHandle {
    pub fn loop_state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ask the loop to stop and wait until it has released the source.
    ///
    /// Takes effect at the next state boundary, so at most one read timeout
    /// or the rest of the current backoff wait.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "acquisition task ended abnormally");
        }
    }
}

pub struct AcquisitionLoop<S: PositionSource> {
    source: S,
    state: SharedPositionState,
    settings: LoopSettings,
    stats: Arc<AcquisitionStats>,
    current: LoopState,
    state_tx: watch::Sender<LoopState>,
    stop_rx: watch::Receiver<bool>,
    consecutive_parse_errors: u32,
}

impl<S: PositionSource> AcquisitionLoop<S> {
    /// Start a loop for `source` on the current tokio runtime.
    pub fn spawn(source: S, state: SharedPositionState, settings: LoopSettings) -> AcquisitionHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        let stats = Arc::new(AcquisitionStats::default());

        let acquisition = Self {
            source,
            state,
            settings,
            stats: Arc::clone(&stats),
            current: LoopState::Idle,
            state_tx,
            stop_rx,
            consecutive_parse_errors: 0,
        };
        let task = tokio::spawn(acquisition.run());

        AcquisitionHandle {
            stop_tx,
            state_rx,
            stats,
            task,
        }
    }

    async fn run(mut self) {
        let source = self.source.describe();
        info!(%source, "acquisition starting");

        let mut backoff = Backoff::new(self.settings.backoff);
        let mut reader: Option<S::Reader> = None;

        loop {
            if self.stop_requested() && self.current != LoopState::Stopped {
                if let Some(open) = reader.take() {
                    open.close().await;
                }
                self.transition(LoopEvent::Stop);
            }

            match self.current {
                LoopState::Idle => self.transition(LoopEvent::Start),
                LoopState::Connecting => {
                    self.state.update_connection(ConnectionState::Connecting);
                    match self.source.open().await {
                        Ok(open) => {
                            info!(%source, "source opened");
                            reader = Some(open);
                            backoff.reset();
                            self.consecutive_parse_errors = 0;
                            self.state.update_connection(ConnectionState::Connected);
                            self.transition(LoopEvent::Opened);
                        }
                        Err(e) => {
                            warn!(%source, error = %e, "failed to open source");
                            AcquisitionStats::bump(&self.stats.open_failures);
                            self.state.update_connection(ConnectionState::Error(ConnectionFault::from(&e)));
                            self.transition(LoopEvent::OpenFailed);
                        }
                    }
                }
                LoopState::Reading => {
                    let result = match reader.as_mut() {
                        Some(open) => self.read_step(open).await,
                        None => Err(ReadError::Closed),
                    };
                    if let Err(e) = result {
                        warn!(%source, error = %e, "read failed, backing off");
                        AcquisitionStats::bump(&self.stats.read_failures);
                        if let Some(open) = reader.take() {
                            open.close().await;
                        }
                        self.state.update_connection(ConnectionState::Error(ConnectionFault::from(&e)));
                        self.transition(LoopEvent::ReadFailed);
                    }
                }
                LoopState::Backoff => {
                    let delay = backoff.next_delay();
                    debug!(?delay, "waiting before reconnect");
                    if !self.wait_or_stop(delay).await {
                        self.transition(LoopEvent::BackoffElapsed);
                    }
                }
                LoopState::Stopped => break,
            }
        }

        self.state.update_connection(ConnectionState::Disconnected);
        let stats = self.stats.snapshot();
        info!(
            lines = stats.lines,
            fixes = stats.fixes,
            parse_errors = stats.parse_errors,
            "acquisition stopped"
        );
    }

    /// Read and apply one line.
    async fn read_step(&mut self, reader: &mut S::Reader) -> Result<(), ReadError> {
        let line = reader.read_line(self.settings.read_timeout).await?;
        AcquisitionStats::bump(&self.stats.lines);
        if line.is_empty() {
            return Ok(());
        }

        match nmea::parse_sentence(&line, Utc::now()) {
            Ok(fix) => {
                self.consecutive_parse_errors = 0;
                AcquisitionStats::bump(&self.stats.fixes);
                if !fix.valid {
                    debug!("receiver reports no fix");
                }
                self.state.write(SharedSnapshot::with_fix(fix));
                self.transition(LoopEvent::FixRead);
                Ok(())
            }
            Err(e) if !e.counts_as_corruption() => {
                AcquisitionStats::bump(&self.stats.skipped);
                Ok(())
            }
            Err(e) => {
                AcquisitionStats::bump(&self.stats.parse_errors);
                self.consecutive_parse_errors += 1;
                debug!(error = %e, %line, "unparseable line");
                if self.consecutive_parse_errors >= self.settings.max_consecutive_parse_errors {
                    Err(ReadError::TooManyParseErrors(self.consecutive_parse_errors))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn transition(&mut self, event: LoopEvent) {
        let next = self.current.on(event);
        if next != self.current {
            info!(from = ?self.current, to = ?next, "acquisition state");
        }
        self.current = next;
        self.state_tx.send_if_modified(|published| {
            let changed = *published != next;
            *published = next;
            changed
        });
    }

    /// A dropped handle counts as a stop request too.
    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }

    /// Sleep for `delay` unless stopped first. Returns whether a stop arrived.
    async fn wait_or_stop(&mut self, delay: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.stop_rx.changed() => true,
        }
    }
}
