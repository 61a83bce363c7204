// src/display/terminal.rs
//! Terminal-based status display

use crate::{
    acquisition::StatsSnapshot,
    error::Result,
    gps::Fix,
    monitor::GpsMonitor,
    status::{ColorTier, StatusReport},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;
use tracing::warn;

const REFRESH: Duration = Duration::from_secs(1);

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Redraw the monitor's status once per second until `running` clears or Ctrl+C
    ///
    /// The cursor and line wrapping come back however the loop ends, including
    /// when this future is dropped.
    pub async fn run(&self, monitor: &GpsMonitor, running: Arc<AtomicBool>) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Hide, DisableLineWrap)?;
        let _restore = RestoreScreen;

        // Set up Ctrl+C handler
        let running_clone = Arc::clone(&running);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            running_clone.store(false, Ordering::Relaxed);
        });

        while running.load(Ordering::Relaxed) {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
            self.render_display(&mut stdout, &monitor.poll_status(), monitor.stats())?;
            stdout.flush()?;
            sleep(REFRESH).await;
        }

        println!("\nShutting down...");
        Ok(())
    }

    /// Render one frame
    pub fn render_display(
        &self,
        stdout: &mut impl Write,
        report: &StatusReport,
        stats: Option<StatsSnapshot>,
    ) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("GPS Mapper - Serial GPS Status"),
            Print("\n"),
            Print("=".repeat(60)),
            Print("\n"),
            ResetColor
        )?;

        self.render_status_section(stdout, report)?;
        self.render_position_section(stdout, &report.fix)?;

        if let Some(stats) = stats {
            self.render_stats_section(stdout, &stats)?;
        }

        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("Press Ctrl+C to exit"),
            Print("\n"),
            ResetColor
        )?;

        Ok(())
    }

    fn render_status_section(&self, stdout: &mut impl Write, report: &StatusReport) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print("STATUS:\n"),
            ResetColor,
            Print("  Signal:     "),
            SetForegroundColor(tier_color(report.tier)),
            Print(format!("{}\n", report.tier.label())),
            ResetColor,
            Print(format!("  Connection: {}\n", report.connection.label())),
            Print(format!("  Data age:   {:.1} s\n", report.age_seconds)),
        )?;

        if let Some(time) = report.fix.receiver_time {
            execute!(
                stdout,
                Print(format!("  GPS time:   {}\n", time.format("%Y-%m-%d %H:%M:%S UTC")))
            )?;
        }

        execute!(stdout, Print("\n"))?;
        Ok(())
    }

    fn render_position_section(&self, stdout: &mut impl Write, fix: &Fix) -> Result<()> {
        let position = fix.position();
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print("POSITION:\n"),
            ResetColor,
            Print(format!("  Latitude:  {}\n", Fix::format_coordinate(position.map(|p| p.0)))),
            Print(format!("  Longitude: {}\n", Fix::format_coordinate(position.map(|p| p.1)))),
            Print(format!(
                "  Speed:     {}\n\n",
                Fix::format_value(fix.speed().map(|s| format!("{:.1}", s)), "km/h")
            )),
        )?;
        Ok(())
    }

    fn render_stats_section(&self, stdout: &mut impl Write, stats: &StatsSnapshot) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Magenta),
            Print("SESSION:\n"),
            ResetColor,
            Print(format!("  Lines:        {}\n", stats.lines)),
            Print(format!("  Fixes:        {}\n", stats.fixes)),
            Print(format!("  Parse errors: {}\n", stats.parse_errors)),
            Print(format!(
                "  Reconnects:   {}\n\n",
                stats.open_failures + stats.read_failures
            )),
        )?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

struct RestoreScreen;

impl Drop for RestoreScreen {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, EnableLineWrap);
    }
}

fn tier_color(tier: ColorTier) -> Color {
    match tier {
        ColorTier::Fresh => Color::Green,
        ColorTier::Stale => Color::Yellow,
        ColorTier::Lost => Color::Red,
    }
}
