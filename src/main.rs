// src/main.rs v4
//! GPS Mapper - serial GPS status and live map feed

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gps_mapper::{
    config::GpsConfig,
    display::{self, terminal::TerminalDisplay},
    gps::{nmea, raw, serial, LineReader, PositionSource, SerialSource},
    map::{self, AppState},
    GpsMonitor,
};
use std::{
    path::PathBuf,
    time::Duration,
    sync::{atomic::AtomicBool, Arc},
};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gps-mapper")]
#[command(about = "Serial GPS status and live web map feed", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/gps-mapper/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire positions and serve the map feed (default)
    Run(RunArgs),
    /// Check the host for common serial GPS setup problems
    Diagnose,
    /// Stop gpsd and reset the serial line
    RestartService,
    /// List available serial ports
    Ports,
    /// Echo raw NMEA from the receiver and tally sentence types
    Raw {
        /// How long to listen
        #[arg(long, default_value_t = 30)]
        seconds: u64,

        /// Serial device (default: from config)
        #[arg(long)]
        device: Option<PathBuf>,

        /// Serial baud rate (default: from config)
        #[arg(long)]
        baud: Option<u32>,
    },
    /// Parse a single NMEA sentence and print the fix
    Parse {
        /// The sentence, e.g. "$GPRMC,...*6A"
        line: String,
    },
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Serial device
    #[arg(long)]
    device: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Map server port
    #[arg(long)]
    port: Option<u16>,

    /// Use the built-in simulator instead of a receiver
    #[arg(long)]
    simulate: bool,

    /// Log only, no terminal status view
    #[arg(long)]
    headless: bool,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep the status view readable unless RUST_LOG asks for more
    let interactive = match &cli.command {
        None => display::should_use_terminal(),
        Some(Command::Run(args)) => !args.headless && display::should_use_terminal(),
        Some(_) => false,
    };
    let default_level = if interactive { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => GpsConfig::get_config_path()?,
    };
    let config = GpsConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(config, &config_path, args).await,
        Command::Diagnose => diagnose(config),
        Command::RestartService => {
            let monitor = GpsMonitor::new(config);
            if !monitor.restart_service().await {
                bail!("service restart did not complete");
            }
            println!("gpsd stopped and serial line reset");
            Ok(())
        }
        Command::Ports => {
            let ports = serial::list_serial_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            } else {
                println!("Available serial ports:");
                for port in ports {
                    println!("  {}", port);
                }
            }
            Ok(())
        }
        Command::Raw { seconds, device, baud } => {
            let device = device.unwrap_or(config.device);
            raw_monitor(SerialSource::new(device, baud.unwrap_or(config.baud_rate)), seconds).await
        }
        Command::Parse { line } => {
            let fix = nmea::parse_sentence(&line, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&fix)?);
            Ok(())
        }
    }
}

async fn run(mut config: GpsConfig, config_path: &std::path::Path, args: RunArgs) -> anyhow::Result<()> {
    if let Some(device) = &args.device {
        config.update_serial(device.clone(), args.baud.unwrap_or(config.baud_rate));
    } else if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(port) = args.port {
        config.web_port = port;
    }
    if args.simulate {
        config.simulate = true;
    }
    config.validate()?;

    if args.save {
        config.save_to(config_path)?;
        info!(path = %config_path.display(), "configuration saved");
    }

    let listener = map::bind(config.web_port)
        .await
        .with_context(|| format!("map server cannot listen on port {}", config.web_port))?;

    let mut monitor = GpsMonitor::new(config.clone());
    monitor.start(config.clone()).await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = AppState::new(monitor.state(), config.status, config.device.clone());
    let mut server = tokio::spawn(map::run_server(listener, app, async {
        let _ = shutdown_rx.await;
    }));

    // A server that dies mid-session ends the session instead of running without a map
    let (exit, server_ended) = tokio::select! {
        result = wait_for_exit(&monitor, &args) => (result, false),
        outcome = &mut server => {
            match outcome {
                Ok(Ok(())) => warn!("map server stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "map server failed"),
                Err(e) => error!(error = %e, "map server task panicked"),
            }
            (Ok(()), true)
        }
    };

    if let Some(stats) = monitor.stats() {
        info!(lines = stats.lines, fixes = stats.fixes, parse_errors = stats.parse_errors, "session summary");
    }
    monitor.stop().await;
    exit?;

    if server_ended {
        bail!("map server stopped, session ended");
    }
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "map server failed"),
        Err(e) => warn!(error = %e, "map server task panicked"),
        Ok(Ok(())) => {}
    }
    Ok(())
}

/// Block until the operator asks to stop.
async fn wait_for_exit(monitor: &GpsMonitor, args: &RunArgs) -> anyhow::Result<()> {
    if args.headless || !display::should_use_terminal() {
        info!("running headless, Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
    } else {
        let running = Arc::new(AtomicBool::new(true));
        TerminalDisplay::new().run(monitor, running).await?;
    }
    Ok(())
}

async fn raw_monitor(mut source: SerialSource, seconds: u64) -> anyhow::Result<()> {
    println!("Monitoring {} for {} seconds, Ctrl+C to stop early", source.describe(), seconds);
    println!("{}", "=".repeat(60));

    let mut reader = match source.open().await {
        Ok(reader) => reader,
        Err(e) => {
            println!("✗ {}", e);
            println!("Possible issues:");
            println!("  - receiver not connected or HAT not seated");
            println!("  - wrong device path (see `gps-mapper ports`)");
            println!("  - no permission on the device (dialout group)");
            bail!("cannot open receiver");
        }
    };

    let echo = |line: &str| println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
    let tally = tokio::select! {
        tally = raw::capture(&mut reader, Duration::from_secs(seconds), echo) => Some(tally),
        _ = tokio::signal::ctrl_c() => None,
    };
    reader.close().await;

    let Some(tally) = tally else {
        println!("\nStopped by user");
        return Ok(());
    };

    println!("{}", "=".repeat(60));
    println!("Total sentences: {}", tally.lines);
    for (address, count) in &tally.by_address {
        println!("  {:<8} {}", address, count);
    }
    if let Some(reason) = &tally.ended_early {
        println!("Capture ended early: {}", reason);
    }

    let verdict = tally.verdict();
    match verdict {
        raw::Verdict::Communicating => println!("✓ {}", verdict.describe()),
        raw::Verdict::NoPositionSentences => println!("! {}", verdict.describe()),
        raw::Verdict::NoData => bail!("{}", verdict.describe()),
    }
    Ok(())
}

fn diagnose(config: GpsConfig) -> anyhow::Result<()> {
    let report = GpsMonitor::new(config).run_diagnostics();
    for check in &report.checks {
        let mark = if check.passed { "✓" } else { "✗" };
        println!("{} {:<18} {}", mark, check.check, check.detail);
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{} of {} checks failed", failed, report.checks.len());
    }
    println!("All checks passed.");
    Ok(())
}
