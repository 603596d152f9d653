//! Rootstar Telemetry Application
//!
//! Command-line front end for serial telemetry devices. Decodes one of the
//! six supported wire protocols and logs the resulting samples.
//!
//! # Usage
//!
//! ```bash
//! # Acquire from a device
//! rootstar-telemetry acquire --port /dev/ttyUSB0 --variant 5
//!
//! # Acquire using a config file, overriding the port
//! rootstar-telemetry acquire --config telemetry.toml --port COM3
//!
//! # Run against a simulated device
//! rootstar-telemetry simulate --variant 6 --seconds 10
//!
//! # List serial ports
//! rootstar-telemetry ports
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rootstar_telemetry_core::ProtocolVariant;
use rootstar_telemetry_native::{
    AcquisitionConfig, AcquisitionHandle, DecodePipeline, SystemClock, TelemetrySample,
    TracingDiagnostics,
};

/// Interval between progress reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Rootstar Telemetry Application
#[derive(Parser, Debug)]
#[command(name = "rootstar-telemetry")]
#[command(author, version, about = "Rootstar serial telemetry decoder", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Acquire from a serial device
    Acquire {
        /// Serial port path (e.g., /dev/ttyUSB0 or COM3)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Protocol variant (1-6)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=6))]
        variant: Option<u8>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum channels per sample
        #[arg(long)]
        channels: Option<usize>,

        /// Stop after this many seconds (runs until the link fails otherwise)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Decode frames from a simulated device
    Simulate {
        /// Protocol variant (1-6)
        #[arg(
            short,
            long,
            default_value = "5",
            value_parser = clap::value_parser!(u8).range(1..=6)
        )]
        variant: u8,

        /// Run time in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },

    /// List available serial ports
    Ports,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Rootstar Telemetry v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Acquire { port, baud, variant, config, channels, seconds } => {
            let mut config = match config {
                Some(path) => AcquisitionConfig::load(path)?,
                None => AcquisitionConfig::default(),
            };
            if let Some(id) = variant {
                config.variant = ProtocolVariant::try_from(id)?;
            }
            if port.is_some() {
                config.serial.port = port;
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            if channels.is_some() {
                config.output_channels = channels;
            }
            config.validate()?;
            run_acquire(&config, seconds.map(Duration::from_secs))?;
        }
        Commands::Simulate { variant, seconds } => {
            let variant = ProtocolVariant::try_from(variant)?;
            run_simulate(variant, Duration::from_secs(seconds))?;
        }
        Commands::Ports => list_ports(),
    }

    Ok(())
}

/// Build the pipeline with a callback that logs each sample.
fn build_pipeline(config: &AcquisitionConfig, clock: Arc<SystemClock>) -> DecodePipeline {
    DecodePipeline::new(
        config,
        clock,
        Box::new(TracingDiagnostics),
        Box::new(|sample: TelemetrySample| {
            debug!(
                seq = sample.sequence,
                arrival_us = sample.arrival_us,
                corrupt = sample.corrupt,
                "{:?}",
                sample.channels
            );
        }),
    )
}

/// Log progress until the worker stops or `limit` elapses, then shut down.
fn supervise(mut handle: AcquisitionHandle, limit: Option<Duration>) {
    let started = Instant::now();
    handle.start();

    loop {
        std::thread::sleep(REPORT_INTERVAL);
        let stats = handle.stats();
        info!(
            emitted = stats.frames_emitted,
            corrupt = stats.checksum_failures,
            stale = stats.stale_frames,
            timeouts = stats.timeouts,
            reconnects = stats.reconnects,
            "Acquisition progress"
        );
        if handle.status().is_finished() || limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    if !handle.shutdown() {
        warn!("Acquisition thread left running");
    }
    info!(status = ?handle.status(), stats = ?handle.stats(), "Acquisition finished");
}

#[cfg(feature = "usb")]
fn run_acquire(config: &AcquisitionConfig, limit: Option<Duration>) -> anyhow::Result<()> {
    use rootstar_telemetry_native::{Reconnect, SerialTransport};

    let transport = SerialTransport::from_config(&config.serial)?;
    info!(port = transport.name(), variant = %config.variant, "Acquiring");

    let clock = Arc::new(SystemClock::new(config.wait_strategy));
    let pipeline = build_pipeline(config, clock);
    let reconnect = Reconnect {
        factory: SerialTransport::reopener(config.serial.clone()),
        policy: config.reconnect.clone(),
    };

    let handle = AcquisitionHandle::spawn(
        pipeline,
        Box::new(transport),
        Some(reconnect),
        config.join_timeout(),
    )?;
    supervise(handle, limit);
    Ok(())
}

#[cfg(not(feature = "usb"))]
fn run_acquire(_config: &AcquisitionConfig, _limit: Option<Duration>) -> anyhow::Result<()> {
    anyhow::bail!("USB support not enabled. Rebuild with --features usb")
}

fn run_simulate(variant: ProtocolVariant, duration: Duration) -> anyhow::Result<()> {
    use rootstar_telemetry_native::{synthetic_schedule, SimulatedTransport};

    info!(%variant, "Simulating device for {}s", duration.as_secs());

    let config = AcquisitionConfig::for_variant(variant);
    let clock = Arc::new(SystemClock::new(config.wait_strategy));
    // Leave the buffer empty briefly so the first frame counts as fresh
    let schedule = synthetic_schedule(variant, Duration::from_millis(50), duration);
    let transport = SimulatedTransport::with_schedule(clock.clone(), &schedule);
    info!(frames = schedule.len(), "Generated frame schedule");

    let pipeline = build_pipeline(&config, clock);
    let handle =
        AcquisitionHandle::spawn(pipeline, Box::new(transport), None, config.join_timeout())?;
    supervise(handle, Some(duration + Duration::from_millis(500)));
    Ok(())
}

fn list_ports() {
    #[cfg(feature = "usb")]
    {
        let ports = rootstar_telemetry_native::SerialTransport::list_ports();
        if ports.is_empty() {
            info!("  (none found)");
        }
        for port in ports {
            info!("  {port}");
        }
    }

    #[cfg(not(feature = "usb"))]
    warn!("USB support not enabled. Rebuild with --features usb");
}
