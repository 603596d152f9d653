//! Rootstar Telemetry Native - Host-side acquisition runtime
//!
//! This crate drives the `no_std` frame decoder from
//! `rootstar_telemetry_core` against real or simulated device links:
//! - Byte transports (serial port, simulated device)
//! - Frame stall timeout and stale-frame rejection
//! - Timing reconciliation of paired frames
//! - Dedicated acquisition thread with reconnection
//! - TOML configuration and diagnostics
//!
//! # Modules
//!
//! - [`bridge`]: Byte transports (USB serial, simulation)
//! - [`acquisition`]: Decode pipeline and acquisition thread
//! - [`clock`]: Monotonic time, wait strategies, shutdown signalling
//! - [`config`]: Configuration loading
//! - [`diagnostics`]: Link-quality events
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rootstar_telemetry_core::ProtocolVariant;
//! use rootstar_telemetry_native::{
//!     synthetic_schedule, AcquisitionConfig, AcquisitionHandle, DecodePipeline,
//!     SimulatedTransport, SystemClock, TelemetrySample, TracingDiagnostics,
//! };
//!
//! let config = AcquisitionConfig::for_variant(ProtocolVariant::FourChannelCrc);
//! let clock = Arc::new(SystemClock::new(config.wait_strategy));
//! let schedule =
//!     synthetic_schedule(config.variant, Duration::from_millis(50), Duration::from_secs(2));
//! let transport = SimulatedTransport::with_schedule(clock.clone(), &schedule);
//!
//! let pipeline = DecodePipeline::new(
//!     &config,
//!     clock,
//!     Box::new(TracingDiagnostics),
//!     Box::new(|sample: TelemetrySample| println!("{:?}", sample.channels)),
//! );
//! let mut handle =
//!     AcquisitionHandle::spawn(pipeline, Box::new(transport), None, config.join_timeout())?;
//! handle.start();
//! std::thread::sleep(Duration::from_secs(2));
//! handle.shutdown();
//! # Ok::<(), rootstar_telemetry_native::AcquisitionError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod acquisition;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;

// Re-export key types
pub use acquisition::{
    AcquisitionHandle, DecodePipeline, PollOutcome, Reconnect, StartGate, StatsSnapshot,
    TelemetrySample, TransportFactory, WorkerStatus,
};
pub use bridge::{synthetic_schedule, ByteSource, SimulatedTransport};
pub use clock::{Clock, ManualClock, ShutdownSignal, SystemClock, WaitStrategy};
pub use config::{AcquisitionConfig, ReconnectPolicy, SerialConfig};
pub use diagnostics::{
    ChannelDiagnostics, Diagnostic, DiagnosticCode, DiagnosticSink, Severity, TracingDiagnostics,
};
pub use error::{AcquisitionError, AcquisitionResult, ConfigError};

#[cfg(feature = "usb")]
pub use bridge::SerialTransport;
