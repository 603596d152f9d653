//! Acquisition runtime
//!
//! Turns a [`crate::bridge::ByteSource`] into a stream of
//! [`TelemetrySample`]s:
//!
//! - [`monitor`]: stall timeout and stale-frame detection
//! - [`reconcile`]: even spacing of paired frames (variants 5 and 6)
//! - [`emitter`]: start/stop gate and consumer callback
//! - [`pipeline`]: one decode step at a time over a byte source
//! - [`worker`]: dedicated thread, reconnection and bounded shutdown

pub mod emitter;
pub mod monitor;
pub mod pipeline;
pub mod reconcile;
pub mod worker;

pub use emitter::{SampleCallback, SampleEmitter, StartGate, TelemetrySample};
pub use monitor::TimeoutMonitor;
pub use pipeline::{DecodePipeline, PipelineStats, PollOutcome, StatsSnapshot};
pub use reconcile::TimingReconciler;
pub use worker::{AcquisitionHandle, Reconnect, TransportFactory, WorkerStatus};
