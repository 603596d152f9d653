//! Dedicated acquisition thread
//!
//! The thread owns the transport and the [`DecodePipeline`] exclusively. The
//! caller keeps an [`AcquisitionHandle`] to open or close the sample gate,
//! read counters and shut the thread down.
//!
//! Shutdown interrupts every wait the thread performs, but a transport that
//! blocks inside a read cannot be interrupted. Such a thread is detached
//! after the join timeout instead of blocking the caller.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::emitter::StartGate;
use super::pipeline::{DecodePipeline, PipelineStats, PollOutcome, StatsSnapshot};
use crate::bridge::ByteSource;
use crate::clock::{shutdown_pair, ShutdownSignal, ShutdownTrigger, WaitOutcome};
use crate::config::ReconnectPolicy;
use crate::diagnostics::DiagnosticCode;
use crate::error::{AcquisitionError, AcquisitionResult};

/// Reopens the transport after a failure.
pub type TransportFactory = Box<dyn FnMut() -> io::Result<Box<dyn ByteSource>> + Send>;

/// Lifecycle of the acquisition thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Reading from the transport
    Running,
    /// Exited after a shutdown request
    Stopped,
    /// Exited because the transport could not be recovered
    Failed(String),
}

impl WorkerStatus {
    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Clone, Debug)]
struct SharedStatus(Arc<Mutex<WorkerStatus>>);

impl SharedStatus {
    fn lock(&self) -> MutexGuard<'_, WorkerStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Transport recovery settings for [`AcquisitionHandle::spawn`].
pub struct Reconnect {
    /// Opens a replacement transport
    pub factory: TransportFactory,
    /// When and how often to try
    pub policy: ReconnectPolicy,
}

enum Recovery {
    Reopened(Box<dyn ByteSource>),
    Interrupted,
    GaveUp(String),
}

/// Owner's view of a running acquisition thread.
pub struct AcquisitionHandle {
    gate: StartGate,
    stats: Arc<PipelineStats>,
    status: SharedStatus,
    trigger: ShutdownTrigger,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl AcquisitionHandle {
    /// Move `pipeline` and `transport` onto a new thread and start reading.
    ///
    /// The sample gate keeps whatever position it had; call
    /// [`Self::start`] to begin forwarding samples.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        pipeline: DecodePipeline,
        transport: Box<dyn ByteSource>,
        reconnect: Option<Reconnect>,
        join_timeout: Duration,
    ) -> AcquisitionResult<Self> {
        let gate = pipeline.gate().clone();
        let stats = Arc::clone(pipeline.stats());
        let status = SharedStatus(Arc::new(Mutex::new(WorkerStatus::Running)));
        let (trigger, shutdown) = shutdown_pair();
        let (done_tx, done) = crossbeam_channel::bounded(1);

        let thread_status = status.clone();
        let thread = thread::Builder::new()
            .name(format!("telemetry-{}", pipeline.variant().id()))
            .spawn(move || {
                run(pipeline, transport, reconnect, &shutdown, &thread_status, &done_tx);
            })
            .map_err(AcquisitionError::Spawn)?;

        Ok(Self { gate, stats, status, trigger, done, thread: Some(thread), join_timeout })
    }

    /// Begin forwarding samples. Idempotent.
    pub fn start(&self) {
        if self.gate.start() {
            info!("Sample delivery started");
        }
    }

    /// Stop forwarding samples; decoding continues. Idempotent.
    pub fn stop(&self) {
        if self.gate.stop() {
            info!("Sample delivery stopped");
        }
    }

    /// Whether samples are being forwarded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.gate.is_started()
    }

    /// Thread lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status.lock().clone()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Signal the thread to exit and wait up to the join timeout.
    ///
    /// Returns `false` if the thread did not exit in time; it is then
    /// detached. Calling this again after it returned is a no-op.
    pub fn shutdown(&mut self) -> bool {
        self.gate.stop();
        self.trigger.trigger();
        let Some(thread) = self.thread.take() else {
            return true;
        };

        match self.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("Acquisition thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.join_timeout, "Acquisition thread did not exit; detaching");
                false
            }
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for AcquisitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionHandle")
            .field("started", &self.is_started())
            .field("status", &self.status())
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}

fn run(
    mut pipeline: DecodePipeline,
    mut transport: Box<dyn ByteSource>,
    mut reconnect: Option<Reconnect>,
    shutdown: &ShutdownSignal,
    status: &SharedStatus,
    done: &Sender<()>,
) {
    info!(variant = %pipeline.variant(), "Acquisition thread started");

    let outcome = loop {
        match pipeline.poll(transport.as_mut(), shutdown) {
            Ok(PollOutcome::Interrupted) => break WorkerStatus::Stopped,
            Ok(_) => {}
            Err(err) => {
                let reason = err.to_string();
                pipeline.report(DiagnosticCode::TransportFailure, reason.as_str());
                match recover(&mut pipeline, reconnect.as_mut(), reason, shutdown) {
                    Recovery::Reopened(next) => transport = next,
                    Recovery::Interrupted => break WorkerStatus::Stopped,
                    Recovery::GaveUp(reason) => break WorkerStatus::Failed(reason),
                }
            }
        }
    };

    match &outcome {
        WorkerStatus::Failed(reason) => error!(%reason, "Acquisition thread failed"),
        _ => info!("Acquisition thread finished"),
    }
    *status.lock() = outcome;
    drop(transport);
    let _ = done.send(());
}

fn recover(
    pipeline: &mut DecodePipeline,
    reconnect: Option<&mut Reconnect>,
    reason: String,
    shutdown: &ShutdownSignal,
) -> Recovery {
    let Some(reconnect) = reconnect.filter(|r| r.policy.enabled) else {
        return Recovery::GaveUp(reason);
    };

    let mut attempt = 1;
    while reconnect.policy.allows(attempt) {
        if pipeline.clock().wait(reconnect.policy.delay(), shutdown) == WaitOutcome::Interrupted {
            return Recovery::Interrupted;
        }
        match (reconnect.factory)() {
            Ok(transport) => {
                pipeline.reset_connection();
                pipeline.stats().record_reconnect();
                pipeline.report(
                    DiagnosticCode::Reconnected,
                    format!("Transport reopened after {attempt} attempt(s)"),
                );
                return Recovery::Reopened(transport);
            }
            Err(err) => warn!(attempt, "Reopen failed: {err}"),
        }
        attempt += 1;
    }

    Recovery::GaveUp(format!("{reason} (gave up after {} reopen attempts)", attempt - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SimulatedTransport;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AcquisitionConfig;
    use crate::diagnostics::{ChannelDiagnostics, Diagnostic};
    use crate::TelemetrySample;
    use rootstar_telemetry_core::ProtocolVariant;
    use std::time::Instant;

    const FRAME_A: [u8; 5] = [0xC0, 0x00, 0x0A, 0x00, 0x14];
    const FRAME_B: [u8; 5] = [0xC0, 0x00, 0x1E, 0x00, 0x28];

    fn pipeline(
        clock: &ManualClock,
    ) -> (DecodePipeline, Receiver<TelemetrySample>, Receiver<Diagnostic>) {
        let (sink, diagnostics) = ChannelDiagnostics::new();
        let (tx, samples) = crossbeam_channel::unbounded();
        let pipeline = DecodePipeline::new(
            &AcquisitionConfig::for_variant(ProtocolVariant::TwoChannel),
            Arc::new(clock.clone()),
            Box::new(sink),
            Box::new(move |sample| {
                let _ = tx.send(sample);
            }),
        );
        (pipeline, samples, diagnostics)
    }

    fn wait_for_finish(handle: &AcquisitionHandle) -> WorkerStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = handle.status();
            if status.is_finished() || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_samples_flow_after_start() {
        let clock = ManualClock::new();
        let (pipeline, samples, _diagnostics) = pipeline(&clock);
        let mut transport = SimulatedTransport::new(Arc::new(clock.clone()));
        transport.push_at(Duration::from_millis(10), &FRAME_A);
        pipeline.gate().start();

        let mut handle =
            AcquisitionHandle::spawn(pipeline, Box::new(transport), None, Duration::from_secs(2))
                .unwrap();
        assert!(handle.is_started());
        handle.start();
        assert!(handle.is_started());

        let sample = samples.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sample.channels, vec![10.0, 20.0]);
        assert_eq!(handle.stats().frames_emitted, 1);

        handle.stop();
        assert!(!handle.is_started());
        assert!(handle.shutdown());
        assert_eq!(handle.status(), WorkerStatus::Stopped);
        assert!(handle.shutdown());
    }

    #[test]
    fn test_failure_without_reconnect() {
        let clock = ManualClock::new();
        let (pipeline, _samples, diagnostics) = pipeline(&clock);
        let mut transport = SimulatedTransport::new(Arc::new(clock.clone()));
        transport.fail_at(Duration::from_millis(5));

        let mut handle =
            AcquisitionHandle::spawn(pipeline, Box::new(transport), None, Duration::from_secs(2))
                .unwrap();

        assert!(matches!(wait_for_finish(&handle), WorkerStatus::Failed(_)));
        let codes: Vec<_> = diagnostics.try_iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::TransportFailure]);
        assert!(handle.shutdown());
    }

    #[test]
    fn test_reconnect_discards_backlog() {
        let clock = ManualClock::new();
        let (pipeline, samples, diagnostics) = pipeline(&clock);
        let mut first = SimulatedTransport::new(Arc::new(clock.clone()));
        first.fail_at(Duration::from_millis(5));

        let factory_clock = clock.clone();
        let factory: TransportFactory = Box::new(move || {
            let now = factory_clock.elapsed();
            let mut next = SimulatedTransport::new(Arc::new(factory_clock.clone()));
            next.push_backlog(&FRAME_A);
            next.push_at(now + Duration::from_millis(50), &FRAME_B);
            Ok(Box::new(next) as Box<dyn ByteSource>)
        });
        let reconnect = Reconnect {
            factory,
            policy: ReconnectPolicy { enabled: true, delay_ms: 100, max_attempts: 3 },
        };
        pipeline.gate().start();

        let mut handle = AcquisitionHandle::spawn(
            pipeline,
            Box::new(first),
            Some(reconnect),
            Duration::from_secs(2),
        )
        .unwrap();

        let sample = samples.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sample.channels, vec![30.0, 40.0]);
        assert!(handle.shutdown());

        let codes: Vec<_> = diagnostics.try_iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::TransportFailure,
                DiagnosticCode::Reconnected,
                DiagnosticCode::StaleFrame,
            ]
        );
        let stats = handle.stats();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.stale_frames, 1);
    }

    #[test]
    fn test_reconnect_gives_up() {
        let clock = ManualClock::new();
        let (pipeline, _samples, _diagnostics) = pipeline(&clock);
        let mut first = SimulatedTransport::new(Arc::new(clock.clone()));
        first.fail_at(Duration::ZERO);

        let reconnect = Reconnect {
            factory: Box::new(|| Err(io::Error::new(io::ErrorKind::NotFound, "no device"))),
            policy: ReconnectPolicy { enabled: true, delay_ms: 2000, max_attempts: 2 },
        };
        let mut handle = AcquisitionHandle::spawn(
            pipeline,
            Box::new(first),
            Some(reconnect),
            Duration::from_secs(2),
        )
        .unwrap();

        match wait_for_finish(&handle) {
            WorkerStatus::Failed(reason) => assert!(reason.contains("2 reopen attempts")),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(clock.now_us() >= 4_000_000);
        assert!(handle.shutdown());
    }

    struct WedgedSource {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl ByteSource for WedgedSource {
        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            Ok(None)
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_wedged_transport_detached() {
        let clock = ManualClock::new();
        let (pipeline, _samples, _diagnostics) = pipeline(&clock);
        let (release_tx, release) = crossbeam_channel::bounded(0);
        let (entered, entered_rx) = crossbeam_channel::unbounded();

        let mut handle = AcquisitionHandle::spawn(
            pipeline,
            Box::new(WedgedSource { entered, release }),
            None,
            Duration::from_millis(50),
        )
        .unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(!handle.shutdown());
        assert_eq!(handle.status(), WorkerStatus::Running);
        drop(release_tx);
    }
}
