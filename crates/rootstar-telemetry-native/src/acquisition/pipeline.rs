//! Byte-at-a-time decode pipeline
//!
//! [`DecodePipeline::poll`] performs one step of the acquisition loop: check
//! the stall timer, read at most one byte, feed the decoder and resolve a
//! completed frame. It owns the decoder and never shares it, so one pipeline
//! serves exactly one connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rootstar_telemetry_core::{ChecksumStatus, DecodeState, FrameDecoder, ProtocolVariant, Step};

use super::emitter::{SampleCallback, SampleEmitter, StartGate};
use super::monitor::TimeoutMonitor;
use super::reconcile::TimingReconciler;
use crate::bridge::ByteSource;
use crate::clock::{Clock, ShutdownSignal, WaitOutcome};
use crate::config::AcquisitionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::error::{AcquisitionError, AcquisitionResult};

/// What one [`DecodePipeline::poll`] call did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was buffered; waited one idle interval
    Idle,
    /// A byte was consumed or a frame was resolved without emission
    Progress,
    /// A sample was handed to the consumer
    Emitted,
    /// Shutdown was requested
    Interrupted,
}

/// Frame counters, shared with the acquisition handle.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
    checksum_failures: AtomicU64,
    stale_frames: AtomicU64,
    timeouts: AtomicU64,
    faults: AtomicU64,
    reconnects: AtomicU64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        Self::bump(&self.reconnects);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            stale_frames: self.stale_frames.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PipelineStats`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Samples handed to the consumer
    pub frames_emitted: u64,
    /// Resolved frames dropped because the gate was closed
    pub frames_dropped: u64,
    /// Frames emitted zeroed after a CRC mismatch
    pub checksum_failures: u64,
    /// Frames discarded as pre-reconnect leftovers
    pub stale_frames: u64,
    /// Frames abandoned after a stall
    pub timeouts: u64,
    /// Decoder invariant violations
    pub faults: u64,
    /// Successful transport reopens
    pub reconnects: u64,
}

/// Decoder, timeout monitor, reconciler and emitter for one connection.
pub struct DecodePipeline {
    decoder: FrameDecoder,
    monitor: TimeoutMonitor,
    reconciler: TimingReconciler,
    emitter: SampleEmitter,
    diagnostics: Box<dyn DiagnosticSink>,
    clock: Arc<dyn Clock>,
    idle_poll: Duration,
    stats: Arc<PipelineStats>,
}

impl DecodePipeline {
    /// Build a pipeline from configuration.
    ///
    /// The gate starts closed; samples are dropped until it is opened.
    #[must_use]
    pub fn new(
        config: &AcquisitionConfig,
        clock: Arc<dyn Clock>,
        diagnostics: Box<dyn DiagnosticSink>,
        on_sample: SampleCallback,
    ) -> Self {
        Self {
            decoder: FrameDecoder::new(config.variant),
            monitor: TimeoutMonitor::new(config.frame_timeout()),
            reconciler: TimingReconciler::new(config.reconcile_timing),
            emitter: SampleEmitter::new(config.effective_channels(), StartGate::new(), on_sample),
            diagnostics,
            clock,
            idle_poll: config.idle_poll(),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Active variant.
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.decoder.variant()
    }

    /// Decoder state.
    #[must_use]
    pub fn state(&self) -> DecodeState {
        self.decoder.state()
    }

    /// Gate controlling emission.
    #[must_use]
    pub fn gate(&self) -> &StartGate {
        self.emitter.gate()
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Clock used for timestamps and waits.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Forward a diagnostic to the sink.
    pub fn report(&self, code: DiagnosticCode, detail: impl Into<String>) {
        self.diagnostics.report(Diagnostic::new(code, detail));
    }

    /// Prepare for a freshly opened transport.
    pub fn reset_connection(&mut self) {
        self.decoder.reset_connection();
        self.monitor.reset_connection();
    }

    /// Run one step of the acquisition loop.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::Transport`] if the source fails. Any
    /// partial frame is abandoned first.
    pub fn poll(
        &mut self,
        source: &mut dyn ByteSource,
        shutdown: &ShutdownSignal,
    ) -> AcquisitionResult<PollOutcome> {
        if shutdown.is_triggered() {
            return Ok(PollOutcome::Interrupted);
        }

        self.check_stall();

        let available = match source.bytes_available() {
            Ok(count) => count,
            Err(err) => return Err(self.abort(err)),
        };
        if available == 0 {
            self.monitor.observe_empty();
            return Ok(self.idle(shutdown));
        }

        let byte = match source.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => return Ok(self.idle(shutdown)),
            Err(err) => return Err(self.abort(err)),
        };

        let now = self.clock.now_us();
        match self.decoder.consume_byte(byte, now) {
            Step::Discarded => {}
            Step::Synced => {
                tracing::trace!(byte, "Frame sync");
                self.monitor.arm(now);
            }
            Step::Accepted => self.monitor.touch(now),
            Step::Rejected => {
                tracing::debug!(byte, "Header mismatch, resynchronising");
                self.monitor.disarm();
            }
            Step::Complete => return Ok(self.resolve(shutdown)),
            Step::Fault(err) => {
                PipelineStats::bump(&self.stats.faults);
                self.monitor.disarm();
                self.report(DiagnosticCode::DecoderFault, err.to_string());
            }
        }
        Ok(PollOutcome::Progress)
    }

    fn idle(&self, shutdown: &ShutdownSignal) -> PollOutcome {
        match self.clock.wait(self.idle_poll, shutdown) {
            WaitOutcome::Elapsed => PollOutcome::Idle,
            WaitOutcome::Interrupted => PollOutcome::Interrupted,
        }
    }

    fn check_stall(&mut self) {
        let now = self.clock.now_us();
        if self.decoder.state() != DecodeState::Accumulating || !self.monitor.expired(now) {
            return;
        }
        let cursor = self.decoder.accumulator().cursor;
        self.decoder.reset();
        self.monitor.resolve();
        PipelineStats::bump(&self.stats.timeouts);
        self.report(
            DiagnosticCode::FrameTimeout,
            format!("Frame abandoned after {cursor} bytes with no progress"),
        );
    }

    fn abort(&mut self, err: std::io::Error) -> AcquisitionError {
        self.decoder.reset();
        self.monitor.disarm();
        AcquisitionError::Transport(err)
    }

    fn resolve(&mut self, shutdown: &ShutdownSignal) -> PollOutcome {
        let fresh = self.monitor.resolve();
        let frame = match self.decoder.take_frame() {
            Ok(frame) => frame,
            Err(err) => {
                PipelineStats::bump(&self.stats.faults);
                self.report(DiagnosticCode::DecoderFault, err.to_string());
                return PollOutcome::Progress;
            }
        };

        if !fresh {
            PipelineStats::bump(&self.stats.stale_frames);
            self.report(
                DiagnosticCode::StaleFrame,
                "Frame completed before the transport buffer drained; discarded",
            );
            return PollOutcome::Progress;
        }

        if let ChecksumStatus::Mismatch { declared, computed } = frame.checksum {
            PipelineStats::bump(&self.stats.checksum_failures);
            self.report(
                DiagnosticCode::ChecksumMismatch,
                format!("CRC declared {declared:#06x}, computed {computed:#06x}; samples zeroed"),
            );
        }

        if let Some(hold) = self.reconciler.hold_for(&frame) {
            tracing::trace!(?hold, "Holding second frame of pair");
            if self.clock.wait(hold, shutdown) == WaitOutcome::Interrupted {
                return PollOutcome::Interrupted;
            }
        }

        if self.emitter.emit(&frame, self.clock.now_us()) {
            PipelineStats::bump(&self.stats.frames_emitted);
            PollOutcome::Emitted
        } else {
            PipelineStats::bump(&self.stats.frames_dropped);
            PollOutcome::Progress
        }
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("decoder", &self.decoder)
            .field("monitor", &self.monitor)
            .field("reconciler", &self.reconciler)
            .field("emitter", &self.emitter)
            .field("idle_poll", &self.idle_poll)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SimulatedTransport;
    use crate::clock::ManualClock;
    use crate::diagnostics::ChannelDiagnostics;
    use crate::TelemetrySample;
    use crossbeam_channel::Receiver;
    use rootstar_telemetry_core::encode::encode_frame;

    struct Harness {
        clock: ManualClock,
        pipeline: DecodePipeline,
        transport: SimulatedTransport,
        samples: Receiver<TelemetrySample>,
        diagnostics: Receiver<Diagnostic>,
    }

    impl Harness {
        fn new(variant: ProtocolVariant) -> Self {
            let clock = ManualClock::new();
            let (sink, diagnostics) = ChannelDiagnostics::new();
            let (tx, samples) = crossbeam_channel::unbounded();
            let pipeline = DecodePipeline::new(
                &AcquisitionConfig::for_variant(variant),
                Arc::new(clock.clone()),
                Box::new(sink),
                Box::new(move |sample| {
                    let _ = tx.send(sample);
                }),
            );
            pipeline.gate().start();
            let transport = SimulatedTransport::new(Arc::new(clock.clone()));
            Self { clock, pipeline, transport, samples, diagnostics }
        }

        fn push(&mut self, at_ms: u64, bytes: &[u8]) {
            self.transport.push_at(Duration::from_millis(at_ms), bytes);
        }

        fn run_until(&mut self, until_ms: u64) {
            let shutdown = ShutdownSignal::never();
            while self.clock.elapsed() < Duration::from_millis(until_ms) {
                self.pipeline.poll(&mut self.transport, &shutdown).unwrap();
            }
        }

        fn codes(&self) -> Vec<DiagnosticCode> {
            self.diagnostics.try_iter().map(|d| d.code).collect()
        }
    }

    #[test]
    fn test_valid_crc_frame_emitted() {
        let mut h = Harness::new(ProtocolVariant::FourChannelCrc);
        let frame =
            encode_frame(ProtocolVariant::FourChannelCrc, &[100, 200, 300, 400], 7, 2).unwrap();
        h.push(5, &frame);
        h.run_until(20);

        let sample = h.samples.try_recv().unwrap();
        assert_eq!(sample.channels, vec![100.0, 200.0, 300.0, 400.0]);
        assert_eq!(sample.arrival_us, 5_000);
        assert_eq!(sample.sub_mode, 2);
        assert!(!sample.corrupt);
        assert!(h.codes().is_empty());
        assert_eq!(h.pipeline.stats().snapshot().frames_emitted, 1);
    }

    #[test]
    fn test_corrupt_crc_frame_zeroed() {
        let mut h = Harness::new(ProtocolVariant::FourChannelCrc);
        let mut frame =
            encode_frame(ProtocolVariant::FourChannelCrc, &[100, 200, 300, 400], 7, 0).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        h.push(5, &frame);
        h.run_until(20);

        let sample = h.samples.try_recv().unwrap();
        assert_eq!(sample.channels, vec![0.0; 4]);
        assert!(sample.corrupt);
        assert_eq!(h.codes(), vec![DiagnosticCode::ChecksumMismatch]);
        assert_eq!(h.pipeline.stats().snapshot().checksum_failures, 1);
    }

    #[test]
    fn test_second_of_pair_held() {
        let mut h = Harness::new(ProtocolVariant::FourChannelCrc);
        let first = encode_frame(ProtocolVariant::FourChannelCrc, &[1, 2, 3, 4], 0, 0).unwrap();
        let second = encode_frame(ProtocolVariant::FourChannelCrc, &[5, 6, 7, 8], 0, 1).unwrap();
        h.push(10, &first);
        h.push(90, &second);
        h.run_until(95);

        let a = h.samples.try_recv().unwrap();
        let b = h.samples.try_recv().unwrap();
        assert_eq!(a.released_us, 10_000);
        assert_eq!(b.arrival_us, 90_000);
        assert_eq!(b.released_us, 210_000);
        assert_eq!(b.released_us - b.arrival_us, 120_000);
    }

    #[test]
    fn test_corrupt_frame_still_paces_next() {
        let mut h = Harness::new(ProtocolVariant::FourChannelCrc);
        let mut first = encode_frame(ProtocolVariant::FourChannelCrc, &[1, 2, 3, 4], 0, 0).unwrap();
        let last = first.len() - 1;
        first[last] ^= 0x01;
        let second = encode_frame(ProtocolVariant::FourChannelCrc, &[5, 6, 7, 8], 0, 1).unwrap();
        h.push(10, &first);
        h.push(90, &second);
        h.run_until(95);

        let a = h.samples.try_recv().unwrap();
        assert!(a.corrupt);
        assert_eq!(a.released_us, 10_000);

        let b = h.samples.try_recv().unwrap();
        assert!(!b.corrupt);
        assert_eq!(b.arrival_us, 90_000);
        assert_eq!(b.released_us, 210_000);
        assert_eq!(h.codes(), vec![DiagnosticCode::ChecksumMismatch]);
    }

    #[test]
    fn test_stalled_frame_abandoned() {
        let mut h = Harness::new(ProtocolVariant::FourChannelCrc);
        h.push(5, &[0xF0]);
        h.run_until(6);
        assert_eq!(h.pipeline.state(), DecodeState::Accumulating);

        h.run_until(5 + 1000);
        assert_eq!(h.pipeline.state(), DecodeState::Accumulating);
        assert!(h.codes().is_empty());

        h.run_until(5 + 1002);
        assert_eq!(h.pipeline.state(), DecodeState::Idle);
        assert_eq!(h.codes(), vec![DiagnosticCode::FrameTimeout]);
        assert!(h.samples.try_recv().is_err());
        assert_eq!(h.pipeline.stats().snapshot().timeouts, 1);
    }

    #[test]
    fn test_backlog_frame_discarded() {
        let mut h = Harness::new(ProtocolVariant::TwoChannel);
        h.transport.push_backlog(&[0xC0, 0x00, 0x0A, 0x00, 0x14]);
        h.push(10, &[0xC0, 0x00, 0x0B, 0x00, 0x15]);
        h.run_until(20);

        assert_eq!(h.codes(), vec![DiagnosticCode::StaleFrame]);
        let sample = h.samples.try_recv().unwrap();
        assert_eq!(sample.channels, vec![11.0, 21.0]);
        assert!(h.samples.try_recv().is_err());
        assert_eq!(h.pipeline.stats().snapshot().stale_frames, 1);
    }

    #[test]
    fn test_reset_connection_requires_new_drain() {
        let mut h = Harness::new(ProtocolVariant::TwoChannel);
        h.run_until(5);
        h.pipeline.reset_connection();
        h.transport.push_backlog(&[0xC0, 0x00, 0x01, 0x00, 0x02]);
        h.run_until(10);

        assert_eq!(h.codes(), vec![DiagnosticCode::StaleFrame]);
        assert!(h.samples.try_recv().is_err());
    }

    #[test]
    fn test_closed_gate_drops() {
        let mut h = Harness::new(ProtocolVariant::TwoChannel);
        h.pipeline.gate().stop();
        h.push(1, &[0xC0, 0x00, 0x0A, 0x00, 0x14]);
        h.run_until(5);

        assert!(h.samples.try_recv().is_err());
        let stats = h.pipeline.stats().snapshot();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_emitted, 0);
    }

    #[test]
    fn test_transport_failure_aborts_frame() {
        let mut h = Harness::new(ProtocolVariant::TwoChannel);
        h.push(1, &[0xC0, 0x00]);
        h.run_until(2);
        assert_eq!(h.pipeline.state(), DecodeState::Accumulating);

        h.transport.fail_at(Duration::from_millis(3));
        h.clock.advance(Duration::from_millis(5));
        let result = h.pipeline.poll(&mut h.transport, &ShutdownSignal::never());
        assert!(matches!(result, Err(AcquisitionError::Transport(_))));
        assert_eq!(h.pipeline.state(), DecodeState::Idle);
    }

    #[test]
    fn test_shutdown_interrupts_poll() {
        let mut h = Harness::new(ProtocolVariant::TwoChannel);
        let (mut trigger, signal) = crate::clock::shutdown_pair();
        trigger.trigger();
        let outcome = h.pipeline.poll(&mut h.transport, &signal).unwrap();
        assert_eq!(outcome, PollOutcome::Interrupted);
    }

    #[test]
    fn test_interleaved_frame_emits_eighty_channels() {
        let mut h = Harness::new(ProtocolVariant::InterleavedBlock);
        let values: Vec<u16> = (0..80).map(|i| 400 + i).collect();
        let frame = encode_frame(ProtocolVariant::InterleavedBlock, &values, 3, 4).unwrap();
        h.push(2, &frame);
        h.run_until(5);

        let sample = h.samples.try_recv().unwrap();
        let expected: Vec<f32> = values.iter().map(|&v| f32::from(v)).collect();
        assert_eq!(sample.channels, expected);
        assert_eq!(sample.status, 3);
    }
}
