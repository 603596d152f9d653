//! Sample hand-off to the consumer

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use rootstar_telemetry_core::{DecodedFrame, ProtocolVariant};

/// One decoded, validated and reconciled sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Emission counter, starting at zero per pipeline
    pub sequence: u64,
    /// Variant the frame was decoded with
    pub variant: ProtocolVariant,
    /// Channel values after the output cap
    pub channels: Vec<f32>,
    /// Sync byte arrival time in microseconds
    pub arrival_us: u64,
    /// Time the sample left the pipeline, after any reconciliation hold
    pub released_us: u64,
    /// Frame status byte (0 when the variant has none)
    pub status: u8,
    /// Sync sub-mode (variants 5 and 6)
    pub sub_mode: u8,
    /// Checksum failed; channel values are zero
    pub corrupt: bool,
}

/// Shared "started" flag deciding whether samples are forwarded.
///
/// Clones share the flag. Both transitions are idempotent.
#[derive(Clone, Debug, Default)]
pub struct StartGate {
    started: Arc<Mutex<bool>>,
}

impl StartGate {
    /// Create a gate in the stopped position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A panicked holder cannot leave a bool half-written
        self.started.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open the gate. Returns `true` if it was closed.
    pub fn start(&self) -> bool {
        !std::mem::replace(&mut *self.lock(), true)
    }

    /// Close the gate. Returns `true` if it was open.
    pub fn stop(&self) -> bool {
        std::mem::replace(&mut *self.lock(), false)
    }

    /// Whether samples are currently forwarded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.lock()
    }
}

/// Consumer callback.
pub type SampleCallback = Box<dyn FnMut(TelemetrySample) + Send>;

/// Builds [`TelemetrySample`]s and passes them to the consumer while the
/// gate is open.
pub struct SampleEmitter {
    gate: StartGate,
    output_channels: usize,
    sequence: u64,
    on_sample: SampleCallback,
}

impl SampleEmitter {
    /// Create an emitter capped at `output_channels` channels.
    #[must_use]
    pub fn new(output_channels: usize, gate: StartGate, on_sample: SampleCallback) -> Self {
        Self { gate, output_channels, sequence: 0, on_sample }
    }

    /// The gate this emitter obeys.
    #[must_use]
    pub fn gate(&self) -> &StartGate {
        &self.gate
    }

    /// Forward `frame` if started. Returns whether the callback ran.
    pub fn emit(&mut self, frame: &DecodedFrame, released_us: u64) -> bool {
        if !self.gate.is_started() {
            return false;
        }

        let channels = frame
            .channels()
            .iter()
            .take(self.output_channels)
            .map(|&value| f32::from(value))
            .collect();

        let sample = TelemetrySample {
            sequence: self.sequence,
            variant: frame.variant,
            channels,
            arrival_us: frame.arrival_us,
            released_us,
            status: frame.status,
            sub_mode: frame.sub_mode,
            corrupt: frame.checksum.is_mismatch(),
        };
        self.sequence += 1;
        (self.on_sample)(sample);
        true
    }
}

impl std::fmt::Debug for SampleEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleEmitter")
            .field("gate", &self.gate)
            .field("output_channels", &self.output_channels)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
