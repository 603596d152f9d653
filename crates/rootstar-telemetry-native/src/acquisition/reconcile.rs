//! Timing reconciliation for paired frames
//!
//! Variants 5 and 6 send two frames back-to-back once per super-frame. The
//! second frame of a pair is held so that samples leave the pipeline evenly
//! spaced at half the super-frame period.

use std::time::Duration;

use rootstar_telemetry_core::DecodedFrame;

/// Physical measurement cycle of paired-frame devices.
pub const SUPER_FRAME: Duration = Duration::from_millis(400);

/// Frames closer than this to their predecessor are the second of a pair.
pub const DETECTION_WINDOW: Duration = Duration::from_millis(150);

/// Spacing the second frame of a pair is stretched to.
pub const PAIR_TARGET: Duration = Duration::from_millis(200);

/// Decides how long a resolved frame must be held before release.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingReconciler {
    enabled: bool,
}

impl TimingReconciler {
    /// Create a reconciler; a disabled one never holds.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Hold required before releasing `frame`, if any.
    ///
    /// Only checksum-valid frames of paired variants are held. Corrupt
    /// frames still count as the predecessor of the next frame because
    /// arrival history is kept by the decoder.
    #[must_use]
    pub fn hold_for(&self, frame: &DecodedFrame) -> Option<Duration> {
        if !self.enabled || !frame.variant.emits_paired_frames() || frame.checksum.is_mismatch() {
            return None;
        }
        let delta = Duration::from_micros(frame.inter_arrival_us()?);
        if delta.is_zero() || delta >= DETECTION_WINDOW {
            return None;
        }
        Some(PAIR_TARGET - delta)
    }
}

impl Default for TimingReconciler {
    fn default() -> Self {
        Self::new(true)
    }
}
