//! Error types for the telemetry wire layer
//!
//! These errors work in `no_std` environments. Frame-level anomalies that the
//! decoder heals by itself (resynchronization noise, checksum mismatches) are
//! not errors; they are reported through [`crate::frame::Step`] and
//! [`crate::frame::ChecksumStatus`] instead. The types here cover caller
//! misuse and invariant violations that force a reset.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Decode Errors
// ============================================================================

/// Defensive errors raised by the frame decoder.
///
/// Every variant leaves the decoder reset to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    /// A byte was fed while a completed frame was still waiting to be taken
    UnconsumedFrame {
        /// The byte that arrived too early
        byte: u8,
    },
    /// The accumulator cursor ran past the frame length
    CursorOverrun {
        /// Cursor position observed
        cursor: usize,
        /// Frame length for the active variant
        expected: usize,
    },
    /// A frame was requested before the decoder reached `Complete`
    FrameNotReady,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnconsumedFrame { byte } => {
                write!(f, "Byte 0x{byte:02X} fed while a completed frame was pending")
            }
            Self::CursorOverrun { cursor, expected } => {
                write!(f, "Accumulator cursor {cursor} exceeds frame length {expected}")
            }
            Self::FrameNotReady => write!(f, "No completed frame available"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DecodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::UnconsumedFrame { byte } => defmt::write!(f, "Unconsumed frame: {:02X}", byte),
            Self::CursorOverrun { cursor, expected } => {
                defmt::write!(f, "Cursor {} > {}", cursor, expected);
            }
            Self::FrameNotReady => defmt::write!(f, "Frame not ready"),
        }
    }
}

// ============================================================================
// Encode Errors
// ============================================================================

/// Errors while building a wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodeError {
    /// Wrong number of channel values for the variant
    ChannelCount {
        /// Values supplied
        got: usize,
        /// Values the variant carries
        expected: usize,
    },
    /// Sub-mode outside the variant's sync range
    SubModeOutOfRange {
        /// Requested sub-mode
        sub_mode: u8,
        /// Number of sync values the variant accepts
        available: u8,
    },
    /// Output buffer too small
    BufferOverflow {
        /// Required size
        required: usize,
        /// Available size
        available: usize,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelCount { got, expected } => {
                write!(f, "Channel count mismatch: got {got}, variant carries {expected}")
            }
            Self::SubModeOutOfRange { sub_mode, available } => {
                write!(f, "Sub-mode {sub_mode} out of range (0..{available})")
            }
            Self::BufferOverflow { required, available } => {
                write!(f, "Buffer overflow: need {required} bytes, have {available}")
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EncodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ChannelCount { got, expected } => {
                defmt::write!(f, "Channels: {} != {}", got, expected);
            }
            Self::SubModeOutOfRange { sub_mode, available } => {
                defmt::write!(f, "Sub-mode {} >= {}", sub_mode, available);
            }
            Self::BufferOverflow { required, available } => {
                defmt::write!(f, "Overflow: {} > {}", required, available);
            }
        }
    }
}

// ============================================================================
// Variant Errors
// ============================================================================

/// Unknown protocol variant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownVariant {
    /// The identifier that was rejected
    pub id: u8,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown protocol variant {} (expected 1-6)", self.id)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UnknownVariant {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Unknown variant {}", self.id);
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

#[cfg(feature = "std")]
impl std::error::Error for UnknownVariant {}
