//! Byte-level frame decoder
//!
//! [`FrameDecoder`] owns one [`FrameAccumulator`] and advances it one byte at
//! a time through `Idle → Accumulating → Complete`. The caller takes the
//! finished frame with [`FrameDecoder::take_frame`], which validates the
//! CRC-16 trailer (where present) and resets the accumulator to `Idle`.
//!
//! Noise while `Idle` is discarded silently. Bytes fed while a completed
//! frame is still pending are a caller bug: the pending frame is dropped and
//! the decoder resets.
//!
//! # Example
//!
//! ```
//! use rootstar_telemetry_core::frame::{FrameDecoder, Step};
//! use rootstar_telemetry_core::protocol::ProtocolVariant;
//!
//! let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
//! let mut last = Step::Discarded;
//! for byte in [0xC0, 0x00, 0x0A, 0x00, 0x14] {
//!     last = decoder.consume_byte(byte, 0);
//! }
//! assert_eq!(last, Step::Complete);
//!
//! let frame = decoder.take_frame().unwrap();
//! assert_eq!(frame.channels().as_slice(), &[10, 20]);
//! ```

use heapless::Vec;

use crate::crc;
use crate::error::DecodeError;
use crate::layout;
use crate::protocol::{
    ChannelLayout, ProtocolVariant, SyncRule, VariantDescriptor, SAMPLE_BUFFER_WORDS,
};

/// Largest frame (sync byte included) of any variant.
pub const MAX_FRAME_BYTES: usize = 164;

// ============================================================================
// Accumulator State
// ============================================================================

/// Decode position within the current frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DecodeState {
    /// Waiting for a sync byte
    #[default]
    Idle,
    /// Sync matched, collecting frame bytes
    Accumulating,
    /// All bytes collected; frame must be taken before the next byte
    Complete,
}

/// Mutable per-connection decode state.
///
/// Reset in place at the start of every frame and after every frame
/// resolves. Timestamps are monotonic microseconds supplied by the caller.
#[derive(Clone, Debug)]
pub struct FrameAccumulator {
    /// Current decode state
    pub state: DecodeState,
    /// Bytes consumed since the sync byte
    pub cursor: usize,
    /// Bytes after the sync byte that complete the frame
    pub expected_length: usize,
    /// Assembled 16-bit words
    pub sample_buffer: [u16; SAMPLE_BUFFER_WORDS],
    /// Device status bits from the frame trailer
    pub status_byte: u8,
    /// Copy of every byte since the sync byte (checksum variants only)
    pub raw_payload: Vec<u8, MAX_FRAME_BYTES>,
    /// Checksum declared in the frame trailer
    pub declared_checksum: u16,
    /// Sync offset within the variant's sync range
    pub sub_mode: u8,
    /// Frame counter from the header (variant 2)
    pub counter: Option<u8>,
    /// Timestamp of the current sync byte
    pub arrival_us: u64,
    /// Timestamp of the previous sync byte
    pub previous_arrival_us: Option<u64>,
    /// Whether the active variant carries a CRC trailer
    pub uses_checksum: bool,
    synced_once: bool,
}

impl FrameAccumulator {
    /// Create an idle accumulator for a variant.
    #[must_use]
    pub fn new(descriptor: &VariantDescriptor) -> Self {
        Self {
            state: DecodeState::Idle,
            cursor: 0,
            expected_length: descriptor.expected_length(),
            sample_buffer: [0; SAMPLE_BUFFER_WORDS],
            status_byte: 0,
            raw_payload: Vec::new(),
            declared_checksum: 0,
            sub_mode: 0,
            counter: None,
            arrival_us: 0,
            previous_arrival_us: None,
            uses_checksum: descriptor.has_checksum,
            synced_once: false,
        }
    }

    /// Return to `Idle`, keeping arrival history for timing reconciliation.
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.cursor = 0;
        self.raw_payload.clear();
    }

    /// Forget arrival history as well, as after a reconnect.
    pub fn reset_history(&mut self) {
        self.reset();
        self.previous_arrival_us = None;
        self.synced_once = false;
    }

    fn begin(&mut self, descriptor: &VariantDescriptor, sync: u8, sub_mode: u8, now_us: u64) {
        self.state = DecodeState::Accumulating;
        self.cursor = 0;
        self.expected_length = descriptor.expected_length();
        self.sample_buffer = [0; SAMPLE_BUFFER_WORDS];
        self.status_byte = 0;
        self.declared_checksum = 0;
        self.sub_mode = sub_mode;
        self.counter = None;
        self.previous_arrival_us = self.synced_once.then_some(self.arrival_us);
        self.arrival_us = now_us;
        self.synced_once = true;
        self.raw_payload.clear();
        if self.uses_checksum {
            // Capacity is the largest frame, so the sync byte always fits
            let _ = self.raw_payload.push(sync);
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Result of feeding one byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Not a sync byte while `Idle`; ignored
    Discarded,
    /// Sync byte matched, a new frame started
    Synced,
    /// Byte consumed, frame still incomplete
    Accepted,
    /// Header byte did not match; back to `Idle`
    Rejected,
    /// Frame complete, ready for [`FrameDecoder::take_frame`]
    Complete,
    /// Defensive reset after a caller or invariant error
    Fault(DecodeError),
}

/// Outcome of CRC validation for a taken frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Variant carries no checksum
    NotPresent,
    /// Computed CRC matches the trailer
    Valid,
    /// Computed CRC disagrees with the trailer; samples were zeroed
    Mismatch {
        /// Value from the frame trailer
        declared: u16,
        /// Value computed over the payload
        computed: u16,
    },
}

impl ChecksumStatus {
    /// Whether the frame failed validation.
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}

/// A completed, checksum-validated frame.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    /// Variant the frame was decoded with
    pub variant: ProtocolVariant,
    /// Sample buffer at completion (zeroed on checksum mismatch)
    pub words: [u16; SAMPLE_BUFFER_WORDS],
    /// Status byte from the trailer (0 when absent)
    pub status: u8,
    /// Sync offset within the variant's sync range
    pub sub_mode: u8,
    /// Header frame counter (variant 2)
    pub counter: Option<u8>,
    /// Timestamp of this frame's sync byte
    pub arrival_us: u64,
    /// Timestamp of the previous sync byte
    pub previous_arrival_us: Option<u64>,
    /// CRC validation result
    pub checksum: ChecksumStatus,
}

impl DecodedFrame {
    /// Channel values in emission order for this variant.
    #[must_use]
    pub fn channels(&self) -> Vec<u16, SAMPLE_BUFFER_WORDS> {
        layout::project(self.variant.descriptor(), &self.words)
    }

    /// Microseconds since the previous sync byte, if there was one.
    #[must_use]
    pub fn inter_arrival_us(&self) -> Option<u64> {
        self.previous_arrival_us.map(|prev| self.arrival_us.saturating_sub(prev))
    }
}

/// Per-connection frame decoder for one protocol variant.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    descriptor: &'static VariantDescriptor,
    accumulator: FrameAccumulator,
}

impl FrameDecoder {
    /// Create a decoder for `variant`.
    #[must_use]
    pub fn new(variant: ProtocolVariant) -> Self {
        let descriptor = variant.descriptor();
        Self { descriptor, accumulator: FrameAccumulator::new(descriptor) }
    }

    /// Active variant.
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.descriptor.variant
    }

    /// Current decode state.
    #[must_use]
    pub fn state(&self) -> DecodeState {
        self.accumulator.state
    }

    /// Read-only view of the accumulator.
    #[must_use]
    pub fn accumulator(&self) -> &FrameAccumulator {
        &self.accumulator
    }

    /// Abandon any partial frame.
    pub fn reset(&mut self) {
        self.accumulator.reset();
    }

    /// Abandon any partial frame and forget arrival history.
    pub fn reset_connection(&mut self) {
        self.accumulator.reset_history();
    }

    /// Feed one byte received at `now_us`.
    pub fn consume_byte(&mut self, byte: u8, now_us: u64) -> Step {
        match self.accumulator.state {
            DecodeState::Idle => self.consume_idle(byte, now_us),
            DecodeState::Accumulating => self.consume_frame_byte(byte, now_us),
            DecodeState::Complete => {
                self.accumulator.reset();
                Step::Fault(DecodeError::UnconsumedFrame { byte })
            }
        }
    }

    fn consume_idle(&mut self, byte: u8, now_us: u64) -> Step {
        match self.descriptor.sync.matches(byte) {
            Some(sub_mode) => {
                self.accumulator.begin(self.descriptor, byte, sub_mode, now_us);
                Step::Synced
            }
            None => Step::Discarded,
        }
    }

    fn consume_frame_byte(&mut self, byte: u8, now_us: u64) -> Step {
        let desc = self.descriptor;
        let acc = &mut self.accumulator;
        let cursor = acc.cursor;

        if cursor >= acc.expected_length {
            let expected = acc.expected_length;
            acc.reset();
            return Step::Fault(DecodeError::CursorOverrun { cursor, expected });
        }

        if cursor < desc.data_start() {
            if !header_byte_ok(desc, cursor, byte) {
                acc.reset();
                // The rejected byte may itself open the next frame
                return match self.consume_idle(byte, now_us) {
                    Step::Synced => Step::Synced,
                    _ => Step::Rejected,
                };
            }
            if cursor == desc.data_start() - 1 {
                acc.counter = Some(byte);
            }
        } else if cursor < desc.data_end() {
            let position = cursor - desc.data_start();
            let slot = desc.layout.slot(position);
            if position % 2 == 0 {
                acc.sample_buffer[slot] = u16::from(byte) << 8;
            } else {
                acc.sample_buffer[slot] = acc.sample_buffer[slot]
                    .wrapping_add(u16::from(byte))
                    .wrapping_add(desc.bias);
            }
        } else if Some(cursor) == desc.status_offset() {
            acc.status_byte = byte;
            if desc.layout == ChannelLayout::Interleaved {
                for sample in 0..desc.data_words / 2 {
                    acc.sample_buffer[3 * sample + 2] = u16::from(byte);
                }
            }
        } else if let Some(offset) = desc.checksum_offset() {
            if cursor == offset {
                acc.declared_checksum = u16::from(byte) << 8;
            } else {
                acc.declared_checksum += u16::from(byte);
            }
        }

        let in_checksum = desc.checksum_offset().is_some_and(|offset| cursor >= offset);
        if acc.uses_checksum && !in_checksum {
            let _ = acc.raw_payload.push(byte);
        }

        acc.cursor += 1;
        if acc.cursor == acc.expected_length {
            acc.state = DecodeState::Complete;
            Step::Complete
        } else {
            Step::Accepted
        }
    }

    /// Take the completed frame and reset to `Idle`.
    ///
    /// On a CRC mismatch the frame is still returned, with its sample words
    /// zeroed and [`ChecksumStatus::Mismatch`] set.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FrameNotReady`] unless the state is `Complete`.
    pub fn take_frame(&mut self) -> Result<DecodedFrame, DecodeError> {
        if self.accumulator.state != DecodeState::Complete {
            return Err(DecodeError::FrameNotReady);
        }

        let acc = &mut self.accumulator;
        let checksum = if acc.uses_checksum {
            let computed = crc::crc16(&acc.raw_payload);
            if computed == acc.declared_checksum {
                ChecksumStatus::Valid
            } else {
                acc.sample_buffer = [0; SAMPLE_BUFFER_WORDS];
                ChecksumStatus::Mismatch { declared: acc.declared_checksum, computed }
            }
        } else {
            ChecksumStatus::NotPresent
        };

        let frame = DecodedFrame {
            variant: self.descriptor.variant,
            words: acc.sample_buffer,
            status: acc.status_byte,
            sub_mode: acc.sub_mode,
            counter: acc.counter,
            arrival_us: acc.arrival_us,
            previous_arrival_us: acc.previous_arrival_us,
            checksum,
        };
        acc.reset();
        Ok(frame)
    }
}

fn header_byte_ok(desc: &VariantDescriptor, cursor: usize, byte: u8) -> bool {
    match desc.sync {
        SyncRule::Pair { second, version, .. } => match cursor {
            0 => byte == second,
            1 => byte == version,
            _ => true,
        },
        SyncRule::Single(_) | SyncRule::Range { .. } => true,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_frame;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8], now_us: u64) -> Step {
        let mut last = Step::Discarded;
        for &byte in bytes {
            last = decoder.consume_byte(byte, now_us);
        }
        last
    }

    #[test]
    fn test_two_channel_scenario() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
        let bytes = [0xC0, 0x00, 0x0A, 0x00, 0x14];

        for (i, &byte) in bytes.iter().enumerate() {
            let step = decoder.consume_byte(byte, 0);
            if i < bytes.len() - 1 {
                assert_ne!(step, Step::Complete);
            } else {
                assert_eq!(step, Step::Complete);
            }
        }

        assert_eq!(decoder.state(), DecodeState::Complete);
        assert_eq!(&decoder.accumulator().sample_buffer[..2], &[10, 20]);
    }

    #[test]
    fn test_idle_noise_discarded() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
        for byte in [0x00, 0x12, 0xFF, 0xC1] {
            assert_eq!(decoder.consume_byte(byte, 0), Step::Discarded);
            assert_eq!(decoder.state(), DecodeState::Idle);
        }
        assert_eq!(decoder.consume_byte(0xC0, 0), Step::Synced);
        assert_eq!(decoder.state(), DecodeState::Accumulating);
    }

    #[test]
    fn test_sample_buffer_zeroed_on_sync() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::FourChannel);
        let frame = encode_frame(ProtocolVariant::FourChannel, &[1, 2, 3, 4], 0x11, 0).unwrap();
        assert_eq!(feed(&mut decoder, &frame, 0), Step::Complete);
        decoder.take_frame().unwrap();

        // Partial frame: only the first word arrives
        feed(&mut decoder, &[0xB0, 0x00, 0x09], 10);
        assert_eq!(&decoder.accumulator().sample_buffer[..4], &[9, 0, 0, 0]);
    }

    #[test]
    fn test_roundtrip_every_variant() {
        for variant in ProtocolVariant::ALL {
            let desc = variant.descriptor();
            let channels: std::vec::Vec<u16> = (0..desc.output_channels)
                .map(|i| (i as u16).wrapping_mul(1021).wrapping_add(7))
                .collect();
            let bytes = encode_frame(variant, &channels, 0x5C, 0).unwrap();

            let mut decoder = FrameDecoder::new(variant);
            assert_eq!(feed(&mut decoder, &bytes, 0), Step::Complete, "{variant}");

            let frame = decoder.take_frame().unwrap();
            assert!(!frame.checksum.is_mismatch(), "{variant}");
            assert_eq!(frame.channels().as_slice(), channels.as_slice(), "{variant}");
            if desc.has_status {
                assert_eq!(frame.status, 0x5C, "{variant}");
            }
            assert_eq!(decoder.state(), DecodeState::Idle);
        }
    }

    #[test]
    fn test_checksum_variant_valid() {
        let channels = [100, 2000, 30000, 65535];
        let bytes = encode_frame(ProtocolVariant::FourChannelCrc, &channels, 0x03, 2).unwrap();
        assert_eq!(bytes[0], 0xF2);

        let mut decoder = FrameDecoder::new(ProtocolVariant::FourChannelCrc);
        assert_eq!(feed(&mut decoder, &bytes, 0), Step::Complete);

        let frame = decoder.take_frame().unwrap();
        assert_eq!(frame.checksum, ChecksumStatus::Valid);
        assert_eq!(frame.sub_mode, 2);
        assert_eq!(frame.channels().as_slice(), &channels);
    }

    #[test]
    fn test_checksum_variant_corrupted_trailer() {
        let channels = [100, 2000, 30000, 65535];
        let mut bytes = encode_frame(ProtocolVariant::FourChannelCrc, &channels, 0x03, 0).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let mut decoder = FrameDecoder::new(ProtocolVariant::FourChannelCrc);
        assert_eq!(feed(&mut decoder, &bytes, 0), Step::Complete);

        let frame = decoder.take_frame().unwrap();
        assert!(frame.checksum.is_mismatch());
        assert_eq!(frame.channels().as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_checksum_excludes_trailer_includes_sync() {
        let bytes = encode_frame(ProtocolVariant::FourChannelCrc, &[1, 2, 3, 4], 0, 1).unwrap();
        let mut decoder = FrameDecoder::new(ProtocolVariant::FourChannelCrc);
        feed(&mut decoder, &bytes, 0);

        let payload = &decoder.accumulator().raw_payload;
        assert_eq!(payload.as_slice(), &bytes[..bytes.len() - 2]);
        assert_eq!(payload[0], 0xF1);
    }

    #[test]
    fn test_interleaved_bias_applied() {
        let mut bytes = [0u8; 164];
        bytes[0] = 0xF8;
        // Channel 1, sample 0: raw 0x0000 → 512
        // Channel 2, sample 0: raw 0xFFFF → wraps to 511
        bytes[1 + 8] = 0xFF;
        bytes[1 + 9] = 0xFF;
        let crc = crate::crc::crc16(&bytes[..162]);
        bytes[162] = (crc >> 8) as u8;
        bytes[163] = crc as u8;

        let mut decoder = FrameDecoder::new(ProtocolVariant::InterleavedBlock);
        assert_eq!(feed(&mut decoder, &bytes, 0), Step::Complete);
        let frame = decoder.take_frame().unwrap();
        assert_eq!(frame.checksum, ChecksumStatus::Valid);
        assert_eq!(frame.words[0], 512);
        assert_eq!(frame.words[1], 511);
    }

    #[test]
    fn test_interleaved_status_fills_triples() {
        let channels = [0u16; 80];
        let bytes = encode_frame(ProtocolVariant::InterleavedBlock, &channels, 0x42, 0).unwrap();
        let mut decoder = FrameDecoder::new(ProtocolVariant::InterleavedBlock);
        feed(&mut decoder, &bytes, 0);
        let frame = decoder.take_frame().unwrap();

        for sample in 0..40 {
            assert_eq!(frame.words[3 * sample + 2], 0x42);
        }
    }

    #[test]
    fn test_modular_eeg_header() {
        let channels = [1, 2, 3, 4, 5, 1023];
        let bytes = encode_frame(ProtocolVariant::ModularEeg, &channels, 0x0F, 77).unwrap();
        assert_eq!(&bytes[..4], &[0xA5, 0x5A, 0x02, 77]);

        let mut decoder = FrameDecoder::new(ProtocolVariant::ModularEeg);
        assert_eq!(feed(&mut decoder, &bytes, 0), Step::Complete);
        let frame = decoder.take_frame().unwrap();
        assert_eq!(frame.counter, Some(77));
        assert_eq!(frame.status, 0x0F);
        assert_eq!(frame.channels().as_slice(), &channels);
    }

    #[test]
    fn test_modular_eeg_bad_second_sync_resynchronizes() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::ModularEeg);
        assert_eq!(decoder.consume_byte(0xA5, 0), Step::Synced);
        assert_eq!(decoder.consume_byte(0x00, 0), Step::Rejected);
        assert_eq!(decoder.state(), DecodeState::Idle);

        // A repeated first sync byte restarts the frame
        assert_eq!(decoder.consume_byte(0xA5, 0), Step::Synced);
        assert_eq!(decoder.consume_byte(0xA5, 0), Step::Synced);
        assert_eq!(decoder.consume_byte(0x5A, 0), Step::Accepted);
        assert_eq!(decoder.consume_byte(0x03, 0), Step::Rejected);
    }

    #[test]
    fn test_byte_while_complete_forces_reset() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
        feed(&mut decoder, &[0xC0, 0, 1, 0, 2], 0);
        assert_eq!(decoder.state(), DecodeState::Complete);

        let step = decoder.consume_byte(0xC0, 0);
        assert_eq!(step, Step::Fault(DecodeError::UnconsumedFrame { byte: 0xC0 }));
        assert_eq!(decoder.state(), DecodeState::Idle);
        assert_eq!(decoder.take_frame().unwrap_err(), DecodeError::FrameNotReady);
    }

    #[test]
    fn test_take_frame_before_complete() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
        feed(&mut decoder, &[0xC0, 0x01], 0);
        assert!(matches!(decoder.take_frame(), Err(DecodeError::FrameNotReady)));
        assert_eq!(decoder.state(), DecodeState::Accumulating);
    }

    #[test]
    fn test_arrival_history() {
        let mut decoder = FrameDecoder::new(ProtocolVariant::TwoChannel);
        feed(&mut decoder, &[0xC0, 0, 1, 0, 2], 1_000);
        let first = decoder.take_frame().unwrap();
        assert_eq!(first.previous_arrival_us, None);

        feed(&mut decoder, &[0xC0, 0, 1, 0, 2], 81_000);
        let second = decoder.take_frame().unwrap();
        assert_eq!(second.previous_arrival_us, Some(1_000));
        assert_eq!(second.inter_arrival_us(), Some(80_000));

        decoder.reset_connection();
        feed(&mut decoder, &[0xC0, 0, 1, 0, 2], 90_000);
        assert_eq!(decoder.take_frame().unwrap().previous_arrival_us, None);
    }
}
