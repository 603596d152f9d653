//! Wire protocol variants for serial telemetry devices
//!
//! The device stream carries no protocol identifier. The active variant is
//! chosen once at configuration time and fixes:
//! - which byte values start a frame
//! - how many bytes follow the sync byte
//! - whether a status byte and a CRC-16 trailer are present
//! - how data bytes map onto sample buffer slots
//!
//! Byte layout after the sync byte, per variant:
//!
//! | Variant | Sync | Header | Data | Status | CRC |
//! |---|---|---|---|---|---|
//! | 1 | `0xC0` | - | 2 words | - | - |
//! | 2 | `0xA5` | `0x5A`, version `0x02`, counter | 6 words | 1 | - |
//! | 3 | `0xE0` | - | 2 words | - | - |
//! | 4 | `0xB0` | - | 4 words | 1 | - |
//! | 5 | `0xF0..=0xF4` | - | 4 words | 1 | 2 |
//! | 6 | `0xF8..=0xFC` | - | 2 × 40 interleaved words | 1 | 2 |
//!
//! All words are big-endian.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownVariant;

/// Capacity of the per-frame sample buffer, in 16-bit words.
pub const SAMPLE_BUFFER_WORDS: usize = 128;

/// Bias added to every variant 6 sample word.
pub const INTERLEAVED_BIAS: u16 = 512;

/// Samples per channel in a variant 6 block.
pub const INTERLEAVED_SAMPLES: usize = 40;

/// Bytes per 4-sample, 2-channel interleave block.
const INTERLEAVE_BLOCK_BYTES: usize = 16;

// ============================================================================
// Protocol Variants
// ============================================================================

/// Protocol variant identifier.
///
/// Converted to and from the numeric id (1-6) used in configuration files.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ProtocolVariant {
    /// Single sync byte, two channel words
    TwoChannel = 1,
    /// Modular EEG "P2" framing: double sync, version, counter, six words, status
    ModularEeg = 2,
    /// Alternate single sync byte, two channel words
    TwoChannelAlt = 3,
    /// Single sync byte, four channel words, status
    FourChannel = 4,
    /// Sub-mode sync range, four channel words, status, CRC-16
    FourChannelCrc = 5,
    /// Sub-mode sync range, 2 × 40 interleaved sample block, status, CRC-16
    InterleavedBlock = 6,
}

impl ProtocolVariant {
    /// All variants in id order.
    pub const ALL: [Self; 6] = [
        Self::TwoChannel,
        Self::ModularEeg,
        Self::TwoChannelAlt,
        Self::FourChannel,
        Self::FourChannelCrc,
        Self::InterleavedBlock,
    ];

    /// Look up a variant by its numeric id.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::TwoChannel),
            2 => Some(Self::ModularEeg),
            3 => Some(Self::TwoChannelAlt),
            4 => Some(Self::FourChannel),
            5 => Some(Self::FourChannelCrc),
            6 => Some(Self::InterleavedBlock),
            _ => None,
        }
    }

    /// Numeric id (1-6).
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Static framing descriptor for this variant.
    #[must_use]
    pub const fn descriptor(self) -> &'static VariantDescriptor {
        match self {
            Self::TwoChannel => &TWO_CHANNEL,
            Self::ModularEeg => &MODULAR_EEG,
            Self::TwoChannelAlt => &TWO_CHANNEL_ALT,
            Self::FourChannel => &FOUR_CHANNEL,
            Self::FourChannelCrc => &FOUR_CHANNEL_CRC,
            Self::InterleavedBlock => &INTERLEAVED_BLOCK,
        }
    }

    /// Whether the device emits frames in back-to-back pairs per 400 ms
    /// super-frame, which the timing reconciler spreads out.
    #[must_use]
    pub const fn emits_paired_frames(self) -> bool {
        self.id() >= 5
    }
}

impl TryFrom<u8> for ProtocolVariant {
    type Error = UnknownVariant;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(UnknownVariant { id })
    }
}

impl From<ProtocolVariant> for u8 {
    fn from(variant: ProtocolVariant) -> Self {
        variant.id()
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TwoChannel => "two-channel",
            Self::ModularEeg => "modular-eeg",
            Self::TwoChannelAlt => "two-channel-alt",
            Self::FourChannel => "four-channel",
            Self::FourChannelCrc => "four-channel-crc",
            Self::InterleavedBlock => "interleaved-block",
        };
        write!(f, "variant {} ({name})", self.id())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolVariant {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "V{}", self.id());
    }
}

// ============================================================================
// Variant Descriptors
// ============================================================================

/// Which byte values start a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncRule {
    /// One fixed sync value
    Single(u8),
    /// Two fixed sync bytes followed by a version byte
    Pair {
        /// First sync byte (matched in `Idle`)
        first: u8,
        /// Second sync byte (checked as the first header byte)
        second: u8,
        /// Required version byte
        version: u8,
    },
    /// `count` contiguous values starting at `base`; the offset is the sub-mode
    Range {
        /// Lowest accepted sync value
        base: u8,
        /// Number of accepted values
        count: u8,
    },
}

impl SyncRule {
    /// Match a byte seen in `Idle`, returning the sub-mode on success.
    #[inline]
    #[must_use]
    pub const fn matches(&self, byte: u8) -> Option<u8> {
        match *self {
            Self::Single(sync) => {
                if byte == sync {
                    Some(0)
                } else {
                    None
                }
            }
            Self::Pair { first, .. } => {
                if byte == first {
                    Some(0)
                } else {
                    None
                }
            }
            Self::Range { base, count } => {
                if byte >= base && byte - base < count {
                    Some(byte - base)
                } else {
                    None
                }
            }
        }
    }

    /// Sync byte that announces `sub_mode`, if the rule has one.
    #[must_use]
    pub const fn sync_for(&self, sub_mode: u8) -> Option<u8> {
        match *self {
            Self::Single(sync) | Self::Pair { first: sync, .. } => {
                if sub_mode == 0 {
                    Some(sync)
                } else {
                    None
                }
            }
            Self::Range { base, count } => {
                if sub_mode < count {
                    Some(base + sub_mode)
                } else {
                    None
                }
            }
        }
    }

    /// Number of distinct sub-modes.
    #[must_use]
    pub const fn sub_modes(&self) -> u8 {
        match *self {
            Self::Single(_) | Self::Pair { .. } => 1,
            Self::Range { count, .. } => count,
        }
    }
}

/// How data bytes are placed in the sample buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Word `n` lands in slot `n`
    Sequential,
    /// Two channels interleaved in 4-sample blocks, re-projected into
    /// (ch1, ch2, status) triples
    Interleaved,
}

impl ChannelLayout {
    /// Buffer slot for the word containing data byte `position`.
    #[inline]
    #[must_use]
    pub const fn slot(self, position: usize) -> usize {
        match self {
            Self::Sequential => position / 2,
            Self::Interleaved => {
                let block = position / INTERLEAVE_BLOCK_BYTES;
                let channel = (position / 8) % 2;
                let sample = ((position % INTERLEAVE_BLOCK_BYTES) - 8 * channel) / 2;
                12 * block + 3 * sample + channel
            }
        }
    }

    /// Data byte position of the high byte for `(sample, channel)` in an
    /// interleaved block. Inverse of [`Self::slot`].
    #[inline]
    #[must_use]
    pub const fn interleaved_position(sample: usize, channel: usize) -> usize {
        INTERLEAVE_BLOCK_BYTES * (sample / 4) + 8 * channel + 2 * (sample % 4)
    }
}

/// Immutable framing definition for one protocol variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VariantDescriptor {
    /// Variant this descriptor belongs to
    pub variant: ProtocolVariant,
    /// Accepted sync values
    pub sync: SyncRule,
    /// Header bytes between the sync byte and the first data byte
    pub header_len: usize,
    /// 16-bit data words in the frame
    pub data_words: usize,
    /// Whether a status byte follows the data
    pub has_status: bool,
    /// Whether a CRC-16 trailer follows the status byte
    pub has_checksum: bool,
    /// Data placement in the sample buffer
    pub layout: ChannelLayout,
    /// Value added to every assembled word (wrapping)
    pub bias: u16,
    /// Channel values produced per frame
    pub output_channels: usize,
}

impl VariantDescriptor {
    /// Offset (after the sync byte) of the first data byte.
    #[inline]
    #[must_use]
    pub const fn data_start(&self) -> usize {
        self.header_len
    }

    /// Offset (after the sync byte) one past the last data byte.
    #[inline]
    #[must_use]
    pub const fn data_end(&self) -> usize {
        self.header_len + 2 * self.data_words
    }

    /// Offset of the status byte, if the variant carries one.
    #[inline]
    #[must_use]
    pub const fn status_offset(&self) -> Option<usize> {
        if self.has_status {
            Some(self.data_end())
        } else {
            None
        }
    }

    /// Offset of the checksum high byte, if the variant carries one.
    #[inline]
    #[must_use]
    pub const fn checksum_offset(&self) -> Option<usize> {
        if self.has_checksum {
            Some(self.data_end() + self.has_status as usize)
        } else {
            None
        }
    }

    /// Bytes that follow the sync byte in a complete frame.
    #[inline]
    #[must_use]
    pub const fn expected_length(&self) -> usize {
        self.data_end() + self.has_status as usize + 2 * self.has_checksum as usize
    }

    /// Total frame size on the wire, sync byte included.
    #[inline]
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        1 + self.expected_length()
    }
}

const TWO_CHANNEL: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::TwoChannel,
    sync: SyncRule::Single(0xC0),
    header_len: 0,
    data_words: 2,
    has_status: false,
    has_checksum: false,
    layout: ChannelLayout::Sequential,
    bias: 0,
    output_channels: 2,
};

const MODULAR_EEG: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::ModularEeg,
    sync: SyncRule::Pair { first: 0xA5, second: 0x5A, version: 0x02 },
    header_len: 3,
    data_words: 6,
    has_status: true,
    has_checksum: false,
    layout: ChannelLayout::Sequential,
    bias: 0,
    output_channels: 6,
};

const TWO_CHANNEL_ALT: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::TwoChannelAlt,
    sync: SyncRule::Single(0xE0),
    header_len: 0,
    data_words: 2,
    has_status: false,
    has_checksum: false,
    layout: ChannelLayout::Sequential,
    bias: 0,
    output_channels: 2,
};

const FOUR_CHANNEL: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::FourChannel,
    sync: SyncRule::Single(0xB0),
    header_len: 0,
    data_words: 4,
    has_status: true,
    has_checksum: false,
    layout: ChannelLayout::Sequential,
    bias: 0,
    output_channels: 4,
};

const FOUR_CHANNEL_CRC: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::FourChannelCrc,
    sync: SyncRule::Range { base: 0xF0, count: 5 },
    header_len: 0,
    data_words: 4,
    has_status: true,
    has_checksum: true,
    layout: ChannelLayout::Sequential,
    bias: 0,
    output_channels: 4,
};

const INTERLEAVED_BLOCK: VariantDescriptor = VariantDescriptor {
    variant: ProtocolVariant::InterleavedBlock,
    sync: SyncRule::Range { base: 0xF8, count: 5 },
    header_len: 0,
    data_words: 2 * INTERLEAVED_SAMPLES,
    has_status: true,
    has_checksum: true,
    layout: ChannelLayout::Interleaved,
    bias: INTERLEAVED_BIAS,
    output_channels: 2 * INTERLEAVED_SAMPLES,
};

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_id_roundtrip() {
        for variant in ProtocolVariant::ALL {
            assert_eq!(ProtocolVariant::from_id(variant.id()), Some(variant));
            assert_eq!(variant.descriptor().variant, variant);
        }
        assert_eq!(ProtocolVariant::from_id(0), None);
        assert_eq!(ProtocolVariant::try_from(7), Err(UnknownVariant { id: 7 }));
    }

    #[test]
    fn test_frame_lengths() {
        let lengths: [usize; 6] = ProtocolVariant::ALL.map(|v| v.descriptor().frame_len());
        assert_eq!(lengths, [5, 17, 5, 10, 12, 164]);
    }

    #[test]
    fn test_trailer_offsets() {
        let desc = ProtocolVariant::FourChannelCrc.descriptor();
        assert_eq!(desc.status_offset(), Some(8));
        assert_eq!(desc.checksum_offset(), Some(9));
        assert_eq!(desc.expected_length(), 11);

        let desc = ProtocolVariant::TwoChannel.descriptor();
        assert_eq!(desc.status_offset(), None);
        assert_eq!(desc.checksum_offset(), None);
    }

    #[test]
    fn test_sync_range_sub_modes() {
        let rule = ProtocolVariant::FourChannelCrc.descriptor().sync;
        assert_eq!(rule.matches(0xEF), None);
        assert_eq!(rule.matches(0xF0), Some(0));
        assert_eq!(rule.matches(0xF4), Some(4));
        assert_eq!(rule.matches(0xF5), None);
        assert_eq!(rule.sync_for(3), Some(0xF3));
        assert_eq!(rule.sync_for(5), None);
    }

    #[test]
    fn test_paired_frames_only_for_crc_variants() {
        let paired: [bool; 6] = ProtocolVariant::ALL.map(ProtocolVariant::emits_paired_frames);
        assert_eq!(paired, [false, false, false, false, true, true]);
    }

    #[test]
    fn test_interleaved_slot_projection() {
        let layout = ChannelLayout::Interleaved;

        // First block: channel 1 bytes 0..8, channel 2 bytes 8..16
        assert_eq!(layout.slot(0), 0);
        assert_eq!(layout.slot(1), 0);
        assert_eq!(layout.slot(2), 3);
        assert_eq!(layout.slot(6), 9);
        assert_eq!(layout.slot(8), 1);
        assert_eq!(layout.slot(14), 10);

        // Second block starts at slot 12
        assert_eq!(layout.slot(16), 12);
        assert_eq!(layout.slot(24), 13);

        // Last byte of the block stays inside the sample buffer
        assert!(layout.slot(2 * 2 * INTERLEAVED_SAMPLES - 1) < SAMPLE_BUFFER_WORDS);
    }

    #[test]
    fn test_interleaved_position_inverts_slot() {
        for sample in 0..INTERLEAVED_SAMPLES {
            for channel in 0..2 {
                let position = ChannelLayout::interleaved_position(sample, channel);
                assert_eq!(ChannelLayout::Interleaved.slot(position), 3 * sample + channel);
                assert_eq!(ChannelLayout::Interleaved.slot(position + 1), 3 * sample + channel);
            }
        }
    }
}
