//! Wire frame encoder
//!
//! Builds byte-exact frames for any variant, the inverse of the decoder.
//! Used by simulated devices and by tests that need known-good input.
//!
//! Format per variant is described in [`crate::protocol`]. For the
//! interleaved variant the encoder subtracts the 512 bias and scatters the
//! `ch1, ch2` sample pairs into 4-sample channel blocks.

use heapless::Vec;

use crate::crc;
use crate::error::EncodeError;
use crate::frame::MAX_FRAME_BYTES;
use crate::protocol::{ChannelLayout, ProtocolVariant, SyncRule};

/// Encoded frame bytes.
pub type FrameBytes = Vec<u8, MAX_FRAME_BYTES>;

/// Encode one frame.
///
/// `channels` must hold exactly the variant's channel count, in the order
/// the decoder emits them. `tag` is the sub-mode for sync-range variants
/// (5 and 6), the frame counter for variant 2, and ignored otherwise.
///
/// # Errors
///
/// Returns [`EncodeError`] if the channel count or sub-mode does not fit
/// the variant.
pub fn encode_frame(
    variant: ProtocolVariant,
    channels: &[u16],
    status: u8,
    tag: u8,
) -> Result<FrameBytes, EncodeError> {
    let mut buffer = [0u8; MAX_FRAME_BYTES];
    let size = encode_frame_into(variant, channels, status, tag, &mut buffer)?;

    let mut out = FrameBytes::new();
    let _ = out.extend_from_slice(&buffer[..size]);
    Ok(out)
}

/// Encode one frame into `buffer`, returning the number of bytes written.
///
/// # Errors
///
/// Returns [`EncodeError::BufferOverflow`] if `buffer` is shorter than the
/// frame, plus the errors of [`encode_frame`].
pub fn encode_frame_into(
    variant: ProtocolVariant,
    channels: &[u16],
    status: u8,
    tag: u8,
    buffer: &mut [u8],
) -> Result<usize, EncodeError> {
    let desc = variant.descriptor();
    let size = desc.frame_len();

    if channels.len() != desc.output_channels {
        return Err(EncodeError::ChannelCount {
            got: channels.len(),
            expected: desc.output_channels,
        });
    }
    if buffer.len() < size {
        return Err(EncodeError::BufferOverflow { required: size, available: buffer.len() });
    }

    let sub_mode = match desc.sync {
        SyncRule::Range { .. } => tag,
        SyncRule::Single(_) | SyncRule::Pair { .. } => 0,
    };
    let sync = desc.sync.sync_for(sub_mode).ok_or(EncodeError::SubModeOutOfRange {
        sub_mode,
        available: desc.sync.sub_modes(),
    })?;

    let frame = &mut buffer[..size];
    frame.fill(0);
    frame[0] = sync;

    // Offsets below are relative to the byte after sync
    let body = &mut frame[1..];
    if let SyncRule::Pair { second, version, .. } = desc.sync {
        body[0] = second;
        body[1] = version;
        body[2] = tag;
    }

    let data = &mut body[desc.data_start()..desc.data_end()];
    match desc.layout {
        ChannelLayout::Sequential => {
            for (chunk, &value) in data.chunks_exact_mut(2).zip(channels) {
                chunk.copy_from_slice(&value.wrapping_sub(desc.bias).to_be_bytes());
            }
        }
        ChannelLayout::Interleaved => {
            for (index, &value) in channels.iter().enumerate() {
                let position = ChannelLayout::interleaved_position(index / 2, index % 2);
                data[position..position + 2]
                    .copy_from_slice(&value.wrapping_sub(desc.bias).to_be_bytes());
            }
        }
    }

    if let Some(offset) = desc.status_offset() {
        body[offset] = status;
    }

    if let Some(offset) = desc.checksum_offset() {
        let checksum = crc::crc16(&frame[..1 + offset]);
        frame[1 + offset..1 + offset + 2].copy_from_slice(&checksum.to_be_bytes());
    }

    Ok(size)
}
