//! Channel layout projection
//!
//! Turns a frame's sample buffer into the flat channel vector handed to
//! consumers. Sequential variants emit their leading words. The interleaved
//! variant stores (ch1, ch2, status) triples per sample; projection emits
//! `ch1, ch2` for each of the 40 samples and leaves status to the frame.

use heapless::Vec;

use crate::protocol::{ChannelLayout, VariantDescriptor, SAMPLE_BUFFER_WORDS};

/// Project the sample buffer into channel order.
///
/// For the interleaved layout this is not a prefix of the buffer: the
/// third word of every triple is the per-sample status and is excluded,
/// so 80 channels come from the first 120 words.
#[must_use]
pub fn project(
    descriptor: &VariantDescriptor,
    words: &[u16; SAMPLE_BUFFER_WORDS],
) -> Vec<u16, SAMPLE_BUFFER_WORDS> {
    let mut out = Vec::new();
    match descriptor.layout {
        ChannelLayout::Sequential => {
            // output_channels never exceeds the buffer capacity
            let _ = out.extend_from_slice(&words[..descriptor.output_channels]);
        }
        ChannelLayout::Interleaved => {
            for triple in words.chunks_exact(3).take(descriptor.output_channels / 2) {
                let _ = out.push(triple[0]);
                let _ = out.push(triple[1]);
            }
        }
    }
    out
}
