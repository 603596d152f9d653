//! Rootstar Telemetry Core - `no_std` serial telemetry decoding
//!
//! This crate turns the raw byte stream of an external biosignal sensor into
//! validated frames of 16-bit channel words. It is hardware and platform
//! independent: bytes go in one at a time together with a monotonic
//! timestamp, completed frames come out.
//!
//! # Modules
//!
//! - [`protocol`]: The six wire variants and their framing descriptors
//! - [`frame`]: Frame accumulator and byte-level decoder state machine
//! - [`crc`]: CRC-16 checksum used by variants 5 and 6
//! - [`layout`]: Projection of the sample buffer into channel order
//! - [`encode`]: Frame encoder for simulated devices and tests
//! - [`error`]: Error types
//!
//! # Features
//!
//! - `std`: Enable standard library support (`std::error::Error` impls)
//! - `defmt`: Enable `defmt` formatting for embedded logging
//!
//! # Example
//!
//! ```rust
//! use rootstar_telemetry_core::encode::encode_frame;
//! use rootstar_telemetry_core::frame::{FrameDecoder, Step};
//! use rootstar_telemetry_core::protocol::ProtocolVariant;
//!
//! let variant = ProtocolVariant::FourChannelCrc;
//! let bytes = encode_frame(variant, &[512, 480, 530, 505], 0x01, 0).unwrap();
//!
//! let mut decoder = FrameDecoder::new(variant);
//! for &byte in &bytes {
//!     if decoder.consume_byte(byte, 0) == Step::Complete {
//!         let frame = decoder.take_frame().unwrap();
//!         assert_eq!(frame.channels().as_slice(), &[512, 480, 530, 505]);
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod crc;
pub mod encode;
pub mod error;
pub mod frame;
pub mod layout;
pub mod protocol;

// Re-export commonly used types at crate root
pub use error::{DecodeError, EncodeError, UnknownVariant};
pub use frame::{ChecksumStatus, DecodeState, DecodedFrame, FrameAccumulator, FrameDecoder, Step};
pub use protocol::{ProtocolVariant, VariantDescriptor, SAMPLE_BUFFER_WORDS};
