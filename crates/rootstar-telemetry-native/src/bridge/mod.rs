//! Byte transports feeding the frame decoder
//!
//! The decoder only needs two capabilities from a device link: read one byte
//! if one is buffered, and report how many bytes are buffered. Everything
//! platform specific stays behind [`ByteSource`].
//!
//! - [`usb`]: Serial port transport (requires `usb` feature)
//! - [`simulated`]: In-memory transport driven by a [`crate::clock::Clock`]

use std::io;

#[cfg(feature = "usb")]
pub mod usb;

pub mod simulated;

#[cfg(feature = "usb")]
pub use usb::SerialTransport;

pub use simulated::{synthetic_schedule, SimulatedTransport};

/// Source of single bytes from a device link.
pub trait ByteSource: Send {
    /// Read one byte, or `None` if nothing arrived within the driver timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the link should be considered lost.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Number of bytes buffered and readable without blocking.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the link should be considered lost.
    fn bytes_available(&mut self) -> io::Result<usize>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}
