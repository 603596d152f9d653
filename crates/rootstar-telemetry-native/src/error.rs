//! Error types for host-side acquisition
//!
//! Only failures that need a decision from the owner of a connection are
//! errors here. Corrupt, stalled and stale frames are expected operating
//! conditions and are reported through [`crate::diagnostics`] instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while acquiring telemetry.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The byte transport failed; the current frame was aborted
    #[error("Transport failure: {0}")]
    Transport(#[from] io::Error),

    /// Serial port error
    #[cfg(feature = "usb")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The acquisition thread could not be started
    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Result type for acquisition operations.
pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

/// Errors while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}
