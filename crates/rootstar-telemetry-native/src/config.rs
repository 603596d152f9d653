//! Acquisition configuration
//!
//! Loaded from TOML; every field has a default so a file only needs to name
//! what it changes.
//!
//! ```toml
//! variant = 5
//! output_channels = 2
//! wait_strategy = "spin"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//!
//! [reconnect]
//! enabled = true
//! delay_ms = 2000
//! max_attempts = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rootstar_telemetry_core::ProtocolVariant;

use crate::clock::WaitStrategy;
use crate::error::ConfigError;

/// Stall interval after which a partial frame is abandoned.
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 1000;

/// Serial link settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout of the port driver
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { port: None, baud_rate: 57_600, read_timeout_ms: 100 }
    }
}

/// What to do when the transport fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectPolicy {
    /// Reopen the transport after a failure
    pub enabled: bool,
    /// Delay before each reopen attempt
    pub delay_ms: u64,
    /// Attempts per failure before giving up (0 = unlimited)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { enabled: true, delay_ms: 2000, max_attempts: 0 }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Delay before each attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether `attempt` (1-based) is allowed.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }
}

/// Configuration for one acquisition connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Wire protocol variant (1-6)
    pub variant: ProtocolVariant,
    /// Cap on emitted channels; extra channels are dropped
    pub output_channels: Option<usize>,
    /// Abandon a frame after this long without a new byte
    pub frame_timeout_ms: u64,
    /// Pause between reads when no byte is buffered
    pub idle_poll_ms: u64,
    /// How waits are performed
    pub wait_strategy: WaitStrategy,
    /// Spread back-to-back frame pairs evenly over the super-frame
    pub reconcile_timing: bool,
    /// Bound on joining the acquisition thread at shutdown
    pub join_timeout_ms: u64,
    /// Serial link
    pub serial: SerialConfig,
    /// Transport failure handling
    pub reconnect: ReconnectPolicy,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::TwoChannel,
            output_channels: None,
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            idle_poll_ms: 1,
            wait_strategy: WaitStrategy::Sleep,
            reconcile_timing: true,
            join_timeout_ms: 2000,
            serial: SerialConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Default configuration for a variant.
    #[must_use]
    pub fn for_variant(variant: ProtocolVariant) -> Self {
        Self { variant, ..Self::default() }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, plus the
    /// errors of [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_channels == Some(0) {
            return Err(ConfigError::Invalid {
                field: "output_channels",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "serial.baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Channels emitted per sample after applying the cap.
    #[must_use]
    pub fn effective_channels(&self) -> usize {
        let natural = self.variant.descriptor().output_channels;
        self.output_channels.map_or(natural, |cap| cap.min(natural))
    }

    /// Frame stall timeout.
    #[must_use]
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Idle poll interval.
    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Thread join bound.
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
