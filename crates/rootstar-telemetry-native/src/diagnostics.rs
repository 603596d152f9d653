//! Decoder diagnostics
//!
//! Frame-level anomalies self-heal inside the decoder, but each one is
//! reported as a [`Diagnostic`] so operators can see link quality. The
//! default sink forwards to `tracing`; [`ChannelDiagnostics`] collects them
//! for inspection.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Diagnostic severity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Routine condition worth recording
    Info,
    /// Data was lost or altered
    Warning,
    /// The connection needs attention
    Error,
}

/// What happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// No byte arrived within the frame timeout; frame abandoned
    FrameTimeout,
    /// CRC-16 disagreed with the trailer; samples zeroed
    ChecksumMismatch,
    /// Frame completed without an empty-buffer observation; discarded
    StaleFrame,
    /// Decoder invariant violated; forced back to idle
    DecoderFault,
    /// Transport read failed
    TransportFailure,
    /// Transport reopened after a failure
    Reconnected,
}

impl DiagnosticCode {
    /// Severity this code is reported with.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::StaleFrame | Self::Reconnected => Severity::Info,
            Self::FrameTimeout | Self::ChecksumMismatch | Self::DecoderFault => Severity::Warning,
            Self::TransportFailure => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FrameTimeout => "frame-timeout",
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::StaleFrame => "stale-frame",
            Self::DecoderFault => "decoder-fault",
            Self::TransportFailure => "transport-failure",
            Self::Reconnected => "reconnected",
        };
        f.write_str(name)
    }
}

/// One diagnostic event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Event kind
    pub code: DiagnosticCode,
    /// Human-readable detail
    pub detail: String,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    #[must_use]
    pub fn new(code: DiagnosticCode, detail: impl Into<String>) -> Self {
        Self { severity: code.severity(), code, detail: detail.into() }
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink: Send {
    /// Handle one diagnostic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Sink that logs through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        let Diagnostic { severity, code, detail } = diagnostic;
        match severity {
            Severity::Info => tracing::info!(%code, "{detail}"),
            Severity::Warning => tracing::warn!(%code, "{detail}"),
            Severity::Error => tracing::error!(%code, "{detail}"),
        }
    }
}

/// Sink that forwards diagnostics over a channel.
#[derive(Clone, Debug)]
pub struct ChannelDiagnostics {
    tx: Sender<Diagnostic>,
}

impl ChannelDiagnostics {
    /// Create a sink and the receiver that collects its output.
    #[must_use]
    pub fn new() -> (Self, Receiver<Diagnostic>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl DiagnosticSink for ChannelDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(diagnostic);
    }
}
