//! Frame stall and staleness tracking

use std::time::Duration;

/// Watches a partially received frame for stalls and records whether the
/// transport buffer has been seen empty since the last resolution.
///
/// A frame that completes without such an observation was already sitting
/// in the driver buffer, typically from before a reconnect, and is stale.
#[derive(Clone, Debug)]
pub struct TimeoutMonitor {
    timeout_us: u64,
    last_progress_us: Option<u64>,
    drained: bool,
}

impl TimeoutMonitor {
    /// Create a monitor that expires after `timeout` without progress.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout_us: u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX),
            last_progress_us: None,
            drained: false,
        }
    }

    /// Start timing a new frame.
    pub fn arm(&mut self, now_us: u64) {
        self.last_progress_us = Some(now_us);
    }

    /// Record a consumed byte.
    pub fn touch(&mut self, now_us: u64) {
        if self.last_progress_us.is_some() {
            self.last_progress_us = Some(now_us);
        }
    }

    /// Stop timing.
    pub fn disarm(&mut self) {
        self.last_progress_us = None;
    }

    /// Whether a frame is being timed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.last_progress_us.is_some()
    }

    /// Whether the stall interval has been exceeded at `now_us`.
    #[must_use]
    pub fn expired(&self, now_us: u64) -> bool {
        self.last_progress_us
            .is_some_and(|last| now_us.saturating_sub(last) > self.timeout_us)
    }

    /// Record that the transport had nothing buffered.
    pub fn observe_empty(&mut self) {
        self.drained = true;
    }

    /// Whether an empty buffer was seen since the last resolution.
    #[must_use]
    pub fn has_drained(&self) -> bool {
        self.drained
    }

    /// Close out the current frame; returns whether it was fresh.
    pub fn resolve(&mut self) -> bool {
        self.last_progress_us = None;
        std::mem::take(&mut self.drained)
    }

    /// Forget everything; the next frame must be preceded by an empty
    /// observation on the new connection.
    pub fn reset_connection(&mut self) {
        self.last_progress_us = None;
        self.drained = false;
    }
}
