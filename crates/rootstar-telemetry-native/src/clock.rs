//! Monotonic time and interruptible waits
//!
//! Every wait in the acquisition path (idle polling, reconciliation holds,
//! reconnect delays) goes through a [`Clock`] so it can be interrupted by a
//! [`ShutdownSignal`] and so tests can run against virtual time with
//! [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

// ============================================================================
// Shutdown Signalling
// ============================================================================

/// Receiving side of a shutdown request. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self { rx: crossbeam_channel::never() }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }

    /// Block for up to `duration`, returning early on shutdown.
    pub fn sleep(&self, duration: Duration) -> WaitOutcome {
        match self.rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => WaitOutcome::Elapsed,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => WaitOutcome::Interrupted,
        }
    }
}

/// Sending side of a shutdown request.
///
/// Triggering (or dropping) it wakes every wait on the paired signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Option<Sender<()>>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&mut self) {
        self.tx.take();
    }

    /// Whether [`Self::trigger`] has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.tx.is_none()
    }
}

/// Create a connected trigger/signal pair.
#[must_use]
pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (ShutdownTrigger { tx: Some(tx) }, ShutdownSignal { rx })
}

// ============================================================================
// Clocks
// ============================================================================

/// How a wait consumes its time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Yield to the OS scheduler
    #[default]
    Sleep,
    /// Busy-wait on the monotonic clock; occupies a core for lower jitter
    Spin,
}

/// Result of a wait.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed
    Elapsed,
    /// Shutdown was requested before the duration passed
    Interrupted,
}

/// Monotonic time source with interruptible waits.
pub trait Clock: Send + Sync {
    /// Microseconds since the clock's epoch.
    fn now_us(&self) -> u64;

    /// Wait for `duration` unless `shutdown` fires first.
    fn wait(&self, duration: Duration, shutdown: &ShutdownSignal) -> WaitOutcome;
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch: Instant,
    strategy: WaitStrategy,
}

impl SystemClock {
    /// Create a clock whose epoch is now.
    #[must_use]
    pub fn new(strategy: WaitStrategy) -> Self {
        Self { epoch: Instant::now(), strategy }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(WaitStrategy::default())
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn wait(&self, duration: Duration, shutdown: &ShutdownSignal) -> WaitOutcome {
        match self.strategy {
            WaitStrategy::Sleep => shutdown.sleep(duration),
            WaitStrategy::Spin => {
                let deadline = Instant::now() + duration;
                while Instant::now() < deadline {
                    if shutdown.is_triggered() {
                        return WaitOutcome::Interrupted;
                    }
                    std::hint::spin_loop();
                }
                WaitOutcome::Elapsed
            }
        }
    }
}

/// Virtual clock for deterministic tests.
///
/// Time only moves when a wait is performed or [`ManualClock::advance`] is
/// called. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.now_us.fetch_add(micros, Ordering::SeqCst);
    }

    /// Current time as a duration since the epoch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn wait(&self, duration: Duration, shutdown: &ShutdownSignal) -> WaitOutcome {
        if shutdown.is_triggered() {
            return WaitOutcome::Interrupted;
        }
        self.advance(duration);
        WaitOutcome::Elapsed
    }
}
