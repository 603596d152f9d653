//! Simulated device transport
//!
//! Bytes are scheduled at points in time on a shared [`Clock`] and become
//! readable once that time has passed. With a [`crate::clock::ManualClock`]
//! this gives fully deterministic end-to-end tests; with a
//! [`crate::clock::SystemClock`] it stands in for hardware.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rootstar_telemetry_core::encode::{encode_frame, FrameBytes};
use rootstar_telemetry_core::ProtocolVariant;

use crate::bridge::ByteSource;
use crate::clock::Clock;
use crate::acquisition::reconcile::SUPER_FRAME;

/// Frame rate used for variants that stream continuously.
pub const CONTINUOUS_RATE_HZ: u32 = 256;

/// Gap between the two frames of a simulated super-frame pair.
pub const PAIR_SPACING: Duration = Duration::from_millis(60);

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// In-memory [`ByteSource`] fed from a time-stamped schedule.
pub struct SimulatedTransport {
    clock: Arc<dyn Clock>,
    pending: VecDeque<(u64, u8)>,
    fail_at_us: Option<u64>,
}

impl SimulatedTransport {
    /// Create an empty transport reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, pending: VecDeque::new(), fail_at_us: None }
    }

    /// Create a transport that plays back a frame schedule.
    #[must_use]
    pub fn with_schedule(clock: Arc<dyn Clock>, schedule: &[(Duration, FrameBytes)]) -> Self {
        let mut transport = Self::new(clock);
        for (at, bytes) in schedule {
            transport.push_at(*at, bytes);
        }
        transport
    }

    /// Make `bytes` readable from time `at` on.
    pub fn push_at(&mut self, at: Duration, bytes: &[u8]) {
        let at_us = micros(at);
        let in_order = self.pending.back().map_or(true, |&(last, _)| last <= at_us);
        self.pending.extend(bytes.iter().map(|&byte| (at_us, byte)));
        if !in_order {
            self.pending.make_contiguous().sort_by_key(|&(t, _)| t);
        }
    }

    /// Make `bytes` readable immediately, as data left over in a driver
    /// buffer from before a reconnect.
    pub fn push_backlog(&mut self, bytes: &[u8]) {
        let now = Duration::from_micros(self.clock.now_us());
        self.push_at(now, bytes);
    }

    /// Fail every read from time `at` on.
    pub fn fail_at(&mut self, at: Duration) {
        self.fail_at_us = Some(micros(at));
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn check_link(&self, now: u64) -> io::Result<()> {
        match self.fail_at_us {
            Some(at) if now >= at => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated device disconnected"))
            }
            _ => Ok(()),
        }
    }
}

impl ByteSource for SimulatedTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let now = self.clock.now_us();
        self.check_link(now)?;
        match self.pending.front() {
            Some(&(at, byte)) if at <= now => {
                self.pending.pop_front();
                Ok(Some(byte))
            }
            _ => Ok(None),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let now = self.clock.now_us();
        self.check_link(now)?;
        Ok(self.pending.iter().take_while(|&&(at, _)| at <= now).count())
    }
}

/// Generate a plausible frame schedule for `variant` lasting `duration`,
/// starting at `start`.
///
/// Variants 5 and 6 emit a back-to-back pair per 400 ms super-frame, the
/// others stream at [`CONTINUOUS_RATE_HZ`]. Channel values are slow sine
/// waves around mid-scale.
#[must_use]
pub fn synthetic_schedule(
    variant: ProtocolVariant,
    start: Duration,
    duration: Duration,
) -> Vec<(Duration, FrameBytes)> {
    let channels = variant.descriptor().output_channels;
    let sub_modes = variant.descriptor().sync.sub_modes();

    let times: Vec<Duration> = if variant.emits_paired_frames() {
        let pairs = (duration.as_micros() / SUPER_FRAME.as_micros()) as u32;
        (0..pairs)
            .flat_map(|n| {
                let base = start + SUPER_FRAME * n;
                [base, base + PAIR_SPACING]
            })
            .collect()
    } else {
        let period = Duration::from_secs(1) / CONTINUOUS_RATE_HZ;
        let frames = (duration.as_micros() / period.as_micros()) as u32;
        (0..frames).map(|n| start + period * n).collect()
    };

    times
        .into_iter()
        .enumerate()
        .filter_map(|(n, at)| {
            let values: Vec<u16> = (0..channels)
                .map(|ch| {
                    let t = (n * channels + ch) as f64 / (channels as f64 * 64.0);
                    let freq = 1.0 + (ch % 4) as f64;
                    (512.0 + 300.0 * (2.0 * PI * freq * t).sin()) as u16
                })
                .collect();
            let tag = if sub_modes > 1 { (n % usize::from(sub_modes)) as u8 } else { n as u8 };
            encode_frame(variant, &values, 0, tag).ok().map(|bytes| (at, bytes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_bytes_become_available_on_schedule() {
        let clock = ManualClock::new();
        let mut transport = SimulatedTransport::new(Arc::new(clock.clone()));
        transport.push_at(Duration::from_millis(10), &[1, 2, 3]);

        assert_eq!(transport.bytes_available().unwrap(), 0);
        assert_eq!(transport.read_byte().unwrap(), None);
        assert_eq!(transport.remaining(), 3);

        clock.advance(Duration::from_millis(10));
        assert_eq!(transport.bytes_available().unwrap(), 3);
        assert_eq!(transport.read_byte().unwrap(), Some(1));
        assert_eq!(transport.bytes_available().unwrap(), 2);
        assert_eq!(transport.remaining(), 2);
    }

    #[test]
    fn test_out_of_order_pushes_sorted() {
        let clock = ManualClock::new();
        let mut transport = SimulatedTransport::new(Arc::new(clock.clone()));
        transport.push_at(Duration::from_millis(20), &[2]);
        transport.push_at(Duration::from_millis(10), &[1]);

        clock.advance(Duration::from_millis(15));
        assert_eq!(transport.read_byte().unwrap(), Some(1));
        assert_eq!(transport.read_byte().unwrap(), None);
    }

    #[test]
    fn test_failure_injection() {
        let clock = ManualClock::new();
        let mut transport = SimulatedTransport::new(Arc::new(clock.clone()));
        transport.fail_at(Duration::from_millis(5));

        assert!(transport.bytes_available().is_ok());
        clock.advance(Duration::from_millis(5));
        let err = transport.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_synthetic_schedule_pairs() {
        let schedule = synthetic_schedule(
            ProtocolVariant::FourChannelCrc,
            Duration::from_millis(50),
            Duration::from_secs(2),
        );
        assert_eq!(schedule.len(), 10);
        assert_eq!(schedule[0].0, Duration::from_millis(50));
        assert_eq!(schedule[1].0, Duration::from_millis(50) + PAIR_SPACING);
        assert_eq!(schedule[2].0, Duration::from_millis(450));
        assert!(schedule.iter().all(|(_, bytes)| bytes.len() == 12));
    }

    #[test]
    fn test_synthetic_schedule_continuous() {
        let schedule =
            synthetic_schedule(ProtocolVariant::ModularEeg, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(schedule.len(), CONTINUOUS_RATE_HZ as usize);
        assert_eq!(schedule[1].1[3], 1);
    }
}
