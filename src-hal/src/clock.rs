//! Host clock to sample time translation
//!
//! The HAL correlates our sample position with its own timeline through
//! zero timestamps: a `(sample_time, host_time)` pair sampled on demand.
//! Ticks per frame is derived once from the host clock frequency and the
//! fixed nominal sample rate; the anchor is captured at every IO start.

use atomic_float::AtomicF64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Seed reported with every zero timestamp; the timeline is never re-based mid-stream
pub const ZERO_TIMESTAMP_SEED: u64 = 1;

/// Free-running monotonic tick source
pub trait HostClock: Send + Sync {
    /// Ticks per second
    fn frequency_hz(&self) -> f64;

    /// Current tick count
    fn now(&self) -> u64;
}

/// `mach_absolute_time` based clock, the same timebase the HAL uses
#[cfg(target_os = "macos")]
#[derive(Debug, Default, Clone, Copy)]
pub struct MachClock;

#[cfg(target_os = "macos")]
#[allow(deprecated)]
impl HostClock for MachClock {
    fn frequency_hz(&self) -> f64 {
        let mut info = libc::mach_timebase_info_data_t { numer: 0, denom: 0 };
        // SAFETY: info is a valid out-pointer for the duration of the call
        unsafe {
            libc::mach_timebase_info(&mut info);
        }
        if info.numer == 0 || info.denom == 0 {
            return 1_000_000_000.0;
        }
        // ticks * numer / denom = nanoseconds
        1_000_000_000.0 * (info.denom as f64) / (info.numer as f64)
    }

    fn now(&self) -> u64 {
        // SAFETY: no preconditions
        unsafe { libc::mach_absolute_time() }
    }
}

/// `CLOCK_MONOTONIC` in nanoseconds
#[cfg(all(unix, not(target_os = "macos")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

#[cfg(all(unix, not(target_os = "macos")))]
impl HostClock for MonotonicClock {
    fn frequency_hz(&self) -> f64 {
        1_000_000_000.0
    }

    fn now(&self) -> u64 {
        // SAFETY: timespec is plain old data; ts is a valid out-pointer and
        // CLOCK_MONOTONIC always exists on unix
        let ts = unsafe {
            let mut ts: libc::timespec = std::mem::zeroed();
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            ts
        };
        (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
    }
}

/// The platform's native host clock
#[cfg(target_os = "macos")]
pub fn system_clock() -> Box<dyn HostClock> {
    Box::new(MachClock)
}

/// The platform's native host clock
#[cfg(all(unix, not(target_os = "macos")))]
pub fn system_clock() -> Box<dyn HostClock> {
    Box::new(MonotonicClock)
}

/// Manually stepped clock for simulations and tests
#[derive(Debug)]
pub struct ManualClock {
    frequency_hz: f64,
    ticks: AtomicU64,
}

impl ManualClock {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl HostClock for ManualClock {
    fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl<C: HostClock + ?Sized> HostClock for std::sync::Arc<C> {
    fn frequency_hz(&self) -> f64 {
        (**self).frequency_hz()
    }

    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// A host-time / sample-time correlation point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroTimestamp {
    pub sample_time: f64,
    pub host_time: u64,
    pub seed: u64,
}

/// Host ticks elapsing per audio frame
#[inline]
pub fn compute_ticks_per_frame(host_clock_freq_hz: f64, sample_rate_hz: f64) -> f64 {
    host_clock_freq_hz / sample_rate_hz
}

/// Sample position of `now` relative to `anchor`
///
/// A `now` earlier than `anchor` (an anchor observed mid-update) and a
/// non-positive `ticks_per_frame` (not yet initialized) both report sample 0.
#[inline]
pub fn zero_timestamp(now: u64, anchor: u64, ticks_per_frame: f64) -> ZeroTimestamp {
    let sample_time = if ticks_per_frame > 0.0 {
        now.saturating_sub(anchor) as f64 / ticks_per_frame
    } else {
        0.0
    };
    ZeroTimestamp {
        sample_time,
        host_time: now,
        seed: ZERO_TIMESTAMP_SEED,
    }
}

/// Host ticks spanned by `frames`, rounded to the nearest tick
#[inline]
pub fn frames_to_ticks(frames: u64, ticks_per_frame: f64) -> u64 {
    (frames as f64 * ticks_per_frame).round() as u64
}

/// Clock state shared by the lifecycle and the timestamp query
///
/// All fields are relaxed atomics: the anchor is written only by IO start,
/// and a timestamp computed against a stale anchor is off for one report.
#[derive(Debug)]
pub struct ClockState {
    ticks_per_frame: AtomicF64,
    anchor_host_time: AtomicU64,
}

impl ClockState {
    pub fn new() -> Self {
        Self {
            ticks_per_frame: AtomicF64::new(0.0),
            anchor_host_time: AtomicU64::new(0),
        }
    }

    /// Derive ticks per frame from the host clock frequency
    pub fn calibrate(&self, host_clock_freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let ticks_per_frame = compute_ticks_per_frame(host_clock_freq_hz, sample_rate_hz);
        self.ticks_per_frame.store(ticks_per_frame, Ordering::Relaxed);
        ticks_per_frame
    }

    pub fn ticks_per_frame(&self) -> f64 {
        self.ticks_per_frame.load(Ordering::Relaxed)
    }

    pub fn anchor(&self) -> u64 {
        self.anchor_host_time.load(Ordering::Relaxed)
    }

    pub fn set_anchor(&self, host_time: u64) {
        self.anchor_host_time.store(host_time, Ordering::Relaxed);
    }

    pub fn timestamp(&self, now: u64) -> ZeroTimestamp {
        zero_timestamp(now, self.anchor(), self.ticks_per_frame())
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_per_frame() {
        assert_eq!(compute_ticks_per_frame(1_000_000_000.0, 44100.0), 1e9 / 44100.0);
        // Apple silicon timebase: 24 MHz
        let tpf = compute_ticks_per_frame(24_000_000.0, 44100.0);
        assert!((tpf - 544.217_687).abs() < 1e-5);
    }

    #[test]
    fn test_zero_timestamp_basic() {
        let tpf = compute_ticks_per_frame(44100.0 * 100.0, 44100.0);
        let ts = zero_timestamp(1_000 + 4410, 1_000, tpf);
        assert_eq!(ts.sample_time, 44.1);
        assert_eq!(ts.host_time, 5410);
        assert_eq!(ts.seed, ZERO_TIMESTAMP_SEED);
    }

    #[test]
    fn test_zero_timestamp_stale_anchor_and_uncalibrated() {
        assert_eq!(zero_timestamp(10, 20, 100.0).sample_time, 0.0);
        assert_eq!(zero_timestamp(10_000, 0, 0.0).sample_time, 0.0);
    }

    #[test]
    fn test_long_session_precision() {
        // Six hours at 44.1 kHz on a 24 MHz timebase
        let tpf = compute_ticks_per_frame(24_000_000.0, 44100.0);
        let frames: u64 = 6 * 3600 * 44100;
        let ticks = frames_to_ticks(frames, tpf);
        let ts = zero_timestamp(ticks, 0, tpf);
        assert!((ts.sample_time - frames as f64).abs() < 0.01);
    }

    #[test]
    fn test_clock_state() {
        let state = ClockState::new();
        assert_eq!(state.ticks_per_frame(), 0.0);
        state.calibrate(88200.0, 44100.0);
        assert_eq!(state.ticks_per_frame(), 2.0);

        state.set_anchor(100);
        assert_eq!(state.anchor(), 100);
        assert_eq!(state.timestamp(300).sample_time, 100.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1000.0);
        clock.set(5);
        clock.advance(10);
        assert_eq!(clock.now(), 15);
        assert_eq!(clock.frequency_hz(), 1000.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = system_clock();
        assert!(clock.frequency_hz() > 0.0);
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
